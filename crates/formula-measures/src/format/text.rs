//! `CALCULATION PROPERTY` clauses in measure scripts.
//!
//! ```text
//! CALCULATION PROPERTY Currency Visible=False Accuracy=2 Format='\$#,0.00' AdditionalInfo='LCID="1033"'
//! ```
//!
//! Fields are written in a fixed order and only when non-empty; the parser accepts them in any
//! order.

use std::fmt::Write as _;

use crate::error::FormatError;
use crate::format::{parse_bool, CustomFormat, Format, FormatKind, FormatParts};
use crate::model::{non_empty, CalculationProperty, Kpi, KpiAnnotations};

const KPI_ANNOTATIONS_KEY: &str = "KpiAnnotations";

fn kpi_fields(kpi: &Kpi) -> [(&'static str, &Option<String>); 10] {
    [
        ("KpiDescription", &kpi.description),
        ("KpiTargetFormatString", &kpi.target_format_string),
        ("KpiTargetDescription", &kpi.target_description),
        ("KpiTargetExpression", &kpi.target_expression),
        ("KpiStatusGraphic", &kpi.status_graphic),
        ("KpiStatusDescription", &kpi.status_description),
        ("KpiStatusExpression", &kpi.status_expression),
        ("KpiTrendGraphic", &kpi.trend_graphic),
        ("KpiTrendDescription", &kpi.trend_description),
        ("KpiTrendExpression", &kpi.trend_expression),
    ]
}

fn kpi_field_mut<'k>(kpi: &'k mut Kpi, key: &str) -> Option<&'k mut Option<String>> {
    let field = match key.to_ascii_lowercase().as_str() {
        "kpidescription" => &mut kpi.description,
        "kpitargetformatstring" => &mut kpi.target_format_string,
        "kpitargetdescription" => &mut kpi.target_description,
        "kpitargetexpression" => &mut kpi.target_expression,
        "kpistatusgraphic" => &mut kpi.status_graphic,
        "kpistatusdescription" => &mut kpi.status_description,
        "kpistatusexpression" => &mut kpi.status_expression,
        "kpitrendgraphic" => &mut kpi.trend_graphic,
        "kpitrenddescription" => &mut kpi.trend_description,
        "kpitrendexpression" => &mut kpi.trend_expression,
        _ => return None,
    };
    Some(field)
}

impl CalculationProperty {
    /// Render the `CALCULATION PROPERTY` clause, or `None` when the property is the default.
    #[must_use]
    pub fn to_dax_text(&self) -> Option<String> {
        let property = self.clone().normalized();
        if property.is_default() {
            return None;
        }

        let mut out = format!("CALCULATION PROPERTY {}", property.format.kind());
        if property.is_hidden {
            out.push_str(" Visible=False");
        }
        let parts = property.format.parts();
        if let Some(accuracy) = parts.accuracy {
            let _ = write!(out, " Accuracy={accuracy}");
        }
        if parts.thousand_separator == Some(true) {
            out.push_str(" ThousandSeparator=True");
        }
        if let Some(format_string) = non_empty(&property.format_string) {
            push_pair(&mut out, "Format", format_string);
        }
        if let Some(custom) = parts.custom.filter(|c| !c.is_empty()) {
            push_pair(&mut out, "AdditionalInfo", &custom.to_string());
        }
        if let Some(folder) = non_empty(&property.display_folder) {
            push_pair(&mut out, "DisplayFolder", folder);
        }
        if let Some(description) = non_empty(&property.description) {
            push_pair(&mut out, "Description", description);
        }
        if let Some(kpi) = &property.kpi {
            for (key, value) in kpi_fields(kpi) {
                if let Some(value) = non_empty(value) {
                    push_pair(&mut out, key, value);
                }
            }
            if !kpi.annotations.is_empty() {
                push_pair(
                    &mut out,
                    KPI_ANNOTATIONS_KEY,
                    &kpi_annotations_text(&kpi.annotations),
                );
            }
        }
        Some(out)
    }
}

fn push_pair(out: &mut String, key: &str, value: &str) {
    let _ = write!(out, " {key}={}", quote_value(value));
}

/// `'value'`, with `'` escaped as `''`.
#[must_use]
pub fn quote_value(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Read a single-quoted value starting at `start` (which must point at the opening `'`). Values
/// may span lines. Returns the decoded value and the byte offset just past the closing quote.
pub(crate) fn read_quoted_value(src: &str, start: usize) -> Option<(String, usize)> {
    let rest = src.get(start..)?;
    let mut chars = rest.char_indices();
    if chars.next().map(|(_, c)| c) != Some('\'') {
        return None;
    }
    let mut out = String::new();
    let mut chars = chars.peekable();
    while let Some((idx, c)) = chars.next() {
        if c == '\'' {
            if chars.peek().is_some_and(|(_, next)| *next == '\'') {
                chars.next();
                out.push('\'');
                continue;
            }
            return Some((out, start + idx + 1));
        }
        out.push(c);
    }
    None
}

/// `Name="Value", Other="x ""quoted"" y"`.
#[must_use]
pub fn kpi_annotations_text(annotations: &KpiAnnotations) -> String {
    annotations
        .iter()
        .map(|(name, value)| format!("{name}=\"{}\"", value.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse the `KpiAnnotations` list, preserving left-to-right order. Duplicate names are rejected.
pub fn parse_kpi_annotations(list: &str) -> Result<KpiAnnotations, FormatError> {
    let fail = |reason: &str| FormatError::AnnotationList {
        input: list.to_string(),
        reason: reason.to_string(),
    };

    let mut annotations = KpiAnnotations::new();
    let mut rest = list.trim_start();
    while !rest.is_empty() {
        let eq = rest.find('=').ok_or_else(|| fail("expected `=` after name"))?;
        let name = rest[..eq].trim();
        if name.is_empty() {
            return Err(fail("annotation name is empty"));
        }
        let after_eq = rest[eq + 1..].trim_start();
        let Some(body) = after_eq.strip_prefix('"') else {
            return Err(fail("annotation value must be double-quoted"));
        };

        let mut value = String::new();
        let mut chars = body.char_indices().peekable();
        let mut consumed = None;
        while let Some((idx, c)) = chars.next() {
            if c == '"' {
                if chars.peek().is_some_and(|(_, next)| *next == '"') {
                    chars.next();
                    value.push('"');
                    continue;
                }
                consumed = Some(idx + 1);
                break;
            }
            value.push(c);
        }
        let consumed = consumed.ok_or_else(|| fail("unterminated annotation value"))?;
        if !annotations.insert(name, value) {
            return Err(fail(&format!("duplicate annotation `{name}`")));
        }

        rest = body[consumed..].trim_start();
        if let Some(next) = rest.strip_prefix(',') {
            rest = next.trim_start();
            if rest.is_empty() {
                return Err(fail("trailing `,`"));
            }
        } else if !rest.is_empty() {
            return Err(fail("expected `,` between annotations"));
        }
    }
    Ok(annotations)
}

/// A literal on the right-hand side of a `Key=Value` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ClauseValue {
    Text(String),
    Number(u32),
    Bool(bool),
}

impl ClauseValue {
    fn into_text(self, key: &str) -> Result<String, String> {
        match self {
            ClauseValue::Text(text) => Ok(text),
            _ => Err(format!("{key} expects a quoted string")),
        }
    }

    fn into_bool(self, key: &str) -> Result<bool, String> {
        match self {
            ClauseValue::Bool(value) => Ok(value),
            ClauseValue::Text(text) => {
                parse_bool(&text).ok_or_else(|| format!("{key} expects True or False"))
            }
            ClauseValue::Number(_) => Err(format!("{key} expects True or False")),
        }
    }

    fn into_number(self, key: &str) -> Result<u32, String> {
        match self {
            ClauseValue::Number(value) => Ok(value),
            ClauseValue::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| format!("{key} expects a non-negative integer")),
            ClauseValue::Bool(_) => Err(format!("{key} expects a non-negative integer")),
        }
    }
}

/// Collects `Key=Value` pairs of one clause into a [`CalculationProperty`].
#[derive(Debug, Clone)]
pub(crate) struct PropertyBuilder {
    kind: FormatKind,
    parts: FormatParts,
    property: CalculationProperty,
    kpi: Option<Kpi>,
}

impl PropertyBuilder {
    pub(crate) fn new(kind: FormatKind) -> Self {
        Self {
            kind,
            parts: FormatParts::default(),
            property: CalculationProperty::default(),
            kpi: None,
        }
    }

    /// Apply one clause; the error message is reported at the key's position.
    pub(crate) fn apply(&mut self, key: &str, value: ClauseValue) -> Result<(), String> {
        match key.to_ascii_lowercase().as_str() {
            "accuracy" => self.parts.accuracy = Some(value.into_number(key)?),
            "thousandseparator" => self.parts.thousand_separator = Some(value.into_bool(key)?),
            "visible" => self.property.is_hidden = !value.into_bool(key)?,
            "format" => self.property.format_string = Some(value.into_text(key)?),
            "additionalinfo" => {
                let list = value.into_text(key)?;
                let custom = CustomFormat::parse(&list).map_err(|err| err.to_string())?;
                self.parts.custom = Some(custom);
            }
            "displayfolder" => self.property.display_folder = Some(value.into_text(key)?),
            "description" => self.property.description = Some(value.into_text(key)?),
            "kpiannotations" => {
                let list = value.into_text(key)?;
                let annotations = parse_kpi_annotations(&list).map_err(|err| err.to_string())?;
                self.kpi.get_or_insert_with(Kpi::default).annotations = annotations;
            }
            _ => {
                let kpi = self.kpi.get_or_insert_with(Kpi::default);
                let Some(field) = kpi_field_mut(kpi, key) else {
                    return Err(format!("unknown calculation property key '{key}'"));
                };
                *field = Some(value.into_text(key)?);
            }
        }
        Ok(())
    }

    pub(crate) fn finish(self) -> CalculationProperty {
        CalculationProperty {
            format: Format::from_parts(self.kind, self.parts),
            kpi: self.kpi,
            ..self.property
        }
        .normalized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_property_renders_nothing() {
        assert_eq!(CalculationProperty::default().to_dax_text(), None);
    }

    #[test]
    fn field_order_is_fixed() {
        let property = CalculationProperty {
            format: Format::NumberDecimal {
                accuracy: Some(2),
                thousand_separator: true,
            },
            format_string: Some("#,0.00".into()),
            is_hidden: true,
            display_folder: Some("Sales".into()),
            description: Some("It's net".into()),
            kpi: None,
        };
        assert_eq!(
            property.to_dax_text().as_deref(),
            Some(
                "CALCULATION PROPERTY NumberDecimal Visible=False Accuracy=2 \
ThousandSeparator=True Format='#,0.00' DisplayFolder='Sales' Description='It''s net'"
            )
        );
    }

    #[test]
    fn text_format_emits_kind_only() {
        let property = CalculationProperty {
            format: Format::Text,
            format_string: Some("@".into()),
            ..CalculationProperty::default()
        };
        assert_eq!(
            property.to_dax_text().as_deref(),
            Some("CALCULATION PROPERTY Text")
        );
    }

    #[test]
    fn quoted_values_span_lines() {
        let src = "x='a''b\nc' rest";
        let (value, end) = read_quoted_value(src, 2).unwrap();
        assert_eq!(value, "a'b\nc");
        assert_eq!(&src[end..], " rest");
        assert_eq!(read_quoted_value("'open", 0), None);
    }

    #[test]
    fn kpi_annotation_lists() {
        let annotations =
            parse_kpi_annotations(r#"GoalType="Measure", Note="say ""hi""""#).unwrap();
        assert_eq!(annotations.get("Note"), Some(r#"say "hi""#));
        assert_eq!(
            kpi_annotations_text(&annotations),
            r#"GoalType="Measure", Note="say ""hi""""#
        );
        assert!(parse_kpi_annotations(r#"A="1", A="2""#).is_err());
        assert!(parse_kpi_annotations(r#"A=1"#).is_err());
        assert!(parse_kpi_annotations("").unwrap().is_empty());
    }

    #[test]
    fn builder_rejects_unknown_keys_and_bad_values() {
        let mut builder = PropertyBuilder::new(FormatKind::Percentage);
        assert!(builder.apply("Colour", ClauseValue::Text("red".into())).is_err());
        assert!(builder.apply("Accuracy", ClauseValue::Bool(true)).is_err());
        builder.apply("accuracy", ClauseValue::Number(1)).unwrap();
        builder
            .apply("KpiStatusGraphic", ClauseValue::Text("Shapes".into()))
            .unwrap();
        let property = builder.finish();
        assert_eq!(property.format, Format::Percentage { accuracy: Some(1) });
        assert_eq!(
            property.kpi.and_then(|k| k.status_graphic).as_deref(),
            Some("Shapes")
        );
    }
}
