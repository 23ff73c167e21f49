//! Calculation formatting metadata and its three surface syntaxes.
//!
//! [`Format`] is a closed tagged union: every variant carries exactly the attributes its kind
//! accepts, so an attribute that makes no sense for a kind (e.g. `Accuracy` on `General`) cannot be
//! represented. Each surface syntax converts with one exhaustive `match`:
//!
//! - [`text`]: the `CALCULATION PROPERTY <kind> Key=Value ...` clause of measure scripts.
//! - [`xml`]: the `<Format Format="..." .../>` element and `<CalculationProperty>` blocks of the
//!   XML-based model document.
//! - [`json`]: the measure object properties of the JSON-based model document, where the format
//!   travels as an XML fragment inside the `Format` annotation.

pub mod json;
pub mod text;
pub mod xml;

use std::fmt;

use crate::error::FormatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatKind {
    General,
    NumberDecimal,
    NumberWhole,
    Percentage,
    Scientific,
    Currency,
    DateTimeCustom,
    DateTimeShortDatePattern,
    DateTimeGeneral,
    Text,
}

impl FormatKind {
    pub const ALL: [FormatKind; 10] = [
        FormatKind::General,
        FormatKind::NumberDecimal,
        FormatKind::NumberWhole,
        FormatKind::Percentage,
        FormatKind::Scientific,
        FormatKind::Currency,
        FormatKind::DateTimeCustom,
        FormatKind::DateTimeShortDatePattern,
        FormatKind::DateTimeGeneral,
        FormatKind::Text,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            FormatKind::General => "General",
            FormatKind::NumberDecimal => "NumberDecimal",
            FormatKind::NumberWhole => "NumberWhole",
            FormatKind::Percentage => "Percentage",
            FormatKind::Scientific => "Scientific",
            FormatKind::Currency => "Currency",
            FormatKind::DateTimeCustom => "DateTimeCustom",
            FormatKind::DateTimeShortDatePattern => "DateTimeShortDatePattern",
            FormatKind::DateTimeGeneral => "DateTimeGeneral",
            FormatKind::Text => "Text",
        }
    }

    /// Case-insensitive lookup of a format kind name.
    pub fn from_name(name: &str) -> Result<Self, FormatError> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| FormatError::UnknownKind(name.to_string()))
    }
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered `name="value"` attribute list carried by `Currency` (locale, symbol, patterns) and
/// `DateTimeCustom` (locale, group, pattern) formats.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CustomFormat {
    attributes: Vec<(String, String)>,
}

impl CustomFormat {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an attribute, replacing the value of an existing attribute with the same name.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Parse an attribute list such as `LCID="1033" Symbol="$"`.
    ///
    /// Values use XML attribute escaping, so the list can be dropped verbatim onto an element.
    pub fn parse(list: &str) -> Result<Self, FormatError> {
        let wrapped = format!("<a {list}/>");
        let doc =
            roxmltree::Document::parse(&wrapped).map_err(|err| FormatError::AttributeList {
                input: list.to_string(),
                reason: err.to_string(),
            })?;
        let mut out = Self::new();
        for attr in doc.root_element().attributes() {
            out.attributes
                .push((attr.name().to_string(), attr.value().to_string()));
        }
        Ok(out)
    }

    pub(crate) fn from_node(node: roxmltree::Node<'_, '_>) -> Self {
        let attributes = node
            .attributes()
            .map(|attr| (attr.name().to_string(), attr.value().to_string()))
            .collect();
        Self { attributes }
    }
}

impl fmt::Display for CustomFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, (name, value)) in self.attributes.iter().enumerate() {
            if idx > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{name}=\"{}\"", xml::escape_attribute(value))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Format {
    #[default]
    General,
    NumberDecimal {
        accuracy: Option<u32>,
        thousand_separator: bool,
    },
    NumberWhole {
        accuracy: Option<u32>,
        thousand_separator: bool,
    },
    Percentage {
        accuracy: Option<u32>,
    },
    Scientific {
        accuracy: Option<u32>,
    },
    Currency {
        accuracy: Option<u32>,
        currency: Option<CustomFormat>,
    },
    DateTimeCustom {
        date_time: Option<CustomFormat>,
    },
    DateTimeShortDatePattern,
    DateTimeGeneral,
    Text,
}

impl Format {
    #[must_use]
    pub fn kind(&self) -> FormatKind {
        match self {
            Format::General => FormatKind::General,
            Format::NumberDecimal { .. } => FormatKind::NumberDecimal,
            Format::NumberWhole { .. } => FormatKind::NumberWhole,
            Format::Percentage { .. } => FormatKind::Percentage,
            Format::Scientific { .. } => FormatKind::Scientific,
            Format::Currency { .. } => FormatKind::Currency,
            Format::DateTimeCustom { .. } => FormatKind::DateTimeCustom,
            Format::DateTimeShortDatePattern => FormatKind::DateTimeShortDatePattern,
            Format::DateTimeGeneral => FormatKind::DateTimeGeneral,
            Format::Text => FormatKind::Text,
        }
    }

    #[must_use]
    pub fn accuracy(&self) -> Option<u32> {
        self.parts().accuracy
    }

    #[must_use]
    pub fn thousand_separator(&self) -> bool {
        self.parts().thousand_separator.unwrap_or(false)
    }

    #[must_use]
    pub fn custom_format(&self) -> Option<&CustomFormat> {
        match self {
            Format::Currency { currency, .. } => currency.as_ref(),
            Format::DateTimeCustom { date_time } => date_time.as_ref(),
            _ => None,
        }
    }

    /// Flatten into the attribute bag shared by all surface syntaxes.
    pub(crate) fn parts(&self) -> FormatParts {
        match self {
            Format::General
            | Format::DateTimeShortDatePattern
            | Format::DateTimeGeneral
            | Format::Text => FormatParts::default(),
            Format::NumberDecimal {
                accuracy,
                thousand_separator,
            }
            | Format::NumberWhole {
                accuracy,
                thousand_separator,
            } => FormatParts {
                accuracy: *accuracy,
                thousand_separator: thousand_separator.then_some(true),
                custom: None,
            },
            Format::Percentage { accuracy } | Format::Scientific { accuracy } => FormatParts {
                accuracy: *accuracy,
                ..FormatParts::default()
            },
            Format::Currency { accuracy, currency } => FormatParts {
                accuracy: *accuracy,
                thousand_separator: None,
                custom: currency.clone(),
            },
            Format::DateTimeCustom { date_time } => FormatParts {
                custom: date_time.clone(),
                ..FormatParts::default()
            },
        }
    }

    /// Build a format of `kind` from a parsed attribute bag. Attributes the kind does not accept
    /// are dropped with a warning.
    pub(crate) fn from_parts(kind: FormatKind, parts: FormatParts) -> Self {
        let FormatParts {
            accuracy,
            thousand_separator,
            custom,
        } = parts;
        let custom = custom.filter(|c| !c.is_empty());
        let ignore = |name: &str, present: bool| {
            if present {
                log::warn!("{name} is not valid for {kind} formats; ignoring it");
            }
        };

        match kind {
            FormatKind::General
            | FormatKind::DateTimeShortDatePattern
            | FormatKind::DateTimeGeneral
            | FormatKind::Text => {
                ignore("Accuracy", accuracy.is_some());
                ignore("ThousandSeparator", thousand_separator == Some(true));
                ignore("AdditionalInfo", custom.is_some());
                match kind {
                    FormatKind::DateTimeShortDatePattern => Format::DateTimeShortDatePattern,
                    FormatKind::DateTimeGeneral => Format::DateTimeGeneral,
                    FormatKind::Text => Format::Text,
                    _ => Format::General,
                }
            }
            FormatKind::NumberDecimal | FormatKind::NumberWhole => {
                ignore("AdditionalInfo", custom.is_some());
                let thousand_separator = thousand_separator.unwrap_or(false);
                if kind == FormatKind::NumberDecimal {
                    Format::NumberDecimal {
                        accuracy,
                        thousand_separator,
                    }
                } else {
                    Format::NumberWhole {
                        accuracy,
                        thousand_separator,
                    }
                }
            }
            FormatKind::Percentage | FormatKind::Scientific => {
                ignore("ThousandSeparator", thousand_separator == Some(true));
                ignore("AdditionalInfo", custom.is_some());
                if kind == FormatKind::Percentage {
                    Format::Percentage { accuracy }
                } else {
                    Format::Scientific { accuracy }
                }
            }
            FormatKind::Currency => {
                ignore("ThousandSeparator", thousand_separator == Some(true));
                Format::Currency {
                    accuracy,
                    currency: custom,
                }
            }
            FormatKind::DateTimeCustom => {
                ignore("Accuracy", accuracy.is_some());
                ignore("ThousandSeparator", thousand_separator == Some(true));
                Format::DateTimeCustom { date_time: custom }
            }
        }
    }
}

/// Loosely-typed attribute bag collected while reading any surface syntax.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct FormatParts {
    pub(crate) accuracy: Option<u32>,
    pub(crate) thousand_separator: Option<bool>,
    pub(crate) custom: Option<CustomFormat>,
}

/// `True`/`False` as written by the model designers; reading is case-insensitive.
pub(crate) fn bool_text(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_format_list_keeps_tabs_and_line_breaks() {
        let custom = CustomFormat::new()
            .with("LCID", "1033")
            .with("FormatString", "a\tb\nc\r");
        let list = custom.to_string();
        assert!(!list.contains(['\t', '\n', '\r']), "{list}");
        assert_eq!(CustomFormat::parse(&list), Ok(custom));
    }

    #[test]
    fn kind_names_round_trip() {
        for kind in FormatKind::ALL {
            assert_eq!(FormatKind::from_name(kind.name()), Ok(kind));
        }
        assert_eq!(
            FormatKind::from_name("numberdecimal"),
            Ok(FormatKind::NumberDecimal)
        );
        assert!(matches!(
            FormatKind::from_name("Money"),
            Err(FormatError::UnknownKind(name)) if name == "Money"
        ));
    }

    #[test]
    fn from_parts_drops_attributes_the_kind_does_not_accept() {
        let parts = FormatParts {
            accuracy: Some(2),
            thousand_separator: Some(true),
            custom: Some(CustomFormat::new().with("LCID", "1033")),
        };
        assert_eq!(Format::from_parts(FormatKind::General, parts.clone()), Format::General);
        assert_eq!(
            Format::from_parts(FormatKind::Percentage, parts.clone()),
            Format::Percentage { accuracy: Some(2) }
        );
        assert_eq!(
            Format::from_parts(FormatKind::Currency, parts),
            Format::Currency {
                accuracy: Some(2),
                currency: Some(CustomFormat::new().with("LCID", "1033")),
            }
        );
    }

    #[test]
    fn custom_format_attribute_list() {
        let custom = CustomFormat::parse(r#"LCID="1033" DisplayName="$ English" Symbol="&amp;""#)
            .unwrap();
        assert_eq!(custom.get("Symbol"), Some("&"));
        assert_eq!(
            custom.to_string(),
            r#"LCID="1033" DisplayName="$ English" Symbol="&amp;""#
        );
        assert!(CustomFormat::parse("LCID=1033").is_err());
    }
}
