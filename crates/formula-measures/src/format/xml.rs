//! XML shapes used by the XML-based model document.
//!
//! A format is a `<Format>` element whose attributes carry the kind, accuracy and thousand
//! separator; locale details hang off a child element:
//!
//! ```xml
//! <Format Format="Currency" Accuracy="2" xmlns="">
//!   <Currency LCID="1033" DisplayName="$ English (United States)" Symbol="$" PositivePattern="0" NegativePattern="0" />
//! </Format>
//! <Format Format="DateTimeCustom" xmlns="">
//!   <DateTimes><DateTime LCID="1033" Group="ShortDate" FormatString="M/d/yyyy" /></DateTimes>
//! </Format>
//! ```
//!
//! Inside the engine namespace the element is written with `xmlns=""`; the JSON document embeds
//! the same fragment without it.

use std::borrow::Cow;
use std::io::Write;

use quick_xml::escape::{escape, partial_escape};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::Writer;
use roxmltree::Node;

use crate::error::{FormatError, MeasureResult};
use crate::format::{bool_text, parse_bool, CustomFormat, Format, FormatKind, FormatParts};
use crate::model::{non_empty, CalculationProperty, KpiAnnotations};

pub const ENGINE_NAMESPACE: &str = "http://schemas.microsoft.com/analysisservices/2003/engine";

/// Name of the calculation-property annotation that carries the `<Format>` element.
pub const FORMAT_ANNOTATION: &str = "Format";

/// The element that holds a format's [`CustomFormat`] attributes.
enum CustomElement<'f> {
    Currency(&'f CustomFormat),
    DateTime(&'f CustomFormat),
}

fn custom_element(format: &Format) -> Option<CustomElement<'_>> {
    match format {
        Format::Currency { currency, .. } => currency.as_ref().map(CustomElement::Currency),
        Format::DateTimeCustom { date_time } => date_time.as_ref().map(CustomElement::DateTime),
        Format::General
        | Format::NumberDecimal { .. }
        | Format::NumberWhole { .. }
        | Format::Percentage { .. }
        | Format::Scientific { .. }
        | Format::DateTimeShortDatePattern
        | Format::DateTimeGeneral
        | Format::Text => None,
    }
}

/// Write `format` as a `<Format>` element.
pub fn write_format_element<W: Write>(
    writer: &mut Writer<W>,
    format: &Format,
    reset_namespace: bool,
) -> MeasureResult<()> {
    let parts = format.parts();
    let accuracy = parts.accuracy.map(|a| a.to_string());

    let mut start = BytesStart::new("Format");
    start.push_attribute(("Format", format.kind().name()));
    if let Some(accuracy) = accuracy.as_deref() {
        start.push_attribute(("Accuracy", accuracy));
    }
    if let Some(thousand_separator) = parts.thousand_separator {
        start.push_attribute(("ThousandSeparator", bool_text(thousand_separator)));
    }
    if reset_namespace {
        start.push_attribute(("xmlns", ""));
    }

    let Some(custom) = custom_element(format) else {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    };

    writer.write_event(Event::Start(start))?;
    match custom {
        CustomElement::Currency(attrs) => write_attribute_element(writer, "Currency", attrs)?,
        CustomElement::DateTime(attrs) => {
            writer.write_event(Event::Start(BytesStart::new("DateTimes")))?;
            write_attribute_element(writer, "DateTime", attrs)?;
            writer.write_event(Event::End(BytesEnd::new("DateTimes")))?;
        }
    }
    writer.write_event(Event::End(BytesEnd::new("Format")))?;
    Ok(())
}

fn write_attribute_element<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    attrs: &CustomFormat,
) -> MeasureResult<()> {
    let mut elem = BytesStart::new(name);
    for (key, value) in attrs.attributes() {
        elem.push_attribute(Attribute {
            key: QName(key.as_bytes()),
            value: Cow::Owned(escape_attribute(value).into_owned().into_bytes()),
        });
    }
    writer.write_event(Event::Empty(elem))?;
    Ok(())
}

/// Serialize `format` as a standalone `<Format .../>` fragment.
pub fn format_fragment(format: &Format, reset_namespace: bool) -> MeasureResult<String> {
    let mut writer = Writer::new(Vec::new());
    write_format_element(&mut writer, format, reset_namespace)?;
    Ok(String::from_utf8(writer.into_inner())?)
}

/// Parse a standalone `<Format .../>` fragment.
pub fn parse_format_fragment(xml: &str) -> Result<Format, FormatError> {
    let doc =
        roxmltree::Document::parse(xml).map_err(|err| FormatError::Fragment(err.to_string()))?;
    read_format_element(doc.root_element())
}

/// Decode a `<Format>` element.
pub fn read_format_element(node: Node<'_, '_>) -> Result<Format, FormatError> {
    if node.tag_name().name() != "Format" {
        return Err(FormatError::Fragment(format!(
            "expected <Format>, found <{}>",
            node.tag_name().name()
        )));
    }
    let kind_name = node
        .attribute("Format")
        .ok_or_else(|| FormatError::Fragment("missing Format attribute".to_string()))?;
    let kind = FormatKind::from_name(kind_name)?;

    let accuracy = node
        .attribute("Accuracy")
        .map(|value| {
            value
                .trim()
                .parse::<u32>()
                .map_err(|_| FormatError::Fragment(format!("invalid Accuracy {value:?}")))
        })
        .transpose()?;
    let thousand_separator = node
        .attribute("ThousandSeparator")
        .map(|value| {
            parse_bool(value.trim()).ok_or_else(|| {
                FormatError::Fragment(format!("invalid ThousandSeparator {value:?}"))
            })
        })
        .transpose()?;

    let custom = match kind {
        FormatKind::Currency => child_element(node, "Currency").map(CustomFormat::from_node),
        FormatKind::DateTimeCustom => child_element(node, "DateTimes")
            .and_then(|times| child_element(times, "DateTime"))
            .or_else(|| child_element(node, "DateTime"))
            .map(CustomFormat::from_node),
        _ => None,
    };

    Ok(Format::from_parts(
        kind,
        FormatParts {
            accuracy,
            thousand_separator,
            custom,
        },
    ))
}

/// A `<CalculationProperty>` element as stored in the XML-based model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlCalculationProperty {
    /// `[Measure]`, `Measures.[Measure]` or `KPIs.[Measure]`.
    pub reference: String,
    /// Format, visibility and descriptive metadata. The KPI is assembled by the container.
    pub property: CalculationProperty,
    /// Annotations other than the `Format` annotation, in document order.
    pub annotations: KpiAnnotations,
    /// Whether the element carries a `Format` annotation. Only measure properties do.
    pub format_annotation: bool,
}

/// Write one `<CalculationProperty>` element.
pub fn write_calculation_property<W: Write>(
    writer: &mut Writer<W>,
    element: &XmlCalculationProperty,
) -> MeasureResult<()> {
    let XmlCalculationProperty {
        reference,
        property,
        annotations,
        format_annotation,
    } = element;
    writer.write_event(Event::Start(BytesStart::new("CalculationProperty")))?;

    if *format_annotation || !annotations.is_empty() {
        writer.write_event(Event::Start(BytesStart::new("Annotations")))?;
        if *format_annotation {
            writer.write_event(Event::Start(BytesStart::new("Annotation")))?;
            write_text_element(writer, "Name", FORMAT_ANNOTATION)?;
            writer.write_event(Event::Start(BytesStart::new("Value")))?;
            write_format_element(writer, &property.format, true)?;
            writer.write_event(Event::End(BytesEnd::new("Value")))?;
            writer.write_event(Event::End(BytesEnd::new("Annotation")))?;
        }
        for (name, value) in annotations.iter() {
            writer.write_event(Event::Start(BytesStart::new("Annotation")))?;
            write_text_element(writer, "Name", name)?;
            write_text_element(writer, "Value", value)?;
            writer.write_event(Event::End(BytesEnd::new("Annotation")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("Annotations")))?;
    }

    write_text_element(writer, "CalculationReference", reference)?;
    write_text_element(writer, "CalculationType", "Member")?;
    if let Some(format_string) = property.effective_format_string() {
        write_text_element(writer, "FormatString", format_string)?;
    }
    if property.is_hidden {
        write_text_element(writer, "Visible", "false")?;
    }
    if let Some(description) = non_empty(&property.description) {
        write_text_element(writer, "Description", description)?;
    }
    if let Some(folder) = non_empty(&property.display_folder) {
        write_text_element(writer, "DisplayFolder", folder)?;
    }

    writer.write_event(Event::End(BytesEnd::new("CalculationProperty")))?;
    Ok(())
}

/// Decode a `<CalculationProperty>` element.
pub fn read_calculation_property(
    node: Node<'_, '_>,
) -> Result<XmlCalculationProperty, FormatError> {
    let reference = child_text(node, "CalculationReference")
        .ok_or(FormatError::MissingElement("CalculationProperty", "CalculationReference"))?;

    let mut format = Format::General;
    let mut format_annotation = false;
    let mut annotations = KpiAnnotations::new();
    if let Some(list) = child_element(node, "Annotations") {
        for annotation in list
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "Annotation")
        {
            let name = child_text(annotation, "Name")
                .ok_or(FormatError::MissingElement("Annotation", "Name"))?;
            let value = child_element(annotation, "Value");
            if name == FORMAT_ANNOTATION {
                format_annotation = true;
                let format_node = value.and_then(|v| v.children().find(|n| n.is_element()));
                if let Some(format_node) = format_node {
                    format = read_format_element(format_node)?;
                }
                continue;
            }
            let value = value.map(element_text).unwrap_or_default();
            if !annotations.insert(name.clone(), value) {
                log::warn!("duplicate annotation {name:?} on calculation property {reference}");
            }
        }
    }

    let is_hidden = child_text(node, "Visible")
        .and_then(|v| parse_bool(v.trim()))
        .is_some_and(|visible| !visible);

    let property = CalculationProperty {
        format,
        format_string: child_text(node, "FormatString"),
        is_hidden,
        display_folder: child_text(node, "DisplayFolder"),
        description: child_text(node, "Description"),
        kpi: None,
    }
    .normalized();

    Ok(XmlCalculationProperty {
        reference,
        property,
        annotations,
        format_annotation,
    })
}

/// Element content with `\r` written as a character reference, so end-of-line normalization on
/// read keeps `\r\n` intact.
pub(crate) fn escape_text(text: &str) -> Cow<'_, str> {
    let escaped = partial_escape(text);
    if escaped.contains('\r') {
        Cow::Owned(escaped.replace('\r', "&#xD;"))
    } else {
        escaped
    }
}

/// Attribute value with tabs and line breaks written as character references; attribute-value
/// normalization would otherwise turn each into a space.
pub(crate) fn escape_attribute(value: &str) -> Cow<'_, str> {
    let escaped = escape(value);
    if escaped.contains(['\t', '\n', '\r']) {
        Cow::Owned(
            escaped
                .replace('\t', "&#x9;")
                .replace('\n', "&#xA;")
                .replace('\r', "&#xD;"),
        )
    } else {
        escaped
    }
}

pub(crate) fn write_text_element<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    text: &str,
) -> MeasureResult<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    if !text.is_empty() {
        writer.write_event(Event::Text(BytesText::from_escaped(escape_text(text))))?;
    }
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

pub(crate) fn child_element<'a, 'input>(
    node: Node<'a, 'input>,
    name: &str,
) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

pub(crate) fn child_text(node: Node<'_, '_>, name: &str) -> Option<String> {
    child_element(node, name).map(element_text)
}

/// Concatenated text content of an element (entities decoded).
pub(crate) fn element_text(node: Node<'_, '_>) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_fragment_nests_locale_element() {
        let format = Format::Currency {
            accuracy: Some(2),
            currency: Some(
                CustomFormat::new()
                    .with("LCID", "1033")
                    .with("Symbol", "$"),
            ),
        };
        let xml = format_fragment(&format, false).unwrap();
        assert_eq!(
            xml,
            r#"<Format Format="Currency" Accuracy="2"><Currency LCID="1033" Symbol="$"/></Format>"#
        );
        assert_eq!(parse_format_fragment(&xml).unwrap(), format);
    }

    #[test]
    fn carriage_returns_survive_text_elements() {
        let mut writer = Writer::new(Vec::new());
        write_text_element(&mut writer, "Description", "a\r\nb <c>\r").unwrap();
        let xml = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(xml, "<Description>a&#xD;\nb &lt;c&gt;&#xD;</Description>");

        let doc = roxmltree::Document::parse(&xml).unwrap();
        assert_eq!(doc.root_element().text(), Some("a\r\nb <c>\r"));
    }

    #[test]
    fn attribute_whitespace_is_kept_as_character_references() {
        let format = Format::DateTimeCustom {
            date_time: Some(
                CustomFormat::new()
                    .with("LCID", "1033")
                    .with("FormatString", "d\tMMM\r\nyyyy \"x\""),
            ),
        };
        let xml = format_fragment(&format, false).unwrap();
        assert!(
            xml.contains(r#"FormatString="d&#x9;MMM&#xD;&#xA;yyyy &quot;x&quot;""#),
            "{xml}"
        );
        assert_eq!(parse_format_fragment(&xml).unwrap(), format);
    }

    #[test]
    fn reads_designer_written_fragments() {
        let xml = r#"<Format Format="NumberDecimal" Accuracy="2" ThousandSeparator="True" xmlns="" />"#;
        assert_eq!(
            parse_format_fragment(xml).unwrap(),
            Format::NumberDecimal {
                accuracy: Some(2),
                thousand_separator: true,
            }
        );
        assert!(matches!(
            parse_format_fragment(r#"<Format Format="Money"/>"#),
            Err(FormatError::UnknownKind(_))
        ));
    }

    #[test]
    fn calculation_property_element_round_trip() {
        let property = CalculationProperty {
            format: Format::DateTimeCustom {
                date_time: Some(
                    CustomFormat::new()
                        .with("LCID", "1033")
                        .with("Group", "ShortDate"),
                ),
            },
            format_string: Some("M/d/yyyy".into()),
            is_hidden: true,
            display_folder: Some("Dates".into()),
            description: Some("Last <order> date".into()),
            kpi: None,
        };
        let mut annotations = KpiAnnotations::new();
        annotations.insert("Type", "User");
        let element = XmlCalculationProperty {
            reference: "[Last Order]".into(),
            property,
            annotations,
            format_annotation: true,
        };

        let mut writer = Writer::new(Vec::new());
        write_calculation_property(&mut writer, &element).unwrap();
        let xml = String::from_utf8(writer.into_inner()).unwrap();
        assert!(xml.contains("Last &lt;order&gt; date"), "{xml}");

        let doc = roxmltree::Document::parse(&xml).unwrap();
        assert_eq!(read_calculation_property(doc.root_element()).unwrap(), element);
    }
}
