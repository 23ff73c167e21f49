//! Measure-object properties of the JSON-based model document.
//!
//! ```json
//! {
//!   "name": "Revenue",
//!   "expression": "SUM(Sales[Amount])",
//!   "formatString": "\\$#,0.00;(\\$#,0.00);\\$#,0.00",
//!   "displayFolder": "Sales",
//!   "annotations": [
//!     { "name": "Format", "value": "<Format Format=\"Currency\" Accuracy=\"2\"><Currency LCID=\"1033\"/></Format>" }
//!   ]
//! }
//! ```
//!
//! Only the keys owned by [`CalculationProperty`] are touched when writing; everything else on the
//! object is left as found.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::MeasureResult;
use crate::format::xml::{format_fragment, parse_format_fragment, FORMAT_ANNOTATION};
use crate::format::Format;
use crate::model::{non_empty, CalculationProperty, Kpi, KpiAnnotations};

const FORMAT_STRING: &str = "formatString";
const IS_HIDDEN: &str = "isHidden";
const DISPLAY_FOLDER: &str = "displayFolder";
const DESCRIPTION: &str = "description";
const KPI: &str = "kpi";
const ANNOTATIONS: &str = "annotations";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct JsonAnnotation {
    name: String,
    #[serde(
        deserialize_with = "required_text_or_lines",
        serialize_with = "serialize_text_or_lines"
    )]
    value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonKpi {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target_description: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "text_or_lines",
        serialize_with = "serialize_optional_text_or_lines"
    )]
    target_expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target_format_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status_graphic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status_description: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "text_or_lines",
        serialize_with = "serialize_optional_text_or_lines"
    )]
    status_expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    trend_graphic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    trend_description: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "text_or_lines",
        serialize_with = "serialize_optional_text_or_lines"
    )]
    trend_expression: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    annotations: Vec<JsonAnnotation>,
}

impl From<&Kpi> for JsonKpi {
    fn from(kpi: &Kpi) -> Self {
        let text = |field: &Option<String>| non_empty(field).map(str::to_string);
        Self {
            description: text(&kpi.description),
            target_description: text(&kpi.target_description),
            target_expression: text(&kpi.target_expression),
            target_format_string: text(&kpi.target_format_string),
            status_graphic: text(&kpi.status_graphic),
            status_description: text(&kpi.status_description),
            status_expression: text(&kpi.status_expression),
            trend_graphic: text(&kpi.trend_graphic),
            trend_description: text(&kpi.trend_description),
            trend_expression: text(&kpi.trend_expression),
            annotations: kpi
                .annotations
                .iter()
                .map(|(name, value)| JsonAnnotation {
                    name: name.to_string(),
                    value: value.to_string(),
                })
                .collect(),
        }
    }
}

impl From<JsonKpi> for Kpi {
    fn from(json: JsonKpi) -> Self {
        let mut annotations = KpiAnnotations::new();
        for JsonAnnotation { name, value } in json.annotations {
            if !annotations.insert(name.clone(), value) {
                log::warn!("duplicate KPI annotation {name:?}; keeping the first value");
            }
        }
        Kpi {
            description: json.description,
            target_description: json.target_description,
            target_format_string: json.target_format_string,
            target_expression: json.target_expression,
            status_graphic: json.status_graphic,
            status_description: json.status_description,
            status_expression: json.status_expression,
            trend_graphic: json.trend_graphic,
            trend_description: json.trend_description,
            trend_expression: json.trend_expression,
            annotations,
        }
        .normalized()
    }
}

/// Decode the calculation property stored on a JSON measure object.
pub fn read_measure_properties(object: &Map<String, Value>) -> MeasureResult<CalculationProperty> {
    let mut format = Format::General;
    if let Some(annotations) = object.get(ANNOTATIONS) {
        let annotations: Vec<JsonAnnotation> = serde_json::from_value(annotations.clone())?;
        if let Some(annotation) = annotations.iter().find(|a| a.name == FORMAT_ANNOTATION) {
            format = parse_format_fragment(&annotation.value)?;
        }
    }

    let kpi = match object.get(KPI) {
        Some(Value::Null) | None => None,
        Some(kpi) => Some(Kpi::from(serde_json::from_value::<JsonKpi>(kpi.clone())?)),
    };

    Ok(CalculationProperty {
        format,
        format_string: object.get(FORMAT_STRING).and_then(value_text),
        is_hidden: object
            .get(IS_HIDDEN)
            .and_then(Value::as_bool)
            .unwrap_or(false),
        display_folder: object.get(DISPLAY_FOLDER).and_then(value_text),
        description: object.get(DESCRIPTION).and_then(value_text),
        kpi,
    }
    .normalized())
}

/// Store `property` on a JSON measure object.
///
/// Owned keys are set when non-empty and removed otherwise. Annotations other than `Format` keep
/// their values and positions.
pub fn write_measure_properties(
    property: &CalculationProperty,
    object: &mut Map<String, Value>,
) -> MeasureResult<()> {
    set_or_remove(
        object,
        FORMAT_STRING,
        property
            .effective_format_string()
            .map(|s| Value::String(s.to_string())),
    );
    set_or_remove(
        object,
        IS_HIDDEN,
        property.is_hidden.then_some(Value::Bool(true)),
    );
    set_or_remove(
        object,
        DISPLAY_FOLDER,
        non_empty(&property.display_folder).map(|s| Value::String(s.to_string())),
    );
    set_or_remove(
        object,
        DESCRIPTION,
        non_empty(&property.description).map(|s| Value::String(s.to_string())),
    );
    let kpi = match &property.kpi {
        Some(kpi) => Some(serde_json::to_value(JsonKpi::from(kpi))?),
        None => None,
    };
    set_or_remove(object, KPI, kpi);

    let mut annotations: Vec<JsonAnnotation> = match object.get(ANNOTATIONS) {
        Some(existing) => serde_json::from_value(existing.clone())?,
        None => Vec::new(),
    };
    let fragment = match property.format {
        Format::General => None,
        ref format => Some(format_fragment(format, false)?),
    };
    match (
        annotations.iter().position(|a| a.name == FORMAT_ANNOTATION),
        fragment,
    ) {
        (Some(idx), Some(fragment)) => annotations[idx].value = fragment,
        (Some(idx), None) => {
            annotations.remove(idx);
        }
        (None, Some(fragment)) => annotations.push(JsonAnnotation {
            name: FORMAT_ANNOTATION.to_string(),
            value: fragment,
        }),
        (None, None) => {}
    }
    let annotations = if annotations.is_empty() {
        None
    } else {
        Some(serde_json::to_value(annotations)?)
    };
    set_or_remove(object, ANNOTATIONS, annotations);
    Ok(())
}

fn set_or_remove(object: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    match value {
        Some(value) => {
            object.insert(key.to_string(), value);
        }
        None => {
            object.shift_remove(key);
        }
    }
}

/// A string, or an array of lines joined with `\n`.
pub(crate) fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Array(lines) => Some(
            lines
                .iter()
                .map(|line| line.as_str().unwrap_or_default())
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        _ => None,
    }
}

/// Multi-line text is stored as an array of lines, single lines as a plain string.
pub(crate) fn text_value(text: &str) -> Value {
    if text.contains('\n') {
        Value::Array(
            text.split('\n')
                .map(|line| Value::String(line.to_string()))
                .collect(),
        )
    } else {
        Value::String(text.to_string())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TextOrLines {
    Text(String),
    Lines(Vec<String>),
}

impl TextOrLines {
    fn into_text(self) -> String {
        match self {
            TextOrLines::Text(text) => text,
            TextOrLines::Lines(lines) => lines.join("\n"),
        }
    }
}

fn text_or_lines<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<TextOrLines>::deserialize(deserializer)?.map(TextOrLines::into_text))
}

fn required_text_or_lines<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(TextOrLines::deserialize(deserializer)?.into_text())
}

fn serialize_text_or_lines<S: Serializer>(text: &str, serializer: S) -> Result<S::Ok, S::Error> {
    text_value(text).serialize(serializer)
}

fn serialize_optional_text_or_lines<S: Serializer>(
    text: &Option<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    text.as_deref().map(text_value).serialize(serializer)
}
