use std::collections::{HashMap, HashSet};
use std::ops::Range;

use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::{Map, Value};

use super::xml::splice;
use crate::container::MeasureContainer;
use crate::error::{MeasureError, MeasureResult};
use crate::format::json::{
    read_measure_properties, text_value, value_text, write_measure_properties,
};
use crate::model::Measure;

const TABLES_POINTER: &str = "/model/tables";

fn name_of(object: &Map<String, Value>) -> Option<&str> {
    object.get("name").and_then(Value::as_str)
}

impl MeasureContainer {
    /// Read `model.tables[*].measures` of the JSON-based model document.
    pub fn parse_from_json(text: &str) -> MeasureResult<Self> {
        let root: Value = serde_json::from_str(text)?;
        let tables = root
            .pointer(TABLES_POINTER)
            .and_then(Value::as_array)
            .ok_or_else(|| MeasureError::structure("the document has no model.tables list", text))?;

        let mut measures = Vec::new();
        for table in tables {
            let table = table
                .as_object()
                .ok_or_else(|| MeasureError::structure("table entry is not an object", text))?;
            let table_name = name_of(table)
                .ok_or_else(|| MeasureError::structure("table without a name", text))?;
            let Some(list) = table.get("measures") else {
                continue;
            };
            let list = list.as_array().ok_or_else(|| {
                let message = format!("measures of table {table_name} is not a list");
                MeasureError::structure(message, text)
            })?;

            for entry in list {
                let object = entry.as_object().ok_or_else(|| {
                    let message = format!("measure of table {table_name} is not an object");
                    MeasureError::structure(message, text)
                })?;
                let name = name_of(object).ok_or_else(|| {
                    let message = format!("measure of table {table_name} has no name");
                    MeasureError::structure(message, text)
                })?;
                let expression = object
                    .get("expression")
                    .and_then(value_text)
                    .unwrap_or_default();
                let property = read_measure_properties(object)?;
                measures.push(
                    Measure::new(table_name, name, expression.trim())
                        .with_calculation_property(property),
                );
            }
        }

        let mut container = Self::new(measures);
        container.synthesize_supporting_measures();
        Ok(container)
    }

    /// Rewrite each table's `measures` list from the container's primary measures.
    ///
    /// Only the `measures` values that actually change are replaced in `original`; every other
    /// byte (escapes, line endings, key order) is kept. Unknown properties and foreign annotations
    /// of a measure that keeps its name survive. Culture translations of measures that no longer
    /// exist are dropped. A measure whose table is not in the model is an error.
    pub fn merge_into_json(&self, original: &str) -> MeasureResult<String> {
        let root: Value = serde_json::from_str(original)?;
        let tables = root
            .pointer(TABLES_POINTER)
            .and_then(Value::as_array)
            .ok_or_else(|| {
                MeasureError::structure("the document has no model.tables list", original)
            })?;

        let table_names: HashSet<&str> = tables
            .iter()
            .filter_map(|t| t.as_object().and_then(name_of))
            .collect();
        if let Some(orphan) = self.measures().find(|m| !table_names.contains(m.table_name())) {
            return Err(MeasureError::UnknownTable {
                table: orphan.table_name().to_string(),
                measure: orphan.name().to_string(),
            });
        }

        let spans: DocumentSpans<'_> = serde_json::from_str(original)?;
        let layout = Layout::detect(original);
        let mut edits: Vec<(Range<usize>, String)> = Vec::new();

        for (table, raw) in tables.iter().zip(&spans.model.tables) {
            let Some(table) = table.as_object() else {
                continue;
            };
            let Some(table_name) = name_of(table) else {
                continue;
            };
            let current = table.get("measures");
            let list = Value::Array(self.measure_list(table_name, current, original)?);

            match current {
                Some(current) if *current == list => {}
                Some(_) => {
                    let table_spans: MeasuresSpan<'_> = serde_json::from_str(raw.get())?;
                    let Some(measures) = table_spans.measures else {
                        continue;
                    };
                    let range = span_of(original, measures)?;
                    let text = layout.render(&list, line_indent(original, range.start))?;
                    edits.push((range, text));
                }
                None if list.as_array().is_some_and(Vec::is_empty) => {}
                None => {
                    let range = span_of(original, raw)?;
                    let body = raw.get().strip_suffix('}').unwrap_or(raw.get()).trim_end();
                    let at = range.start + body.len();
                    edits.push((at..at, layout.member("measures", &list, original, range.start)?));
                }
            }
        }

        let surviving = self.surviving_names();
        for culture in spans.model.cultures.iter().flatten() {
            let Ok(culture) = serde_json::from_str::<CultureSpans<'_>>(culture.get()) else {
                continue;
            };
            let culture_name = culture.name.as_deref().unwrap_or_default();
            let tables = culture
                .translations
                .and_then(|t| t.model)
                .and_then(|m| m.tables)
                .unwrap_or_default();
            for table in tables {
                let Ok(table) = serde_json::from_str::<MeasuresSpan<'_>>(table.get()) else {
                    continue;
                };
                let Some(measures) = table.measures else {
                    continue;
                };
                let table_name = table.name.as_deref().unwrap_or_default();
                let kept = surviving_translations(measures, table_name, &surviving, culture_name);
                let Some(kept) = kept else {
                    continue;
                };
                let range = span_of(original, measures)?;
                let text = layout.render(&kept, line_indent(original, range.start))?;
                edits.push((range, text));
            }
        }

        log::debug!("merging {} measure list(s) into the model document", edits.len());
        Ok(splice(
            original,
            edits
                .iter()
                .map(|(range, text)| (range.clone(), text.as_str()))
                .collect(),
        ))
    }

    /// The new `measures` list of one table. Existing same-named measure objects are updated in
    /// place so their foreign keys survive.
    fn measure_list(
        &self,
        table_name: &str,
        current: Option<&Value>,
        original: &str,
    ) -> MeasureResult<Vec<Value>> {
        let mut existing: HashMap<&str, &Map<String, Value>> = HashMap::new();
        match current {
            None => {}
            Some(Value::Array(list)) => {
                for object in list.iter().filter_map(Value::as_object) {
                    if let Some(name) = name_of(object) {
                        existing.entry(name).or_insert(object);
                    }
                }
            }
            Some(_) => {
                return Err(MeasureError::structure(
                    format!("measures of table {table_name} is not a list"),
                    original,
                ))
            }
        }

        let mut list = Vec::new();
        for measure in self.measures().filter(|m| m.table_name() == table_name) {
            let mut object = existing
                .remove(measure.name())
                .cloned()
                .unwrap_or_default();
            object.insert("name".to_string(), Value::String(measure.name().to_string()));
            object.insert("expression".to_string(), text_value(measure.expression()));
            write_measure_properties(measure.calculation_property(), &mut object)?;
            list.push(Value::Object(object));
        }
        Ok(list)
    }

    fn surviving_names(&self) -> HashMap<&str, HashSet<&str>> {
        let mut surviving: HashMap<&str, HashSet<&str>> = HashMap::new();
        for measure in self.measures() {
            surviving
                .entry(measure.table_name())
                .or_default()
                .insert(measure.name());
        }
        surviving
    }
}

/// Borrowed views of the parts of a model document that a merge may rewrite. Every `RawValue`
/// is a slice of the original text, so its position gives the byte range to replace.
#[derive(Deserialize)]
struct DocumentSpans<'a> {
    #[serde(borrow)]
    model: ModelSpans<'a>,
}

#[derive(Deserialize)]
struct ModelSpans<'a> {
    #[serde(borrow)]
    tables: Vec<&'a RawValue>,
    #[serde(default, borrow)]
    cultures: Option<Vec<&'a RawValue>>,
}

/// A model table or a translated table.
#[derive(Deserialize)]
struct MeasuresSpan<'a> {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, borrow)]
    measures: Option<&'a RawValue>,
}

#[derive(Deserialize)]
struct CultureSpans<'a> {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, borrow)]
    translations: Option<TranslationsSpan<'a>>,
}

#[derive(Deserialize)]
struct TranslationsSpan<'a> {
    #[serde(default, borrow)]
    model: Option<TranslatedModelSpan<'a>>,
}

#[derive(Deserialize)]
struct TranslatedModelSpan<'a> {
    #[serde(default, borrow)]
    tables: Option<Vec<&'a RawValue>>,
}

/// Byte range of `raw` inside `text`, which it was deserialized from.
fn span_of(text: &str, raw: &RawValue) -> MeasureResult<Range<usize>> {
    let value = raw.get();
    let start = (value.as_ptr() as usize).wrapping_sub(text.as_ptr() as usize);
    let range = start..start.saturating_add(value.len());
    match text.get(range.clone()) {
        Some(slice) if std::ptr::eq(slice, value) => Ok(range),
        _ => Err(MeasureError::structure(
            "a JSON value could not be located in the document",
            text,
        )),
    }
}

/// Leading spaces and tabs of the line holding `offset`.
fn line_indent(text: &str, offset: usize) -> &str {
    let line_start = text[..offset].rfind('\n').map_or(0, |idx| idx + 1);
    let line = &text[line_start..offset];
    let width = line.len() - line.trim_start_matches([' ', '\t']).len();
    &line[..width]
}

/// Whitespace conventions of the original document, reused for rewritten values.
struct Layout {
    pretty: bool,
    newline: &'static str,
}

impl Layout {
    const INDENT: &'static str = "  ";

    fn detect(text: &str) -> Self {
        Self {
            pretty: text.trim().contains('\n'),
            newline: if text.contains("\r\n") { "\r\n" } else { "\n" },
        }
    }

    /// `value` serialized to start on a line indented by `indent`.
    fn render(&self, value: &Value, indent: &str) -> MeasureResult<String> {
        if !self.pretty {
            return Ok(serde_json::to_string(value)?);
        }
        let text = serde_json::to_string_pretty(value)?;
        Ok(text.replace('\n', &format!("{}{indent}", self.newline)))
    }

    /// A new `"key": value` member appended to the object starting at `object_start`.
    fn member(
        &self,
        key: &str,
        value: &Value,
        text: &str,
        object_start: usize,
    ) -> MeasureResult<String> {
        let key = serde_json::to_string(key)?;
        if !self.pretty {
            return Ok(format!(",{key}:{}", self.render(value, "")?));
        }
        let indent = format!("{}{}", line_indent(text, object_start), Self::INDENT);
        Ok(format!(
            ",{}{indent}{key}: {}",
            self.newline,
            self.render(value, &indent)?
        ))
    }
}

/// The translated measure entries of `table_name` whose measure still exists, or `None` when
/// nothing is dropped.
fn surviving_translations(
    measures: &RawValue,
    table_name: &str,
    surviving: &HashMap<&str, HashSet<&str>>,
    culture_name: &str,
) -> Option<Value> {
    let Ok(Value::Array(entries)) = serde_json::from_str::<Value>(measures.get()) else {
        return None;
    };
    let keep = surviving.get(table_name);
    let total = entries.len();
    let kept: Vec<Value> = entries
        .into_iter()
        .filter(|entry| {
            let name = entry.get("name").and_then(Value::as_str).unwrap_or_default();
            let alive = keep.is_some_and(|names| names.contains(name));
            if !alive {
                log::debug!(
                    "dropping {culture_name} translation of removed measure {table_name}[{name}]"
                );
            }
            alive
        })
        .collect();
    (kept.len() != total).then_some(Value::Array(kept))
}
