//! MDX script commands and calculation properties for the XML-based model document.
//!
//! Below the batching level a script holds a single command with the preamble and every measure.
//! From that level on, each primary measure gets its own command (the preamble rides along with
//! the first) annotated with the measure's name and table.

use std::io::Write;

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use serde::{Deserialize, Serialize};

use crate::container::{MeasureContainer, XmlModelInfo};
use crate::error::{MeasureError, MeasureResult};
use crate::format::text::quote_value;
use crate::format::xml::{
    write_calculation_property, write_text_element, XmlCalculationProperty, ENGINE_NAMESPACE,
};
use crate::model::{bracket_name, CalculationProperty, Kpi, KpiAnnotations, Measure, SupportingKind};

/// Command annotation holding the measure name.
pub const FULL_NAME_ANNOTATION: &str = "FullName";
/// Command annotation holding the owning table.
pub const TABLE_ANNOTATION: &str = "Table";

const MEASURES_BANNER: &str = "\
----------------------------------------------------------
-- PowerPivot measures command (do not modify manually) --
----------------------------------------------------------";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    /// First compatibility level that writes one command per measure.
    pub batched_commands_from_level: u32,
    /// Default-member placeholder below `batched_commands_from_level`.
    pub legacy_placeholder: String,
    /// Default-member placeholder from `batched_commands_from_level` on.
    pub placeholder: String,
    /// Level assumed when the document does not declare one.
    pub default_compatibility_level: u32,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            batched_commands_from_level: 1103,
            legacy_placeholder: "__No measures defined".to_string(),
            placeholder: "__XL_Count of Models".to_string(),
            default_compatibility_level: 1100,
        }
    }
}

impl CommandConfig {
    /// Whether `name` is one of the default-member placeholders.
    #[must_use]
    pub fn is_placeholder(&self, name: &str) -> bool {
        name == self.placeholder || name == self.legacy_placeholder
    }
}

/// One `<Command>` of an MDX script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub text: String,
    pub annotations: Vec<(String, String)>,
}

/// The regenerated children of `<MdxScript>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MdxScriptBody {
    /// `<Commands>...</Commands>`
    pub commands: String,
    /// `<CalculationProperties>...</CalculationProperties>`
    pub calculation_properties: String,
}

#[derive(Debug, Clone)]
pub struct CommandProducer<'c> {
    config: &'c CommandConfig,
    compatibility_level: u32,
}

impl<'c> CommandProducer<'c> {
    #[must_use]
    pub fn new(config: &'c CommandConfig, compatibility_level: u32) -> Self {
        Self {
            config,
            compatibility_level,
        }
    }

    #[must_use]
    pub fn is_batched(&self) -> bool {
        self.compatibility_level >= self.config.batched_commands_from_level
    }

    fn placeholder(&self) -> &str {
        if self.is_batched() {
            &self.config.placeholder
        } else {
            &self.config.legacy_placeholder
        }
    }

    /// `CALCULATE`, the placeholder default member and the banner comment.
    #[must_use]
    pub fn preamble(&self) -> String {
        let placeholder = bracket_name(self.placeholder());
        format!(
            "CALCULATE;\n\
             CREATE MEMBER CURRENTCUBE.Measures.{placeholder} AS 1, VISIBLE = 0;\n\
             ALTER CUBE CURRENTCUBE UPDATE DIMENSION Measures, Default_Member = {placeholder};\n\
             {MEASURES_BANNER}\n"
        )
    }

    #[must_use]
    pub fn commands(&self, container: &MeasureContainer) -> Vec<Command> {
        let preamble = self.preamble();
        let primary: Vec<&Measure> = container.measures().collect();

        if !self.is_batched() || primary.is_empty() {
            let mut text = preamble;
            for measure in primary {
                text.push('\n');
                text.push_str(&measure_statements(container, measure));
            }
            return vec![Command {
                text,
                annotations: Vec::new(),
            }];
        }

        primary
            .into_iter()
            .enumerate()
            .map(|(idx, measure)| {
                let mut text = if idx == 0 {
                    format!("{preamble}\n")
                } else {
                    String::new()
                };
                text.push_str(&measure_statements(container, measure));
                Command {
                    text,
                    annotations: vec![
                        (FULL_NAME_ANNOTATION.to_string(), measure.name().to_string()),
                        (TABLE_ANNOTATION.to_string(), measure.table_name().to_string()),
                    ],
                }
            })
            .collect()
    }

    /// One property per primary measure, the KPI and supporting-measure properties of KPI
    /// measures, and the hidden placeholder last.
    #[must_use]
    pub fn calculation_properties(
        &self,
        container: &MeasureContainer,
    ) -> Vec<XmlCalculationProperty> {
        let mut out = Vec::new();
        for measure in container.measures() {
            let property = measure.calculation_property();
            out.push(XmlCalculationProperty {
                reference: measure.bracketed_name(),
                property: CalculationProperty {
                    kpi: None,
                    ..property.clone()
                },
                annotations: KpiAnnotations::new(),
                format_annotation: true,
            });
            let Some(kpi) = &property.kpi else {
                continue;
            };

            out.push(XmlCalculationProperty {
                reference: format!("KPIs.{}", measure.bracketed_name()),
                property: CalculationProperty {
                    description: kpi.description.clone(),
                    ..CalculationProperty::default()
                },
                annotations: kpi.annotations.clone(),
                format_annotation: false,
            });
            for support in supporting_measures(container, measure, kpi) {
                out.push(XmlCalculationProperty {
                    reference: support.measure.bracketed_name(),
                    property: supporting_property(kpi, support.kind),
                    annotations: KpiAnnotations::new(),
                    format_annotation: false,
                });
            }
        }

        let placeholder = bracket_name(self.placeholder());
        out.push(XmlCalculationProperty {
            reference: if self.is_batched() {
                placeholder
            } else {
                format!("Measures.{placeholder}")
            },
            property: CalculationProperty {
                is_hidden: true,
                ..CalculationProperty::default()
            },
            annotations: KpiAnnotations::new(),
            format_annotation: false,
        });
        out
    }

    pub fn write_commands_xml<W: Write>(
        &self,
        writer: &mut Writer<W>,
        container: &MeasureContainer,
    ) -> MeasureResult<()> {
        writer.write_event(Event::Start(BytesStart::new("Commands")))?;
        for command in self.commands(container) {
            writer.write_event(Event::Start(BytesStart::new("Command")))?;
            write_text_element(writer, "Text", &command.text)?;
            if !command.annotations.is_empty() {
                writer.write_event(Event::Start(BytesStart::new("Annotations")))?;
                for (name, value) in &command.annotations {
                    writer.write_event(Event::Start(BytesStart::new("Annotation")))?;
                    write_text_element(writer, "Name", name)?;
                    write_text_element(writer, "Value", value)?;
                    writer.write_event(Event::End(BytesEnd::new("Annotation")))?;
                }
                writer.write_event(Event::End(BytesEnd::new("Annotations")))?;
            }
            writer.write_event(Event::End(BytesEnd::new("Command")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("Commands")))?;
        Ok(())
    }

    pub fn write_calculation_properties_xml<W: Write>(
        &self,
        writer: &mut Writer<W>,
        container: &MeasureContainer,
    ) -> MeasureResult<()> {
        writer.write_event(Event::Start(BytesStart::new("CalculationProperties")))?;
        for element in self.calculation_properties(container) {
            write_calculation_property(writer, &element)?;
        }
        writer.write_event(Event::End(BytesEnd::new("CalculationProperties")))?;
        Ok(())
    }

    /// Fails when a KPI sets a field whose supporting measure would not be written.
    pub fn mdx_script_body(&self, container: &MeasureContainer) -> MeasureResult<MdxScriptBody> {
        for measure in container.measures() {
            if let Some(kpi) = measure.kpi() {
                check_supported_fields(container, measure, kpi)?;
            }
        }
        let mut commands = Writer::new(Vec::new());
        self.write_commands_xml(&mut commands, container)?;
        let mut properties = Writer::new(Vec::new());
        self.write_calculation_properties_xml(&mut properties, container)?;
        Ok(MdxScriptBody {
            commands: String::from_utf8(commands.into_inner())?,
            calculation_properties: String::from_utf8(properties.into_inner())?,
        })
    }
}

struct Supporting {
    kind: SupportingKind,
    measure: Measure,
}

/// The supporting measures of a KPI measure: the container's own when present, otherwise built
/// from the KPI's expressions.
fn supporting_measures(
    container: &MeasureContainer,
    measure: &Measure,
    kpi: &Kpi,
) -> Vec<Supporting> {
    SupportingKind::ALL
        .into_iter()
        .filter_map(|kind| {
            let name = kind.measure_name(measure.name());
            let existing = container
                .supporting_measures()
                .find(|m| m.name() == name && m.table_name() == measure.table_name())
                .cloned();
            let support = existing.or_else(|| {
                kpi.expression(kind)
                    .map(|expr| Measure::new(measure.table_name(), name, expr))
            })?;
            Some(Supporting {
                kind,
                measure: support,
            })
        })
        .collect()
}

fn check_supported_fields(
    container: &MeasureContainer,
    measure: &Measure,
    kpi: &Kpi,
) -> MeasureResult<()> {
    let written: Vec<SupportingKind> = supporting_measures(container, measure, kpi)
        .into_iter()
        .map(|support| support.kind)
        .collect();
    let missing = SupportingKind::ALL
        .into_iter()
        .filter(|kind| !written.contains(kind))
        .find_map(|kind| kpi.dependent_field(kind).map(|field| (kind, field)));
    match missing {
        Some((kind, field)) => Err(MeasureError::KpiField {
            table: measure.table_name().to_string(),
            measure: measure.name().to_string(),
            field,
            kind: kind.suffix(),
        }),
        None => Ok(()),
    }
}

fn supporting_property(kpi: &Kpi, kind: SupportingKind) -> CalculationProperty {
    CalculationProperty {
        format_string: match kind {
            SupportingKind::Goal => kpi.target_format_string.clone(),
            SupportingKind::Status | SupportingKind::Trend => None,
        },
        is_hidden: true,
        description: kpi.supporting_description(kind).map(str::to_string),
        ..CalculationProperty::default()
    }
}

/// The measure's statement, followed for KPI measures by its supporting measures and the
/// `CREATE KPI` statement.
fn measure_statements(container: &MeasureContainer, measure: &Measure) -> String {
    let mut text = measure.terminated_text();
    text.push('\n');
    let Some(kpi) = measure.kpi() else {
        return text;
    };

    let supporting = supporting_measures(container, measure, kpi);
    for support in &supporting {
        text.push_str(&support.measure.terminated_text());
        text.push('\n');
    }

    let name = measure.bracketed_name();
    text.push_str(&format!(
        "CREATE KPI CURRENTCUBE.{name} AS Measures.{name}, ASSOCIATED_MEASURE_GROUP = {}",
        quote_value(measure.table_name())
    ));
    for support in &supporting {
        let key = match support.kind {
            SupportingKind::Goal => "GOAL",
            SupportingKind::Status => "STATUS",
            SupportingKind::Trend => "TREND",
        };
        text.push_str(&format!(
            ", {key} = Measures.{}",
            support.measure.bracketed_name()
        ));
        let graphic = match support.kind {
            SupportingKind::Goal => None,
            SupportingKind::Status => kpi.status_graphic.as_deref(),
            SupportingKind::Trend => kpi.trend_graphic.as_deref(),
        };
        if let Some(graphic) = graphic.filter(|g| !g.is_empty()) {
            text.push_str(&format!(", {key}_GRAPHIC = {}", quote_value(graphic)));
        }
    }
    text.push_str(";\n");
    text
}

fn engine_element(name: &str) -> BytesStart<'_> {
    let mut start = BytesStart::new(name);
    start.push_attribute(("xmlns", ENGINE_NAMESPACE));
    start
}

fn empty_fragment(name: &str) -> MeasureResult<String> {
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Empty(engine_element(name)))?;
    Ok(String::from_utf8(writer.into_inner())?)
}

pub fn begin_transaction() -> MeasureResult<String> {
    empty_fragment("BeginTransaction")
}

pub fn commit_transaction() -> MeasureResult<String> {
    empty_fragment("CommitTransaction")
}

pub fn rollback_transaction() -> MeasureResult<String> {
    empty_fragment("RollbackTransaction")
}

/// `<Process>` with `ProcessRecalc` for the whole database.
pub fn process_recalc(database_id: &str) -> MeasureResult<String> {
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Start(engine_element("Process")))?;
    write_text_element(&mut writer, "Type", "ProcessRecalc")?;
    writer.write_event(Event::Start(BytesStart::new("Object")))?;
    write_text_element(&mut writer, "DatabaseID", database_id)?;
    writer.write_event(Event::End(BytesEnd::new("Object")))?;
    writer.write_event(Event::End(BytesEnd::new("Process")))?;
    Ok(String::from_utf8(writer.into_inner())?)
}

/// `<Alter>` replacing the model's MDX script with `body`.
pub fn alter_mdx_script(info: &XmlModelInfo, body: &MdxScriptBody) -> MeasureResult<String> {
    let mut writer = Writer::new(Vec::new());
    let mut alter = engine_element("Alter");
    alter.push_attribute(("AllowCreate", "true"));
    alter.push_attribute(("ObjectExpansion", "ExpandFull"));
    writer.write_event(Event::Start(alter))?;

    writer.write_event(Event::Start(BytesStart::new("Object")))?;
    write_text_element(&mut writer, "DatabaseID", &info.database_id)?;
    write_text_element(&mut writer, "CubeID", &info.cube_id)?;
    write_text_element(&mut writer, "MdxScriptID", &info.mdx_script_id)?;
    writer.write_event(Event::End(BytesEnd::new("Object")))?;

    writer.write_event(Event::Start(BytesStart::new("ObjectDefinition")))?;
    writer.write_event(Event::Start(BytesStart::new("MdxScript")))?;
    write_text_element(&mut writer, "ID", &info.mdx_script_id)?;
    write_text_element(&mut writer, "Name", &info.mdx_script_name)?;
    writer.get_mut().write_all(body.commands.as_bytes())?;
    writer
        .get_mut()
        .write_all(body.calculation_properties.as_bytes())?;
    writer.write_event(Event::End(BytesEnd::new("MdxScript")))?;
    writer.write_event(Event::End(BytesEnd::new("ObjectDefinition")))?;

    writer.write_event(Event::End(BytesEnd::new("Alter")))?;
    Ok(String::from_utf8(writer.into_inner())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_follows_compatibility_level() {
        let config = CommandConfig::default();
        let legacy = CommandProducer::new(&config, 1100).preamble();
        assert!(legacy.contains("Measures.[__No measures defined] AS 1"));
        let batched = CommandProducer::new(&config, 1103).preamble();
        assert!(batched.contains("Default_Member = [__XL_Count of Models];"));
        assert!(batched.ends_with("----------------------------------------------------------\n"));
    }

    #[test]
    fn synthetic_levels_come_from_config() {
        let config = CommandConfig {
            batched_commands_from_level: 5,
            ..CommandConfig::default()
        };
        assert!(!CommandProducer::new(&config, 4).is_batched());
        assert!(CommandProducer::new(&config, 5).is_batched());
    }

    #[test]
    fn fixed_fragments() {
        assert_eq!(
            begin_transaction().unwrap(),
            format!(r#"<BeginTransaction xmlns="{ENGINE_NAMESPACE}"/>"#)
        );
        assert_eq!(
            process_recalc("Model & Co").unwrap(),
            format!(
                r#"<Process xmlns="{ENGINE_NAMESPACE}"><Type>ProcessRecalc</Type><Object><DatabaseID>Model &amp; Co</DatabaseID></Object></Process>"#
            )
        );
    }
}
