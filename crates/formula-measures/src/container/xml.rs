use std::ops::Range;

use roxmltree::{Document, Node};

use crate::commands::{CommandConfig, CommandProducer};
use crate::container::MeasureContainer;
use crate::error::{MeasureError, MeasureResult};
use crate::format::xml::{child_element, child_text, element_text, read_calculation_property};
use crate::parser::{parse_script_with, ParseOptions, ParsedScript};

/// Identity of the model's MDX script, read from the first `Database`, `Cube` and `MdxScript`
/// elements of the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlModelInfo {
    pub database_id: String,
    pub cube_id: String,
    pub mdx_script_id: String,
    pub mdx_script_name: String,
    pub compatibility_level: u32,
}

impl XmlModelInfo {
    /// Read the model identity from `text`. Missing ids are empty; a missing compatibility level
    /// falls back to `default_compatibility_level`.
    pub fn from_xml(text: &str, default_compatibility_level: u32) -> MeasureResult<Self> {
        let doc = Document::parse(text)?;
        Ok(Self::from_document(&doc, default_compatibility_level))
    }

    fn from_document(doc: &Document<'_>, default_compatibility_level: u32) -> Self {
        let database = find_element(doc, "Database");

        let compatibility_level = database
            .and_then(|db| child_text(db, "CompatibilityLevel"))
            .or_else(|| find_element(doc, "CompatibilityLevel").map(element_text))
            .and_then(|level| level.trim().parse().ok())
            .unwrap_or_else(|| {
                log::debug!(
                    "no compatibility level in the model document; assuming {default_compatibility_level}"
                );
                default_compatibility_level
            });

        let script = find_element(doc, "MdxScript");
        let mdx_script_id = id_of(script);
        let mdx_script_name = script
            .and_then(|s| child_text(s, "Name"))
            .unwrap_or_else(|| mdx_script_id.clone());

        Self {
            database_id: id_of(database),
            cube_id: id_of(find_element(doc, "Cube")),
            mdx_script_id,
            mdx_script_name,
            compatibility_level,
        }
    }
}

fn id_of(node: Option<Node<'_, '_>>) -> String {
    node.and_then(|n| child_text(n, "ID")).unwrap_or_default()
}

fn find_element<'a, 'input>(doc: &'a Document<'input>, name: &str) -> Option<Node<'a, 'input>> {
    doc.descendants()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

/// `<MdxScript>` and its `<Commands>`; both are required.
fn script_nodes<'a, 'input>(
    doc: &'a Document<'input>,
    text: &str,
) -> MeasureResult<(Node<'a, 'input>, Node<'a, 'input>)> {
    let script = find_element(doc, "MdxScript")
        .ok_or_else(|| MeasureError::structure("the document has no <MdxScript> element", text))?;
    let commands = child_element(script, "Commands")
        .ok_or_else(|| MeasureError::structure("<MdxScript> has no <Commands> element", text))?;
    Ok((script, commands))
}

impl MeasureContainer {
    pub fn parse_from_xml(text: &str) -> MeasureResult<Self> {
        Self::parse_from_xml_with(text, &ParseOptions::default(), &CommandConfig::default())
    }

    /// Read the measures of the XML-based model document: every command's text is parsed as a
    /// script, then the calculation properties are attached and KPIs folded.
    pub fn parse_from_xml_with(
        text: &str,
        options: &ParseOptions,
        config: &CommandConfig,
    ) -> MeasureResult<Self> {
        let doc = Document::parse(text)?;
        let (script, commands) = script_nodes(&doc, text)?;

        let mut parsed = ParsedScript::default();
        for command in commands
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "Command")
        {
            let Some(command_text) = child_text(command, "Text") else {
                continue;
            };
            let ParsedScript { measures, kpis } = parse_script_with(&command_text, options)?;
            parsed.measures.extend(measures);
            parsed.kpis.extend(kpis);
        }

        let mut properties = Vec::new();
        if let Some(list) = child_element(script, "CalculationProperties") {
            for node in list
                .children()
                .filter(|n| n.is_element() && n.tag_name().name() == "CalculationProperty")
            {
                let element = read_calculation_property(node)
                    .map_err(|err| MeasureError::structure(err.to_string(), text))?;
                properties.push(element);
            }
        }

        Self::assemble(parsed, properties, config)
    }

    pub fn merge_into_xml(&self, original: &str) -> MeasureResult<String> {
        self.merge_into_xml_with(original, &CommandConfig::default())
    }

    /// Regenerate `<Commands>` and `<CalculationProperties>` inside the document's `<MdxScript>`.
    /// Every other byte of `original` is kept as is; a missing `<CalculationProperties>` is
    /// inserted right after `<Commands>`.
    pub fn merge_into_xml_with(
        &self,
        original: &str,
        config: &CommandConfig,
    ) -> MeasureResult<String> {
        let doc = Document::parse(original)?;
        let info = XmlModelInfo::from_document(&doc, config.default_compatibility_level);
        let (script, commands) = script_nodes(&doc, original)?;

        let producer = CommandProducer::new(config, info.compatibility_level);
        let body = producer.mdx_script_body(self)?;

        let commands_range = commands.range();
        let mut edits: Vec<(Range<usize>, &str)> =
            vec![(commands_range.clone(), body.commands.as_str())];
        match child_element(script, "CalculationProperties") {
            Some(properties) => {
                edits.push((properties.range(), body.calculation_properties.as_str()));
            }
            None => edits.push((
                commands_range.end..commands_range.end,
                body.calculation_properties.as_str(),
            )),
        }
        Ok(splice(original, edits))
    }
}

/// Replace non-overlapping byte ranges of `text`.
pub(super) fn splice(text: &str, mut edits: Vec<(Range<usize>, &str)>) -> String {
    edits.sort_by_key(|(range, _)| range.start);
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (range, replacement) in edits {
        out.push_str(&text[cursor..range.start]);
        out.push_str(replacement);
        cursor = range.end;
    }
    out.push_str(&text[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_info_defaults() {
        let info = XmlModelInfo::from_xml(
            r#"<Batch><Database><ID>Db</ID></Database><MdxScript><ID>MdxScript</ID></MdxScript></Batch>"#,
            1100,
        )
        .unwrap();
        assert_eq!(
            info,
            XmlModelInfo {
                database_id: "Db".into(),
                cube_id: String::new(),
                mdx_script_id: "MdxScript".into(),
                mdx_script_name: "MdxScript".into(),
                compatibility_level: 1100,
            }
        );
    }

    #[test]
    fn splice_keeps_untouched_bytes() {
        let text = "a<X>1</X>b<Y/>c";
        assert_eq!(splice(text, vec![(10..14, "<Y>2</Y>"), (1..9, "<X/>")]), "a<X/>b<Y>2</Y>c");
        assert_eq!(splice(text, vec![(9..9, "!")]), "a<X>1</X>!b<Y/>c");
    }
}
