//! The ordered measure set of a model, and the conversions between it and the three surfaces:
//! measure scripts, the XML-based model document and the JSON-based model document.

mod json;
mod xml;

pub use xml::XmlModelInfo;

use std::collections::HashMap;

use crate::commands::CommandConfig;
use crate::error::{MeasureError, MeasureResult};
use crate::format::xml::XmlCalculationProperty;
use crate::model::{bracket_name, CalculationProperty, Kpi, Measure, SupportingKind};
use crate::parser::{parse_script_with, split_reference, KpiStatement, ParseOptions, ParsedScript};

/// Reference qualifier of KPI calculation properties (`KPIs.[Revenue]`).
const KPI_QUALIFIER: &str = "KPIs";
const MEASURES_QUALIFIER: &str = "Measures";

/// Which persisted representation a model document uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Xml,
    Json,
}

impl DocumentKind {
    /// `<` as the first non-whitespace character means XML; anything else is treated as JSON.
    #[must_use]
    pub fn detect(text: &str) -> Self {
        let text = text.trim_start_matches('\u{feff}').trim_start();
        if text.starts_with('<') {
            DocumentKind::Xml
        } else {
            DocumentKind::Json
        }
    }
}

/// Every measure of a model in source order, primary and supporting alike.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeasureContainer {
    measures: Vec<Measure>,
}

impl MeasureContainer {
    #[must_use]
    pub fn new(measures: Vec<Measure>) -> Self {
        Self { measures }
    }

    /// Parse a measure script.
    pub fn from_script(src: &str) -> MeasureResult<Self> {
        Self::from_script_with(src, &ParseOptions::default())
    }

    /// Parse a measure script. KPI supporting measures are synthesized unless the script already
    /// defines `_`-prefixed measures.
    pub fn from_script_with(src: &str, options: &ParseOptions) -> MeasureResult<Self> {
        let parsed = parse_script_with(src, options)?;
        let mut container = Self::assemble(parsed, Vec::new(), &CommandConfig::default())?;
        container.synthesize_supporting_measures();
        Ok(container)
    }

    /// Read the measures of a model document, choosing the path with [`DocumentKind::detect`].
    pub fn parse(text: &str) -> MeasureResult<Self> {
        match DocumentKind::detect(text) {
            DocumentKind::Xml => {
                log::debug!("reading measures from the XML model document");
                Self::parse_from_xml(text)
            }
            DocumentKind::Json => {
                log::debug!("reading measures from the JSON model document");
                Self::parse_from_json(text)
            }
        }
    }

    /// Write the measures into `original`, choosing the path with [`DocumentKind::detect`].
    pub fn merge_into(&self, original: &str) -> MeasureResult<String> {
        match DocumentKind::detect(original) {
            DocumentKind::Xml => {
                log::debug!("merging measures into the XML model document");
                self.merge_into_xml(original)
            }
            DocumentKind::Json => {
                log::debug!("merging measures into the JSON model document");
                self.merge_into_json(original)
            }
        }
    }

    /// Every measure, primary and supporting, in source order.
    #[must_use]
    pub fn all_measures(&self) -> &[Measure] {
        &self.measures
    }

    /// Measures whose name does not start with `_`.
    pub fn measures(&self) -> impl Iterator<Item = &Measure> {
        self.measures.iter().filter(|m| !m.is_supporting())
    }

    /// `_`-prefixed KPI helper measures.
    pub fn supporting_measures(&self) -> impl Iterator<Item = &Measure> {
        self.measures.iter().filter(|m| m.is_supporting())
    }

    /// First measure (primary or supporting) with this exact name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Measure> {
        self.measures.iter().find(|m| m.name() == name)
    }

    /// Number of primary measures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.measures().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render the primary measures as a script, each statement followed by a blank line.
    #[must_use]
    pub fn to_dax_text(&self) -> String {
        let mut out = String::new();
        for measure in self.measures() {
            out.push_str(&measure.to_dax_text());
            out.push_str("\n\n");
        }
        out
    }

    /// Build the container from parsed command text plus the calculation properties found next to
    /// it, folding KPI statements and KPI properties onto their primary measures.
    fn assemble(
        parsed: ParsedScript,
        properties: Vec<XmlCalculationProperty>,
        config: &CommandConfig,
    ) -> MeasureResult<Self> {
        let ParsedScript { mut measures, kpis } = parsed;

        let mut index: HashMap<String, usize> = HashMap::new();
        for (idx, measure) in measures.iter().enumerate() {
            index.entry(measure.name().to_string()).or_insert(idx);
        }

        let mut kpi_properties: HashMap<String, Kpi> = HashMap::new();
        let mut supporting_properties: HashMap<String, XmlCalculationProperty> = HashMap::new();
        for element in properties {
            let Some((qualifier, name)) = split_reference(&element.reference) else {
                return Err(MeasureError::structure(
                    format!("malformed calculation reference {:?}", element.reference),
                    &element.reference,
                ));
            };
            if qualifier.is_some_and(|q| q.eq_ignore_ascii_case(KPI_QUALIFIER)) {
                let kpi = kpi_properties.entry(name).or_default();
                if kpi.description.is_none() {
                    kpi.description = element.property.description.clone();
                }
                kpi.annotations.merge(&element.annotations);
                continue;
            }
            if config.is_placeholder(&name) {
                continue;
            }
            let Some(&idx) = index.get(&name) else {
                log::warn!(
                    "calculation property {} does not match any measure; skipping it",
                    element.reference
                );
                continue;
            };
            if measures[idx].is_supporting() {
                supporting_properties.insert(name, element.clone());
            }
            measures[idx].set_calculation_property(element.property);
        }

        for statement in kpis {
            let target = statement
                .measure
                .clone()
                .unwrap_or_else(|| statement.name.clone());
            let Some(&idx) = index.get(&target).filter(|&&idx| !measures[idx].is_supporting())
            else {
                log::warn!("KPI [{}] refers to unknown measure [{target}]", statement.name);
                continue;
            };
            let mut kpi = kpi_properties.remove(&statement.name).unwrap_or_default();
            fold_kpi_statement(&mut kpi, &statement, &measures, &index, &supporting_properties);
            attach_kpi(&mut measures[idx], kpi);
        }

        // KPI properties without a CREATE KPI statement still carry description and annotations.
        for (name, kpi) in kpi_properties {
            match index.get(&name) {
                Some(&idx) if !measures[idx].is_supporting() => attach_kpi(&mut measures[idx], kpi),
                _ => log::warn!("KPI property KPIs.[{name}] does not match any measure"),
            }
        }

        Ok(Self { measures })
    }

    /// Append `_<Name> Goal|Status|Trend` measures for every KPI expression, unless the set already
    /// contains supporting measures.
    fn synthesize_supporting_measures(&mut self) {
        if self.supporting_measures().next().is_some() {
            return;
        }
        let mut synthesized = Vec::new();
        for measure in self.measures() {
            let Some(kpi) = measure.kpi() else {
                continue;
            };
            for kind in SupportingKind::ALL {
                let Some(expression) = kpi.expression(kind) else {
                    continue;
                };
                let property = CalculationProperty {
                    format_string: match kind {
                        SupportingKind::Goal => kpi.target_format_string.clone(),
                        SupportingKind::Status | SupportingKind::Trend => None,
                    },
                    is_hidden: true,
                    description: kpi.supporting_description(kind).map(str::to_string),
                    ..CalculationProperty::default()
                };
                synthesized.push(
                    Measure::new(
                        measure.table_name(),
                        kind.measure_name(measure.name()),
                        expression,
                    )
                    .with_calculation_property(property),
                );
            }
        }
        if !synthesized.is_empty() {
            log::debug!("synthesized {} KPI supporting measures", synthesized.len());
        }
        self.measures.extend(synthesized);
    }
}

fn attach_kpi(measure: &mut Measure, kpi: Kpi) {
    let property = CalculationProperty {
        kpi: Some(kpi),
        ..measure.calculation_property().clone()
    };
    measure.set_calculation_property(property);
}

/// Resolve the goal/status/trend references of a `CREATE KPI` statement into expressions.
///
/// A reference to a supporting measure contributes that measure's expression, plus the
/// description (and for the goal the format string) and annotations of its calculation property.
/// Any other value is kept as an inline expression.
fn fold_kpi_statement(
    kpi: &mut Kpi,
    statement: &KpiStatement,
    measures: &[Measure],
    index: &HashMap<String, usize>,
    supporting_properties: &HashMap<String, XmlCalculationProperty>,
) {
    if statement.status_graphic.is_some() {
        kpi.status_graphic = statement.status_graphic.clone();
    }
    if statement.trend_graphic.is_some() {
        kpi.trend_graphic = statement.trend_graphic.clone();
    }

    for (kind, value) in [
        (SupportingKind::Goal, &statement.goal),
        (SupportingKind::Status, &statement.status),
        (SupportingKind::Trend, &statement.trend),
    ] {
        let Some(value) = value else {
            continue;
        };
        let referenced = split_reference(value)
            .filter(|(qualifier, _)| {
                qualifier.map_or(true, |q| q.eq_ignore_ascii_case(MEASURES_QUALIFIER))
            })
            .and_then(|(_, name)| index.get(&name).map(|&idx| (name, &measures[idx])))
            .filter(|(_, measure)| measure.is_supporting());

        let (expression, description) = kpi.supporting_fields_mut(kind);
        match referenced {
            Some((name, measure)) => {
                log::debug!("folding supporting measure [{name}] into KPI [{}]", statement.name);
                *expression = Some(measure.expression().to_string());
                if let Some(element) = supporting_properties.get(&name) {
                    if description.is_none() {
                        *description = element.property.description.clone();
                    }
                    if kind == SupportingKind::Goal && kpi.target_format_string.is_none() {
                        kpi.target_format_string = element.property.format_string.clone();
                    }
                    kpi.annotations.merge(&element.annotations);
                }
            }
            None => *expression = Some(strip_measures_qualifier(value)),
        }
    }
}

/// `Measures.[X]` -> `[X]`; other text unchanged.
fn strip_measures_qualifier(value: &str) -> String {
    let trimmed = value.trim();
    match split_reference(trimmed) {
        Some((Some(qualifier), name)) if qualifier.eq_ignore_ascii_case(MEASURES_QUALIFIER) => {
            bracket_name(&name)
        }
        _ => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_document_kind_from_first_significant_character() {
        assert_eq!(DocumentKind::detect("\u{feff}  \n<Batch/>"), DocumentKind::Xml);
        assert_eq!(DocumentKind::detect("  {\"model\":{}}"), DocumentKind::Json);
    }

    #[test]
    fn views_partition_all_measures() {
        let container = MeasureContainer::from_script(
            "CREATE MEASURE 'T'[M] = 1\n\
             CALCULATION PROPERTY General KpiTargetExpression='100' KpiStatusExpression='IF([M] > 100, 1, -1)';\n\
             CREATE MEASURE 'T'[N] = 2;",
        )
        .unwrap();
        let names: Vec<&str> = container.all_measures().iter().map(Measure::name).collect();
        assert_eq!(names, vec!["M", "N", "_M Goal", "_M Status"]);
        assert_eq!(container.len(), 2);
        assert_eq!(container.supporting_measures().count(), 2);
        let goal = container.find("_M Goal").unwrap();
        assert_eq!(goal.full_text(), "CREATE MEASURE 'T'[_M Goal]=100");
        assert!(goal.calculation_property().is_hidden);
    }

    #[test]
    fn explicit_supporting_measures_suppress_synthesis() {
        let container = MeasureContainer::from_script(
            "CREATE MEASURE 'T'[M] = 1 CALCULATION PROPERTY General KpiTargetExpression='100';\n\
             CREATE MEASURE 'T'[_Helper] = 2;",
        )
        .unwrap();
        assert_eq!(container.all_measures().len(), 2);
    }

    #[test]
    fn strips_only_a_leading_measures_qualifier() {
        assert_eq!(strip_measures_qualifier(" measures.[Target] "), "[Target]");
        assert_eq!(strip_measures_qualifier("100"), "100");
        assert_eq!(strip_measures_qualifier("Measures.X"), "Measures.X");
    }
}
