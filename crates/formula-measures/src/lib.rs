//! Round-trip editing of tabular model measures.
//!
//! Measures are edited as a plain script of `CREATE MEASURE` statements and written back into the
//! model's persisted document (XML- or JSON-based) without touching anything else in it:
//!
//! ```no_run
//! # fn main() -> formula_measures::MeasureResult<()> {
//! # let model_xml = String::new();
//! let container = formula_measures::parse(&model_xml)?;
//! let script = formula_measures::render(&container);
//! // ... the script is edited ...
//! let edited = formula_measures::parse_script(&script)?;
//! let updated = formula_measures::merge(&edited, &model_xml)?;
//! # let _ = updated;
//! # Ok(())
//! # }
//! ```

pub mod commands;
mod container;
mod error;
pub mod format;
mod model;
pub mod parser;
pub mod scanner;

pub use crate::commands::{CommandConfig, CommandProducer};
pub use crate::container::{DocumentKind, MeasureContainer, XmlModelInfo};
pub use crate::error::{FormatError, MeasureError, MeasureResult, ParseError, ParseErrors};
pub use crate::format::{CustomFormat, Format, FormatKind};
pub use crate::model::{
    bracket_name, quote_table_name, CalculationProperty, Kpi, KpiAnnotations, Measure,
    SupportingKind, SUPPORTING_PREFIX,
};
pub use crate::parser::{KpiStatement, ParseOptions, ParsedScript};

/// Read the measures of a persisted model document (XML or JSON, chosen by its first character).
pub fn parse(model_text: &str) -> MeasureResult<MeasureContainer> {
    MeasureContainer::parse(model_text)
}

/// Parse an edited measure script.
pub fn parse_script(script: &str) -> MeasureResult<MeasureContainer> {
    MeasureContainer::from_script(script)
}

/// Render the primary measures as a script.
#[must_use]
pub fn render(container: &MeasureContainer) -> String {
    container.to_dax_text()
}

/// Write `container` back into `original_model_text`, keeping every unrelated byte.
pub fn merge(container: &MeasureContainer, original_model_text: &str) -> MeasureResult<String> {
    container.merge_into(original_model_text)
}
