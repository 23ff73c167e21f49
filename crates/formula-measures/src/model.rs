use std::fmt;

use crate::format::Format;
use crate::scanner::ends_with_line_comment;

/// Prefix shared by every synthesized KPI helper measure.
pub const SUPPORTING_PREFIX: char = '_';

/// One of the three helper measures that carry a KPI's expressions in the XML-based model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupportingKind {
    Goal,
    Status,
    Trend,
}

impl SupportingKind {
    pub const ALL: [SupportingKind; 3] = [
        SupportingKind::Goal,
        SupportingKind::Status,
        SupportingKind::Trend,
    ];

    #[must_use]
    pub fn suffix(self) -> &'static str {
        match self {
            SupportingKind::Goal => "Goal",
            SupportingKind::Status => "Status",
            SupportingKind::Trend => "Trend",
        }
    }

    /// `_<measure> Goal|Status|Trend`.
    #[must_use]
    pub fn measure_name(self, measure: &str) -> String {
        format!("{SUPPORTING_PREFIX}{measure} {}", self.suffix())
    }
}

/// Ordered KPI annotations. Names are unique; insertion order is preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct KpiAnnotations {
    entries: Vec<(String, String)>,
}

impl KpiAnnotations {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new annotation. Returns `false` (and leaves the set unchanged) when the name is
    /// already present.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        let name = name.into();
        if self.get(&name).is_some() {
            return false;
        }
        self.entries.push((name, value.into()));
        true
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Append every annotation of `other` whose name is not present yet; existing values win.
    pub fn merge(&mut self, other: &KpiAnnotations) {
        for (name, value) in other.iter() {
            self.insert(name, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Kpi {
    pub description: Option<String>,
    pub target_description: Option<String>,
    pub target_format_string: Option<String>,
    pub target_expression: Option<String>,
    pub status_graphic: Option<String>,
    pub status_description: Option<String>,
    pub status_expression: Option<String>,
    pub trend_graphic: Option<String>,
    pub trend_description: Option<String>,
    pub trend_expression: Option<String>,
    pub annotations: KpiAnnotations,
}

impl Kpi {
    /// The expression stored in the given supporting measure, if non-empty.
    #[must_use]
    pub fn expression(&self, kind: SupportingKind) -> Option<&str> {
        let expr = match kind {
            SupportingKind::Goal => &self.target_expression,
            SupportingKind::Status => &self.status_expression,
            SupportingKind::Trend => &self.trend_expression,
        };
        non_empty(expr)
    }

    /// The description carried by the given supporting measure's calculation property.
    #[must_use]
    pub fn supporting_description(&self, kind: SupportingKind) -> Option<&str> {
        let description = match kind {
            SupportingKind::Goal => &self.target_description,
            SupportingKind::Status => &self.status_description,
            SupportingKind::Trend => &self.trend_description,
        };
        non_empty(description)
    }

    /// The first field set on the KPI that only the given supporting measure's property carries.
    #[must_use]
    pub fn dependent_field(&self, kind: SupportingKind) -> Option<&'static str> {
        let fields = match kind {
            SupportingKind::Goal => [
                ("target description", &self.target_description),
                ("target format string", &self.target_format_string),
            ],
            SupportingKind::Status => [
                ("status description", &self.status_description),
                ("status graphic", &self.status_graphic),
            ],
            SupportingKind::Trend => [
                ("trend description", &self.trend_description),
                ("trend graphic", &self.trend_graphic),
            ],
        };
        fields
            .into_iter()
            .find(|(_, value)| non_empty(value).is_some())
            .map(|(name, _)| name)
    }

    /// Expression and description slots fed by the given supporting measure.
    pub(crate) fn supporting_fields_mut(
        &mut self,
        kind: SupportingKind,
    ) -> (&mut Option<String>, &mut Option<String>) {
        match kind {
            SupportingKind::Goal => (&mut self.target_expression, &mut self.target_description),
            SupportingKind::Status => (&mut self.status_expression, &mut self.status_description),
            SupportingKind::Trend => (&mut self.trend_expression, &mut self.trend_description),
        }
    }

    #[must_use]
    pub fn has_supporting_expressions(&self) -> bool {
        SupportingKind::ALL
            .into_iter()
            .any(|kind| self.expression(kind).is_some())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clone().normalized() == Kpi::default()
    }

    /// Empty strings become `None`.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        for field in [
            &mut self.description,
            &mut self.target_description,
            &mut self.target_format_string,
            &mut self.target_expression,
            &mut self.status_graphic,
            &mut self.status_description,
            &mut self.status_expression,
            &mut self.trend_graphic,
            &mut self.trend_description,
            &mut self.trend_expression,
        ] {
            if field.as_deref().is_some_and(str::is_empty) {
                *field = None;
            }
        }
        self
    }
}

/// Formatting, visibility and KPI metadata attached to a measure.
///
/// The default value (General format, visible, no strings, no KPI) is semantically "no
/// calculation property" and renders to nothing in measure scripts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CalculationProperty {
    pub format: Format,
    pub format_string: Option<String>,
    pub is_hidden: bool,
    pub display_folder: Option<String>,
    pub description: Option<String>,
    pub kpi: Option<Kpi>,
}

impl CalculationProperty {
    #[must_use]
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Canonical form shared by every reader: empty strings become `None`, empty KPIs are dropped,
    /// and `Text` formats carry no format string (the kind implies `@`).
    #[must_use]
    pub fn normalized(mut self) -> Self {
        for field in [
            &mut self.format_string,
            &mut self.display_folder,
            &mut self.description,
        ] {
            if field.as_deref().is_some_and(str::is_empty) {
                *field = None;
            }
        }
        if self.format == Format::Text {
            self.format_string = None;
        }
        self.kpi = self.kpi.map(Kpi::normalized).filter(|kpi| !kpi.is_empty());
        self
    }

    /// The format string written to persisted documents.
    #[must_use]
    pub fn effective_format_string(&self) -> Option<&str> {
        match self.format {
            Format::Text => Some("@"),
            _ => non_empty(&self.format_string),
        }
    }
}

/// A measure defined against a table.
///
/// `full_text` is the complete `CREATE MEASURE <table>[<name>] = <expression>` statement exactly
/// as authored (without the terminating `;`) and always ends with `expression`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Measure {
    table_name: String,
    name: String,
    expression: String,
    full_text: String,
    calculation_property: CalculationProperty,
}

impl Measure {
    /// Build a measure whose statement text is synthesized from its parts.
    #[must_use]
    pub fn new(
        table_name: impl Into<String>,
        name: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        let table_name = table_name.into();
        let name = name.into();
        let expression = expression.into();
        let full_text = format!(
            "CREATE MEASURE {}{}={expression}",
            quote_table_name(&table_name),
            bracket_name(&name)
        );
        Self {
            table_name,
            name,
            expression,
            full_text,
            calculation_property: CalculationProperty::default(),
        }
    }

    /// Build a measure from a parsed statement, keeping the authored text.
    pub(crate) fn from_source(
        table_name: String,
        name: String,
        expression: String,
        full_text: String,
    ) -> Self {
        debug_assert!(full_text.ends_with(&expression));
        Self {
            table_name,
            name,
            expression,
            full_text,
            calculation_property: CalculationProperty::default(),
        }
    }

    #[must_use]
    pub fn with_calculation_property(mut self, property: CalculationProperty) -> Self {
        self.calculation_property = property.normalized();
        self
    }

    pub(crate) fn set_calculation_property(&mut self, property: CalculationProperty) {
        self.calculation_property = property.normalized();
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// The measure name without brackets.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `[name]`, with `]` escaped as `]]`.
    #[must_use]
    pub fn bracketed_name(&self) -> String {
        bracket_name(&self.name)
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    pub fn calculation_property(&self) -> &CalculationProperty {
        &self.calculation_property
    }

    pub fn kpi(&self) -> Option<&Kpi> {
        self.calculation_property.kpi.as_ref()
    }

    /// Supporting measures are the `_`-prefixed helpers that carry KPI expressions.
    #[must_use]
    pub fn is_supporting(&self) -> bool {
        self.name.starts_with(SUPPORTING_PREFIX)
    }

    /// The statement text followed by `;`, on its own line when the text ends in a line comment.
    #[must_use]
    pub fn terminated_text(&self) -> String {
        terminate_statement(&self.full_text)
    }

    /// Render the measure as a script statement: header and expression, the optional
    /// `CALCULATION PROPERTY` clause, and the `;` terminator.
    #[must_use]
    pub fn to_dax_text(&self) -> String {
        match self.calculation_property.to_dax_text() {
            Some(clause) => format!("{}\n{clause};", self.full_text),
            None => self.terminated_text(),
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_dax_text())
    }
}

/// `'table'`, with `'` escaped as `''`.
#[must_use]
pub fn quote_table_name(table: &str) -> String {
    format!("'{}'", table.replace('\'', "''"))
}

/// `[name]`, with `]` escaped as `]]`.
#[must_use]
pub fn bracket_name(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

pub(crate) fn terminate_statement(text: &str) -> String {
    if ends_with_line_comment(text) {
        format!("{text}\n;")
    } else {
        format!("{text};")
    }
}

pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
