//! Statement parser for measure scripts.
//!
//! A script is a sequence of statements:
//!
//! ```text
//! CREATE MEASURE 'Sales'[Revenue] = SUM(Sales[Amount]) -- gross
//! CALCULATION PROPERTY Currency Accuracy=2 Format='\$#,0.00';
//! CREATE KPI CURRENTCUBE.[Revenue] AS Measures.[Revenue], GOAL = Measures.[_Revenue Goal];
//! ```
//!
//! Expressions are not interpreted: the parser only finds their boundaries so the authored text
//! (comments included) can be kept byte-for-byte. MDX statements that appear in persisted command
//! text (`CALCULATE;`, `CREATE MEMBER ...;`, `ALTER CUBE ...;`) are recognized and skipped.
//!
//! Errors never abort the parse; the parser resynchronizes at the next `;` or statement keyword and
//! keeps collecting diagnostics. A statement that produced any error is not published.

use serde::{Deserialize, Serialize};

use crate::error::{ParseError, ParseErrors};
use crate::format::parse_bool;
use crate::format::text::{read_quoted_value, ClauseValue, PropertyBuilder};
use crate::format::FormatKind;
use crate::model::{CalculationProperty, Measure};
use crate::scanner::{line_col, unescape_delimited, Keyword, Scanner, Token, TokenKind};

const DEFAULT_MAX_REPORTED_ERRORS: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Diagnostics beyond this many are counted but not listed.
    pub max_reported_errors: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_reported_errors: DEFAULT_MAX_REPORTED_ERRORS,
        }
    }
}

/// A `CREATE KPI` statement as found in persisted command text.
///
/// Values are kept as written (`Measures.[_Revenue Goal]`, `100`), except for the single-quoted
/// measure group and graphics which are unquoted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KpiStatement {
    pub name: String,
    /// Name of the measure the KPI is defined `AS`.
    pub measure: Option<String>,
    pub measure_group: Option<String>,
    pub goal: Option<String>,
    pub status: Option<String>,
    pub status_graphic: Option<String>,
    pub trend: Option<String>,
    pub trend_graphic: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedScript {
    /// Completed measures in source order.
    pub measures: Vec<Measure>,
    pub kpis: Vec<KpiStatement>,
}

/// Parse a measure script with the default [`ParseOptions`].
pub fn parse_script(src: &str) -> Result<ParsedScript, ParseErrors> {
    parse_script_with(src, &ParseOptions::default())
}

pub fn parse_script_with(src: &str, options: &ParseOptions) -> Result<ParsedScript, ParseErrors> {
    let mut parser = Parser::new(src);
    parser.parse();
    if parser.errors.is_empty() {
        Ok(parser.script)
    } else {
        Err(ParseErrors::new(
            src,
            parser.errors,
            options.max_reported_errors,
        ))
    }
}

/// Split `[Name]`, `Measures.[Name]` or `KPIs.[Name]` into its qualifier and unescaped name.
pub(crate) fn split_reference(reference: &str) -> Option<(Option<&str>, String)> {
    let tokens: Vec<Token> = Scanner::new(reference)
        .filter(|t| !t.kind.is_trivia() && t.kind != TokenKind::Eof)
        .collect();
    match tokens.as_slice() {
        [name] if name.kind == TokenKind::Bracketed => {
            Some((None, unescape_delimited(name.text(reference))))
        }
        [qualifier, dot, name]
            if matches!(qualifier.kind, TokenKind::Identifier | TokenKind::Keyword(_))
                && dot.kind == TokenKind::Delimiter('.')
                && name.kind == TokenKind::Bracketed =>
        {
            Some((
                Some(qualifier.text(reference)),
                unescape_delimited(name.text(reference)),
            ))
        }
        _ => None,
    }
}

/// How a measure expression ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    /// `;` at parenthesis depth 0 (consumed).
    Semicolon,
    /// `CALCULATION PROPERTY` (not consumed).
    Clause,
    /// `CREATE MEASURE|KPI|MEMBER` (not consumed).
    NextStatement,
    End,
}

/// How a `CREATE KPI` clause value ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Separator {
    Comma,
    End,
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    errors: Vec<ParseError>,
    script: ParsedScript,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            errors: Vec::new(),
            script: ParsedScript::default(),
        }
    }

    fn text(&self, token: Token) -> &'a str {
        token.text(self.src)
    }

    fn error(&mut self, offset: usize, message: impl Into<String>) {
        let (line, column) = line_col(self.src, offset);
        self.errors.push(ParseError::new(line, column, message));
    }

    fn eof(&self) -> Token {
        Token {
            kind: TokenKind::Eof,
            start: self.src.len(),
            len: 0,
        }
    }

    /// The next raw token, without consuming it.
    fn peek(&self) -> Token {
        Scanner::at(self.src, self.pos)
            .next()
            .unwrap_or_else(|| self.eof())
    }

    fn bump(&mut self) -> Token {
        let token = self.peek();
        self.pos = token.end();
        token
    }

    /// Skip whitespace and comments, then peek. Unterminated block comments are reported here.
    fn lookahead(&mut self) -> Token {
        loop {
            let token = self.peek();
            match token.kind {
                TokenKind::UnterminatedBlockComment => {
                    self.error(token.start, "unterminated block comment");
                    self.pos = token.end();
                }
                kind if kind.is_trivia() => self.pos = token.end(),
                _ => return token,
            }
        }
    }

    fn significant_from(&self, offset: usize) -> Token {
        Scanner::at(self.src, offset)
            .find(|t| !t.kind.is_trivia())
            .unwrap_or_else(|| self.eof())
    }

    fn significant_after(&self, token: Token) -> Token {
        self.significant_from(token.end())
    }

    fn is_statement_start(&self, token: Token) -> bool {
        token.kind == TokenKind::Keyword(Keyword::Create)
            && matches!(
                self.significant_after(token).kind,
                TokenKind::Keyword(Keyword::Measure | Keyword::Kpi | Keyword::Member)
            )
    }

    fn is_clause_start(&self, token: Token) -> bool {
        token.kind == TokenKind::Keyword(Keyword::Calculation)
            && self.significant_after(token).kind == TokenKind::Keyword(Keyword::Property)
    }

    fn describe(&self, token: Token) -> String {
        match token.kind {
            TokenKind::Eof => "end of input".to_string(),
            _ => format!("'{}'", self.text(token)),
        }
    }

    /// Consume the next significant token if it is `expected`; otherwise report an error.
    fn expect(&mut self, expected: TokenKind, what: &str) -> Option<Token> {
        let token = self.lookahead();
        if token.kind == expected {
            self.pos = token.end();
            Some(token)
        } else {
            let found = self.describe(token);
            self.error(token.start, format!("expected {what}, found {found}"));
            None
        }
    }

    /// Resynchronize: skip to just past the next `;` at depth 0, or up to the next statement.
    fn skip_statement(&mut self) {
        let mut depth = 0i32;
        loop {
            let token = self.peek();
            match token.kind {
                TokenKind::Eof => return,
                TokenKind::Keyword(Keyword::Create) if self.is_statement_start(token) => return,
                TokenKind::Delimiter(';') if depth <= 0 => {
                    self.pos = token.end();
                    return;
                }
                TokenKind::Delimiter('(') => depth += 1,
                TokenKind::Delimiter(')') => depth -= 1,
                _ => {}
            }
            self.pos = token.end();
        }
    }

    fn parse(&mut self) {
        loop {
            let token = self.lookahead();
            match token.kind {
                TokenKind::Eof => break,
                TokenKind::Delimiter(';') => self.pos = token.end(),
                TokenKind::Keyword(Keyword::Create) => {
                    self.pos = token.end();
                    self.parse_create(token);
                }
                TokenKind::Keyword(Keyword::Alter) => self.skip_statement(),
                TokenKind::Identifier if self.text(token).eq_ignore_ascii_case("CALCULATE") => {
                    self.skip_statement();
                }
                _ => {
                    let found = self.describe(token);
                    self.error(
                        token.start,
                        format!("unexpected {found}; expected CREATE MEASURE"),
                    );
                    self.pos = token.end();
                    self.skip_statement();
                }
            }
        }
    }

    fn parse_create(&mut self, create: Token) {
        let token = self.lookahead();
        match token.kind {
            TokenKind::Keyword(Keyword::Measure) => {
                self.pos = token.end();
                self.parse_measure(create);
            }
            TokenKind::Keyword(Keyword::Kpi) => {
                self.pos = token.end();
                self.parse_kpi();
            }
            TokenKind::Keyword(Keyword::Member) => self.skip_statement(),
            _ => {
                let found = self.describe(token);
                self.error(
                    token.start,
                    format!("expected MEASURE or KPI after CREATE, found {found}"),
                );
                self.skip_statement();
            }
        }
    }

    fn parse_measure(&mut self, create: Token) {
        let errors_before = self.errors.len();

        let Some(table) = self.parse_table_name() else {
            self.skip_statement();
            return;
        };
        let Some(name) = self.parse_bracketed("measure name") else {
            self.skip_statement();
            return;
        };
        let Some(eq) = self.expect(TokenKind::Delimiter('='), "'=' after the measure name") else {
            self.skip_statement();
            return;
        };

        let (span, boundary) = self.parse_expression();
        let Some((start, end)) = span else {
            self.error(eq.start, "expected an expression after '='");
            if boundary == Boundary::Clause {
                self.skip_statement();
            }
            return;
        };

        let property = match boundary {
            Boundary::Clause => self.parse_calculation_property(),
            Boundary::Semicolon | Boundary::NextStatement | Boundary::End => {
                CalculationProperty::default()
            }
        };
        // Comments after the terminator or clause still document this measure.
        let trailing = match boundary {
            Boundary::Semicolon | Boundary::Clause => self.trailing_comments(),
            Boundary::NextStatement | Boundary::End => None,
        };
        let src = self.src;
        let comments = trailing.map_or("", |(from, to)| &src[from..to]);

        if self.errors.len() == errors_before {
            let measure = Measure::from_source(
                table,
                name,
                format!("{}{comments}", &src[start..end]),
                format!("{}{comments}", &src[create.start..end]),
            )
            .with_calculation_property(property);
            self.script.measures.push(measure);
        }
    }

    fn parse_table_name(&mut self) -> Option<String> {
        let token = self.lookahead();
        let table = match token.kind {
            TokenKind::Identifier | TokenKind::Keyword(_) => self.text(token).to_string(),
            TokenKind::QuotedName => unescape_delimited(self.text(token)),
            TokenKind::PartialQuotedName => {
                self.error(token.start, "unterminated table name");
                return None;
            }
            _ => {
                let found = self.describe(token);
                self.error(token.start, format!("expected a table name, found {found}"));
                return None;
            }
        };
        self.pos = token.end();
        Some(table)
    }

    fn parse_bracketed(&mut self, what: &str) -> Option<String> {
        let token = self.lookahead();
        match token.kind {
            TokenKind::Bracketed => {
                self.pos = token.end();
                Some(unescape_delimited(self.text(token)))
            }
            TokenKind::PartialBracketed => {
                self.error(token.start, format!("unterminated {what}"));
                None
            }
            _ => {
                let found = self.describe(token);
                self.error(token.start, format!("expected a bracketed {what}, found {found}"));
                None
            }
        }
    }

    /// Comments between the current position and the next statement or the end of input.
    /// Returns the span from the current position through the last comment, and consumes it.
    fn trailing_comments(&mut self) -> Option<(usize, usize)> {
        let start = self.pos;
        let mut end = None;
        for token in Scanner::at(self.src, start) {
            match token.kind {
                TokenKind::Whitespace => {}
                TokenKind::LineComment | TokenKind::BlockComment => end = Some(token.end()),
                _ => break,
            }
        }
        let end = end?;
        self.pos = end;
        Some((start, end))
    }

    /// Scan an expression. Returns the byte span from its first to its last non-whitespace token
    /// (trailing comments included) and what ended it.
    fn parse_expression(&mut self) -> (Option<(usize, usize)>, Boundary) {
        let mut depth = 0i32;
        let mut span: Option<(usize, usize)> = None;
        loop {
            let token = self.peek();
            let boundary = match token.kind {
                TokenKind::Eof => Some(Boundary::End),
                TokenKind::Delimiter(';') if depth <= 0 => {
                    self.pos = token.end();
                    Some(Boundary::Semicolon)
                }
                TokenKind::Keyword(Keyword::Create) if self.is_statement_start(token) => {
                    Some(Boundary::NextStatement)
                }
                TokenKind::Keyword(Keyword::Calculation) if self.is_clause_start(token) => {
                    Some(Boundary::Clause)
                }
                _ => None,
            };
            if let Some(boundary) = boundary {
                return (span, boundary);
            }

            self.pos = token.end();
            match token.kind {
                TokenKind::Whitespace => continue,
                TokenKind::Delimiter('(') => depth += 1,
                TokenKind::Delimiter(')') => depth -= 1,
                TokenKind::UnterminatedString => {
                    self.error(token.start, "unterminated string literal");
                }
                TokenKind::UnterminatedBlockComment => {
                    self.error(token.start, "unterminated block comment");
                }
                TokenKind::PartialQuotedName => {
                    self.error(token.start, "unterminated quoted table name");
                }
                TokenKind::PartialBracketed => {
                    self.error(token.start, "unterminated bracketed name");
                }
                TokenKind::Error => {
                    let text = self.text(token);
                    self.error(token.start, format!("unexpected character '{text}'"));
                }
                _ => {}
            }
            span = Some((span.map_or(token.start, |(start, _)| start), token.end()));
        }
    }

    /// `CALCULATION PROPERTY <kind> Key=Value ... [;]`, starting at `CALCULATION`.
    fn parse_calculation_property(&mut self) -> CalculationProperty {
        self.bump();
        self.lookahead();
        self.bump();

        let kind_token = self.lookahead();
        let kind = match kind_token.kind {
            TokenKind::Identifier | TokenKind::Keyword(_) => {
                match FormatKind::from_name(self.text(kind_token)) {
                    Ok(kind) => kind,
                    Err(err) => {
                        self.error(kind_token.start, err.to_string());
                        self.skip_statement();
                        return CalculationProperty::default();
                    }
                }
            }
            _ => {
                let found = self.describe(kind_token);
                self.error(
                    kind_token.start,
                    format!("expected a format type after CALCULATION PROPERTY, found {found}"),
                );
                self.skip_statement();
                return CalculationProperty::default();
            }
        };
        self.pos = kind_token.end();

        let mut builder = PropertyBuilder::new(kind);
        loop {
            // Comments before the next statement are left for the caller to absorb.
            let next = self.significant_from(self.pos);
            if next.kind == TokenKind::Eof || self.is_statement_start(next) {
                break;
            }
            let token = self.lookahead();
            match token.kind {
                TokenKind::Delimiter(';') => {
                    self.pos = token.end();
                    break;
                }
                TokenKind::Identifier | TokenKind::Keyword(_) => {
                    self.pos = token.end();
                    let key = self.text(token);
                    let expected = format!("'=' after {key}");
                    if self.expect(TokenKind::Delimiter('='), &expected).is_none() {
                        self.skip_statement();
                        break;
                    }
                    let Some(value) = self.parse_clause_value() else {
                        self.skip_statement();
                        break;
                    };
                    if let Err(message) = builder.apply(key, value) {
                        self.error(token.start, message);
                    }
                }
                _ => {
                    let found = self.describe(token);
                    self.error(
                        token.start,
                        format!("unexpected {found} in calculation property"),
                    );
                    self.skip_statement();
                    break;
                }
            }
        }
        builder.finish()
    }

    fn parse_clause_value(&mut self) -> Option<ClauseValue> {
        let token = self.lookahead();
        match token.kind {
            TokenKind::QuotedName | TokenKind::PartialQuotedName => {
                match read_quoted_value(self.src, token.start) {
                    Some((value, end)) => {
                        self.pos = end;
                        Some(ClauseValue::Text(value))
                    }
                    None => {
                        self.error(token.start, "unterminated quoted value");
                        self.pos = self.src.len();
                        None
                    }
                }
            }
            TokenKind::Number => {
                self.pos = token.end();
                let text = self.text(token);
                match text.parse::<u32>() {
                    Ok(number) => Some(ClauseValue::Number(number)),
                    Err(_) => {
                        self.error(
                            token.start,
                            format!("expected a non-negative integer, found '{text}'"),
                        );
                        None
                    }
                }
            }
            TokenKind::Identifier | TokenKind::Keyword(_) => {
                match parse_bool(self.text(token)) {
                    Some(value) => {
                        self.pos = token.end();
                        Some(ClauseValue::Bool(value))
                    }
                    None => {
                        let found = self.describe(token);
                        self.error(
                            token.start,
                            format!("expected a quoted string, number, True or False, found {found}"),
                        );
                        None
                    }
                }
            }
            _ => {
                let found = self.describe(token);
                self.error(token.start, format!("expected a value, found {found}"));
                None
            }
        }
    }

    /// `CREATE KPI [CURRENTCUBE.][Name] AS <measure>, KEY = value, ... ;`, after `KPI`.
    fn parse_kpi(&mut self) {
        let errors_before = self.errors.len();

        let token = self.lookahead();
        if token.kind == TokenKind::Identifier
            && self.text(token).eq_ignore_ascii_case("CURRENTCUBE")
        {
            self.pos = token.end();
            if self.expect(TokenKind::Delimiter('.'), "'.' after CURRENTCUBE").is_none() {
                self.skip_statement();
                return;
            }
        }
        let Some(name) = self.parse_bracketed("KPI name") else {
            self.skip_statement();
            return;
        };

        let as_token = self.lookahead();
        if !(as_token.kind == TokenKind::Identifier
            && self.text(as_token).eq_ignore_ascii_case("AS"))
        {
            let found = self.describe(as_token);
            self.error(as_token.start, format!("expected AS after the KPI name, found {found}"));
            self.skip_statement();
            return;
        }
        self.pos = as_token.end();

        let mut kpi = KpiStatement {
            name,
            ..KpiStatement::default()
        };
        let (measure, mut separator) = self.parse_kpi_value();
        kpi.measure = measure.map(|text| match split_reference(&text) {
            Some((_, name)) => name,
            None => text,
        });

        while separator == Separator::Comma {
            let key_token = self.lookahead();
            if !matches!(key_token.kind, TokenKind::Identifier | TokenKind::Keyword(_)) {
                let found = self.describe(key_token);
                self.error(key_token.start, format!("expected a KPI property, found {found}"));
                self.skip_statement();
                return;
            }
            self.pos = key_token.end();
            let key = self.text(key_token);
            let Some(eq) = self.expect(TokenKind::Delimiter('='), "'=' after the KPI property")
            else {
                self.skip_statement();
                return;
            };

            let (value, next) = self.parse_kpi_value();
            separator = next;
            let Some(value) = value else {
                self.error(eq.start, format!("expected a value for {key}"));
                continue;
            };
            match key.to_ascii_uppercase().as_str() {
                "ASSOCIATED_MEASURE_GROUP" => kpi.measure_group = Some(unquote(&value)),
                "GOAL" => kpi.goal = Some(value),
                "STATUS" => kpi.status = Some(value),
                "STATUS_GRAPHIC" => kpi.status_graphic = Some(unquote(&value)),
                "TREND" => kpi.trend = Some(value),
                "TREND_GRAPHIC" => kpi.trend_graphic = Some(unquote(&value)),
                _ => log::debug!("ignoring KPI property {key} on [{}]", kpi.name),
            }
        }

        if self.errors.len() == errors_before {
            self.script.kpis.push(kpi);
        }
    }

    /// Raw text of one `CREATE KPI` value, up to a `,` or `;` at depth 0 (consumed) or the next
    /// statement.
    fn parse_kpi_value(&mut self) -> (Option<String>, Separator) {
        let mut depth = 0i32;
        let mut span: Option<(usize, usize)> = None;
        let separator = loop {
            let token = self.peek();
            match token.kind {
                TokenKind::Eof => break Separator::End,
                TokenKind::Keyword(Keyword::Create) if self.is_statement_start(token) => {
                    break Separator::End;
                }
                TokenKind::Delimiter(';') if depth <= 0 => {
                    self.pos = token.end();
                    break Separator::End;
                }
                TokenKind::Delimiter(',') if depth <= 0 => {
                    self.pos = token.end();
                    break Separator::Comma;
                }
                _ => {}
            }
            self.pos = token.end();
            match token.kind {
                TokenKind::Delimiter('(') => depth += 1,
                TokenKind::Delimiter(')') => depth -= 1,
                TokenKind::UnterminatedString | TokenKind::PartialQuotedName => {
                    self.error(token.start, "unterminated string in KPI definition");
                }
                _ => {}
            }
            if !token.kind.is_trivia() {
                span = Some((span.map_or(token.start, |(start, _)| start), token.end()));
            }
        };
        let value = span.map(|(start, end)| self.src[start..end].to_string());
        (value, separator)
    }
}

/// `'Sales'` -> `Sales`; anything else is returned unchanged.
fn unquote(value: &str) -> String {
    match read_quoted_value(value, 0) {
        Some((text, end)) if end == value.len() => text,
        _ => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Format;

    fn measures(src: &str) -> Vec<Measure> {
        parse_script(src).unwrap().measures
    }

    #[test]
    fn header_forms_and_expression_span() {
        let parsed = measures(
            "CREATE MEASURE 'Sales ''EU'''[Total [net]]] = SUM('Sales ''EU'''[Amount]);\n\
             create measure Sales[Count]=COUNTROWS(Sales)",
        );
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].table_name(), "Sales 'EU'");
        assert_eq!(parsed[0].name(), "Total [net]");
        assert_eq!(parsed[0].expression(), "SUM('Sales ''EU'''[Amount])");
        assert_eq!(
            parsed[0].full_text(),
            "CREATE MEASURE 'Sales ''EU'''[Total [net]]] = SUM('Sales ''EU'''[Amount])"
        );
        assert_eq!(parsed[1].table_name(), "Sales");
        assert_eq!(parsed[1].expression(), "COUNTROWS(Sales)");
    }

    #[test]
    fn equals_inside_strings_and_comments_does_not_move_the_boundary() {
        let parsed = measures("CREATE MEASURE t[A] /* x = y */ = IF([B] = \"a=b\", 1) // = 3\n;");
        assert_eq!(parsed[0].expression(), "IF([B] = \"a=b\", 1) // = 3");
    }

    #[test]
    fn semicolon_inside_parentheses_does_not_end_the_statement() {
        let parsed = measures("CREATE MEASURE t[A] = FOO(1; 2)\nCREATE MEASURE t[B] = 2");
        assert_eq!(parsed[0].expression(), "FOO(1; 2)");
        assert_eq!(parsed[1].expression(), "2");
    }

    #[test]
    fn clause_is_parsed_and_not_part_of_full_text() {
        let parsed = measures(
            "CREATE MEASURE t[A] = 1\nCALCULATION PROPERTY numberwhole visible=false \
             Accuracy=0 ThousandSeparator=True Description='multi\nline';",
        );
        let measure = &parsed[0];
        assert_eq!(measure.full_text(), "CREATE MEASURE t[A] = 1");
        let property = measure.calculation_property();
        assert_eq!(
            property.format,
            Format::NumberWhole {
                accuracy: Some(0),
                thousand_separator: true
            }
        );
        assert!(property.is_hidden);
        assert_eq!(property.description.as_deref(), Some("multi\nline"));
    }

    #[test]
    fn unknown_format_kind_is_reported() {
        let err = parse_script("CREATE MEASURE t[A] = 1 CALCULATION PROPERTY Money;").unwrap_err();
        assert_eq!(err.errors.len(), 1);
        assert_eq!(err.errors[0].line, 1);
        assert_eq!(err.errors[0].column, 46);
        assert!(err.errors[0]
            .message
            .contains("wrong calculation property type"));
    }

    #[test]
    fn mdx_statements_are_skipped_and_kpis_collected() {
        let parsed = parse_script(
            "CALCULATE;\n\
             CREATE MEMBER CURRENTCUBE.Measures.[__XL_Count of Models] AS 1, VISIBLE = 0;\n\
             ALTER CUBE CURRENTCUBE UPDATE DIMENSION Measures, Default_Member = [__XL_Count of Models];\n\
             CREATE MEASURE 'T'[M] = 1;\n\
             CREATE KPI CURRENTCUBE.[M] AS Measures.[M], ASSOCIATED_MEASURE_GROUP = 'T', \
             GOAL = Measures.[_M Goal], STATUS_GRAPHIC = 'Traffic Light', CAPTION = 'x';",
        )
        .unwrap();
        assert_eq!(parsed.measures.len(), 1);
        assert_eq!(
            parsed.kpis,
            vec![KpiStatement {
                name: "M".into(),
                measure: Some("M".into()),
                measure_group: Some("T".into()),
                goal: Some("Measures.[_M Goal]".into()),
                status_graphic: Some("Traffic Light".into()),
                ..KpiStatement::default()
            }]
        );
    }

    #[test]
    fn recovery_keeps_later_statements_and_errors() {
        let err = parse_script(
            "CREATE MEASURE t[A] 1;\nCREATE MEASURE t[B] = [open\nCREATE MEASURE t[C] = 3 CALCULATION PROPERTY General Colour='red';",
        )
        .unwrap_err();
        let lines: Vec<usize> = err.errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![1, 2, 3]);
    }

    #[test]
    fn references_split_into_qualifier_and_name() {
        assert_eq!(split_reference("[A]]b]"), Some((None, "A]b".to_string())));
        assert_eq!(
            split_reference("Measures.[Sales Total]"),
            Some((Some("Measures"), "Sales Total".to_string()))
        );
        assert_eq!(split_reference("Measures.Foo"), None);
    }
}
