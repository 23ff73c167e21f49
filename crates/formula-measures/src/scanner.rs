//! Tokenizer for measure scripts.
//!
//! The scanner never fails: malformed input produces [`TokenKind::Error`] or one of the partial
//! token kinds, and the stream always finishes with a single [`TokenKind::Eof`]. Every token
//! carries its absolute byte offset, so scanning can restart at any token boundary with
//! [`Scanner::at`].

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Evaluate,
    Define,
    Measure,
    Order,
    By,
    Asc,
    Desc,
    Start,
    At,
    Create,
    Var,
    Return,
    Calculation,
    Property,
    Kpi,
    Member,
    Alter,
    Cube,
    In,
    Not,
}

impl Keyword {
    const ALL: [Keyword; 20] = [
        Keyword::Evaluate,
        Keyword::Define,
        Keyword::Measure,
        Keyword::Order,
        Keyword::By,
        Keyword::Asc,
        Keyword::Desc,
        Keyword::Start,
        Keyword::At,
        Keyword::Create,
        Keyword::Var,
        Keyword::Return,
        Keyword::Calculation,
        Keyword::Property,
        Keyword::Kpi,
        Keyword::Member,
        Keyword::Alter,
        Keyword::Cube,
        Keyword::In,
        Keyword::Not,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::Evaluate => "EVALUATE",
            Keyword::Define => "DEFINE",
            Keyword::Measure => "MEASURE",
            Keyword::Order => "ORDER",
            Keyword::By => "BY",
            Keyword::Asc => "ASC",
            Keyword::Desc => "DESC",
            Keyword::Start => "START",
            Keyword::At => "AT",
            Keyword::Create => "CREATE",
            Keyword::Var => "VAR",
            Keyword::Return => "RETURN",
            Keyword::Calculation => "CALCULATION",
            Keyword::Property => "PROPERTY",
            Keyword::Kpi => "KPI",
            Keyword::Member => "MEMBER",
            Keyword::Alter => "ALTER",
            Keyword::Cube => "CUBE",
            Keyword::In => "IN",
            Keyword::Not => "NOT",
        }
    }

    /// Case-insensitive keyword lookup.
    #[must_use]
    pub fn from_ident(ident: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kw| kw.as_str().eq_ignore_ascii_case(ident))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// A whitespace run. Never spans more than one physical line: a run ends after its `\n`.
    Whitespace,
    /// `-- ...` or `// ...` up to (not including) the line break.
    LineComment,
    BlockComment,
    /// `/* ...` without the closing `*/`; extends to end of input.
    UnterminatedBlockComment,
    /// `"..."` with `""` as the escaped quote.
    String,
    UnterminatedString,
    Number,
    Identifier,
    /// An identifier immediately followed by `(`.
    Function,
    /// `'...'` with `''` as the escaped quote (escaped table names, MDX strings).
    QuotedName,
    /// A `'...` that hits a line break or end of input before closing.
    PartialQuotedName,
    /// `[...]` with `]]` as the escaped bracket (column and measure references).
    Bracketed,
    /// A `[...` that hits a line break or end of input before closing.
    PartialBracketed,
    Keyword(Keyword),
    Delimiter(char),
    /// A character that cannot start any token.
    Error,
    Eof,
}

impl TokenKind {
    #[must_use]
    pub fn is_comment(self) -> bool {
        matches!(
            self,
            TokenKind::LineComment | TokenKind::BlockComment | TokenKind::UnterminatedBlockComment
        )
    }

    /// Whitespace or comments.
    #[must_use]
    pub fn is_trivia(self) -> bool {
        self == TokenKind::Whitespace || self.is_comment()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token {
    pub kind: TokenKind,
    /// Absolute byte offset into the scanned source.
    pub start: usize,
    /// Length in bytes.
    pub len: usize,
}

impl Token {
    #[must_use]
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    #[must_use]
    pub fn text<'a>(&self, src: &'a str) -> &'a str {
        src.get(self.start..self.end()).unwrap_or_default()
    }
}

const DELIMITERS: &[char] = &[
    '(', ')', '{', '}', ',', ';', '=', '+', '-', '*', '/', '&', '|', '<', '>', '^', '.', ':',
];

#[derive(Debug, Clone)]
pub struct Scanner<'a> {
    src: &'a str,
    pos: usize,
    done: bool,
}

impl<'a> Scanner<'a> {
    #[must_use]
    pub fn new(src: &'a str) -> Self {
        Self::at(src, 0)
    }

    /// Start scanning at `offset`. Offsets past the end or inside a UTF-8 sequence are moved
    /// forward to the next valid position.
    #[must_use]
    pub fn at(src: &'a str, offset: usize) -> Self {
        let mut pos = offset.min(src.len());
        while !src.is_char_boundary(pos) {
            pos += 1;
        }
        Self {
            src,
            pos,
            done: false,
        }
    }

    /// Byte offset of the next token.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.pos
    }

    fn scan_token(&self) -> (TokenKind, usize) {
        let rest = &self.src[self.pos..];
        let mut chars = rest.chars();
        let Some(first) = chars.next() else {
            return (TokenKind::Eof, 0);
        };
        let second = chars.next();

        match first {
            c if c.is_whitespace() => (TokenKind::Whitespace, whitespace_len(rest)),
            '-' if second == Some('-') => (TokenKind::LineComment, line_len(rest)),
            '/' if second == Some('/') => (TokenKind::LineComment, line_len(rest)),
            '/' if second == Some('*') => match rest[2..].find("*/") {
                Some(idx) => (TokenKind::BlockComment, idx + 4),
                None => (TokenKind::UnterminatedBlockComment, rest.len()),
            },
            '"' => match closing_len(rest, '"', false) {
                Some(len) => (TokenKind::String, len),
                None => (TokenKind::UnterminatedString, rest.len()),
            },
            '\'' => match closing_len(rest, '\'', true) {
                Some(len) => (TokenKind::QuotedName, len),
                None => (TokenKind::PartialQuotedName, partial_len(rest)),
            },
            '[' => match closing_len(rest, ']', true) {
                Some(len) => (TokenKind::Bracketed, len),
                None => (TokenKind::PartialBracketed, partial_len(rest)),
            },
            c if c.is_ascii_digit() => (TokenKind::Number, number_len(rest)),
            '.' if second.is_some_and(|c| c.is_ascii_digit()) => {
                (TokenKind::Number, number_len(rest))
            }
            c if is_ident_start(c) => {
                let len = rest
                    .char_indices()
                    .find(|(_, c)| !is_ident_part(*c))
                    .map_or(rest.len(), |(idx, _)| idx);
                let kind = if rest[len..].starts_with('(') {
                    TokenKind::Function
                } else if let Some(keyword) = Keyword::from_ident(&rest[..len]) {
                    TokenKind::Keyword(keyword)
                } else {
                    TokenKind::Identifier
                };
                (kind, len)
            }
            c if DELIMITERS.contains(&c) => (TokenKind::Delimiter(c), c.len_utf8()),
            c => (TokenKind::Error, c.len_utf8()),
        }
    }
}

impl Iterator for Scanner<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.done {
            return None;
        }
        let (kind, len) = self.scan_token();
        if kind == TokenKind::Eof {
            self.done = true;
        }
        let token = Token {
            kind,
            start: self.pos,
            len,
        };
        self.pos += len;
        Some(token)
    }
}

/// Tokenize all of `src`, including the trailing [`TokenKind::Eof`].
#[must_use]
pub fn tokenize(src: &str) -> Vec<Token> {
    Scanner::new(src).collect()
}

/// Merge adjacent whitespace tokens into logical runs spanning several lines.
#[must_use]
pub fn merge_whitespace(tokens: impl IntoIterator<Item = Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::new();
    for token in tokens {
        match out.last_mut() {
            Some(prev)
                if prev.kind == TokenKind::Whitespace
                    && token.kind == TokenKind::Whitespace
                    && prev.end() == token.start =>
            {
                prev.len += token.len;
            }
            _ => out.push(token),
        }
    }
    out
}

/// 1-based line and column (in characters) of a byte offset.
#[must_use]
pub fn line_col(src: &str, offset: usize) -> (usize, usize) {
    let mut offset = offset.min(src.len());
    while !src.is_char_boundary(offset) {
        offset -= 1;
    }
    let before = &src[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |idx| idx + 1);
    let column = before[line_start..].chars().count() + 1;
    (line, column)
}

/// Whether the last significant token of `text` is a line comment, i.e. appending a terminator on
/// the same line would comment it out.
#[must_use]
pub fn ends_with_line_comment(text: &str) -> bool {
    Scanner::new(text)
        .filter(|t| !matches!(t.kind, TokenKind::Whitespace | TokenKind::Eof))
        .last()
        .is_some_and(|t| t.kind == TokenKind::LineComment)
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn whitespace_len(rest: &str) -> usize {
    let mut len = 0;
    for c in rest.chars() {
        if !c.is_whitespace() {
            break;
        }
        len += c.len_utf8();
        if c == '\n' {
            break;
        }
    }
    len
}

fn line_len(rest: &str) -> usize {
    rest.find(&['\r', '\n'][..]).unwrap_or(rest.len())
}

fn partial_len(rest: &str) -> usize {
    line_len(rest)
}

/// Length of a delimited token (opening char included) whose closing char is escaped by doubling.
fn closing_len(rest: &str, close: char, stop_at_newline: bool) -> Option<usize> {
    let mut chars = rest.char_indices().skip(1).peekable();
    while let Some((idx, c)) = chars.next() {
        if c == close {
            if chars.peek().is_some_and(|(_, next)| *next == close) {
                chars.next();
                continue;
            }
            return Some(idx + c.len_utf8());
        }
        if stop_at_newline && c == '\n' {
            return None;
        }
    }
    None
}

fn number_len(rest: &str) -> usize {
    let bytes = rest.as_bytes();
    let mut i = 0;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
    }
    if i < bytes.len() && matches!(bytes[i], b'e' | b'E') {
        let mut j = i + 1;
        if j < bytes.len() && matches!(bytes[j], b'+' | b'-') {
            j += 1;
        }
        if j < bytes.len() && bytes[j].is_ascii_digit() {
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            i = j;
        }
    }
    i
}

/// Decode a `'...'`, `"..."` or `[...]` token body, collapsing doubled closing characters.
#[must_use]
pub fn unescape_delimited(text: &str) -> String {
    let mut chars = text.chars();
    let close = match chars.next() {
        Some('[') => ']',
        Some(c @ ('\'' | '"')) => c,
        _ => return text.to_string(),
    };
    let body = chars.as_str();
    let body = body.strip_suffix(close).unwrap_or(body);
    let doubled: String = [close, close].iter().collect();
    body.replace(&doubled, &close.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn measure_header_tokens() {
        assert_eq!(
            kinds("CREATE MEASURE 'Sales'[Total Amount]=SUM(Sales[Amount])"),
            vec![
                TokenKind::Keyword(Keyword::Create),
                TokenKind::Whitespace,
                TokenKind::Keyword(Keyword::Measure),
                TokenKind::Whitespace,
                TokenKind::QuotedName,
                TokenKind::Bracketed,
                TokenKind::Delimiter('='),
                TokenKind::Function,
                TokenKind::Delimiter('('),
                TokenKind::Identifier,
                TokenKind::Bracketed,
                TokenKind::Delimiter(')'),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn whitespace_is_split_per_physical_line() {
        let src = "a  \n  \n b";
        let tokens = tokenize(src);
        let ws: Vec<&str> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Whitespace)
            .map(|t| t.text(src))
            .collect();
        assert_eq!(ws, vec!["  \n", "  \n", " "]);

        let merged = merge_whitespace(tokens);
        let ws: Vec<&str> = merged
            .iter()
            .filter(|t| t.kind == TokenKind::Whitespace)
            .map(|t| t.text(src))
            .collect();
        assert_eq!(ws, vec!["  \n  \n "]);
    }

    #[test]
    fn comments_and_strings() {
        let src = "1 -- one\r\n// two\n/* three\n */ \"a\"\"b\"";
        let tokens = tokenize(src);
        let texts: Vec<(TokenKind, &str)> = tokens
            .iter()
            .filter(|t| !matches!(t.kind, TokenKind::Whitespace))
            .map(|t| (t.kind, t.text(src)))
            .collect();
        assert_eq!(
            texts,
            vec![
                (TokenKind::Number, "1"),
                (TokenKind::LineComment, "-- one"),
                (TokenKind::LineComment, "// two"),
                (TokenKind::BlockComment, "/* three\n */"),
                (TokenKind::String, "\"a\"\"b\""),
                (TokenKind::Eof, ""),
            ]
        );
    }

    #[test]
    fn partial_forms_and_errors_do_not_stop_scanning() {
        assert_eq!(
            kinds("[Sales\n'Tab\n\"open"),
            vec![
                TokenKind::PartialBracketed,
                TokenKind::Whitespace,
                TokenKind::PartialQuotedName,
                TokenKind::Whitespace,
                TokenKind::UnterminatedString,
                TokenKind::Eof,
            ]
        );
        assert_eq!(
            kinds("1 ? /* x"),
            vec![
                TokenKind::Number,
                TokenKind::Whitespace,
                TokenKind::Error,
                TokenKind::Whitespace,
                TokenKind::UnterminatedBlockComment,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn bracket_escape_and_unescape() {
        let src = "[a]]b]";
        let tokens = tokenize(src);
        assert_eq!(tokens[0].kind, TokenKind::Bracketed);
        assert_eq!(tokens[0].len, src.len());
        assert_eq!(unescape_delimited(tokens[0].text(src)), "a]b");
        assert_eq!(unescape_delimited("'It''s'"), "It's");
    }

    #[test]
    fn restart_from_offset_matches_full_scan() {
        let src = "CREATE MEASURE t[A]=1.5e3 + 2";
        let full = tokenize(src);
        let restart_at = full[4].start;
        let restarted: Vec<Token> = Scanner::at(src, restart_at).collect();
        assert_eq!(&full[4..], restarted.as_slice());
    }

    #[test]
    fn eof_is_emitted_exactly_once() {
        let mut scanner = Scanner::new("");
        assert_eq!(scanner.next().map(|t| t.kind), Some(TokenKind::Eof));
        assert_eq!(scanner.next(), None);
    }

    #[test]
    fn keywords_are_case_insensitive_and_functions_win() {
        assert_eq!(
            kinds("return Not("),
            vec![
                TokenKind::Keyword(Keyword::Return),
                TokenKind::Whitespace,
                TokenKind::Function,
                TokenKind::Delimiter('('),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn line_col_is_one_based() {
        let src = "ab\ncd";
        assert_eq!(line_col(src, 0), (1, 1));
        assert_eq!(line_col(src, 4), (2, 2));
        assert!(ends_with_line_comment("1 -- c\n  "));
        assert!(!ends_with_line_comment("1 /* c */"));
    }
}
