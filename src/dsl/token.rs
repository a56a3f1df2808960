/// The kind of a lexical token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// An unrecognised byte; the parser reports it as an error.
    Illegal,
    Eof,
    Ident,
    Str,
    Number,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Assign,
    Comma,
    When,
    DependsOn,
    Include,
    IncludePlatform,
    Variable,
    Template,
}

/// A lexical token with its starting source position (1-based).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// The token text. String literals have the surrounding quotes stripped.
    pub literal: String,
    pub line: usize,
    pub column: usize,
}

impl Token {
    #[must_use]
    pub const fn new(kind: TokenKind, literal: String, line: usize, column: usize) -> Self {
        Self {
            kind,
            literal,
            line,
            column,
        }
    }

    #[must_use]
    pub const fn eof(line: usize, column: usize) -> Self {
        Self {
            kind: TokenKind::Eof,
            literal: String::new(),
            line,
            column,
        }
    }
}

/// Re-tag an identifier as a keyword when its lowercased text matches one of
/// the reserved words.
#[must_use]
pub fn keyword_kind(ident: &str) -> TokenKind {
    match ident.to_lowercase().as_str() {
        "when" => TokenKind::When,
        "depends_on" => TokenKind::DependsOn,
        "include" => TokenKind::Include,
        "include_platform" => TokenKind::IncludePlatform,
        "variable" => TokenKind::Variable,
        "template" => TokenKind::Template,
        _ => TokenKind::Ident,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_match_case_insensitively() {
        assert_eq!(keyword_kind("when"), TokenKind::When);
        assert_eq!(keyword_kind("WHEN"), TokenKind::When);
        assert_eq!(keyword_kind("Depends_On"), TokenKind::DependsOn);
        assert_eq!(keyword_kind("include"), TokenKind::Include);
        assert_eq!(keyword_kind("include_platform"), TokenKind::IncludePlatform);
        assert_eq!(keyword_kind("variable"), TokenKind::Variable);
        assert_eq!(keyword_kind("template"), TokenKind::Template);
    }

    #[test]
    fn plain_identifiers_stay_idents() {
        assert_eq!(keyword_kind("file"), TokenKind::Ident);
        assert_eq!(keyword_kind("whenever"), TokenKind::Ident);
    }
}
