// SPDX-License-Identifier: MIT

//! A language-agnostic lexer for source lines.
//!
//! It only needs to be good enough to tell keywords, identifiers, literals and
//! punctuation apart for the token tier of the similarity scorer.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Keyword,
    Identifier,
    Number,
    String,
    Punct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
}
impl<'a> Token<'a> {
    /// The token with literal values erased.
    pub fn normalized(&self) -> &'a str {
        match self.kind {
            TokenKind::Number => "<num>",
            TokenKind::String => "<str>",
            _ => self.text,
        }
    }
}

lazy_static! {
    static ref TOKEN: Regex = Regex::new(
        r#"(?x)
        (?P<str>"(?:[^"\\]|\\.)*"?|'(?:[^'\\]|\\.)*'?|`[^`]*`?)
        |(?P<num>\d[A-Za-z0-9_.]*)
        |(?P<word>[A-Za-z_$][A-Za-z0-9_$]*)
        |(?P<punct>==|!=|<=|>=|&&|\|\||->|=>|::|\+\+|--|[^\sA-Za-z0-9_$])
        "#
    )
    .unwrap();

    static ref KEYWORDS: HashSet<&'static str> = [
        "abstract", "and", "as", "async", "await", "bool", "break", "case", "catch", "char",
        "class", "const", "continue", "def", "default", "del", "do", "elif", "else", "enum",
        "except", "export", "extends", "extern", "false", "final", "finally", "fn", "for",
        "from", "func", "function", "go", "if", "impl", "implements", "import", "in", "int",
        "interface", "is", "lambda", "let", "loop", "match", "mod", "module", "mut", "new",
        "nil", "None", "not", "null", "or", "package", "pass", "private", "protected", "pub",
        "public", "raise", "return", "self", "static", "struct", "super", "switch", "this",
        "throw", "trait", "True", "False", "true", "try", "type", "typeof", "undefined",
        "unsafe", "use", "using", "var", "void", "where", "while", "with", "yield",
    ]
    .into_iter()
    .collect();
}

pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(word)
}

pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    TOKEN
        .captures_iter(text)
        .filter_map(|caps| {
            let (kind, m) = if let Some(m) = caps.name("str") {
                (TokenKind::String, m)
            } else if let Some(m) = caps.name("num") {
                (TokenKind::Number, m)
            } else if let Some(m) = caps.name("word") {
                let kind = if is_keyword(m.as_str()) {
                    TokenKind::Keyword
                } else {
                    TokenKind::Identifier
                };
                (kind, m)
            } else {
                (TokenKind::Punct, caps.name("punct")?)
            };
            Some(Token {
                kind,
                text: m.as_str(),
            })
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_tokenize() {
        let tokens = tokenize(r#"if (count >= 10) return "a \"b\"";"#);
        let kinds: Vec<(TokenKind, &str)> = tokens.iter().map(|t| (t.kind, t.text)).collect();
        assert_eq!(
            kinds,
            vec![
                (TokenKind::Keyword, "if"),
                (TokenKind::Punct, "("),
                (TokenKind::Identifier, "count"),
                (TokenKind::Punct, ">="),
                (TokenKind::Number, "10"),
                (TokenKind::Punct, ")"),
                (TokenKind::Keyword, "return"),
                (TokenKind::String, r#""a \"b\"""#),
                (TokenKind::Punct, ";"),
            ]
        );
    }

    #[test]
    fn test_normalized_erases_literals() {
        let a: Vec<&str> = tokenize("x = 42 + 'a'").iter().map(Token::normalized).collect();
        let b: Vec<&str> = tokenize("x = 7 + 'zz'").iter().map(Token::normalized).collect();
        assert_eq!(a, b);
        assert_eq!(a, vec!["x", "=", "<num>", "+", "<str>"]);
    }

    #[test]
    fn test_unterminated_string() {
        let tokens = tokenize("print(\"oops");
        assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::String));
    }
}
