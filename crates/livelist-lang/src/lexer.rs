//! Lexer for operation documents using logos.
//!
//! Whitespace, commas and `#` comments are insignificant and skipped.
//! Keywords (`query`, `true`, `null`, ...) are lexed as names; the parser
//! decides their meaning from position.

use crate::error::ParseError;
use crate::span::Span;
use logos::Logos;

/// Token types for operation documents.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n,\u{FEFF}]+")]
#[logos(skip r"#[^\r\n]*")]
pub enum Token {
    // Punctuators
    #[token("!")]
    Bang,
    #[token("$")]
    Dollar,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(":")]
    Colon,
    #[token("=")]
    Equals,
    #[token("...")]
    Ellipsis,
    #[token("@")]
    At,

    #[regex(r"[_A-Za-z][_0-9A-Za-z]*", |lex| lex.slice().to_string())]
    Name(String),

    #[regex(r"-?(0|[1-9][0-9]*)", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    #[regex(
        r"-?(0|[1-9][0-9]*)(\.[0-9]+([eE][+-]?[0-9]+)?|[eE][+-]?[0-9]+)",
        |lex| lex.slice().parse::<f64>().ok()
    )]
    Float(f64),

    #[regex(r#""([^"\\\r\n]|\\.)*""#, |lex| {
        let s = lex.slice();
        unescape_string(&s[1..s.len() - 1])
    })]
    String(String),
}

impl Token {
    /// Short human readable description, used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Bang => "'!'".to_string(),
            Token::Dollar => "'$'".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::LBrace => "'{'".to_string(),
            Token::RBrace => "'}'".to_string(),
            Token::LBracket => "'['".to_string(),
            Token::RBracket => "']'".to_string(),
            Token::Colon => "':'".to_string(),
            Token::Equals => "'='".to_string(),
            Token::Ellipsis => "'...'".to_string(),
            Token::At => "'@'".to_string(),
            Token::Name(name) => format!("name '{}'", name),
            Token::Int(i) => format!("integer {}", i),
            Token::Float(f) => format!("float {}", f),
            Token::String(s) => format!("string \"{}\"", s),
        }
    }
}

/// Unescape a string literal body. Returns `None` for invalid escapes.
fn unescape_string(s: &str) -> Option<String> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next()? {
            'n' => result.push('\n'),
            'r' => result.push('\r'),
            't' => result.push('\t'),
            'b' => result.push('\u{0008}'),
            'f' => result.push('\u{000C}'),
            '\\' => result.push('\\'),
            '/' => result.push('/'),
            '"' => result.push('"'),
            'u' => {
                let hex: String = chars.by_ref().take(4).collect();
                if hex.len() != 4 {
                    return None;
                }
                let code = u32::from_str_radix(&hex, 16).ok()?;
                result.push(char::from_u32(code)?);
            }
            _ => return None,
        }
    }

    Some(result)
}

/// A token with its span in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

/// Lexer that produces spanned tokens.
pub struct Lexer<'source> {
    inner: logos::Lexer<'source, Token>,
}

impl<'source> Lexer<'source> {
    /// Create a new lexer for the given source.
    pub fn new(source: &'source str) -> Self {
        Self {
            inner: Token::lexer(source),
        }
    }

    /// Get the source string.
    pub fn source(&self) -> &'source str {
        self.inner.source()
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<SpannedToken, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        let token = self.inner.next()?;
        let span: Span = self.inner.span().into();
        Some(match token {
            Ok(token) => Ok(SpannedToken { token, span }),
            Err(()) => Err(invalid_token(self.inner.slice(), span)),
        })
    }
}

fn invalid_token(slice: &str, span: Span) -> ParseError {
    if slice.starts_with('"') {
        ParseError::new("invalid string literal", span)
            .with_hint("strings must close on the same line and use valid escapes")
    } else if slice.starts_with(|c: char| c == '-' || c.is_ascii_digit()) {
        ParseError::new(format!("invalid number '{}'", slice), span)
    } else {
        ParseError::new(format!("unexpected character '{}'", slice), span)
    }
}

/// Tokenize a source string, stopping at the first invalid token.
pub fn tokenize(source: &str) -> Result<Vec<SpannedToken>, ParseError> {
    Lexer::new(source).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    #[test]
    fn test_subscription_document() {
        let toks = tokens("subscription TodosSub { todos { id text done } }");
        assert_eq!(toks.len(), 10);
        assert_eq!(toks[0], Token::Name("subscription".to_string()));
        assert_eq!(toks[1], Token::Name("TodosSub".to_string()));
        assert_eq!(toks[2], Token::LBrace);
        assert_eq!(toks[9], Token::RBrace);
    }

    #[test]
    fn test_commas_and_comments_skipped() {
        let toks = tokens("{ a, b # trailing comment\n c }");
        assert_eq!(
            toks,
            vec![
                Token::LBrace,
                Token::Name("a".to_string()),
                Token::Name("b".to_string()),
                Token::Name("c".to_string()),
                Token::RBrace,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        let toks = tokens("123 -456 3.5 -2.5e3 1E2");
        assert_eq!(toks[0], Token::Int(123));
        assert_eq!(toks[1], Token::Int(-456));
        assert_eq!(toks[2], Token::Float(3.5));
        assert_eq!(toks[3], Token::Float(-2500.0));
        assert_eq!(toks[4], Token::Float(100.0));
    }

    #[test]
    fn test_string_escapes() {
        let toks = tokens(r#""hello\nworld" "quote\"d" "A""#);
        assert_eq!(toks[0], Token::String("hello\nworld".to_string()));
        assert_eq!(toks[1], Token::String("quote\"d".to_string()));
        assert_eq!(toks[2], Token::String("A".to_string()));
    }

    #[test]
    fn test_variable_definition_tokens() {
        let toks = tokens("($id: ID!, $done: Boolean = false)");
        assert_eq!(toks[0], Token::LParen);
        assert_eq!(toks[1], Token::Dollar);
        assert_eq!(toks[2], Token::Name("id".to_string()));
        assert_eq!(toks[3], Token::Colon);
        assert_eq!(toks[5], Token::Bang);
        assert!(toks.contains(&Token::Equals));
        assert_eq!(toks.last(), Some(&Token::RParen));
    }

    #[test]
    fn test_spread_and_directive_tokens() {
        let toks = tokens("...F @include");
        assert_eq!(toks[0], Token::Ellipsis);
        assert_eq!(toks[2], Token::At);
    }

    #[test]
    fn test_invalid_character() {
        let err = tokenize("{ todos ; }").unwrap_err();
        assert!(err.message.contains("unexpected character"));
        assert_eq!(err.span, Span::new(8, 9));
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("{ addTodo(text: \"abc) }").unwrap_err();
        assert!(err.message.contains("string"));
    }

    #[test]
    fn test_spans() {
        let toks = tokenize("{ getTodos }").unwrap();
        assert_eq!(toks[1].span, Span::new(2, 10));
    }
}
