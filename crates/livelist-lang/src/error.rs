//! Parse error type.

use crate::span::{Location, Span};
use thiserror::Error;

/// Error during lexing or parsing.
#[derive(Debug, Clone, PartialEq, Error)]
pub struct ParseError {
    /// The error message.
    pub message: String,
    /// Source span where the error occurred.
    pub span: Span,
    /// Optional hint for fixing the error.
    pub hint: Option<String>,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl ParseError {
    /// Create a new parse error.
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            hint: None,
        }
    }

    /// Add a hint to the error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Where the error starts in `source`.
    pub fn location(&self, source: &str) -> Location {
        self.span.location(source)
    }

    /// Format the error with source context.
    pub fn format_with_source(&self, source: &str) -> String {
        let location = self.location(source);
        let (line, col) = (location.line, location.column);
        let mut result = format!("error: {}\n", self.message);
        result.push_str(&format!("  --> line {}\n", location));

        if let Some(source_line) = source.lines().nth(line - 1) {
            result.push_str(&format!("   |\n{:3}| {}\n   |", line, source_line));

            for _ in 0..col {
                result.push(' ');
            }
            result.push('^');

            let line_len = source_line.chars().count();
            let span_len = self.span.len();
            if span_len > 1 {
                let room = (line_len + 1).saturating_sub(col);
                for _ in 1..span_len.min(room) {
                    result.push('~');
                }
            }
            result.push('\n');
        }

        if let Some(hint) = &self.hint {
            result.push_str(&format!("   = hint: {}\n", hint));
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_formatting() {
        let source = "subscription { todos { id text done } ";
        let err = ParseError::new("expected '}', found end of input", Span::new(38, 38))
            .with_hint("close the selection set");

        let formatted = err.format_with_source(source);
        assert!(formatted.contains("line 1:39"));
        assert!(formatted.contains("expected '}'"));
        assert!(formatted.contains("hint: close the selection set"));
    }

    #[test]
    fn test_underline_spans_token() {
        let source = "query { getTodos }\nfragment F on Todo { id }";
        let err = ParseError::new("fragments are not supported", Span::new(19, 27));
        let formatted = err.format_with_source(source);
        assert!(formatted.contains("line 2:1"));
        assert!(formatted.contains("^~~~~~~"));
    }
}
