//! livelist operation language
//!
//! This crate parses the executable subset of GraphQL that livelist clients
//! send: queries, mutations and subscriptions with variables, aliases,
//! arguments and nested selection sets. Fragments and directives are
//! rejected.
//!
//! # Syntax
//!
//! ```text
//! subscription TodosSub { todos { id text done } }
//! { getTodos { id text } }
//! mutation Add($text: String!) { addTodo(text: $text) { id } }
//! mutation { setDone(id: "1", done: true) { id done } }
//! ```
//!
//! # Usage
//!
//! ```rust
//! use livelist_lang::{parse, OperationType};
//!
//! let doc = parse("subscription { todos { id text done } }").unwrap();
//! assert_eq!(doc.operations[0].kind, OperationType::Subscription);
//! ```

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod span;

pub use ast::{
    Argument, Document, Field, ObjectField, OperationDefinition, OperationType, SelectionSet,
    TypeRef, Value, VariableDefinition,
};
pub use error::ParseError;
pub use span::{Location, Span, Spanned};

/// Parse a source string into a document.
///
/// # Example
///
/// ```rust
/// use livelist_lang::parse;
///
/// let doc = parse("{ getTodos { id } }").unwrap();
/// assert_eq!(doc.operations.len(), 1);
/// ```
pub fn parse(source: &str) -> Result<Document, ParseError> {
    parser::parse(source)
}

/// Tokenize a source string (for debugging/testing).
///
/// # Example
///
/// ```rust
/// use livelist_lang::tokenize;
///
/// let tokens = tokenize("{ todos { id } }").unwrap();
/// assert_eq!(tokens.len(), 6);
/// ```
pub fn tokenize(source: &str) -> Result<Vec<lexer::SpannedToken>, ParseError> {
    lexer::tokenize(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_subscription() {
        let doc = parse("subscription TodosSub {\n  todos {\n    id\n    text\n    done\n  }\n}")
            .unwrap();
        let op = &doc.operations[0];
        assert_eq!(op.kind, OperationType::Subscription);
        assert_eq!(op.selection_set.fields.len(), 1);
        assert_eq!(
            op.selection_set.fields[0]
                .selection_set
                .as_ref()
                .map(|s| s.fields.len()),
            Some(3)
        );
    }

    #[test]
    fn test_error_with_source_context() {
        let source = "subscription {\n  todos { ...TodoFields }\n}";
        let err = parse(source).unwrap_err();
        assert_eq!(err.location(source), Location { line: 2, column: 11 });

        let formatted = err.format_with_source(source);
        assert!(formatted.contains("line 2:11"));
        assert!(formatted.contains("error"));
    }

    #[test]
    fn test_lex_error_surfaces_as_parse_error() {
        let err = parse("{ todos % }").unwrap_err();
        assert!(err.message.contains("unexpected character '%'"));
    }
}
