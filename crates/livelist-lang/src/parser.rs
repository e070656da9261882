//! Recursive descent parser for operation documents.

use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::{tokenize, SpannedToken, Token};
use crate::span::{Span, Spanned};

/// Deepest nesting of selection sets, list and object values, and list types.
pub const MAX_DEPTH: usize = 64;

/// Parser over a tokenized document.
pub struct Parser<'source> {
    tokens: Vec<SpannedToken>,
    pos: usize,
    depth: usize,
    source: &'source str,
}

impl<'source> Parser<'source> {
    /// Tokenize `source` and create a parser for it.
    pub fn new(source: &'source str) -> Result<Self, ParseError> {
        Ok(Self {
            tokens: tokenize(source)?,
            pos: 0,
            depth: 0,
            source,
        })
    }

    /// Parse a complete document.
    pub fn parse_document(&mut self) -> Result<Document, ParseError> {
        let mut operations = Vec::new();

        while self.peek().is_some() {
            operations.push(self.parse_definition()?);
        }

        let Some(first) = operations.first() else {
            return Err(ParseError::new("document contains no operations", self.eof_span())
                .with_hint("send e.g. `subscription { todos { id text done } }`"));
        };
        let span = operations
            .iter()
            .fold(first.span, |span, op| span.merge(op.span));

        Ok(Document { operations, span })
    }

    fn parse_definition(&mut self) -> Result<OperationDefinition, ParseError> {
        let Some(tok) = self.peek() else {
            return Err(self.unexpected_eof("operation"));
        };

        match &tok.token {
            Token::LBrace => {
                let selection_set = self.parse_selection_set()?;
                Ok(OperationDefinition {
                    kind: OperationType::Query,
                    name: None,
                    variables: Vec::new(),
                    span: selection_set.span,
                    selection_set,
                })
            }
            Token::Name(name) if name == "fragment" => Err(ParseError::new(
                "fragments are not supported",
                tok.span,
            )
            .with_hint("inline the fields into the selection set")),
            Token::Name(name) => match OperationType::from_keyword(name) {
                Some(kind) => self.parse_operation(kind),
                None => Err(ParseError::new(
                    format!("expected operation definition, found {}", tok.token.describe()),
                    tok.span,
                )
                .with_hint("operations start with 'query', 'mutation', 'subscription' or '{'")),
            },
            other => Err(ParseError::new(
                format!("expected operation definition, found {}", other.describe()),
                tok.span,
            )),
        }
    }

    fn parse_operation(&mut self, kind: OperationType) -> Result<OperationDefinition, ParseError> {
        let keyword = self.next_token()?;

        let name = match self.peek().map(|t| &t.token) {
            Some(Token::Name(_)) => Some(self.expect_name()?),
            _ => None,
        };

        let variables = if self.check(&Token::LParen) {
            self.parse_variable_definitions()?
        } else {
            Vec::new()
        };

        self.reject_directives()?;
        let selection_set = self.parse_selection_set()?;

        Ok(OperationDefinition {
            kind,
            name,
            variables,
            span: keyword.span.merge(selection_set.span),
            selection_set,
        })
    }

    fn parse_variable_definitions(&mut self) -> Result<Vec<VariableDefinition>, ParseError> {
        let open = self.expect_token(Token::LParen)?;
        let mut variables = Vec::new();

        while !self.check(&Token::RParen) {
            variables.push(self.parse_variable_definition()?);
        }
        let close = self.expect_token(Token::RParen)?;

        if variables.is_empty() {
            return Err(ParseError::new(
                "expected at least one variable definition",
                open.span.merge(close.span),
            ));
        }

        Ok(variables)
    }

    fn parse_variable_definition(&mut self) -> Result<VariableDefinition, ParseError> {
        let dollar = self.expect_token(Token::Dollar)?;
        let name = self.expect_name()?;
        self.expect_token(Token::Colon)?;
        let ty = self.parse_type()?;

        let default_value = if self.check(&Token::Equals) {
            self.next_token()?;
            Some(self.parse_value(true)?)
        } else {
            None
        };

        let end = default_value.as_ref().map(|v| v.span).unwrap_or(ty.span);
        self.reject_directives()?;

        Ok(VariableDefinition {
            span: dollar.span.merge(end),
            name,
            ty,
            default_value,
        })
    }

    fn parse_type(&mut self) -> Result<Spanned<TypeRef>, ParseError> {
        let tok = self.next_token()?;
        let (base, mut span) = match tok.token {
            Token::LBracket => {
                self.descend(tok.span)?;
                let inner = self.parse_type()?;
                let close = self.expect_token(Token::RBracket)?;
                self.ascend();
                (inner.value.list(), tok.span.merge(close.span))
            }
            Token::Name(name) => (TypeRef::Named(name), tok.span),
            other => {
                return Err(ParseError::new(
                    format!("expected type, found {}", other.describe()),
                    tok.span,
                ))
            }
        };

        let ty = if self.check(&Token::Bang) {
            span = span.merge(self.next_token()?.span);
            base.non_null()
        } else {
            base
        };

        Ok(Spanned::new(ty, span))
    }

    fn parse_selection_set(&mut self) -> Result<SelectionSet, ParseError> {
        let open = self.expect_token(Token::LBrace)?;
        self.descend(open.span)?;
        let mut fields = Vec::new();

        while !self.check(&Token::RBrace) {
            match self.peek() {
                None => return Err(self.unexpected_eof("'}'")),
                Some(tok) if tok.token == Token::Ellipsis => {
                    return Err(ParseError::new(
                        "fragment spreads and inline fragments are not supported",
                        tok.span,
                    ));
                }
                Some(_) => fields.push(self.parse_field()?),
            }
        }
        let close = self.expect_token(Token::RBrace)?;
        self.ascend();
        let span = open.span.merge(close.span);

        if fields.is_empty() {
            return Err(ParseError::new("selection set cannot be empty", span));
        }

        Ok(SelectionSet { fields, span })
    }

    fn parse_field(&mut self) -> Result<Field, ParseError> {
        let first = self.expect_name()?;

        let (alias, name) = if self.check(&Token::Colon) {
            self.next_token()?;
            (Some(first), self.expect_name()?)
        } else {
            (None, first)
        };

        let mut end = name.span;
        let arguments = if self.check(&Token::LParen) {
            let (arguments, span) = self.parse_arguments()?;
            end = span;
            arguments
        } else {
            Vec::new()
        };

        self.reject_directives()?;

        let selection_set = if self.check(&Token::LBrace) {
            let set = self.parse_selection_set()?;
            end = set.span;
            Some(set)
        } else {
            None
        };

        let start = alias.as_ref().map(|a| a.span).unwrap_or(name.span);
        Ok(Field {
            alias,
            name,
            arguments,
            selection_set,
            span: start.merge(end),
        })
    }

    fn parse_arguments(&mut self) -> Result<(Vec<Argument>, Span), ParseError> {
        let open = self.expect_token(Token::LParen)?;
        let mut arguments: Vec<Argument> = Vec::new();

        while !self.check(&Token::RParen) {
            let name = self.expect_name()?;
            if arguments.iter().any(|a| a.name.value == name.value) {
                return Err(ParseError::new(
                    format!("duplicate argument '{}'", name.value),
                    name.span,
                ));
            }
            self.expect_token(Token::Colon)?;
            let value = self.parse_value(false)?;
            arguments.push(Argument { name, value });
        }
        let close = self.expect_token(Token::RParen)?;
        let span = open.span.merge(close.span);

        if arguments.is_empty() {
            return Err(ParseError::new("expected at least one argument", span));
        }

        Ok((arguments, span))
    }

    /// Parse an input value. Variables are rejected in const position.
    fn parse_value(&mut self, is_const: bool) -> Result<Spanned<Value>, ParseError> {
        let tok = self.next_token()?;
        let value = match tok.token {
            Token::Dollar => {
                let name = self.expect_name()?;
                let span = tok.span.merge(name.span);
                if is_const {
                    return Err(ParseError::new(
                        "variables are not allowed in default values",
                        span,
                    ));
                }
                return Ok(Spanned::new(Value::Variable(name.value), span));
            }
            Token::Int(i) => Value::Int(i),
            Token::Float(f) => Value::Float(f),
            Token::String(s) => Value::String(s),
            Token::Name(name) => match name.as_str() {
                "true" => Value::Boolean(true),
                "false" => Value::Boolean(false),
                "null" => Value::Null,
                _ => Value::Enum(name),
            },
            Token::LBracket => {
                self.descend(tok.span)?;
                let mut items = Vec::new();
                while !self.check(&Token::RBracket) {
                    items.push(self.parse_value(is_const)?);
                }
                let close = self.expect_token(Token::RBracket)?;
                self.ascend();
                return Ok(Spanned::new(Value::List(items), tok.span.merge(close.span)));
            }
            Token::LBrace => {
                self.descend(tok.span)?;
                let mut fields: Vec<ObjectField> = Vec::new();
                while !self.check(&Token::RBrace) {
                    let name = self.expect_name()?;
                    self.expect_token(Token::Colon)?;
                    let value = self.parse_value(is_const)?;
                    fields.push(ObjectField { name, value });
                }
                let close = self.expect_token(Token::RBrace)?;
                self.ascend();
                return Ok(Spanned::new(Value::Object(fields), tok.span.merge(close.span)));
            }
            other => {
                return Err(ParseError::new(
                    format!("expected value, found {}", other.describe()),
                    tok.span,
                ))
            }
        };

        Ok(Spanned::new(value, tok.span))
    }

    fn descend(&mut self, span: Span) -> Result<(), ParseError> {
        if self.depth >= MAX_DEPTH {
            return Err(ParseError::new(
                format!("maximum nesting depth of {} exceeded", MAX_DEPTH),
                span,
            )
            .with_hint("flatten the nested selections, lists or input objects"));
        }
        self.depth += 1;
        Ok(())
    }

    fn ascend(&mut self) {
        self.depth -= 1;
    }

    fn reject_directives(&self) -> Result<(), ParseError> {
        match self.peek() {
            Some(tok) if tok.token == Token::At => {
                Err(ParseError::new("directives are not supported", tok.span))
            }
            _ => Ok(()),
        }
    }

    /// Expect and consume a name.
    fn expect_name(&mut self) -> Result<Spanned<String>, ParseError> {
        let tok = self.next_token()?;
        match tok.token {
            Token::Name(name) => Ok(Spanned::new(name, tok.span)),
            other => Err(ParseError::new(
                format!("expected name, found {}", other.describe()),
                tok.span,
            )),
        }
    }

    /// Expect and consume a specific token.
    fn expect_token(&mut self, expected: Token) -> Result<SpannedToken, ParseError> {
        let Some(tok) = self.peek() else {
            return Err(self.unexpected_eof(&expected.describe()));
        };
        if std::mem::discriminant(&tok.token) == std::mem::discriminant(&expected) {
            self.next_token()
        } else {
            Err(ParseError::new(
                format!("expected {}, found {}", expected.describe(), tok.token.describe()),
                tok.span,
            ))
        }
    }

    fn check(&self, token: &Token) -> bool {
        self.peek().is_some_and(|t| &t.token == token)
    }

    fn peek(&self) -> Option<&SpannedToken> {
        self.tokens.get(self.pos)
    }

    /// Get the next token or error if EOF.
    fn next_token(&mut self) -> Result<SpannedToken, ParseError> {
        let tok = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| self.unexpected_eof("token"))?;
        self.pos += 1;
        Ok(tok)
    }

    fn eof_span(&self) -> Span {
        Span::new(self.source.len(), self.source.len())
    }

    fn unexpected_eof(&self, expected: &str) -> ParseError {
        ParseError::new(
            format!("unexpected end of input, expected {}", expected),
            self.eof_span(),
        )
    }
}

/// Parse a source string into a document.
pub fn parse(source: &str) -> Result<Document, ParseError> {
    let mut parser = Parser::new(source)?;
    parser.parse_document()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse_one(source: &str) -> OperationDefinition {
        let mut doc = parse(source).unwrap();
        assert_eq!(doc.operations.len(), 1);
        doc.operations.remove(0)
    }

    #[test]
    fn test_parse_subscription() {
        let op = parse_one("subscription TodosSub { todos { id text done } }");
        assert_eq!(op.kind, OperationType::Subscription);
        assert_eq!(op.name.as_ref().map(|n| n.value.as_str()), Some("TodosSub"));

        let todos = &op.selection_set.fields[0];
        assert_eq!(todos.name.value, "todos");
        let names: Vec<&str> = todos
            .selection_set
            .as_ref()
            .unwrap()
            .fields
            .iter()
            .map(|f| f.name.value.as_str())
            .collect();
        assert_eq!(names, vec!["id", "text", "done"]);
    }

    #[test]
    fn test_parse_anonymous_query() {
        let op = parse_one("{ getTodos { id } }");
        assert_eq!(op.kind, OperationType::Query);
        assert!(op.name.is_none());
        assert_eq!(op.span, Span::new(0, 19));
    }

    #[test]
    fn test_parse_mutation_with_variables() {
        let op = parse_one(
            "mutation SetDone($id: ID!, $done: Boolean = true) { setDone(id: $id, done: $done) { id done } }",
        );
        assert_eq!(op.kind, OperationType::Mutation);
        assert_eq!(op.variables.len(), 2);
        assert_eq!(op.variables[0].name.value, "id");
        assert_eq!(op.variables[0].ty.value, TypeRef::named("ID").non_null());
        assert_eq!(
            op.variables[1].default_value.as_ref().map(|v| &v.value),
            Some(&Value::Boolean(true))
        );

        let field = &op.selection_set.fields[0];
        assert_eq!(
            field.argument("id").map(|a| &a.value.value),
            Some(&Value::Variable("id".to_string()))
        );
    }

    #[test]
    fn test_parse_alias_and_literals() {
        let op = parse_one(r#"mutation { added: addTodo(text: "buy milk") { id } }"#);
        let field = &op.selection_set.fields[0];
        assert_eq!(field.response_key(), "added");
        assert_eq!(field.name.value, "addTodo");
        assert_eq!(
            field.arguments[0].value.value,
            Value::String("buy milk".to_string())
        );
    }

    #[test]
    fn test_parse_complex_values() {
        let op = parse_one(r#"{ f(a: [1, 2.5, null], b: { x: RED, y: false }) }"#);
        let field = &op.selection_set.fields[0];

        match &field.arguments[0].value.value {
            Value::List(items) => {
                let values: Vec<&Value> = items.iter().map(|i| &i.value).collect();
                assert_eq!(values, vec![&Value::Int(1), &Value::Float(2.5), &Value::Null]);
            }
            other => panic!("expected list, got {:?}", other),
        }
        match &field.arguments[1].value.value {
            Value::Object(fields) => {
                assert_eq!(fields[0].name.value, "x");
                assert_eq!(fields[0].value.value, Value::Enum("RED".to_string()));
                assert_eq!(fields[1].value.value, Value::Boolean(false));
            }
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_list_type() {
        let op = parse_one("query Q($ids: [ID!]!) { getTodos { id } }");
        assert_eq!(
            op.variables[0].ty.value,
            TypeRef::named("ID").non_null().list().non_null()
        );
        assert_eq!(op.variables[0].ty.value.to_string(), "[ID!]!");
    }

    #[test]
    fn test_parse_multiple_operations() {
        let doc = parse("query A { getTodos { id } } subscription B { todos { id } }").unwrap();
        assert_eq!(doc.operations.len(), 2);
        assert_eq!(
            doc.operation_named("B").map(|op| op.kind),
            Some(OperationType::Subscription)
        );
        assert!(doc.operation_named("C").is_none());
    }

    #[test]
    fn test_reject_fragments() {
        let err = parse("fragment F on Todo { id }").unwrap_err();
        assert!(err.message.contains("fragments are not supported"));

        let err = parse("{ todos { ...F } }").unwrap_err();
        assert!(err.message.contains("fragment spreads"));
    }

    #[test]
    fn test_reject_directives() {
        let err = parse("{ todos @skip(if: true) { id } }").unwrap_err();
        assert_eq!(err.message, "directives are not supported");
        assert_eq!(err.span, Span::new(8, 9));
    }

    #[test]
    fn test_reject_variable_in_default() {
        let err = parse("query ($a: Int = $b) { getTodos { id } }").unwrap_err();
        assert!(err.message.contains("not allowed in default values"));
    }

    #[test]
    fn test_empty_document() {
        let err = parse("   # nothing here\n").unwrap_err();
        assert_eq!(err.message, "document contains no operations");
    }

    #[test]
    fn test_empty_selection_set() {
        let err = parse("{ }").unwrap_err();
        assert_eq!(err.message, "selection set cannot be empty");
    }

    #[test]
    fn test_unclosed_selection_set() {
        let err = parse("subscription { todos { id }").unwrap_err();
        assert_eq!(err.message, "unexpected end of input, expected '}'");
        assert_eq!(err.span, Span::new(27, 27));
    }

    #[test]
    fn test_duplicate_argument() {
        let err = parse(r#"mutation { addTodo(text: "a", text: "b") { id } }"#).unwrap_err();
        assert_eq!(err.message, "duplicate argument 'text'");
    }

    #[test]
    fn test_nesting_depth_limit() {
        let source = format!("{{ getTodos(x: {}) {{ id }} }}", "[".repeat(100_000));
        let err = parse(&source).unwrap_err();
        assert_eq!(err.message, "maximum nesting depth of 64 exceeded");
        assert!(err.hint.is_some());
        // the outer selection set takes one level
        assert_eq!(err.span, Span::new(14 + MAX_DEPTH - 1, 14 + MAX_DEPTH));

        let objects = format!("{{ f(a: {}1{}) }}", "{ x: ".repeat(100_000), "}".repeat(100_000));
        assert!(parse(&objects).unwrap_err().message.contains("nesting depth"));

        let selections = format!("{}{}", "{ a ".repeat(MAX_DEPTH + 1), "}".repeat(MAX_DEPTH + 1));
        assert!(parse(&selections).unwrap_err().message.contains("nesting depth"));

        let types = format!("query ($v: {}Int{}) {{ f }}", "[".repeat(500), "]".repeat(500));
        assert!(parse(&types).unwrap_err().message.contains("nesting depth"));
    }

    #[test]
    fn test_nesting_within_limit() {
        let depth = MAX_DEPTH - 1;
        let source = format!("{{ f(a: {}1{}) }}", "[".repeat(depth), "]".repeat(depth));
        let op = parse_one(&source);

        let mut value = &op.selection_set.fields[0].arguments[0].value.value;
        let mut levels = 0;
        while let Value::List(items) = value {
            levels += 1;
            value = &items[0].value;
        }
        assert_eq!(levels, depth);
        assert_eq!(value, &Value::Int(1));
    }

    #[test]
    fn test_unknown_keyword() {
        let err = parse("select todos from list").unwrap_err();
        assert!(err.message.contains("expected operation definition"));
        assert!(err.hint.is_some());
    }
}
