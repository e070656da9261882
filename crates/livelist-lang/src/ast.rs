//! Abstract Syntax Tree types for operation documents.

use std::fmt;

use crate::span::{Span, Spanned};

/// A parsed document: one or more operations.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub operations: Vec<OperationDefinition>,
    pub span: Span,
}

impl Document {
    /// Find an operation by name.
    pub fn operation_named(&self, name: &str) -> Option<&OperationDefinition> {
        self.operations
            .iter()
            .find(|op| op.name.as_ref().is_some_and(|n| n.value == name))
    }
}

/// Kind of operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    Query,
    Mutation,
    Subscription,
}

impl OperationType {
    /// Keyword used in source.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Query => "query",
            OperationType::Mutation => "mutation",
            OperationType::Subscription => "subscription",
        }
    }

    pub(crate) fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "query" => Some(OperationType::Query),
            "mutation" => Some(OperationType::Mutation),
            "subscription" => Some(OperationType::Subscription),
            _ => None,
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single operation definition.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationDefinition {
    /// Operation kind. Anonymous `{ ... }` shorthand is a query.
    pub kind: OperationType,
    /// Optional operation name.
    pub name: Option<Spanned<String>>,
    /// Declared variables.
    pub variables: Vec<VariableDefinition>,
    /// Root selection set.
    pub selection_set: SelectionSet,
    /// The full span of the operation.
    pub span: Span,
}

impl OperationDefinition {
    /// Look up a variable definition by name.
    pub fn variable(&self, name: &str) -> Option<&VariableDefinition> {
        self.variables.iter().find(|v| v.name.value == name)
    }
}

/// A variable definition: `$name: Type = default`.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDefinition {
    pub name: Spanned<String>,
    pub ty: Spanned<TypeRef>,
    pub default_value: Option<Spanned<Value>>,
    pub span: Span,
}

/// A type reference in a variable definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Named(String),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    /// Shorthand for a named type.
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named(name.into())
    }

    /// Wrap in a non-null marker.
    pub fn non_null(self) -> Self {
        TypeRef::NonNull(Box::new(self))
    }

    /// Wrap in a list.
    pub fn list(self) -> Self {
        TypeRef::List(Box::new(self))
    }

    /// Check for a top-level non-null marker.
    pub fn is_non_null(&self) -> bool {
        matches!(self, TypeRef::NonNull(_))
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named(name) => f.write_str(name),
            TypeRef::List(inner) => write!(f, "[{}]", inner),
            TypeRef::NonNull(inner) => write!(f, "{}!", inner),
        }
    }
}

/// A braced list of fields.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionSet {
    pub fields: Vec<Field>,
    pub span: Span,
}

/// A field selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub alias: Option<Spanned<String>>,
    pub name: Spanned<String>,
    pub arguments: Vec<Argument>,
    pub selection_set: Option<SelectionSet>,
    pub span: Span,
}

impl Field {
    /// Key under which the field appears in the response.
    pub fn response_key(&self) -> &str {
        self.alias
            .as_ref()
            .map(|a| a.value.as_str())
            .unwrap_or(&self.name.value)
    }

    /// Look up an argument by name.
    pub fn argument(&self, name: &str) -> Option<&Argument> {
        self.arguments.iter().find(|a| a.name.value == name)
    }
}

/// A field argument: `name: value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: Spanned<String>,
    pub value: Spanned<Value>,
}

/// An input value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Variable(String),
    Int(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Null,
    Enum(String),
    List(Vec<Spanned<Value>>),
    Object(Vec<ObjectField>),
}

impl Value {
    /// Short name of the value kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Variable(_) => "variable",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Boolean(_) => "Boolean",
            Value::Null => "null",
            Value::Enum(_) => "enum",
            Value::List(_) => "list",
            Value::Object(_) => "object",
        }
    }
}

/// A field of an object value.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectField {
    pub name: Spanned<String>,
    pub value: Spanned<Value>,
}
