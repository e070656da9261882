//! Todo schema: operation validation and resolution.
//!
//! ```text
//! type Todo { id: ID!, text: String!, done: Boolean! }
//! type Query { getTodos: [Todo] }
//! type Mutation { addTodo(text: String!): Todo
//!                 setDone(id: ID!, done: Boolean!): Todo }
//! type Subscription { todos: [Todo]! }
//! ```
//!
//! [`Schema::prepare`] turns a request into a [`PreparedOperation`] with
//! every argument already resolved against the request variables. Anything
//! the schema cannot execute is rejected there, before a stream is opened or
//! a mutation applied.

use std::collections::HashSet;
use std::sync::Arc;

use livelist_core::{Snapshot, SubscriptionStream, Todo, TodoList};
use livelist_lang::{
    parse, Field, Location, OperationDefinition, OperationType, Span, Spanned, TypeRef, Value,
};
use livelist_proto::{error_codes, ExecutionResult, GraphQLError, SubscribePayload};
use serde_json::{Map, Number, Value as Json};

/// Scalar types accepted in variable definitions.
const INPUT_SCALARS: &[&str] = &["ID", "String", "Boolean", "Int", "Float"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TodoField {
    Id,
    Text,
    Done,
    Typename,
}

impl TodoField {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "id" => Some(TodoField::Id),
            "text" => Some(TodoField::Text),
            "done" => Some(TodoField::Done),
            "__typename" => Some(TodoField::Typename),
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            TodoField::Id => "ID!",
            TodoField::Text => "String!",
            TodoField::Done => "Boolean!",
            TodoField::Typename => "String!",
        }
    }
}

/// Argument types used by the mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArgType {
    Id,
    String,
    Boolean,
}

impl ArgType {
    fn type_name(&self) -> &'static str {
        match self {
            ArgType::Id => "ID!",
            ArgType::String => "String!",
            ArgType::Boolean => "Boolean!",
        }
    }

    fn accepts(&self, value: &Json) -> bool {
        matches!(
            (self, value),
            (ArgType::Id, Json::String(_))
                | (ArgType::String, Json::String(_))
                | (ArgType::Boolean, Json::Bool(_))
        )
    }
}

#[derive(Debug, Clone)]
enum Resolver {
    Typename(&'static str),
    GetTodos,
    AddTodo { text: String },
    SetDone { id: String, done: bool },
    Todos,
}

#[derive(Debug, Clone)]
struct RootField {
    key: String,
    resolver: Resolver,
    selection: Vec<(String, TodoField)>,
    location: Location,
}

impl RootField {
    fn error(&self, message: impl Into<String>, code: &str) -> GraphQLError {
        GraphQLError::new(message)
            .with_location(self.location.line, self.location.column)
            .with_path(vec![self.key.as_str().into()])
            .with_code(code)
    }
}

/// A validated operation, ready to execute or subscribe.
#[derive(Debug, Clone)]
pub struct PreparedOperation {
    kind: OperationType,
    name: Option<String>,
    fields: Vec<RootField>,
}

impl PreparedOperation {
    /// Operation type.
    pub fn kind(&self) -> OperationType {
        self.kind
    }

    /// Operation name, if the document named it.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Check whether this is a subscription.
    pub fn is_subscription(&self) -> bool {
        self.kind == OperationType::Subscription
    }

    /// Response keys of the root fields, in selection order.
    pub fn response_keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.key.as_str())
    }
}

/// Executable schema backed by a [`TodoList`].
#[derive(Debug, Clone)]
pub struct Schema {
    todos: Arc<TodoList>,
}

impl Schema {
    /// Create a schema over `todos`.
    pub fn new(todos: Arc<TodoList>) -> Self {
        Self { todos }
    }

    /// The backing todo list.
    pub fn todos(&self) -> &Arc<TodoList> {
        &self.todos
    }

    /// Parse and validate a request.
    pub fn prepare(
        &self,
        request: &SubscribePayload,
    ) -> Result<PreparedOperation, Vec<GraphQLError>> {
        let source = request.query.as_str();
        let document = parse(source).map_err(|err| {
            let location = err.location(source);
            vec![GraphQLError::new(format!("Syntax Error: {}", err.message))
                .with_location(location.line, location.column)
                .with_code(error_codes::GRAPHQL_PARSE_FAILED)]
        })?;

        let operation = match request.operation_name.as_deref() {
            Some(name) => document.operation_named(name).ok_or_else(|| {
                vec![validation_error(format!("Unknown operation named \"{}\".", name))]
            })?,
            None if document.operations.len() == 1 => &document.operations[0],
            None => {
                return Err(vec![validation_error(
                    "Must provide operation name if query contains multiple operations.",
                )])
            }
        };

        let mut validator = Validator::new(source, operation);
        validator.coerce_variables(request.variables.as_ref());
        if !validator.errors.is_empty() {
            return Err(validator.errors);
        }

        let fields = validator.root_fields();
        if !validator.errors.is_empty() {
            return Err(validator.errors);
        }

        Ok(PreparedOperation {
            kind: operation.kind,
            name: operation.name.as_ref().map(|n| n.value.clone()),
            fields,
        })
    }

    /// Execute a query or mutation once.
    ///
    /// Root fields run in selection order, so mutations apply serially. A
    /// failing field resolves to `null` and adds an error with its path.
    pub fn execute(&self, operation: &PreparedOperation) -> ExecutionResult {
        let mut data = Map::new();
        let mut errors = Vec::new();

        for field in &operation.fields {
            let value = match &field.resolver {
                Resolver::Typename(name) => Json::String((*name).to_string()),
                Resolver::GetTodos | Resolver::Todos => {
                    project_list(&self.todos.todos(), &field.selection)
                }
                Resolver::AddTodo { text } => {
                    project(&self.todos.add_todo(text.clone()), &field.selection)
                }
                Resolver::SetDone { id, done } => match self.todos.set_done(id, *done) {
                    Ok(todo) => project(&todo, &field.selection),
                    Err(err) => {
                        tracing::debug!(id = %id, error = %err, "setDone failed");
                        errors.push(field.error(err.to_string(), core_error_code(&err)));
                        Json::Null
                    }
                },
            };
            data.insert(field.key.clone(), value);
        }

        ExecutionResult {
            data: Some(Json::Object(data)),
            errors: (!errors.is_empty()).then_some(errors),
        }
    }

    /// Open the live stream backing a subscription operation.
    pub fn subscribe(
        &self,
        operation: &PreparedOperation,
    ) -> Result<SubscriptionStream<Snapshot>, GraphQLError> {
        if !operation.is_subscription() {
            return Err(GraphQLError::new(format!(
                "Cannot subscribe to a {} operation.",
                operation.kind
            ))
            .with_code(error_codes::GRAPHQL_VALIDATION_FAILED));
        }
        self.todos.subscribe().map_err(|err| {
            GraphQLError::new(err.to_string()).with_code(core_error_code(&err))
        })
    }

    /// Render one stream value for a subscription operation.
    pub fn resolve_event(
        &self,
        operation: &PreparedOperation,
        snapshot: &Snapshot,
    ) -> ExecutionResult {
        let mut data = Map::new();
        for field in &operation.fields {
            let value = match field.resolver {
                Resolver::Typename(name) => Json::String(name.to_string()),
                _ => project_list(snapshot, &field.selection),
            };
            data.insert(field.key.clone(), value);
        }
        ExecutionResult::data(Json::Object(data))
    }
}

fn core_error_code(err: &livelist_core::Error) -> &'static str {
    match err {
        livelist_core::Error::NotFound(_) => error_codes::NOT_FOUND,
        livelist_core::Error::Execution(_) => error_codes::INTERNAL_SERVER_ERROR,
    }
}

fn validation_error(message: impl Into<String>) -> GraphQLError {
    GraphQLError::new(message).with_code(error_codes::GRAPHQL_VALIDATION_FAILED)
}

fn project(todo: &Todo, selection: &[(String, TodoField)]) -> Json {
    let mut object = Map::new();
    for (key, field) in selection {
        let value = match field {
            TodoField::Id => Json::String(todo.id.clone()),
            TodoField::Text => Json::String(todo.text.clone()),
            TodoField::Done => Json::Bool(todo.done),
            TodoField::Typename => Json::String("Todo".to_string()),
        };
        object.insert(key.clone(), value);
    }
    Json::Object(object)
}

fn project_list(todos: &[Todo], selection: &[(String, TodoField)]) -> Json {
    Json::Array(todos.iter().map(|t| project(t, selection)).collect())
}

/// Convert a constant literal to JSON.
fn literal_to_json(value: &Value) -> Json {
    match value {
        Value::Variable(_) | Value::Null => Json::Null,
        Value::Int(i) => Json::Number((*i).into()),
        Value::Float(f) => Number::from_f64(*f).map(Json::Number).unwrap_or(Json::Null),
        Value::String(s) | Value::Enum(s) => Json::String(s.clone()),
        Value::Boolean(b) => Json::Bool(*b),
        Value::List(items) => Json::Array(items.iter().map(|i| literal_to_json(&i.value)).collect()),
        Value::Object(fields) => Json::Object(
            fields
                .iter()
                .map(|f| (f.name.value.clone(), literal_to_json(&f.value.value)))
                .collect(),
        ),
    }
}

fn base_type_name(ty: &TypeRef) -> &str {
    match ty {
        TypeRef::Named(name) => name,
        TypeRef::List(inner) | TypeRef::NonNull(inner) => base_type_name(inner),
    }
}

/// Coerce a JSON input value to a variable type.
fn coerce_input(value: &Json, ty: &TypeRef) -> Result<Json, String> {
    match ty {
        TypeRef::NonNull(inner) => {
            if value.is_null() {
                Err(format!("Expected non-nullable type \"{}\" not to be null.", ty))
            } else {
                coerce_input(value, inner)
            }
        }
        _ if value.is_null() => Ok(Json::Null),
        TypeRef::List(inner) => match value {
            Json::Array(items) => items
                .iter()
                .map(|item| coerce_input(item, inner))
                .collect::<Result<Vec<_>, _>>()
                .map(Json::Array),
            other => coerce_input(other, inner).map(|v| Json::Array(vec![v])),
        },
        TypeRef::Named(name) => coerce_scalar(value, name),
    }
}

fn coerce_scalar(value: &Json, name: &str) -> Result<Json, String> {
    match (name, value) {
        ("String", Json::String(_)) | ("ID", Json::String(_)) | ("Boolean", Json::Bool(_)) => {
            Ok(value.clone())
        }
        ("ID", Json::Number(n)) if n.is_i64() || n.is_u64() => Ok(Json::String(n.to_string())),
        ("Int", Json::Number(n)) if n.as_i64().is_some_and(|i| i32::try_from(i).is_ok()) => {
            Ok(value.clone())
        }
        ("Float", Json::Number(_)) => Ok(value.clone()),
        _ => Err(format!("{} cannot represent value: {}", name, value)),
    }
}

struct Validator<'a> {
    source: &'a str,
    operation: &'a OperationDefinition,
    variables: Map<String, Json>,
    errors: Vec<GraphQLError>,
}

impl<'a> Validator<'a> {
    fn new(source: &'a str, operation: &'a OperationDefinition) -> Self {
        Self {
            source,
            operation,
            variables: Map::new(),
            errors: Vec::new(),
        }
    }

    fn error(&mut self, message: impl Into<String>, span: Span, code: &str) {
        let location = span.location(self.source);
        self.errors.push(
            GraphQLError::new(message)
                .with_location(location.line, location.column)
                .with_code(code),
        );
    }

    fn invalid(&mut self, message: impl Into<String>, span: Span) {
        self.error(message, span, error_codes::GRAPHQL_VALIDATION_FAILED);
    }

    fn coerce_variables(&mut self, provided: Option<&Map<String, Json>>) {
        let operation = self.operation;
        let mut seen = HashSet::new();

        for def in &operation.variables {
            let name = def.name.value.as_str();
            if !seen.insert(name) {
                self.invalid(
                    format!("There can be only one variable named \"${}\".", name),
                    def.name.span,
                );
                continue;
            }

            let base = base_type_name(&def.ty.value);
            if !INPUT_SCALARS.contains(&base) {
                self.invalid(format!("Unknown type \"{}\".", base), def.ty.span);
                continue;
            }

            let value = match provided.and_then(|vars| vars.get(name)) {
                Some(value) => Some(value.clone()),
                None => def.default_value.as_ref().map(|d| literal_to_json(&d.value)),
            };

            match value {
                None if def.ty.value.is_non_null() => self.error(
                    format!(
                        "Variable \"${}\" of required type \"{}\" was not provided.",
                        name, def.ty.value
                    ),
                    def.span,
                    error_codes::BAD_USER_INPUT,
                ),
                None => {}
                Some(value) => match coerce_input(&value, &def.ty.value) {
                    Ok(coerced) => {
                        self.variables.insert(name.to_string(), coerced);
                    }
                    Err(reason) => self.error(
                        format!("Variable \"${}\" got invalid value {}; {}", name, value, reason),
                        def.span,
                        error_codes::BAD_USER_INPUT,
                    ),
                },
            }
        }
    }

    fn root_fields(&mut self) -> Vec<RootField> {
        let operation = self.operation;
        let selection = &operation.selection_set;

        if operation.kind == OperationType::Subscription && selection.fields.len() > 1 {
            let subject = match &operation.name {
                Some(name) => format!("Subscription \"{}\"", name.value),
                None => "Anonymous Subscription".to_string(),
            };
            self.invalid(
                format!("{} must select only one top level field.", subject),
                selection.fields[1].span,
            );
        }

        let mut fields: Vec<RootField> = Vec::new();
        for field in &selection.fields {
            let key = field.response_key();
            if fields.iter().any(|f| f.key == key) {
                self.invalid(
                    format!(
                        "Field \"{}\" is selected more than once. Use aliases to select it again.",
                        key
                    ),
                    field.span,
                );
                continue;
            }
            if let Some(root) = self.root_field(field) {
                fields.push(root);
            }
        }
        fields
    }

    fn root_field(&mut self, field: &Field) -> Option<RootField> {
        let kind = self.operation.kind;
        let parent = match kind {
            OperationType::Query => "Query",
            OperationType::Mutation => "Mutation",
            OperationType::Subscription => "Subscription",
        };
        let name = field.name.value.as_str();
        let errors_before = self.errors.len();

        let (resolver, return_type) = match (kind, name) {
            (OperationType::Subscription, "__typename") => {
                self.invalid(
                    "Subscription root field \"__typename\" is not allowed.",
                    field.name.span,
                );
                return None;
            }
            (_, "__typename") => {
                self.check_arguments(field, parent, &[]);
                if field.selection_set.is_some() {
                    self.invalid(
                        "Field \"__typename\" must not have a selection since type \"String!\" has no subfields.",
                        field.name.span,
                    );
                }
                (Resolver::Typename(parent), None)
            }
            (OperationType::Query, "getTodos") => {
                self.check_arguments(field, parent, &[]);
                (Resolver::GetTodos, Some("[Todo]"))
            }
            (OperationType::Subscription, "todos") => {
                self.check_arguments(field, parent, &[]);
                (Resolver::Todos, Some("[Todo]!"))
            }
            (OperationType::Mutation, "addTodo") => {
                let args = self.check_arguments(field, parent, &[("text", ArgType::String)]);
                let text = args.and_then(|mut a| a.pop()).and_then(json_string);
                (Resolver::AddTodo { text: text.unwrap_or_default() }, Some("Todo"))
            }
            (OperationType::Mutation, "setDone") => {
                let args = self.check_arguments(
                    field,
                    parent,
                    &[("id", ArgType::Id), ("done", ArgType::Boolean)],
                );
                let (id, done) = match args.as_deref() {
                    Some([id, Json::Bool(done)]) => (id.as_str().unwrap_or_default().to_string(), *done),
                    _ => (String::new(), false),
                };
                (Resolver::SetDone { id, done }, Some("Todo"))
            }
            _ => {
                self.invalid(
                    format!("Cannot query field \"{}\" on type \"{}\".", name, parent),
                    field.name.span,
                );
                return None;
            }
        };

        let selection = match return_type {
            Some(ty) => self.todo_selection(field, ty),
            None => Vec::new(),
        };

        if self.errors.len() > errors_before {
            return None;
        }

        Some(RootField {
            key: field.response_key().to_string(),
            resolver,
            selection,
            location: field.span.location(self.source),
        })
    }

    /// Check arguments against `expected` and resolve their values in order.
    ///
    /// Returns `None` when any argument is unknown, missing or mistyped.
    fn check_arguments(
        &mut self,
        field: &Field,
        parent: &str,
        expected: &[(&str, ArgType)],
    ) -> Option<Vec<Json>> {
        let field_name = field.name.value.as_str();
        let mut ok = true;
        let mut seen = HashSet::new();

        for arg in &field.arguments {
            let arg_name = arg.name.value.as_str();
            if !expected.iter().any(|(n, _)| *n == arg_name) {
                self.invalid(
                    format!(
                        "Unknown argument \"{}\" on field \"{}.{}\".",
                        arg_name, parent, field_name
                    ),
                    arg.name.span,
                );
                ok = false;
            } else if !seen.insert(arg_name) {
                self.invalid(
                    format!("There can be only one argument named \"{}\".", arg_name),
                    arg.name.span,
                );
                ok = false;
            }
        }

        let mut values = Vec::with_capacity(expected.len());
        for (arg_name, ty) in expected {
            match field.argument(arg_name) {
                None => {
                    self.invalid(
                        format!(
                            "Field \"{}\" argument \"{}\" of type \"{}\" is required, but it was not provided.",
                            field_name,
                            arg_name,
                            ty.type_name()
                        ),
                        field.name.span,
                    );
                    ok = false;
                }
                Some(arg) => match self.argument_value(arg_name, &arg.value, *ty) {
                    Ok(value) => values.push(value),
                    Err(message) => {
                        self.invalid(message, arg.value.span);
                        ok = false;
                    }
                },
            }
        }

        ok.then_some(values)
    }

    fn argument_value(
        &self,
        arg_name: &str,
        value: &Spanned<Value>,
        ty: ArgType,
    ) -> Result<Json, String> {
        match &value.value {
            Value::Variable(var) => {
                let def = self
                    .operation
                    .variable(var)
                    .ok_or_else(|| format!("Variable \"${}\" is not defined.", var))?;
                let resolved = self.variables.get(var).cloned().unwrap_or(Json::Null);
                if resolved.is_null() {
                    return Err(format!(
                        "Argument \"{}\" of non-null type \"{}\" must not be null.",
                        arg_name,
                        ty.type_name()
                    ));
                }
                if !ty.accepts(&resolved) {
                    return Err(format!(
                        "Variable \"${}\" of type \"{}\" used in position expecting type \"{}\".",
                        var,
                        def.ty.value,
                        ty.type_name()
                    ));
                }
                Ok(resolved)
            }
            Value::Null => Err(format!(
                "Expected value of non-null type \"{}\" not to be null.",
                ty.type_name()
            )),
            Value::String(s) if matches!(ty, ArgType::String | ArgType::Id) => {
                Ok(Json::String(s.clone()))
            }
            Value::Int(i) if ty == ArgType::Id => Ok(Json::String(i.to_string())),
            Value::Boolean(b) if ty == ArgType::Boolean => Ok(Json::Bool(*b)),
            other => Err(format!(
                "Expected value of type \"{}\", found {}.",
                ty.type_name(),
                other.kind()
            )),
        }
    }

    fn todo_selection(&mut self, field: &Field, return_type: &str) -> Vec<(String, TodoField)> {
        let name = field.name.value.as_str();
        let Some(set) = &field.selection_set else {
            self.invalid(
                format!(
                    "Field \"{}\" of type \"{}\" must have a selection of subfields. Did you mean \"{} {{ ... }}\"?",
                    name, return_type, name
                ),
                field.name.span,
            );
            return Vec::new();
        };

        let mut selection: Vec<(String, TodoField)> = Vec::new();
        for sub in &set.fields {
            let sub_name = sub.name.value.as_str();
            let Some(todo_field) = TodoField::from_name(sub_name) else {
                self.invalid(
                    format!("Cannot query field \"{}\" on type \"Todo\".", sub_name),
                    sub.name.span,
                );
                continue;
            };
            for arg in &sub.arguments {
                self.invalid(
                    format!(
                        "Unknown argument \"{}\" on field \"Todo.{}\".",
                        arg.name.value, sub_name
                    ),
                    arg.name.span,
                );
            }
            if sub.selection_set.is_some() {
                self.invalid(
                    format!(
                        "Field \"{}\" must not have a selection since type \"{}\" has no subfields.",
                        sub_name,
                        todo_field.type_name()
                    ),
                    sub.name.span,
                );
            }

            let key = sub.response_key();
            match selection.iter().find(|(k, _)| k == key) {
                Some((_, existing)) if *existing == todo_field => {}
                Some(_) => self.invalid(
                    format!(
                        "Fields \"{}\" conflict because they select different fields. Use different aliases on the fields to fetch both.",
                        key
                    ),
                    sub.span,
                ),
                None => selection.push((key.to_string(), todo_field)),
            }
        }
        selection
    }
}

fn json_string(value: Json) -> Option<String> {
    match value {
        Json::String(s) => Some(s),
        _ => None,
    }
}
