//! GraphQL endpoint: queries and mutations over HTTP POST.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use livelist_proto::{error_codes, ExecutionResult, GraphQLError, SubscribePayload};

use super::ws;
use crate::error::AppError;
use crate::AppState;

/// Create GraphQL routes on `path`.
///
/// `POST` executes queries and mutations; `GET` upgrades to a
/// graphql-transport-ws session.
pub fn routes(path: &str) -> Router<AppState> {
    Router::new().route(path, get(ws::upgrade).post(execute))
}

/// Execute a query or mutation.
///
/// Requests that fail validation, and subscription operations, are answered
/// with `400` and an errors-only result.
async fn execute(
    State(state): State<AppState>,
    request: Result<Json<SubscribePayload>, JsonRejection>,
) -> Result<(StatusCode, Json<ExecutionResult>), AppError> {
    let Json(request) = request?;

    let operation = match state.schema.prepare(&request) {
        Ok(operation) => operation,
        Err(errors) => {
            tracing::debug!(errors = errors.len(), "request rejected");
            return Ok((StatusCode::BAD_REQUEST, Json(ExecutionResult::errors(errors))));
        }
    };

    if operation.is_subscription() {
        let error = GraphQLError::new("Subscriptions are only supported over WebSocket.")
            .with_code(error_codes::GRAPHQL_VALIDATION_FAILED);
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(ExecutionResult::errors(vec![error])),
        ));
    }

    tracing::debug!(kind = %operation.kind(), name = ?operation.name(), "executing operation");
    Ok((StatusCode::OK, Json(state.schema.execute(&operation))))
}
