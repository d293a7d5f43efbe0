use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

use crate::config::{Field, FieldValue};
use crate::management::{AdminState, ManagementError};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub registered: usize,
}

#[derive(Serialize)]
pub struct FieldUpdate {
    pub name: String,
    pub field: &'static str,
    pub value: Value,
    pub changed: bool,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error(status: StatusCode, message: impl ToString) -> Response {
    (status, Json(ErrorBody { error: message.to_string() })).into_response()
}

impl IntoResponse for ManagementError {
    fn into_response(self) -> Response {
        let status = match self {
            ManagementError::NotFound(_) => StatusCode::NOT_FOUND,
            ManagementError::AlreadyRegistered(_) => StatusCode::CONFLICT,
        };
        error(status, self)
    }
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        registered: state.registry.names().len(),
    })
}

pub async fn list_configs(State(state): State<AdminState>) -> Json<Vec<String>> {
    Json(state.registry.names())
}

/// Snapshot of one configuration, keyed by field name.
pub async fn get_config(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Map<String, Value>>, ManagementError> {
    let store = state.registry.get(&name)?;
    let snapshot = Field::ALL
        .iter()
        .map(|field| (field.as_str().to_string(), store.get(*field).to_json()))
        .collect();
    Ok(Json(snapshot))
}

/// Set one field. Observers fire before the response is sent.
pub async fn set_field(
    State(state): State<AdminState>,
    Path((name, field)): Path<(String, String)>,
    Json(value): Json<Value>,
) -> Response {
    let store = match state.registry.get(&name) {
        Ok(store) => store,
        Err(e) => return e.into_response(),
    };
    let field: Field = match field.parse() {
        Ok(field) => field,
        Err(e) => return error(StatusCode::BAD_REQUEST, e),
    };
    let result = FieldValue::from_json(field, &value).and_then(|value| store.set(field, value));
    match result {
        Ok(changed) => {
            tracing::info!(name = %name, field = %field, changed, "Configuration updated via admin API");
            Json(FieldUpdate {
                name,
                field: field.as_str(),
                value: store.get(field).to_json(),
                changed,
            })
            .into_response()
        }
        Err(e) => {
            tracing::warn!(name = %name, field = %field, error = %e, "Rejected configuration update");
            error(StatusCode::BAD_REQUEST, e)
        }
    }
}
