use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use eventhire_incidents::IncidentError;
use eventhire_infra::command_dispatcher::DispatchError;
use eventhire_infra::incident_engine::EngineError;

pub fn dispatch_error_to_response(err: DispatchError) -> axum::response::Response {
    match err {
        DispatchError::Concurrency(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DispatchError::Validation(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        DispatchError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        DispatchError::Unauthorized => {
            json_error(StatusCode::FORBIDDEN, "unauthorized", "unauthorized")
        }
        DispatchError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DispatchError::Deserialize(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "deserialize_error", msg)
        }
        DispatchError::Store(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            format!("{e:?}"),
        ),
        DispatchError::Publish(msg) => json_error(StatusCode::BAD_GATEWAY, "publish_error", msg),
    }
}

pub fn engine_error_to_response(err: EngineError) -> axum::response::Response {
    match err {
        EngineError::Incident(inner) => incident_error_to_response(inner),
        EngineError::InsufficientStock { .. } => {
            json_error(StatusCode::CONFLICT, "insufficient_stock", err.to_string())
        }
        EngineError::RentalNotFound
        | EngineError::LineNotFound
        | EngineError::ProductNotFound
        | EngineError::IncidentNotFound => {
            json_error(StatusCode::NOT_FOUND, "not_found", err.to_string())
        }
        EngineError::RentalNotConfirmed => json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "rental_not_confirmed",
            err.to_string(),
        ),
        EngineError::Domain(e) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "domain_error", e.to_string())
        }
        EngineError::Store(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            format!("{e:?}"),
        ),
        EngineError::Deserialize(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "deserialize_error", msg)
        }
        EngineError::Publish(msg) => json_error(StatusCode::BAD_GATEWAY, "publish_error", msg),
    }
}

fn incident_error_to_response(err: IncidentError) -> axum::response::Response {
    let status = match &err {
        IncidentError::Validation(_) => StatusCode::BAD_REQUEST,
        IncidentError::CapacityExceeded { .. }
        | IncidentError::InvalidTransition { .. }
        | IncidentError::Conflict(_) => StatusCode::CONFLICT,
        IncidentError::IllegalOutcome
        | IncidentError::MissingReplacementQuantity
        | IncidentError::ReplacementExceedsAffected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        IncidentError::EntryNotFound => StatusCode::NOT_FOUND,
    };
    let code = match &err {
        IncidentError::CapacityExceeded { .. } => "capacity_exceeded",
        IncidentError::IllegalOutcome => "illegal_outcome",
        IncidentError::InvalidTransition { .. } => "invalid_transition",
        _ => "incident_error",
    };
    json_error(status, code, err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
