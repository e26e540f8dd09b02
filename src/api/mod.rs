/// API routes and handlers
pub mod health;
pub mod middleware;
pub mod offers;
pub mod pros;
pub mod references;

use crate::{
    context::AppContext,
    error::{MarketError, MarketResult},
};
use axum::{extract::rejection::JsonRejection, Json, Router};
use validator::Validate;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(health::routes())
        .merge(references::routes())
        .merge(offers::routes())
        .merge(pros::routes())
}

/// Unwrap a JSON body and run its field validators.
///
/// Both malformed JSON and failed validation surface as `InvalidInput`.
pub(crate) fn validated<T: Validate>(payload: Result<Json<T>, JsonRejection>) -> MarketResult<T> {
    let Json(body) = payload.map_err(|e| MarketError::InvalidInput(e.body_text()))?;
    body.validate()
        .map_err(|e| MarketError::InvalidInput(e.to_string()))?;
    Ok(body)
}
