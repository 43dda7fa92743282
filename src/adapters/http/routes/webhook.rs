//! Inbound payment-provider webhooks.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Router,
};

use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
};

const SIGNATURE_HEADER: &str = "x-webhook-signature";

pub fn router() -> Router<AppState> {
    Router::new().route("/invoice", post(handle_invoice_webhook))
}

/// POST /webhooks/invoice
///
/// The body is taken as raw bytes so the signature covers exactly what the
/// provider signed. Duplicate deliveries and unknown order ids are success
/// responses; only signature and body problems are client errors.
async fn handle_invoice_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::InvalidInput("Missing webhook signature".into()))?;

    state.reconciliation.handle_webhook(signature, &body).await?;
    Ok(StatusCode::OK)
}
