use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
    Json,
};
use tracing::{debug, warn};
use crate::models::ErrorResponse;
use crate::services::auth_service::get_auth_token;
use crate::state::AppState;

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {

    // 1. Get the auth token from the request
    let token = get_auth_token(req.headers(), None).map_err(|e| {
        debug!("No credential on API request: {}", e);
        ErrorResponse::reply(StatusCode::UNAUTHORIZED, "Missing credential")
    })?;

    // 2. Resolve the identity
    let identity = state.verifier.verify(&token).await.map_err(|e| {
        warn!("API credential rejected: {}", e);
        ErrorResponse::reply(StatusCode::UNAUTHORIZED, "Invalid credential")
    })?;

    // 3. Hand the identity to downstream handlers
    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}
