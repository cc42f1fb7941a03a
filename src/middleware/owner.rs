use axum::{extract::Request, middleware::Next, response::Response};

use crate::error::AppError;
use crate::models::CurrentOwner;

/// Header carrying the caller's identity
pub const OWNER_HEADER: &str = "user-id";

/// Owner middleware
/// Extracts the caller identity from the `user-id` header
pub async fn owner_middleware(mut request: Request, next: Next) -> Result<Response, AppError> {
    let owner_id = request
        .headers()
        .get(OWNER_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing user-id header".to_string()))?
        .to_string();

    request
        .extensions_mut()
        .insert(CurrentOwner { id: owner_id });

    Ok(next.run(request).await)
}
