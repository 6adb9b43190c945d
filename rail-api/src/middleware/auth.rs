use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use jsonwebtoken::{decode, DecodingKey, Validation};
use rail_core::{Principal, Role};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub exp: usize,
}

impl From<Claims> for Principal {
    fn from(claims: Claims) -> Self {
        Principal {
            user_id: claims.sub,
            role: claims.role,
        }
    }
}

pub fn decode_principal(token: &str, secret: &str) -> Result<Principal, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::Authentication(format!("Invalid token: {}", e)))?;

    Ok(token_data.claims.into())
}

/// Resolves the bearer token into a `Principal` for the handlers behind it.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or_else(|| AppError::Authentication("Missing bearer token".to_string()))?;

    let principal = decode_principal(bearer.token(), &state.auth.secret)?;
    tracing::debug!(user_id = %principal.user_id, role = ?principal.role, "Authenticated");

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}
