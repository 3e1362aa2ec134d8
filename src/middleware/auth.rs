use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};

const STAFF_ROLES: [&str; 2] = ["employee", "admin"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub role: Option<String>,
}

/// The authenticated caller, placed in request extensions by [`require_bearer_auth`].
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: Uuid,
    pub role: Option<String>,
}

impl Actor {
    pub fn is_staff(&self) -> bool {
        self.role
            .as_deref()
            .map_or(false, |r| STAFF_ROLES.iter().any(|s| s.eq_ignore_ascii_case(r)))
    }
}

/// HS256 keys derived from the shared JWT secret.
#[derive(Clone)]
pub struct AuthKeys {
    decoding: Arc<DecodingKey>,
    encoding: Arc<EncodingKey>,
}

impl AuthKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
            encoding: Arc::new(EncodingKey::from_secret(secret.as_bytes())),
        }
    }

    pub fn issue(&self, actor_id: Uuid, role: Option<&str>, ttl: Duration) -> Result<String> {
        let claims = Claims {
            sub: actor_id.to_string(),
            exp: (Utc::now() + ttl).timestamp().max(0) as usize,
            role: role.map(str::to_string),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| Error::Internal(format!("Failed to sign token: {}", e)))
    }

    fn verify(&self, token: &str) -> Option<Actor> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        let data = decode::<Claims>(token, &self.decoding, &validation).ok()?;
        let id = Uuid::parse_str(&data.claims.sub).ok()?;
        Some(Actor {
            id,
            role: data.claims.role,
        })
    }
}

fn reject(status: StatusCode, code: &str) -> Response {
    (status, Json(json!({ "error": code }))).into_response()
}

pub async fn require_bearer_auth(
    State(keys): State<AuthKeys>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(auth_header) = req.headers().get(axum::http::header::AUTHORIZATION) else {
        return reject(StatusCode::UNAUTHORIZED, "missing_authorization");
    };
    let Ok(auth_str) = auth_header.to_str() else {
        return reject(StatusCode::UNAUTHORIZED, "bad_authorization");
    };
    let Some(token) = auth_str.strip_prefix("Bearer ") else {
        return reject(StatusCode::UNAUTHORIZED, "unsupported_scheme");
    };

    match keys.verify(token) {
        Some(actor) => {
            req.extensions_mut().insert(actor);
            next.run(req).await
        }
        None => reject(StatusCode::UNAUTHORIZED, "invalid_token"),
    }
}

/// Must run after [`require_bearer_auth`].
pub async fn require_staff(req: Request, next: Next) -> Response {
    match req.extensions().get::<Actor>() {
        Some(actor) if actor.is_staff() => next.run(req).await,
        Some(_) => reject(StatusCode::FORBIDDEN, "forbidden"),
        None => reject(StatusCode::UNAUTHORIZED, "missing_authorization"),
    }
}
