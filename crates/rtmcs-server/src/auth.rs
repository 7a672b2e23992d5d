//! # JWT Token Management
//!
//! 管理者 1 名のためのログインと Bearer トークン検証。
//!
//! - HS256、claim は `data: "admin"` / `iat` / `exp`（1 時間）
//! - 検証はステートレス（サーバ側にセッションは持たない）

use std::sync::Arc;

use axum::Json;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const TOKEN_TTL_HOURS: i64 = 1;
const ADMIN_CLAIM: &str = "admin";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub data: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("No authorization token was found")]
    MissingToken,
    #[error("jwt expired")]
    Expired,
    #[error("invalid token")]
    Invalid,
    #[error("failed to sign token")]
    Signing,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::Signing => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        };
        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}

/// JWT manager for token generation and validation
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl JwtManager {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(TOKEN_TTL_HOURS),
        }
    }

    pub fn issue(&self) -> Result<String, AuthError> {
        let now = Utc::now();
        self.issue_with(now.timestamp(), (now + self.ttl).timestamp())
    }

    fn issue_with(&self, iat: i64, exp: i64) -> Result<String, AuthError> {
        let claims = Claims {
            data: ADMIN_CLAIM.to_string(),
            iat,
            exp,
        };
        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| {
            warn!("token signing failed: {e}");
            AuthError::Signing
        })
    }

    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid,
            }
        })?;
        if data.claims.data != ADMIN_CLAIM {
            return Err(AuthError::Invalid);
        }
        Ok(data.claims)
    }
}

/// 設定された管理者アカウント
#[derive(Clone)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

impl AdminCredentials {
    pub fn matches(&self, username: &str, password: &str) -> bool {
        self.username == username && self.password == password
    }
}

#[derive(Clone)]
pub struct AuthState {
    pub jwt: JwtManager,
    pub admin: AdminCredentials,
}

/// `Authorization: Bearer <jwt>` を要求するミドルウェア
pub async fn require_bearer(
    State(auth): State<Arc<AuthState>>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(AuthError::MissingToken)?;
    auth.jwt.validate(token.trim())?;
    Ok(next.run(request).await)
}
