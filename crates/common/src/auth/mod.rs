//! Authentication context utilities
//!
//! Identity verification is delegated to an external provider; this module
//! only extracts the caller identity the gateway needs:
//! - Optional bearer API key (kept as a sha256 fingerprint, never logged raw)
//! - Optional user ID header (scopes agent namespaces)
//! - Request ID for tracing

use crate::errors::{AppError, Result};
use axum::{extract::FromRequestParts, http::request::Parts};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Extracted authentication context available to handlers
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// User ID from the upstream identity provider, if present
    pub user_id: Option<String>,

    /// sha256 fingerprint of the presented API key, if any
    pub api_key_fingerprint: Option<String>,

    /// Request ID for tracing
    pub request_id: String,
}

impl AuthContext {
    /// Whether the caller presented any identity
    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_none() && self.api_key_fingerprint.is_none()
    }
}

/// Hash an API key for storage or logging
pub fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Extract API key from Authorization header
pub fn extract_api_key(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ")
}

/// Axum extractor for AuthContext
///
/// Anonymous requests are allowed; only a malformed Authorization header is
/// rejected. Key validation itself happens upstream.
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        // Extract request ID
        let request_id = parts
            .headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        // Extract user ID
        let user_id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .map(String::from);

        // Extract API key fingerprint
        let api_key_fingerprint = match parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
        {
            Some(header) => {
                let key = extract_api_key(header).ok_or(AppError::InvalidApiKey)?;
                Some(hash_api_key(key))
            }
            None => None,
        };

        Ok(AuthContext {
            user_id,
            api_key_fingerprint,
            request_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_api_key_is_deterministic() {
        let key = "ak_test_12345";
        assert_eq!(hash_api_key(key), hash_api_key(key));
        assert_ne!(hash_api_key(key), hash_api_key("other"));
        // sha256 hex digest
        assert_eq!(hash_api_key(key).len(), 64);
    }

    #[test]
    fn test_extract_api_key() {
        assert_eq!(extract_api_key("Bearer ak_123"), Some("ak_123"));
        assert_eq!(extract_api_key("ak_123"), None);
        assert_eq!(extract_api_key("Basic abc"), None);
    }
}
