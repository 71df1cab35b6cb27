//! Auth-related types shared between the gateway and the store
//!
//! Password-grant sign-in request/response shapes.

use serde::{Deserialize, Serialize};

// =============================================================================
// Auth API DTOs
// =============================================================================

/// Password sign-in request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

/// Authenticated user as returned by the auth endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Sign-in response data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix timestamp (seconds)
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl AuthSession {
    pub fn user_id(&self) -> &str {
        &self.user.id
    }

    /// Whether the access token is past its expiry
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(exp) => chrono::Utc::now().timestamp() >= exp,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_deserialize_and_expiry() {
        let json = r#"{
            "access_token": "tok",
            "refresh_token": "ref",
            "expires_at": 1,
            "token_type": "bearer",
            "user": { "id": "u-1", "email": "chef@example.com", "aud": "authenticated" }
        }"#;

        let session: AuthSession = serde_json::from_str(json).unwrap();
        assert_eq!(session.user_id(), "u-1");
        assert!(session.is_expired());

        let fresh = AuthSession {
            expires_at: None,
            ..session
        };
        assert!(!fresh.is_expired());
    }
}
