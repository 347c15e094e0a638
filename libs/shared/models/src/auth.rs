use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

/// Caller identity resolved by the auth middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    /// Account type ("patient", "doctor", "receptionist").
    ///
    /// Supabase issues `role = "authenticated"` for every signed-in user, so the
    /// account type lives in `user_metadata.user_type` when present.
    pub fn user_type(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("user_type"))
            .and_then(|v| v.as_str())
            .or(self.role.as_deref())
    }

    pub fn is_doctor(&self) -> bool {
        self.user_type() == Some("doctor")
    }
}
