//! Credentials, bearer sessions and password resets.
//!
//! Tokens are opaque random strings looked up in the store; nothing is
//! encoded in them.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::user::User;

pub const RESET_TOKEN_TTL_MINUTES: i64 = 60;

fn hex(bytes: &[u8]) -> String { bytes.iter().map(|b| format!("{b:02x}")).collect() }

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex(&hasher.finalize())
}

/// `salt$sha256(salt || password)`
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt = hex(&salt);
    let hash = digest(&salt, password);
    format!("{salt}${hash}")
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt, expected)) = stored.split_once('$') else { return false };
    let actual = digest(salt, password);
    // constant-time: must not short-circuit on the first differing byte, so no `==`
    actual.len() == expected.len() && actual.bytes().zip(expected.bytes()).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}

pub fn new_token() -> String { Uuid::new_v4().simple().to_string() }

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session { pub token: String, pub user_id: Uuid, pub expires_at: DateTime<Utc> }

impl Session {
    pub fn issue(user_id: Uuid, ttl_hours: i64) -> Self {
        Self { token: new_token(), user_id, expires_at: Utc::now() + Duration::hours(ttl_hours) }
    }
    pub fn is_expired(&self) -> bool { self.expires_at <= Utc::now() }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PasswordReset { pub token: String, pub user_id: Uuid, pub expires_at: DateTime<Utc> }

impl PasswordReset {
    pub fn issue(user_id: Uuid) -> Self {
        Self { token: new_token(), user_id, expires_at: Utc::now() + Duration::minutes(RESET_TOKEN_TTL_MINUTES) }
    }
    pub fn is_expired(&self) -> bool { self.expires_at <= Utc::now() }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 100, message = "Full name is required"))]
    pub full_name: String,
    #[validate(email(message = "Email is invalid"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[serde(default)]
    pub phone_number: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest { pub email: String, pub password: String }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload { pub token: String, pub user: User }

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgotPasswordRequest { pub email: String }

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    pub current_password: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub new_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_roundtrip_and_salting() {
        let a = hash_password("secret1");
        let b = hash_password("secret1");
        assert_ne!(a, b);
        assert!(verify_password("secret1", &a));
        assert!(!verify_password("secret2", &a));
        assert!(!verify_password("secret1", "garbage"));
    }

    #[test]
    fn test_session_expiry() {
        assert!(!Session::issue(Uuid::nil(), 1).is_expired());
        assert!(Session::issue(Uuid::nil(), 0).is_expired());
    }

    #[test]
    fn test_register_validation() {
        let req = RegisterRequest { full_name: "Jane".into(), email: "nope".into(), password: "123".into(), phone_number: None };
        let errs: crate::domain::FieldErrors = req.validate().unwrap_err().into();
        assert!(errs.contains("email"));
        assert!(errs.contains("password"));
    }
}
