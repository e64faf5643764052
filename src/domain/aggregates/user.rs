//! User accounts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use crate::domain::value_objects::Email;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role { #[default] Customer, Admin }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus { #[default] Active, Inactive }

impl Role {
    pub fn as_str(self) -> &'static str { match self { Self::Customer => "customer", Self::Admin => "admin" } }
}

impl UserStatus {
    pub fn as_str(self) -> &'static str { match self { Self::Active => "active", Self::Inactive => "inactive" } }
}

impl FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s { "customer" => Ok(Self::Customer), "admin" => Ok(Self::Admin), other => Err(format!("unknown role {other}")) }
    }
}

impl FromStr for UserStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s { "active" => Ok(Self::Active), "inactive" => Ok(Self::Inactive), other => Err(format!("unknown status {other}")) }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub full_name: String,
    pub email: Email,
    pub role: Role,
    pub status: UserStatus,
    pub phone_number: Option<String>,
    pub loyalty_points: i64,
    #[serde(skip)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(full_name: impl Into<String>, email: Email, password_hash: String) -> Self {
        Self {
            id: Uuid::now_v7(), full_name: full_name.into(), email, role: Role::Customer, status: UserStatus::Active,
            phone_number: None, loyalty_points: 0, password_hash, created_at: Utc::now(),
        }
    }

    pub fn is_admin(&self) -> bool { self.role == Role::Admin }
    pub fn is_active(&self) -> bool { self.status == UserStatus::Active }
}

/// Admin edit of a user profile.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    #[validate(length(min = 1, max = 100, message = "Full name is required"))]
    pub full_name: String,
    #[serde(default)]
    #[validate(length(min = 6, max = 20, message = "Phone number must be 6 to 20 characters"))]
    pub phone_number: Option<String>,
    pub role: Role,
}

impl User {
    pub fn apply(&mut self, update: UserUpdate) {
        self.full_name = update.full_name.trim().to_string();
        self.phone_number = update.phone_number.map(|p| p.trim().to_string()).filter(|p| !p.is_empty());
        self.role = update.role;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_never_serialized() {
        let user = User::new("Jane", Email::parse("jane@example.com").unwrap(), "salt$hash".into());
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["role"], "customer");
        assert_eq!(json["status"], "active");
    }

    #[test]
    fn test_apply_update() {
        let mut user = User::new("Jane", Email::parse("jane@example.com").unwrap(), String::new());
        user.apply(UserUpdate { full_name: " Jane Doe ".into(), phone_number: Some(" ".into()), role: Role::Admin });
        assert_eq!(user.full_name, "Jane Doe");
        assert!(user.phone_number.is_none());
        assert!(user.is_admin());
    }
}
