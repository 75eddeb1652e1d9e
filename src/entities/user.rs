// 👤 Staff User - Identity + role
//
// Credentials and sessions live in front of this crate. What stays here
// is who a caller is and what their role lets them do.

use crate::ledger::LedgerError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full access, including recording payments
    Admin,

    /// Read-only access to students and fee status
    #[serde(alias = "user")]
    Staff,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Staff => "staff",
        }
    }

    /// Lenient parse of stored role strings. Anything unknown is read-only.
    pub fn parse(value: &str) -> Role {
        match value.trim().to_lowercase().as_str() {
            "admin" => Role::Admin,
            _ => Role::Staff,
        }
    }

    pub fn can_record_payments(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffUser {
    pub username: String,
    pub role: Role,
}

impl StaffUser {
    pub fn new(username: impl Into<String>, role: Role) -> Self {
        StaffUser {
            username: username.into(),
            role,
        }
    }
}

pub trait StaffDirectory: Send + Sync {
    fn find_user(&self, username: &str) -> Result<Option<StaffUser>, LedgerError>;
}

/// In-memory staff directory
#[derive(Debug, Clone, Default)]
pub struct StaffRegistry {
    users: Arc<RwLock<HashMap<String, StaffUser>>>,
}

impl StaffRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user; returns false if the username exists
    pub fn add(&self, user: StaffUser) -> bool {
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        if users.contains_key(&user.username) {
            return false;
        }
        users.insert(user.username.clone(), user);
        true
    }
}

impl StaffDirectory for StaffRegistry {
    fn find_user(&self, username: &str) -> Result<Option<StaffUser>, LedgerError> {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        Ok(users.get(username).cloned())
    }
}
