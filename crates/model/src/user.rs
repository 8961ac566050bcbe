//! User account, in scope as the order owner and notification recipient.

use chrono::{DateTime, Utc};
use common::{ProductId, UserId};
use serde::{Deserialize, Serialize};

/// User document. Credentials are handled by the upstream auth layer; only
/// the hashed form is stored here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub password_hash: String,
    pub is_admin: bool,
    #[serde(default)]
    pub wishlist: Vec<ProductId>,
    pub created_at: DateTime<Utc>,
    /// Document version for optimistic concurrency.
    #[serde(default)]
    pub version: u64,
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: UserId::new(),
            name: name.into(),
            email: email.into(),
            password_hash: String::new(),
            is_admin: false,
            wishlist: Vec::new(),
            created_at: now,
            version: 0,
        }
    }

    /// The actor view of this user.
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.id,
            is_admin: self.is_admin,
        }
    }
}

/// The authenticated caller, supplied by the upstream auth middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub is_admin: bool,
}

impl Actor {
    /// True if the actor owns the resource or is an admin.
    pub fn owns_or_admin(&self, owner: UserId) -> bool {
        self.is_admin || self.id == owner
    }
}
