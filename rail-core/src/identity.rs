use serde::{Deserialize, Serialize};

use crate::{BookingError, BookingResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    /// Admins hold every capability a user has.
    pub fn satisfies(self, required: Role) -> bool {
        match required {
            Role::User => true,
            Role::Admin => self == Role::Admin,
        }
    }
}

/// The authenticated caller, as established by the HTTP layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub role: Role,
}

impl Principal {
    pub fn user(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            role: Role::User,
        }
    }

    pub fn admin(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Single capability check used by every caller of the booking services.
pub fn require_role(principal: &Principal, required: Role) -> BookingResult<()> {
    if principal.role.satisfies(required) {
        Ok(())
    } else {
        Err(BookingError::Unauthorized(format!(
            "{} lacks the {:?} role",
            principal.user_id, required
        )))
    }
}

/// Owner-only access with the admin override.
pub fn require_owner_or_admin(principal: &Principal, owner_id: &str) -> BookingResult<()> {
    if principal.is_admin() || principal.user_id == owner_id {
        Ok(())
    } else {
        Err(BookingError::Unauthorized(format!(
            "{} does not own this ticket",
            principal.user_id
        )))
    }
}
