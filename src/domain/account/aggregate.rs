use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::AccountError;
use super::value_objects::{AccountStatus, Email, Role};

pub const DEFAULT_CUSTOMER_NAME: &str = "Unknown User";

// ============================================================================
// Account
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub email: Email,
    pub phone: Option<String>,
    pub role: Role,
    pub status: AccountStatus,
    pub location: Option<String>,
    pub zipcode: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Minimal active customer account for a first-time public sender.
    pub fn new_customer(
        name: Option<String>,
        email: Email,
        phone: Option<String>,
        location: Option<String>,
        zipcode: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CUSTOMER_NAME.to_string()),
            email,
            phone,
            role: Role::User,
            status: AccountStatus::Active,
            location,
            zipcode,
            created_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Customers that can own new orders: role USER and active.
    pub fn ensure_active_customer(&self) -> Result<(), AccountError> {
        self.ensure_role(Role::User)?;
        if !self.is_active() {
            return Err(AccountError::NotActive);
        }
        Ok(())
    }

    pub fn ensure_role(&self, expected: Role) -> Result<(), AccountError> {
        if self.role != expected {
            return Err(AccountError::WrongRole {
                expected,
                actual: self.role,
            });
        }
        Ok(())
    }
}
