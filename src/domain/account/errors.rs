use super::value_objects::Role;

// ============================================================================
// Account Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("Email cannot be empty")]
    EmptyEmail,

    #[error("Invalid email format: {0}")]
    InvalidEmail(String),

    #[error("Account must be active to perform this operation")]
    NotActive,

    #[error("Account has role {actual}, expected {expected}")]
    WrongRole { expected: Role, actual: Role },

    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("Unknown account status: {0}")]
    UnknownStatus(String),
}
