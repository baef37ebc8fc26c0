use super::value_objects::OrderStatus;

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Order is in terminal status {0} and accepts no further transitions")]
    TerminalStatus(OrderStatus),

    #[error("Cannot move order from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error("Unknown order status: {0}")]
    UnknownStatus(String),

    #[error("Unknown transition policy: {0}")]
    UnknownPolicy(String),

    #[error("Both latitude and longitude are required for the {0} location")]
    IncompleteCoordinates(&'static str),

    #[error("Invalid package weight: {0}")]
    InvalidWeight(String),

    #[error("{0} cannot be empty")]
    EmptyField(&'static str),
}
