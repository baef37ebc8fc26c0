// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Each aggregate has its own subdirectory with:
// - Value objects
// - Commands / inputs
// - Errors
// - Aggregate implementation
//
// Persistence and delivery concerns live outside this layer and are reached
// only through the traits in `crate::store` and `crate::notifications`.
//
// ============================================================================

pub mod order;
pub mod account;
