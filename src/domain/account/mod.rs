// ============================================================================
// Account Domain - The accounts the order lifecycle depends on
// ============================================================================
//
// Customers own orders, couriers get assigned to them and admins run them.
// Registration, passwords and sessions live outside this crate; the
// lifecycle only needs to look accounts up and, on the public path, create a
// minimal customer account.
//
// ============================================================================

pub mod value_objects;
pub mod errors;
pub mod aggregate;

pub use value_objects::*;
pub use errors::*;
pub use aggregate::*;
