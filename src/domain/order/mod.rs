// ============================================================================
// Order Domain - Parcel Lifecycle & Tracking
// ============================================================================
//
// This module contains ALL Order-specific code:
// - Value objects (OrderStatus, TransitionPolicy, TrackingCode, GeoPoint)
// - History (StatusHistoryEntry, the append-only audit trail)
// - Events (OrderUpdate pushed through the fan-out hub)
// - Commands (NewOrder, PublicOrderRequest, OrderPatch, StatusChange)
// - Errors (OrderError enum)
// - Aggregate (Order with pure transition logic)
// - Lifecycle (OrderLifecycleManager, the write path)
// - Tracking (TrackingService, the read-only projections)
//
// ============================================================================

pub mod value_objects;
pub mod history;
pub mod events;
pub mod commands;
pub mod errors;
pub mod aggregate;
pub mod lifecycle;
pub mod tracking;

// Re-export for convenience
pub use value_objects::*;
pub use history::*;
pub use events::*;
pub use commands::*;
pub use aggregate::Order;
pub use lifecycle::OrderLifecycleManager;
pub use tracking::TrackingService;
