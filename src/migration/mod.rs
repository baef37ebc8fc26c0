// ============================================================================
// Data Migrations - one-off jobs run from the binary, never on the hot path
// ============================================================================

pub mod receiver_notes;

pub use receiver_notes::backfill_receivers;
