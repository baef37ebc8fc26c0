pub mod redpanda;

pub use redpanda::{PublishError, RedpandaClient};
