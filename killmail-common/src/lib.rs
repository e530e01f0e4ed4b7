pub mod killmail;
pub mod metrics;
pub mod payload;
pub mod retry;
pub mod store;
pub mod timestamp;
