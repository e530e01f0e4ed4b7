pub mod config;
pub mod enricher;
pub mod error;
pub mod metrics_consts;
pub mod pool;
pub mod queue;
pub mod server;
pub mod shutdown;
pub mod worker;
