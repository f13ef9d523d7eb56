//! # Utility Modules
//!
//! Supporting utilities shared by the session and engine.
//!
//! ## Components
//! - **Logging**: `tracing-subscriber` setup from [`LoggingConfig`](crate::config::LoggingConfig)
//! - **Metrics**: Thread-safe observability counters
//! - **Time**: Fixed-rate tick pacing with a hybrid sleep/yield wait

pub mod logging;
pub mod metrics;
pub mod time;
