//! Observability
//!
//! Logging, metrics, and the JSONL event stream used to follow encounters
//! from outside the process.

pub mod events;
pub mod logging;
pub mod metrics;

pub use events::{Event, EventEmitter};
pub use logging::{LogFormat, init_logging};
pub use metrics::init_metrics;
