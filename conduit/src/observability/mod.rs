//! Observability utilities.

mod logging;

pub use logging::{env_filter, init_tracing, LogFormat, DEFAULT_FILTER, LOG_ENV};
