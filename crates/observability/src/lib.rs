//! Process-wide logging setup shared by hosting applications and integration tests.

mod subscriber;

pub use subscriber::{DEFAULT_FILTER, LogFormat, init, init_with};
