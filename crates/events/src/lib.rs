//! Domain event contract and the deterministic command execution helper.

mod event;
mod handler;

pub use event::Event;
pub use handler::execute;
