mod config;
mod event_store;

pub use config::*;
pub use event_store::*;
