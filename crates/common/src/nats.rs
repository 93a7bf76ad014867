mod client;
mod consumer;
mod kv_secret_resolver;

pub use client::*;
pub use consumer::*;
pub use kv_secret_resolver::*;
