mod generator;
mod publisher;
mod vehicle_telemetry;

pub use generator::*;
pub use publisher::*;
pub use vehicle_telemetry::*;
