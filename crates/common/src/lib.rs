pub mod domain;
pub mod nats;
pub mod postgres;
pub mod secrets;
pub mod telemetry;

pub use domain::*;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use domain::MockEventStore;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockEventStoreConnection;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockSecretResolver;
