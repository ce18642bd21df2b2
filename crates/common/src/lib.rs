pub mod domain;
pub mod http;
pub mod nats;
pub mod postgres;
pub mod telemetry;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use domain::MockDeadLetterProducer;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockDeviceGroupResolver;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockDocumentStore;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockRuleSource;
#[cfg(any(test, feature = "testing"))]
pub use nats::MockJetStreamPublisher;
#[cfg(any(test, feature = "testing"))]
pub use nats::MockPartitionConnector;
#[cfg(any(test, feature = "testing"))]
pub use nats::MockPartitionSource;
