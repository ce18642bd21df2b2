mod domain;
mod nats;
mod streaming_agent;

pub use domain::*;
pub use nats::*;
pub use streaming_agent::*;
