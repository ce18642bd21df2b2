mod client;
mod device_group_resolver;
mod models;
mod rule_source;

pub use client::*;
pub use device_group_resolver::*;
pub use models::*;
pub use rule_source::*;
