mod partition_consumer;

pub use partition_consumer::*;
