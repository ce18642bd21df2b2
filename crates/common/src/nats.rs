mod client;
mod dead_letter_producer;
mod partition_source;
mod traits;

pub use client::*;
pub use dead_letter_producer::*;
pub use partition_source::*;
pub use traits::*;
