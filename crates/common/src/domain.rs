mod alarm;
mod device_group;
mod document;
mod record;
mod result;
mod rule;

pub use alarm::*;
pub use device_group::*;
pub use document::*;
pub use record::*;
pub use result::*;
pub use rule::*;
