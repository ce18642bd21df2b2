mod alarm_generator;
mod background_tasks;
mod checkpoint;
mod device_group_cache;
mod documents;
mod message_orchestrator;
mod operator;
mod record_normalizer;
mod rules_evaluation;
mod storage_writer;
mod throughput_counter;

pub use alarm_generator::*;
pub use background_tasks::*;
pub use checkpoint::*;
pub use device_group_cache::*;
pub use documents::*;
pub use message_orchestrator::*;
pub use operator::*;
pub use record_normalizer::*;
pub use rules_evaluation::*;
pub use storage_writer::*;
pub use throughput_counter::*;
