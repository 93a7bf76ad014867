mod batch_deduplicator;
mod ingestion_handler;
mod invocation_outcome;
mod message_decoder;
mod statement_builder;
mod transactional_writer;

pub use batch_deduplicator::*;
pub use ingestion_handler::*;
pub use invocation_outcome::*;
pub use message_decoder::*;
pub use statement_builder::*;
pub use transactional_writer::*;
