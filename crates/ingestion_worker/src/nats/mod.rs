mod raw_record_processor;

pub use raw_record_processor::*;
