mod canonical_event;
mod credentials;
mod event_store;
mod insert_fragment;
mod result;
mod secret_resolver;
mod source_record;

pub use canonical_event::*;
pub use credentials::*;
pub use event_store::*;
pub use insert_fragment::*;
pub use result::*;
pub use secret_resolver::*;
pub use source_record::*;
