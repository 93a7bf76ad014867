mod file_secret_resolver;

pub use file_secret_resolver::*;
