pub mod credentials;
pub mod error;
pub mod source;
pub mod sql;
pub mod target;
