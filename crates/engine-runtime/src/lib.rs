pub mod error;
pub mod execution;
pub mod registry;
pub mod resume;
