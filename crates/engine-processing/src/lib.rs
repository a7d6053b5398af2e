pub mod error;
pub mod extractor;
pub mod mapper;
pub mod retry;
pub mod upserter;
