pub mod literal;
pub mod mysql;
pub mod upsert;
