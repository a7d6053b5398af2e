pub mod legacy;
pub mod mapped;
pub mod row;
