pub mod entity;
pub mod run;
pub mod scope;
