pub mod calendar;
pub mod value;
