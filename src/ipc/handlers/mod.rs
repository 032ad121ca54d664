pub mod calendar;
pub mod core;
pub mod grades;
pub mod reports;
pub mod roster;
