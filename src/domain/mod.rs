pub mod aggregation;
pub mod calendar;
pub mod models;
pub mod time;
pub mod timer;
