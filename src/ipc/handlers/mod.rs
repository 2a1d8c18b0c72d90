pub mod admissions;
pub mod audit;
pub mod backup;
pub mod core;
pub mod finance;
pub mod grading;
pub mod reports;
pub mod results;
pub mod setup;
pub mod staff;
pub mod students;
