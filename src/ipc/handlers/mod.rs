pub mod ai;
pub mod backup;
pub mod core;
pub mod dashboard;
pub mod fees;
pub mod settings;
pub mod students;
