pub mod answer;
pub mod interview;
pub mod message;
pub mod problem;
pub mod report;
