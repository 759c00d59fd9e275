pub mod frame;
pub mod report;
pub mod scenario;
