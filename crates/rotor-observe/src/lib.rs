mod logger;
pub use logger::*;

mod report;
pub use report::{log_cycle, log_report, message_for};
