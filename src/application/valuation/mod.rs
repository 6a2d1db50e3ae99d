//! Daily portfolio valuation: the batch job and the timer that drives it.

pub mod job;
pub mod scheduler;

pub use job::{ClassFailure, PortfolioValuationJob, ValuationReport};
pub use scheduler::{DailySchedule, ValuationScheduler};
