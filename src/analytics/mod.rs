/// Usage analytics
///
/// Monthly statistics over a user's executions. A period is a calendar month in UTC; an
/// execution belongs to the month in which it started.

pub mod storage;

pub use storage::{AnalyticsStorage, Period, PeriodStats};
