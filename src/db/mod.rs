pub mod budget_queries;
pub mod cache_queries;
pub mod earnings_queries;
pub mod historical_move_queries;
pub mod iv_log_queries;
pub mod job_queries;
pub mod sentiment_queries;
