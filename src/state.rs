use crate::services::job_scheduler_service::JobContext;

/// State handed to the thin HTTP surface. The heavy lifting lives in the
/// job context; routes only read through it.
#[derive(Clone)]
pub struct AppState {
    pub ctx: JobContext,
}
