use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, info};

use crate::errors::{BackendError, Result};
use crate::rate_limit::RateLimiter;
use crate::settings::RateLimit as RateLimitCfg;

/// Build the rate window sweep job.
pub fn sweep_job(rate_limiter: Arc<RateLimiter>, schedule: &str) -> Result<Job> {
    Job::new_async(schedule, move |_uuid, _l| {
        let rate_limiter = rate_limiter.clone();
        Box::pin(async move {
            let removed = rate_limiter.sweep();
            debug!(
                removed,
                remaining = rate_limiter.tracked_windows(),
                "Swept elapsed rate windows"
            );
        })
    })
    .map_err(|e| BackendError::Other(format!("Failed to create rate window sweep job: {}", e)))
}

/// Initialize and start the job scheduler with all background tasks
pub async fn init_scheduler(
    rate_limiter: Arc<RateLimiter>,
    cfg: &RateLimitCfg,
) -> Result<JobScheduler> {
    let sched = JobScheduler::new()
        .await
        .map_err(|e| BackendError::Other(format!("Failed to create job scheduler: {}", e)))?;

    sched
        .add(sweep_job(rate_limiter, &cfg.sweep_schedule)?)
        .await
        .map_err(|e| BackendError::Other(format!("Failed to add rate window sweep job: {}", e)))?;

    sched
        .start()
        .await
        .map_err(|e| BackendError::Other(format!("Failed to start job scheduler: {}", e)))?;

    info!(schedule = %cfg.sweep_schedule, "Job scheduler started");
    Ok(sched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::RateLimits;
    use std::time::Duration;

    fn limiter() -> Arc<RateLimiter> {
        Arc::new(RateLimiter::new(
            RateLimits::new().with_limit("auth", "login", 3),
            Duration::from_secs(60),
        ))
    }

    #[test]
    fn test_sweep_job_accepts_default_schedule() {
        assert!(sweep_job(limiter(), &RateLimitCfg::default().sweep_schedule).is_ok());
    }

    #[test]
    fn test_sweep_job_rejects_invalid_schedule() {
        let err = sweep_job(limiter(), "every minute").err().expect("invalid schedule should be rejected");
        assert_eq!(err.code(), "core:internal");
    }
}
