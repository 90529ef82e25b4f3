//! Polling for long-running aggregator jobs.
//!
//! Connection creation and refresh return a job resource that moves through
//! pending → in-progress → completed/failed. The poller fetches it at a
//! fixed interval until it reaches a terminal state or the wait budget runs
//! out.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::domain::Job;

use super::client::BankingProvider;
use super::error::ApiError;

/// Blocking poller over a provider's job endpoint.
pub struct JobPoller {
    provider: Arc<dyn BankingProvider>,
    interval: Duration,
}

impl JobPoller {
    pub fn new(provider: Arc<dyn BankingProvider>, interval: Duration) -> Self {
        Self { provider, interval }
    }

    /// Poll until the job is completed or failed.
    ///
    /// `max_wait` bounds the poller itself; an earlier caller `deadline`
    /// tightens it further. Returns the terminal job either way — callers
    /// decide how to surface a failed job. A Timeout error means the job
    /// never reached a terminal state in time.
    pub fn wait_for_job(
        &self,
        job_id: &str,
        max_wait: Duration,
        deadline: Option<Instant>,
    ) -> Result<Job, ApiError> {
        let own_bound = Instant::now() + max_wait;
        let effective = match deadline {
            Some(d) if d < own_bound => d,
            _ => own_bound,
        };

        loop {
            let remote = self.provider.get_job(job_id)?;
            let job = remote.to_job();
            if job.status.is_terminal() {
                tracing::debug!(job_id, status = job.status.as_str(), "job reached terminal state");
                return Ok(job);
            }

            let now = Instant::now();
            if now >= effective {
                return Err(ApiError::Timeout(format!(
                    "job '{job_id}' still {} after {}ms",
                    job.status.as_str(),
                    max_wait.as_millis()
                )));
            }
            thread::sleep(self.interval.min(effective - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::api::models::{LoginCredentials, RemoteJob};
    use crate::domain::{DateRange, JobStatus};

    /// Provider whose job endpoint yields a fixed sequence of statuses,
    /// then repeats the last one forever.
    struct JobScript {
        statuses: Vec<&'static str>,
        polls: AtomicUsize,
    }

    impl JobScript {
        fn new(statuses: Vec<&'static str>) -> Self {
            Self {
                statuses,
                polls: AtomicUsize::new(0),
            }
        }
    }

    impl BankingProvider for JobScript {
        fn name(&self) -> &str {
            "job-script"
        }

        fn create_connection(
            &self,
            _: &str,
            _: &str,
            _: &LoginCredentials,
        ) -> Result<RemoteJob, ApiError> {
            unimplemented!("not used by poller tests")
        }

        fn refresh_connection(&self, _: &str) -> Result<RemoteJob, ApiError> {
            unimplemented!("not used by poller tests")
        }

        fn delete_connection(&self, _: &str) -> Result<(), ApiError> {
            unimplemented!("not used by poller tests")
        }

        fn list_connections(
            &self,
            _: &str,
        ) -> Result<Vec<crate::api::models::RemoteConnection>, ApiError> {
            unimplemented!("not used by poller tests")
        }

        fn list_accounts(
            &self,
            _: &str,
        ) -> Result<Vec<crate::api::models::RemoteAccount>, ApiError> {
            unimplemented!("not used by poller tests")
        }

        fn list_transactions(
            &self,
            _: &str,
            _: Option<&DateRange>,
        ) -> Result<Vec<crate::api::models::RemoteTransaction>, ApiError> {
            unimplemented!("not used by poller tests")
        }

        fn list_institutions(
            &self,
        ) -> Result<Vec<crate::api::models::RemoteInstitution>, ApiError> {
            unimplemented!("not used by poller tests")
        }

        fn get_job(&self, _: &str) -> Result<RemoteJob, ApiError> {
            let i = self.polls.fetch_add(1, Ordering::SeqCst);
            let status = self.statuses[i.min(self.statuses.len() - 1)];
            Ok(RemoteJob {
                id: "job-1".into(),
                status: Some(status.to_string()),
                steps: Vec::new(),
            })
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    #[test]
    fn returns_once_the_job_completes() {
        let provider = Arc::new(JobScript::new(vec!["pending", "in-progress", "completed"]));
        let poller = JobPoller::new(provider.clone(), Duration::from_millis(5));

        let job = poller
            .wait_for_job("job-1", Duration::from_secs(1), None)
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(provider.polls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn failed_job_is_returned_not_raised() {
        let provider = Arc::new(JobScript::new(vec!["pending", "failed"]));
        let poller = JobPoller::new(provider, Duration::from_millis(5));

        let job = poller
            .wait_for_job("job-1", Duration::from_secs(1), None)
            .unwrap();
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[test]
    fn never_terminal_job_times_out_around_max_wait() {
        let provider = Arc::new(JobScript::new(vec!["in-progress"]));
        let poller = JobPoller::new(provider.clone(), Duration::from_millis(20));

        let start = Instant::now();
        let err = poller
            .wait_for_job("job-1", Duration::from_millis(50), None)
            .unwrap_err();
        let elapsed = start.elapsed();

        assert!(matches!(err, ApiError::Timeout(_)));
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(200));
        // Polls at ~0, 20, 40, 50ms.
        assert_eq!(provider.polls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn caller_deadline_tightens_the_internal_bound() {
        let provider = Arc::new(JobScript::new(vec!["pending"]));
        let poller = JobPoller::new(provider, Duration::from_millis(10));

        let start = Instant::now();
        let err = poller
            .wait_for_job(
                "job-1",
                Duration::from_secs(5),
                Some(Instant::now() + Duration::from_millis(25)),
            )
            .unwrap_err();

        assert!(matches!(err, ApiError::Timeout(_)));
        assert!(start.elapsed() < Duration::from_millis(200));
    }
}
