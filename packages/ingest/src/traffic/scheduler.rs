//! The scheduling thread that keeps the handler fed.
//!
//! One named thread runs all feed jobs sequentially. Between jobs it waits
//! on a command channel, which is how health probes and shutdown reach it.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};

use super::handler::TrafficHandler;
use crate::config::{
    IngestConfig, HEALTH_PING_TIMEOUT, PUBLICATION_DELAY_SECS, REFRESH_INTERVAL_SECS,
};
use crate::error::{IngestError, Result};
use crate::http::{Conditional, FileResponse};
use crate::ndw::FeedSource;

enum Command {
    Ping(mpsc::Sender<()>),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobKind {
    SiteTable,
    SignTable,
    Measurements,
    SignStatus,
}

struct Job {
    kind: JobKind,
    feed: String,
    due: Instant,
    validators: Conditional,
}

/// Handle to the running scheduler thread.
pub struct Scheduler {
    commands: mpsc::Sender<Command>,
    thread: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawn the scheduler thread. All jobs run once right away, reference
    /// tables first.
    pub fn start<S>(handler: Arc<TrafficHandler>, source: S, config: &IngestConfig) -> Result<Self>
    where
        S: FeedSource + 'static,
    {
        let now = Instant::now();
        let job = |kind, feed: &str| Job {
            kind,
            feed: feed.to_string(),
            due: now,
            validators: Conditional::none(),
        };
        let jobs = vec![
            job(JobKind::SiteTable, &config.site_table_feed),
            job(JobKind::SignTable, &config.sign_table_feed),
            job(JobKind::Measurements, &config.measurement_feed),
            job(JobKind::SignStatus, &config.sign_status_feed),
        ];
        let worker = Worker {
            handler,
            source,
            reference_interval: config.reference_reload_interval,
        };

        let (commands, inbox) = mpsc::channel();
        let thread = thread::Builder::new()
            .name("ingest-scheduler".to_string())
            .spawn(move || worker.run(jobs, &inbox))?;
        tracing::info!("Scheduler started");

        Ok(Self {
            commands,
            thread: Some(thread),
        })
    }

    /// Whether the scheduler thread answers a ping within the health timeout.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        let (reply, answer) = mpsc::channel();
        if self.commands.send(Command::Ping(reply)).is_err() {
            return false;
        }
        answer.recv_timeout(HEALTH_PING_TIMEOUT).is_ok()
    }

    /// Stop the thread after its current job and wait for it to exit.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        // The thread may already be gone; joining reports how it ended.
        let _ = self.commands.send(Command::Shutdown);
        thread.join().map_err(|_| IngestError::SchedulerStopped)?;
        tracing::info!("Scheduler stopped");
        Ok(())
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(error = %e, "Scheduler thread ended abnormally");
        }
    }
}

struct Worker<S> {
    handler: Arc<TrafficHandler>,
    source: S,
    reference_interval: Duration,
}

impl<S: FeedSource> Worker<S> {
    fn run(&self, mut jobs: Vec<Job>, inbox: &mpsc::Receiver<Command>) {
        loop {
            let now = Instant::now();
            let next_due = jobs.iter().map(|job| job.due).min().unwrap_or(now);
            match inbox.recv_timeout(next_due.saturating_duration_since(now)) {
                Ok(Command::Ping(reply)) => {
                    let _ = reply.send(());
                }
                Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    let now = Instant::now();
                    for job in jobs.iter_mut().filter(|job| job.due <= now) {
                        let delay = self.run_job(job);
                        tracing::debug!(feed = %job.feed, next_in = ?delay, "Job rescheduled");
                        job.due = Instant::now() + delay;
                    }
                }
            }
        }
    }

    /// Run one job and return the delay until its next run.
    fn run_job(&self, job: &mut Job) -> Duration {
        tracing::info!(feed = %job.feed, "Fetching feed");
        let result = self
            .source
            .fetch(&job.feed, &job.validators)
            .and_then(|response| self.apply(job.kind, &response).map(|()| response));

        match result {
            Ok(response) => {
                if !response.is_not_modified() {
                    job.validators = Conditional::from_response(&response);
                }
                match job.kind {
                    JobKind::Measurements | JobKind::SignStatus => {
                        next_fetch_delay(response.last_modified, Utc::now())
                    }
                    JobKind::SiteTable | JobKind::SignTable => self.reference_interval,
                }
            }
            Err(e) => {
                tracing::warn!(feed = %job.feed, error = %e, "Feed job failed");
                retry_delay()
            }
        }
    }

    fn apply(&self, kind: JobKind, response: &FileResponse) -> Result<()> {
        if response.is_not_modified() {
            tracing::info!(?kind, "Feed not modified");
            return Ok(());
        }
        match kind {
            JobKind::Measurements => self.handler.trigger_decode(&response.body).map(|_| ()),
            JobKind::SiteTable => self.handler.reload_reference(&response.body).map(|_| ()),
            JobKind::SignTable => self.handler.reload_sign_table(&response.body).map(|_| ()),
            JobKind::SignStatus => self.handler.reload_sign_status(&response.body).map(|_| ()),
        }
    }
}

fn retry_delay() -> Duration {
    Duration::from_secs(REFRESH_INTERVAL_SECS.unsigned_abs())
}

/// Delay until the next version of a minutely feed is expected.
///
/// The feed is republished every minute; a new version is expected
/// [`PUBLICATION_DELAY_SECS`] after the current `Last-Modified`, advanced in
/// whole refresh intervals until it lies in the future. Without a
/// `Last-Modified` the refresh interval is used.
///
/// # Examples
/// ```
/// use chrono::{TimeZone, Utc};
/// use std::time::Duration;
/// use trafficflow_ingest::traffic::next_fetch_delay;
///
/// let modified = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
/// let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 20).unwrap();
/// assert_eq!(next_fetch_delay(Some(modified), now), Duration::from_secs(45));
/// ```
#[must_use]
pub fn next_fetch_delay(last_modified: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Duration {
    let Some(last_modified) = last_modified else {
        return retry_delay();
    };
    let mut next = last_modified + TimeDelta::seconds(PUBLICATION_DELAY_SECS);
    if next < now {
        let behind = (now - next).num_seconds();
        let steps = behind / REFRESH_INTERVAL_SECS + 1;
        next += TimeDelta::seconds(steps * REFRESH_INTERVAL_SECS);
    }
    (next - now).to_std().unwrap_or_else(|_| retry_delay())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traffic::SiteFilter;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_next_fetch_delay_fresh_file() {
        assert_eq!(
            next_fetch_delay(Some(at(12, 0, 0)), at(12, 0, 5)),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_next_fetch_delay_stale_file() {
        // Expected at 12:01:05, then 12:02:05, 12:03:05...
        assert_eq!(
            next_fetch_delay(Some(at(12, 0, 0)), at(12, 2, 30)),
            Duration::from_secs(35)
        );
        assert_eq!(
            next_fetch_delay(Some(at(10, 0, 0)), at(12, 0, 0)),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_next_fetch_delay_without_last_modified() {
        assert_eq!(next_fetch_delay(None, at(12, 0, 0)), Duration::from_secs(60));
    }

    struct StaticSource {
        files: HashMap<String, Vec<u8>>,
        fetched: Arc<Mutex<Vec<String>>>,
    }

    impl FeedSource for StaticSource {
        fn fetch(&self, name: &str, _conditional: &Conditional) -> Result<FileResponse> {
            self.fetched.lock().unwrap().push(name.to_string());
            match self.files.get(name) {
                Some(body) => Ok(FileResponse {
                    status: 200,
                    body: body.clone(),
                    etag: Some(format!("\"{name}\"")),
                    last_modified: Some(Utc::now()),
                }),
                None => Err(IngestError::UnexpectedStatus {
                    feed: name.to_string(),
                    status: 404,
                }),
            }
        }
    }

    const SITES: &str = r#"<d2LogicalModel><payloadPublication><measurementSiteTable>
        <measurementSiteRecord id="S1"/>
      </measurementSiteTable></payloadPublication></d2LogicalModel>"#;

    const MEASUREMENTS: &str = r#"<d2LogicalModel><payloadPublication><siteMeasurements>
        <measurementSiteReference id="S1"/>
        <measurementTimeDefault>2024-03-01T12:00:00Z</measurementTimeDefault>
      </siteMeasurements></payloadPublication></d2LogicalModel>"#;

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_scheduler_runs_jobs_and_stops() {
        let config = IngestConfig::default();
        let fetched = Arc::new(Mutex::new(Vec::new()));
        let source = StaticSource {
            files: HashMap::from([
                (config.site_table_feed.clone(), SITES.as_bytes().to_vec()),
                (config.measurement_feed.clone(), MEASUREMENTS.as_bytes().to_vec()),
            ]),
            fetched: Arc::clone(&fetched),
        };
        let handler = Arc::new(TrafficHandler::new(SiteFilter::all(), 4));

        let scheduler = Scheduler::start(Arc::clone(&handler), source, &config).unwrap();

        assert!(wait_for(|| handler.cycles() >= 1));
        assert!(handler.get_aggregate("S1").is_some());
        assert_eq!(handler.reference().len(), 1);
        assert!(scheduler.is_healthy());
        scheduler.stop().unwrap();

        let fetched = fetched.lock().unwrap();
        assert_eq!(fetched[0], config.site_table_feed);
        assert!(fetched.contains(&config.sign_status_feed));
    }
}
