//! Daily valuation timer anchored to a local wall-clock hour.

use super::job::PortfolioValuationJob;
use chrono::{DateTime, Days, Duration as ChronoDuration, LocalResult, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{error, info};

/// Longest single sleep before the wall clock is checked again
const CHECK_INTERVAL: Duration = Duration::from_secs(300);

/// `hour:00` every day in `tz`
#[derive(Debug, Clone, Copy)]
pub struct DailySchedule {
    tz: Tz,
    hour: u32,
}

impl DailySchedule {
    pub fn new(tz: Tz, hour: u32) -> Self {
        Self { tz, hour }
    }

    /// First occurrence strictly after `now`.
    ///
    /// A local time skipped by a DST jump resolves one hour later; a
    /// repeated local time resolves to its first occurrence.
    pub fn next_run_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.with_timezone(&self.tz).date_naive();

        for offset in 0..3 {
            if let Some(date) = today.checked_add_days(Days::new(offset))
                && let Some(candidate) = self.resolve(date)
                && candidate > now
            {
                return candidate;
            }
        }

        now + ChronoDuration::days(1)
    }

    fn resolve(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        let naive = date.and_hms_opt(self.hour, 0, 0)?;
        let local = match self.tz.from_local_datetime(&naive) {
            LocalResult::Single(t) => t,
            LocalResult::Ambiguous(earliest, _) => earliest,
            LocalResult::None => self
                .tz
                .from_local_datetime(&(naive + ChronoDuration::hours(1)))
                .earliest()?,
        };
        Some(local.with_timezone(&Utc))
    }
}

/// Runs the valuation job once per scheduled occurrence until shutdown.
///
/// A run in progress always finishes; shutdown is observed between runs.
pub struct ValuationScheduler {
    job: Arc<PortfolioValuationJob>,
    schedule: DailySchedule,
    check_interval: Duration,
    first_run: Option<DateTime<Utc>>,
}

impl ValuationScheduler {
    pub fn new(job: Arc<PortfolioValuationJob>, schedule: DailySchedule) -> Self {
        Self {
            job,
            schedule,
            check_interval: CHECK_INTERVAL,
            first_run: None,
        }
    }

    pub fn with_check_interval(mut self, check_interval: Duration) -> Self {
        self.check_interval = check_interval;
        self
    }

    /// Use `first_run` as the first deadline instead of the next scheduled occurrence
    pub fn with_first_run(mut self, first_run: DateTime<Utc>) -> Self {
        self.first_run = Some(first_run);
        self
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut next_run = self
            .first_run
            .unwrap_or_else(|| self.schedule.next_run_after(Utc::now()));
        info!("ValuationScheduler: Next valuation at {}", next_run);

        loop {
            if *shutdown.borrow() {
                info!("ValuationScheduler: Shutting down");
                return;
            }

            let now = Utc::now();
            if now >= next_run {
                next_run = self.tick(now, next_run).await;
                continue;
            }

            let wait = (next_run - now)
                .to_std()
                .unwrap_or_default()
                .min(self.check_interval);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        info!("ValuationScheduler: Shutdown channel closed");
                        return;
                    }
                }
            }
        }
    }

    /// Run the job if `now` has reached `next_run` and return the deadline to wait for.
    ///
    /// The following deadline is taken from when the run finished, so runs never overlap.
    pub async fn tick(&self, now: DateTime<Utc>, next_run: DateTime<Utc>) -> DateTime<Utc> {
        if now < next_run {
            return next_run;
        }

        let started = Instant::now();
        match self.job.run().await {
            Ok(report) => info!(
                "ValuationScheduler: Run {} with {} snapshots",
                report.status(),
                report.snapshots_written
            ),
            Err(e) => error!("ValuationScheduler: Run failed: {:#}", e),
        }

        let finished = ChronoDuration::from_std(started.elapsed())
            .ok()
            .and_then(|elapsed| now.checked_add_signed(elapsed))
            .unwrap_or(now);
        let next_run = self.schedule.next_run_after(finished);
        info!("ValuationScheduler: Next valuation at {}", next_run);
        next_run
    }
}
