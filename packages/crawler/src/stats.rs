//! Throughput statistics and finish-time projections.
//!
//! The rate is the mean wall-clock time per diary ingested during this run.
//! Projections are linear: `now + rate * (target - current_total)`, with no
//! smoothing.

use chrono::{DateTime, Local, TimeDelta, TimeZone};
use film_walk_diary_models::CrawlOutcome;

/// Processed handles between reports by default.
pub const DEFAULT_REPORT_EVERY: u64 = 10;

/// Diary totals projected by default: 10 million, 100 million, 1 billion.
pub const DEFAULT_ETA_TARGETS: [u64; 3] = [10_000_000, 100_000_000, 1_000_000_000];

/// Format used for projected finish times.
pub const ETA_FORMAT: &str = "%d.%m.%Y at %H:%M:%S";

/// Projects when `target` diaries will be stored.
///
/// Returns `now` once `current_total` has reached `target`, and `None` if
/// the projection does not fit in a [`DateTime`].
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn project_eta<Tz: TimeZone>(
    now: &DateTime<Tz>,
    seconds_per_diary: f64,
    target: u64,
    current_total: u64,
) -> Option<DateTime<Tz>> {
    let remaining = target.saturating_sub(current_total);
    if remaining == 0 {
        return Some(now.clone());
    }

    let millis = (seconds_per_diary * remaining as f64 * 1000.0).round();
    if !millis.is_finite() || millis < 0.0 || millis >= i64::MAX as f64 {
        return None;
    }

    let delta = TimeDelta::try_milliseconds(millis as i64)?;
    now.clone().checked_add_signed(delta)
}

/// Short label for a target, e.g. `10m` or `1b`.
#[must_use]
pub fn target_label(target: u64) -> String {
    const UNITS: [(u64, &str); 3] = [(1_000_000_000, "b"), (1_000_000, "m"), (1_000, "k")];

    UNITS
        .iter()
        .find(|(size, _)| target >= *size && target % size == 0)
        .map_or_else(|| target.to_string(), |(size, unit)| format!("{}{unit}", target / size))
}

fn with_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Counters for one crawl run.
#[derive(Debug, Clone)]
pub struct CrawlStats {
    started_at: DateTime<Local>,
    report_every: u64,
    targets: Vec<u64>,
    processed: u64,
    new_users: u64,
    known_users: u64,
    failed: u64,
    diaries_this_run: u64,
    base_users: u64,
    base_diaries: u64,
}

impl CrawlStats {
    /// Starts tracking at `started_at`, on top of the store's existing
    /// totals.
    #[must_use]
    pub fn new(started_at: DateTime<Local>, base_users: u64, base_diaries: u64) -> Self {
        Self {
            started_at,
            report_every: DEFAULT_REPORT_EVERY,
            targets: DEFAULT_ETA_TARGETS.to_vec(),
            processed: 0,
            new_users: 0,
            known_users: 0,
            failed: 0,
            diaries_this_run: 0,
            base_users,
            base_diaries,
        }
    }

    /// Sets the report cadence (at least 1).
    #[must_use]
    pub fn with_report_every(mut self, report_every: u64) -> Self {
        self.report_every = report_every.max(1);
        self
    }

    #[must_use]
    pub fn with_targets(mut self, targets: Vec<u64>) -> Self {
        self.targets = targets;
        self
    }

    /// Counts one processed handle.
    pub const fn record(&mut self, outcome: CrawlOutcome) {
        self.processed += 1;
        match outcome {
            CrawlOutcome::AlreadyKnown => self.known_users += 1,
            CrawlOutcome::NewlyScraped { entries } => {
                self.new_users += 1;
                self.diaries_this_run += entries;
            }
            CrawlOutcome::Failed => self.failed += 1,
        }
    }

    /// Takes back users (and their diaries) that were counted as new but
    /// never persisted. The handles stay processed.
    pub const fn rollback(&mut self, users: u64, diaries: u64) {
        self.new_users = self.new_users.saturating_sub(users);
        self.diaries_this_run = self.diaries_this_run.saturating_sub(diaries);
    }

    #[must_use]
    pub const fn processed(&self) -> u64 {
        self.processed
    }

    #[must_use]
    pub const fn new_users(&self) -> u64 {
        self.new_users
    }

    /// True when the handle just recorded completes a report interval.
    #[must_use]
    pub const fn should_report(&self) -> bool {
        self.processed > 0 && self.processed % self.report_every == 0
    }

    /// Mean seconds per diary ingested this run, or `None` before the
    /// first diary.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn seconds_per_diary(&self, now: DateTime<Local>) -> Option<f64> {
        if self.diaries_this_run == 0 {
            return None;
        }
        let elapsed = (now - self.started_at).num_milliseconds().max(0) as f64 / 1000.0;
        Some(elapsed / self.diaries_this_run as f64)
    }

    /// Freezes the counters and projections at `now`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn snapshot(&self, now: DateTime<Local>) -> StatsReport {
        let total_diaries = self.base_diaries + self.diaries_this_run;
        let seconds_per_diary = self.seconds_per_diary(now);
        let seen = self.new_users + self.known_users;

        let etas = self
            .targets
            .iter()
            .map(|&target| EtaProjection {
                target,
                eta: seconds_per_diary
                    .and_then(|rate| project_eta(&now, rate, target, total_diaries)),
            })
            .collect();

        StatsReport {
            now,
            processed: self.processed,
            new_users: self.new_users,
            known_users: self.known_users,
            failed: self.failed,
            diaries_this_run: self.diaries_this_run,
            total_users: self.base_users + self.new_users,
            total_diaries,
            new_user_ratio: (seen > 0).then(|| self.new_users as f64 / seen as f64),
            seconds_per_diary,
            etas,
        }
    }
}

/// Projected finish time for one target.
#[derive(Debug, Clone, PartialEq)]
pub struct EtaProjection {
    pub target: u64,
    /// `None` until a rate is known, or if the projection overflows.
    pub eta: Option<DateTime<Local>>,
}

/// Point-in-time view of a crawl run.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsReport {
    pub now: DateTime<Local>,
    pub processed: u64,
    pub new_users: u64,
    pub known_users: u64,
    pub failed: u64,
    pub diaries_this_run: u64,
    /// Users in the store, including this run's.
    pub total_users: u64,
    /// Diaries in the store, including this run's.
    pub total_diaries: u64,
    /// Share of successfully processed handles that were new users.
    pub new_user_ratio: Option<f64>,
    pub seconds_per_diary: Option<f64>,
    pub etas: Vec<EtaProjection>,
}

impl StatsReport {
    /// Logs the report at `info` level.
    pub fn log(&self) {
        log::info!(
            "Total: {} users and {} diaries.",
            with_thousands(self.total_users),
            with_thousands(self.total_diaries),
        );
        if let Some(ratio) = self.new_user_ratio {
            log::info!("User is new ratio: {:.2}%.", ratio * 100.0);
        }
        if self.failed > 0 {
            log::info!("Failed handles: {} of {}.", self.failed, self.processed);
        }
        for projection in &self.etas {
            let label = target_label(projection.target);
            match projection.eta {
                Some(eta) => log::info!("Est. finish {label} : {}.", eta.format(ETA_FORMAT)),
                None => log::info!("Est. finish {label} : unknown."),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn eta_is_linear_in_remaining_diaries() {
        let eta = project_eta(&at(0), 0.5, 1_000, 800).unwrap();
        assert_eq!(eta, at(100));
    }

    #[test]
    fn eta_strictly_decreases_toward_target() {
        let now = at(0);
        let mut previous = project_eta(&now, 0.25, 10_000, 0).unwrap();
        for current in [1, 10, 500, 9_000, 9_999] {
            let eta = project_eta(&now, 0.25, 10_000, current).unwrap();
            assert!(eta < previous, "{current}: {eta} !< {previous}");
            previous = eta;
        }
    }

    #[test]
    fn reached_target_projects_now() {
        assert_eq!(project_eta(&at(5), 2.0, 100, 100), Some(at(5)));
        assert_eq!(project_eta(&at(5), 2.0, 100, 150), Some(at(5)));
    }

    #[test]
    fn absurd_rate_does_not_overflow() {
        assert_eq!(project_eta(&at(0), f64::MAX, 1_000_000_000, 0), None);
    }

    #[test]
    fn target_labels() {
        assert_eq!(target_label(10_000_000), "10m");
        assert_eq!(target_label(1_000_000_000), "1b");
        assert_eq!(target_label(5_000), "5k");
        assert_eq!(target_label(1_234), "1234");
    }

    #[test]
    fn thousands_separator() {
        assert_eq!(with_thousands(0), "0");
        assert_eq!(with_thousands(999), "999");
        assert_eq!(with_thousands(1_234_567), "1,234,567");
    }

    #[test]
    fn records_outcomes_and_reports_on_cadence() {
        let start = Local::now();
        let mut stats = CrawlStats::new(start, 10, 1_000).with_report_every(3);

        stats.record(CrawlOutcome::NewlyScraped { entries: 40 });
        stats.record(CrawlOutcome::AlreadyKnown);
        assert!(!stats.should_report());
        stats.record(CrawlOutcome::Failed);
        assert!(stats.should_report());

        let report = stats.snapshot(start + TimeDelta::seconds(20));
        assert_eq!(report.processed, 3);
        assert_eq!(report.new_users, 1);
        assert_eq!(report.known_users, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.total_users, 11);
        assert_eq!(report.total_diaries, 1_040);
        assert_eq!(report.new_user_ratio, Some(0.5));
        assert_eq!(report.seconds_per_diary, Some(0.5));
        assert_eq!(report.etas.len(), DEFAULT_ETA_TARGETS.len());
        assert!(report.etas.iter().all(|p| p.eta.is_some()));
    }

    #[test]
    fn rollback_removes_dropped_users_from_totals() {
        let start = Local::now();
        let mut stats = CrawlStats::new(start, 5, 500);
        stats.record(CrawlOutcome::NewlyScraped { entries: 30 });
        stats.record(CrawlOutcome::NewlyScraped { entries: 12 });

        stats.rollback(1, 12);

        let report = stats.snapshot(start + TimeDelta::seconds(3));
        assert_eq!(report.processed, 2);
        assert_eq!(report.new_users, 1);
        assert_eq!(report.total_users, 6);
        assert_eq!(report.total_diaries, 530);
        assert_eq!(report.seconds_per_diary, Some(0.1));
    }

    #[test]
    fn no_rate_before_first_diary() {
        let start = Local::now();
        let mut stats = CrawlStats::new(start, 0, 0).with_targets(vec![100]);
        stats.record(CrawlOutcome::NewlyScraped { entries: 0 });

        let report = stats.snapshot(start + TimeDelta::seconds(5));
        assert_eq!(report.seconds_per_diary, None);
        assert_eq!(
            report.etas,
            vec![EtaProjection {
                target: 100,
                eta: None
            }]
        );
    }
}
