//! Time Budget Tracker
//!
//! Tracks elapsed and remaining wall-clock time against the hard deadline imposed by
//! the hosting runtime. The tracker owns the only cross-invocation state in the crate,
//! the [`ExecutionContext`], which lives as long as the execution environment does and
//! is reset exactly once at the end of every invocation through [`InvocationGuard`].
//!
//! Reads never fail: if the clock cannot be read the tracker reports no remaining time
//! and `TimeStatus::Critical`, which makes every caller stop starting new work.

use crate::error::ClockError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Source of monotonic time readings, measured from an arbitrary origin.
pub trait Clock: Send + Sync {
    fn now(&self) -> Result<Duration, ClockError>;
}

/// Monotonic clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Result<Duration, ClockError> {
        Ok(self.origin.elapsed())
    }
}

#[derive(Debug, Default)]
struct ManualClockState {
    now: Duration,
    failing: bool,
}

/// Hand-driven clock for simulating deadlines and environment reuse.
///
/// Clones share the same reading, so a test can keep one handle while the tracker
/// owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    state: Arc<Mutex<ManualClockState>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock();
        state.now += by;
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }

    /// Make subsequent reads fail until cleared.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Result<Duration, ClockError> {
        let state = self.state.lock();
        if state.failing {
            return Err(ClockError::Unavailable("manual clock set to fail".to_string()));
        }
        Ok(state.now)
    }
}

/// Classification of remaining time. Ordered from worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeStatus {
    Critical,
    Urgent,
    Warning,
    Caution,
    Good,
}

impl TimeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeStatus::Good => "GOOD",
            TimeStatus::Caution => "CAUTION",
            TimeStatus::Warning => "WARNING",
            TimeStatus::Urgent => "URGENT",
            TimeStatus::Critical => "CRITICAL",
        }
    }

    pub fn recommendation(self) -> &'static str {
        match self {
            TimeStatus::Good => "Ample time: run every phase and allow quality retries",
            TimeStatus::Caution => "Run the baseline and secondary phases; skip deep analysis",
            TimeStatus::Warning => "Run the baseline phase only, then finalize",
            TimeStatus::Urgent => "Finalize with existing drafts; avoid retries",
            TimeStatus::Critical => "Start no new work; emit what exists or a fallback skeleton",
        }
    }
}

impl fmt::Display for TimeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remaining-time boundaries, in seconds, between status levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusThresholds {
    /// Strictly more than this is `Good`
    #[serde(default = "default_good_above")]
    pub good_above_secs: u64,
    /// At least this (and not `Good`) is `Caution`
    #[serde(default = "default_caution_from")]
    pub caution_from_secs: u64,
    /// At least this is `Warning`
    #[serde(default = "default_warning_from")]
    pub warning_from_secs: u64,
    /// At least this is `Urgent`; below is `Critical`
    #[serde(default = "default_urgent_from")]
    pub urgent_from_secs: u64,
}

fn default_good_above() -> u64 {
    480
}

fn default_caution_from() -> u64 {
    360
}

fn default_warning_from() -> u64 {
    240
}

fn default_urgent_from() -> u64 {
    120
}

impl Default for StatusThresholds {
    fn default() -> Self {
        Self {
            good_above_secs: default_good_above(),
            caution_from_secs: default_caution_from(),
            warning_from_secs: default_warning_from(),
            urgent_from_secs: default_urgent_from(),
        }
    }
}

impl StatusThresholds {
    pub fn classify(&self, remaining: Duration) -> TimeStatus {
        let secs = remaining.as_secs_f64();
        if secs > self.good_above_secs as f64 {
            TimeStatus::Good
        } else if secs >= self.caution_from_secs as f64 {
            TimeStatus::Caution
        } else if secs >= self.warning_from_secs as f64 {
            TimeStatus::Warning
        } else if secs >= self.urgent_from_secs as f64 {
            TimeStatus::Urgent
        } else {
            TimeStatus::Critical
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.good_above_secs >= self.caution_from_secs
            && self.caution_from_secs > self.warning_from_secs
            && self.warning_from_secs > self.urgent_from_secs)
        {
            return Err(format!(
                "Status thresholds must be decreasing: good>{} caution>={} warning>={} urgent>={}",
                self.good_above_secs,
                self.caution_from_secs,
                self.warning_from_secs,
                self.urgent_from_secs
            ));
        }
        Ok(())
    }
}

/// `budget_status()` answer handed to planners and hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetReport {
    pub remaining_seconds: u64,
    pub status: TimeStatus,
    pub recommendation_text: String,
}

/// Timer state that survives across invocations of a reused execution environment.
///
/// Only the tracker mutates it. `status`, `high_water` and `clock_degraded` are cells
/// because they are refreshed by read-only queries.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    started_at: Option<Duration>,
    elapsed_accum: Duration,
    /// Charges recorded since the running span last opened
    charged_since_start: Duration,
    status: Cell<TimeStatus>,
    high_water: Cell<Duration>,
    clock_degraded: Cell<bool>,
    invocations: u64,
    resets: u64,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            started_at: None,
            elapsed_accum: Duration::ZERO,
            charged_since_start: Duration::ZERO,
            status: Cell::new(TimeStatus::Good),
            high_water: Cell::new(Duration::ZERO),
            clock_degraded: Cell::new(false),
            invocations: 0,
            resets: 0,
        }
    }
}

impl ExecutionContext {
    pub fn started_at(&self) -> Option<Duration> {
        self.started_at
    }

    pub fn elapsed_accum(&self) -> Duration {
        self.elapsed_accum
    }

    /// Status as of the most recent classification.
    pub fn status(&self) -> TimeStatus {
        self.status.get()
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn clock_degraded(&self) -> bool {
        self.clock_degraded.get()
    }

    /// Invocations begun in this environment.
    pub fn invocations(&self) -> u64 {
        self.invocations
    }

    /// Resets performed in this environment.
    pub fn resets(&self) -> u64 {
        self.resets
    }

    /// A running span at invocation start means the previous one was never reset.
    /// Accumulated charges alone are not stale: hosts charge before opening.
    fn is_stale(&self) -> bool {
        self.started_at.is_some()
    }
}

/// Tracks the execution budget for one execution environment.
pub struct TimeBudgetTracker {
    clock: Box<dyn Clock>,
    total_budget: Duration,
    thresholds: StatusThresholds,
    context: ExecutionContext,
}

impl fmt::Debug for TimeBudgetTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeBudgetTracker")
            .field("total_budget", &self.total_budget)
            .field("thresholds", &self.thresholds)
            .field("context", &self.context)
            .finish()
    }
}

impl TimeBudgetTracker {
    pub fn new(total_budget: Duration, thresholds: StatusThresholds) -> Self {
        Self::with_clock(Box::new(SystemClock::new()), total_budget, thresholds)
    }

    pub fn with_clock(
        clock: Box<dyn Clock>,
        total_budget: Duration,
        thresholds: StatusThresholds,
    ) -> Self {
        Self {
            clock,
            total_budget,
            thresholds,
            context: ExecutionContext::default(),
        }
    }

    pub fn total_budget(&self) -> Duration {
        self.total_budget
    }

    pub fn thresholds(&self) -> &StatusThresholds {
        &self.thresholds
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Record the start of the running span if one is not already open.
    pub fn start(&mut self) {
        if self.context.started_at.is_some() {
            return;
        }
        self.context.charged_since_start = Duration::ZERO;
        match self.clock.now() {
            Ok(now) => self.context.started_at = Some(now),
            Err(err) => {
                warn!(error = %err, "Clock unavailable at start; budget treated as exhausted");
                self.context.clock_degraded.set(true);
            }
        }
    }

    /// Charge time the host spent before the tracker started (e.g. checkout).
    pub fn charge(&mut self, spent: Duration) {
        self.context.elapsed_accum += spent;
        self.context.charged_since_start += spent;
    }

    /// Elapsed time this invocation. Never decreases between reads absent a reset.
    pub fn elapsed(&self) -> Duration {
        let running = match self.context.started_at {
            None => Some(Duration::ZERO),
            Some(started) => match self.clock.now() {
                Ok(now) => Some(now.saturating_sub(started)),
                Err(err) => {
                    if !self.context.clock_degraded.replace(true) {
                        warn!(error = %err, "Clock read failed; degrading budget status to CRITICAL");
                    }
                    None
                }
            },
        };
        let high_water = self.context.high_water.get();
        let elapsed = match running {
            Some(running) => (self.context.elapsed_accum + running).max(high_water),
            None => high_water.max(self.context.elapsed_accum),
        };
        self.context.high_water.set(elapsed);
        elapsed
    }

    /// Remaining time against an explicit total. Zero once the clock has failed.
    pub fn remaining(&self, total_budget: Duration) -> Duration {
        let elapsed = self.elapsed();
        if self.context.clock_degraded.get() {
            return Duration::ZERO;
        }
        total_budget.saturating_sub(elapsed)
    }

    /// Remaining time against the configured total.
    pub fn remaining_budget(&self) -> Duration {
        self.remaining(self.total_budget)
    }

    pub fn status(&self) -> TimeStatus {
        let remaining = self.remaining_budget();
        let status = if self.context.clock_degraded.get() {
            TimeStatus::Critical
        } else {
            self.thresholds.classify(remaining)
        };
        self.context.status.set(status);
        status
    }

    pub fn budget_status(&self) -> BudgetReport {
        let status = self.status();
        BudgetReport {
            remaining_seconds: self.remaining_budget().as_secs(),
            status,
            recommendation_text: status.recommendation().to_string(),
        }
    }

    /// True when remaining time is strictly below `floor`.
    pub fn below_floor(&self, floor: Duration) -> bool {
        self.remaining_budget() < floor
    }

    /// Zero the accumulated time and close the running span. Idempotent.
    pub fn reset(&mut self) {
        self.context.started_at = None;
        self.context.elapsed_accum = Duration::ZERO;
        self.context.charged_since_start = Duration::ZERO;
        self.context.high_water.set(Duration::ZERO);
        self.context.clock_degraded.set(false);
        self.context.status.set(TimeStatus::Good);
        self.context.resets += 1;
    }

    /// Open an invocation. The returned guard resets the context when dropped, on
    /// every exit path including unwinding.
    ///
    /// A span left open by an earlier invocation is discarded, but time charged after
    /// it opened belongs to this invocation and is kept.
    pub fn begin_invocation(&mut self) -> InvocationGuard<'_> {
        if self.context.is_stale() {
            let carried = self.context.charged_since_start;
            warn!(
                elapsed_accum_ms = self.context.elapsed_accum.as_millis() as u64,
                carried_ms = carried.as_millis() as u64,
                "Execution context carried state from a previous invocation; resetting"
            );
            self.reset();
            self.context.elapsed_accum = carried;
        }
        self.context.invocations += 1;
        self.start();
        debug!(invocation = self.context.invocations, "Invocation started");
        InvocationGuard { tracker: self }
    }
}

/// Scope of one invocation. Dereferences to the tracker; resets it on drop.
pub struct InvocationGuard<'a> {
    tracker: &'a mut TimeBudgetTracker,
}

impl Deref for InvocationGuard<'_> {
    type Target = TimeBudgetTracker;

    fn deref(&self) -> &Self::Target {
        self.tracker
    }
}

impl DerefMut for InvocationGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.tracker
    }
}

impl Drop for InvocationGuard<'_> {
    fn drop(&mut self) {
        let elapsed = self.tracker.elapsed();
        self.tracker.reset();
        debug!(
            invocation = self.tracker.context.invocations,
            elapsed_ms = elapsed.as_millis() as u64,
            "Invocation finalized; execution context reset"
        );
    }
}
