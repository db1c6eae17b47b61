use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::{
    errors::VerifyError,
    step_map::{StepMap, StepResult},
    trace::Tracer,
};

/// Peaks above this no longer fit in 32 bits.
const OVERFLOW_THRESHOLD: u64 = u32::MAX as u64;

/// Progress updates are batched to keep the bar off the hot path.
const PROGRESS_BATCH: u64 = 1 << 16;

/// Half-open range `[start, stop)` of starting values, with `start` odd.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VerifyRange {
    start: u64,
    stop: u64,
    /// Start as given, before rounding up to odd.
    requested_start: u64,
}

impl VerifyRange {
    /// Even starts (including 0) are bumped to the next odd value; even
    /// starting values are never traced.
    pub fn new(start: u64, stop: u64) -> Result<Self, VerifyError> {
        if start > stop {
            return Err(VerifyError::InvalidRange { start, stop });
        }
        Ok(VerifyRange {
            start: start | 1,
            stop,
            requested_start: start,
        })
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn stop(&self) -> u64 {
        self.stop
    }

    /// Odd starting values in the range, ascending.
    pub fn odd_values(&self) -> impl Iterator<Item = u64> {
        (self.start..self.stop).step_by(2)
    }

    pub fn odd_count(&self) -> u64 {
        self.stop.saturating_sub(self.start).div_ceil(2)
    }

    /// Width of the range as requested, even values included.
    pub fn span(&self) -> u64 {
        self.stop - self.requested_start
    }
}

/// Aggregate figures for one verification run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunStats {
    /// Odd starting values traced.
    pub traced: u64,
    /// Values covered, even ones included.
    pub span: u64,
    pub total_steps: u64,
    /// Longest trajectory and the starting value that produced it.
    pub max_steps: Option<(u64, u64)>,
    /// Starting values whose peak does not fit in 32 bits.
    pub overflows: u64,
    pub elapsed: Duration,
}

impl RunStats {
    fn record(&mut self, value: u64, steps: u64, peak: u64) {
        self.traced += 1;
        self.total_steps += steps;
        if self.max_steps.map_or(true, |(best, _)| steps > best) {
            self.max_steps = Some((steps, value));
        }
        if peak > OVERFLOW_THRESHOLD {
            self.overflows += 1;
        }
    }

    pub fn avg_steps(&self) -> f64 {
        if self.traced == 0 {
            return 0.0;
        }
        self.total_steps as f64 / self.traced as f64
    }

    pub fn overflow_percent(&self) -> f64 {
        if self.traced == 0 {
            return 0.0;
        }
        self.overflows as f64 / self.traced as f64 * 100.0
    }

    /// Values covered per second of compute, even values included.
    pub fn checks_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.span as f64 / secs
    }
}

/// Drives [`Tracer`] over a range, recording every result in a [`StepMap`].
pub struct Verifier {
    tracer: Tracer,
    progress: ProgressBar,
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Verifier {
    pub fn new() -> Self {
        Verifier {
            tracer: Tracer::new(),
            progress: ProgressBar::hidden(),
        }
    }

    /// Reports progress on a visible bar drawn to stderr.
    pub fn with_progress(mut self) -> Self {
        let style = ProgressStyle::with_template(
            "{spinner:.dim} [{bar:30}] {percent:>3}% {human_pos}/{human_len} odd values ({per_sec}, eta {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
        self.progress = ProgressBar::new(0).with_style(style);
        self
    }

    /// Traces every odd value of `range` in ascending order with the value
    /// itself as the memo bound, so lookups only ever see results from smaller
    /// starting values. Aborts on the first trajectory that cycles; `step_map`
    /// then holds every result computed before it.
    #[tracing::instrument(skip(self, step_map))]
    pub fn run(
        &mut self,
        range: VerifyRange,
        step_map: &mut StepMap,
    ) -> Result<RunStats, VerifyError> {
        let mut stats = RunStats {
            span: range.span(),
            ..RunStats::default()
        };
        let total = range.odd_count();
        step_map.reserve(usize::try_from(total).unwrap_or(0));
        self.progress.set_length(total);
        self.progress.set_position(0);
        info!(odd_values = total, "verifying range");

        let started = Instant::now();
        for value in range.odd_values() {
            match self.tracer.trace(value, step_map, value) {
                StepResult::Diverged { peak } => {
                    self.progress.abandon();
                    return Err(VerifyError::Counterexample { start: value, peak });
                }
                result @ StepResult::Terminated { steps, peak } => {
                    if result.to_record().is_none() {
                        self.progress.abandon();
                        return Err(VerifyError::StepCountOverflow { value, steps });
                    }
                    stats.record(value, steps, peak);
                    step_map.insert(value, result);
                }
            }
            if stats.traced % PROGRESS_BATCH == 0 {
                self.progress.set_position(stats.traced);
            }
        }
        stats.elapsed = started.elapsed();
        self.progress.finish_and_clear();

        debug!(?stats, "range verified");
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::trace;

    fn reference(stop: u64) -> StepMap {
        (1..stop)
            .step_by(2)
            .map(|x| (x, trace(x, &StepMap::new(), 0)))
            .collect()
    }

    #[test]
    fn range_normalizes_even_start() {
        let range = VerifyRange::new(0, 10).unwrap();
        assert_eq!(range.start(), 1);
        assert_eq!(range.odd_values().collect::<Vec<_>>(), vec![1, 3, 5, 7, 9]);

        let range = VerifyRange::new(4, 9).unwrap();
        assert_eq!(range.odd_values().collect::<Vec<_>>(), vec![5, 7]);
        assert_eq!(range.odd_count(), 2);
        assert_eq!(range.span(), 5);
    }

    #[test]
    fn range_empty_and_inverted() {
        let range = VerifyRange::new(8, 8).unwrap();
        assert_eq!(range.odd_count(), 0);
        assert_eq!(range.span(), 0);
        assert_eq!(range.odd_values().count(), 0);
        assert!(matches!(
            VerifyRange::new(9, 3),
            Err(VerifyError::InvalidRange { start: 9, stop: 3 })
        ));
    }

    #[test]
    fn run_from_scratch_matches_reference() {
        let mut map = StepMap::new();
        let stats = Verifier::new()
            .run(VerifyRange::new(1, 5_001).unwrap(), &mut map)
            .unwrap();
        assert_eq!(map, reference(5_001));
        assert_eq!(stats.traced, 2_500);
        assert_eq!(stats.span, 5_000);
    }

    #[test]
    fn resumed_run_matches_single_run() {
        let mut verifier = Verifier::new();
        let mut split = StepMap::new();
        verifier
            .run(VerifyRange::new(1, 1_001).unwrap(), &mut split)
            .unwrap();
        verifier
            .run(VerifyRange::new(1_001, 3_001).unwrap(), &mut split)
            .unwrap();

        let mut whole = StepMap::new();
        verifier
            .run(VerifyRange::new(1, 3_001).unwrap(), &mut whole)
            .unwrap();
        assert_eq!(split, whole);
    }

    #[test]
    fn rerun_changes_nothing() {
        let mut verifier = Verifier::new();
        let mut map = StepMap::new();
        verifier
            .run(VerifyRange::new(1, 2_001).unwrap(), &mut map)
            .unwrap();
        let before = map.clone();
        verifier
            .run(VerifyRange::new(1, 2_001).unwrap(), &mut map)
            .unwrap();
        assert_eq!(map, before);
    }

    #[test]
    fn stats_track_steps_and_overflow() {
        let mut map = StepMap::new();
        let stats = Verifier::new()
            .run(VerifyRange::new(1, 30).unwrap(), &mut map)
            .unwrap();
        // 27 has the longest trajectory below 30.
        assert_eq!(stats.max_steps, Some((111, 27)));
        assert_eq!(stats.overflows, 0);
        let total: u64 = (1..30u64)
            .step_by(2)
            .filter_map(|x| map.lookup(x).and_then(|r| r.steps()))
            .sum();
        assert_eq!(stats.total_steps, total);
        assert!((stats.avg_steps() - total as f64 / 15.0).abs() < 1e-9);
    }

    #[test]
    fn stats_count_large_peaks() {
        let mut stats = RunStats::default();
        stats.record(3, 7, 16);
        stats.record(5, 5, u64::from(u32::MAX) + 1);
        assert_eq!(stats.overflows, 1);
        assert_eq!(stats.overflow_percent(), 50.0);
        assert_eq!(stats.max_steps, Some((7, 3)));
    }

    #[test]
    fn checks_per_second_uses_span() {
        let stats = RunStats {
            span: 1_000,
            elapsed: Duration::from_millis(500),
            ..RunStats::default()
        };
        assert_eq!(stats.checks_per_second(), 2_000.0);
        assert_eq!(RunStats::default().checks_per_second(), 0.0);
    }

    #[test]
    fn span_counts_from_requested_start() {
        assert_eq!(VerifyRange::new(0, 10).unwrap().span(), 10);
        assert_eq!(VerifyRange::new(1, 10).unwrap().span(), 9);
        assert_eq!(VerifyRange::new(8, 8).unwrap().span(), 0);

        let mut map = StepMap::new();
        let stats = Verifier::new()
            .run(VerifyRange::new(0, 1_000).unwrap(), &mut map)
            .unwrap();
        assert_eq!(stats.span, 1_000);
        assert_eq!(stats.traced, 500);
    }

    #[test]
    fn unencodable_step_count_aborts_run() {
        // 7 -> 22 -> 11 -> 34 -> 17 -> 52 -> 26 -> 13 -> 40 -> 20 -> 10 -> 5
        let mut map = StepMap::new();
        map.insert(
            5,
            StepResult::Terminated {
                steps: i64::MAX as u64,
                peak: 16,
            },
        );
        let err = Verifier::new()
            .run(VerifyRange::new(7, 9).unwrap(), &mut map)
            .unwrap_err();
        assert!(matches!(
            err,
            VerifyError::StepCountOverflow { value: 7, .. }
        ));
        assert!(!map.contains(7));
    }

    #[test]
    fn counterexample_aborts_run() {
        let start = 0x5555_5555_5555_5555;
        let mut map = StepMap::new();
        let err = Verifier::new()
            .run(VerifyRange::new(start, start + 1).unwrap(), &mut map)
            .unwrap_err();
        assert!(err.is_counterexample());
        match err {
            VerifyError::Counterexample { start: at, peak } => {
                assert_eq!(at, start);
                assert_eq!(peak, start);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!map.contains(start));
    }
}
