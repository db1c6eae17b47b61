use fnv::FnvHashSet;

use crate::step_map::{StepMap, StepResult};

/// Step-counting kernel. Owns the visited set so its allocation is reused
/// across calls; the set itself never outlives a single [`Tracer::trace`].
#[derive(Debug, Default)]
pub struct Tracer {
    visited: FnvHashSet<u64>,
}

impl Tracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts the steps from `start` to 1 and the largest value seen on the way.
    ///
    /// Runs of halvings are collapsed with a single shift. Once the trajectory
    /// drops to an odd value below `lower_bound`, `step_map` is consulted and a
    /// hit is composed onto the steps taken so far. A miss is not fatal: tracing
    /// simply continues, so the result never depends on how complete the map is.
    ///
    /// `3x + 1` wraps at 64 bits. A wrap onto 0 is reported as
    /// [`StepResult::Diverged`], since 0 halves to itself forever.
    pub fn trace(&mut self, start: u64, step_map: &StepMap, lower_bound: u64) -> StepResult {
        self.visited.clear();

        let mut x = start;
        let mut steps: u64 = 0;
        let mut peak = start;

        loop {
            if !self.visited.insert(x) || x == 0 {
                return StepResult::Diverged { peak };
            }

            let zeros = x.trailing_zeros();
            steps += zeros as u64;
            x >>= zeros;

            if x == 1 {
                return StepResult::Terminated { steps, peak };
            }

            if x < lower_bound {
                if let Some(known) = step_map.lookup(x) {
                    return known.after(steps, peak);
                }
            }

            steps += 1;
            x = x.wrapping_mul(3).wrapping_add(1);
            peak = peak.max(x);
        }
    }
}

/// One-shot [`Tracer::trace`] with a fresh visited set.
pub fn trace(start: u64, step_map: &StepMap, lower_bound: u64) -> StepResult {
    Tracer::new().trace(start, step_map, lower_bound)
}
