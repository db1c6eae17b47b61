use fnv::FnvHashMap;

use crate::errors::VerifyError;

/// Outcome of tracing one starting value.
///
/// Checkpoints encode this as a `(steps, peak)` pair where `steps == -1` marks a
/// trajectory that cycled before reaching 1; see [`StepResult::to_record`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StepResult {
    /// The trajectory reached 1 after `steps` steps (every halving counts as one).
    Terminated { steps: u64, peak: u64 },
    /// The trajectory revisited a value without reaching 1.
    Diverged { peak: u64 },
}

impl StepResult {
    /// Step count written to checkpoints for a diverged trajectory.
    pub const DIVERGED_STEPS: i64 = -1;

    pub fn peak(&self) -> u64 {
        match self {
            StepResult::Terminated { peak, .. } | StepResult::Diverged { peak } => *peak,
        }
    }

    pub fn steps(&self) -> Option<u64> {
        match self {
            StepResult::Terminated { steps, .. } => Some(*steps),
            StepResult::Diverged { .. } => None,
        }
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, StepResult::Terminated { .. })
    }

    /// The result of a trajectory that lands on the value `self` describes after
    /// `steps` steps, having already seen `peak` along the way. The step count
    /// saturates at `u64::MAX`; anything past `i64::MAX` is refused on export.
    #[inline]
    pub fn after(self, steps: u64, peak: u64) -> StepResult {
        match self {
            StepResult::Terminated {
                steps: rest,
                peak: rest_peak,
            } => StepResult::Terminated {
                steps: steps.saturating_add(rest),
                peak: peak.max(rest_peak),
            },
            StepResult::Diverged { peak: rest_peak } => StepResult::Diverged {
                peak: peak.max(rest_peak),
            },
        }
    }

    /// Checkpoint `(steps, peak)` encoding, or `None` when the step count does
    /// not fit the signed column.
    pub fn to_record(&self) -> Option<(i64, u64)> {
        match self {
            StepResult::Terminated { steps, peak } => {
                i64::try_from(*steps).ok().map(|steps| (steps, *peak))
            }
            StepResult::Diverged { peak } => Some((Self::DIVERGED_STEPS, *peak)),
        }
    }

    /// Decodes a checkpoint `(steps, peak)` pair. Any negative step count other
    /// than `-1` is rejected; the caller attaches line information.
    pub fn from_record(steps: i64, peak: u64) -> Result<StepResult, String> {
        match steps {
            Self::DIVERGED_STEPS => Ok(StepResult::Diverged { peak }),
            s if s < 0 => Err(format!("negative step count {s}")),
            s => Ok(StepResult::Terminated {
                steps: s as u64,
                peak,
            }),
        }
    }
}

/// Memo table from starting value to its final [`StepResult`].
///
/// Entries are only ever inserted once their result is final; nothing is removed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StepMap {
    entries: FnvHashMap<u64, StepResult>,
}

impl StepMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        StepMap {
            entries: FnvHashMap::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    #[inline]
    pub fn lookup(&self, key: u64) -> Option<StepResult> {
        self.entries.get(&key).copied()
    }

    #[inline]
    pub fn insert(&mut self, key: u64, result: StepResult) {
        self.entries.insert(key, result);
    }

    pub fn contains(&self, key: u64) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn reserve(&mut self, additional: usize) {
        self.entries.reserve(additional);
    }

    /// Unordered iteration over every stored entry.
    pub fn iter(&self) -> impl Iterator<Item = (u64, StepResult)> + '_ {
        self.entries.iter().map(|(k, v)| (*k, *v))
    }

    /// Smallest odd value in `[1, stop)` with no entry.
    pub fn first_missing_odd(&self, stop: u64) -> Option<u64> {
        (1..stop).step_by(2).find(|key| !self.contains(*key))
    }

    /// Fails with [`VerifyError::MissingEntry`] unless every odd value below
    /// `stop` is resolved.
    pub fn ensure_covers(&self, stop: u64) -> Result<(), VerifyError> {
        match self.first_missing_odd(stop) {
            Some(missing) => Err(VerifyError::MissingEntry(missing)),
            None => Ok(()),
        }
    }

    /// Lookup for values the caller guarantees are resolved.
    pub(crate) fn require(&self, key: u64) -> Result<StepResult, VerifyError> {
        self.lookup(key).ok_or(VerifyError::MissingEntry(key))
    }
}

impl FromIterator<(u64, StepResult)> for StepMap {
    fn from_iter<I: IntoIterator<Item = (u64, StepResult)>>(iter: I) -> Self {
        StepMap {
            entries: iter.into_iter().collect(),
        }
    }
}
