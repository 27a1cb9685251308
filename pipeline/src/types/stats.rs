use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// Counters of a pipeline run.
///
/// Only the writer mutates the global instance. Partial counts from several runs combine
/// with `+`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Tasks taken off the work queue and processed by a worker.
    pub count_input: u64,
    /// Records written to the output.
    pub count_output: u64,
    /// Tasks whose transform failed.
    pub count_error: u64,
}

impl Stats {
    /// Counts of one successful task producing `outputs` records.
    pub fn success(outputs: usize) -> Self {
        Self {
            count_input: 1,
            count_output: outputs as u64,
            count_error: 0,
        }
    }

    /// Counts of one failed task.
    pub fn failure() -> Self {
        Self {
            count_input: 1,
            count_output: 0,
            count_error: 1,
        }
    }
}

impl Add for Stats {
    type Output = Stats;

    fn add(self, rhs: Stats) -> Stats {
        Stats {
            count_input: self.count_input + rhs.count_input,
            count_output: self.count_output + rhs.count_output,
            count_error: self.count_error + rhs.count_error,
        }
    }
}

impl AddAssign for Stats {
    fn add_assign(&mut self, rhs: Stats) {
        *self = *self + rhs;
    }
}

impl Sum for Stats {
    fn sum<I: Iterator<Item = Stats>>(iter: I) -> Stats {
        iter.fold(Stats::default(), Add::add)
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "input={} output={} error={}",
            self.count_input, self.count_output, self.count_error
        )
    }
}
