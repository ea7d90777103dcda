use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Default per-tick time budget.
pub const DEFAULT_TIME_BUDGET: Duration = Duration::from_millis(32);

/// The time one host tick may spend advancing tasks, shared by every task
/// resumed during that tick.
#[derive(Debug, Clone, Copy)]
pub struct TickBudget {
    budget: Duration,
    started: Instant,
}

impl TickBudget {
    /// Start measuring a tick with `budget` to spend.
    pub fn start(budget: Duration) -> Self {
        Self {
            budget,
            started: Instant::now(),
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.elapsed())
    }

    pub fn is_exhausted(&self) -> bool {
        self.elapsed() >= self.budget
    }

    /// Fair share of the remaining budget for the next of `tasks_left` tasks.
    pub fn slice(&self, tasks_left: usize) -> Duration {
        match tasks_left {
            0 | 1 => self.remaining(),
            n => self.remaining() / n as u32,
        }
    }
}

/// Durations of the most recent pumps, oldest evicted first.
#[derive(Debug)]
pub struct TickTimer {
    samples: VecDeque<Duration>,
    capacity: usize,
}

impl Default for TickTimer {
    fn default() -> Self {
        Self::new(64)
    }
}

impl TickTimer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, elapsed: Duration) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(elapsed);
    }

    /// Zero until something was recorded.
    pub fn average(&self) -> Duration {
        match u32::try_from(self.samples.len()) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(n) => self.samples.iter().sum::<Duration>() / n,
        }
    }

    pub fn max(&self) -> Duration {
        self.samples.iter().max().copied().unwrap_or_default()
    }

    pub fn min(&self) -> Duration {
        self.samples.iter().min().copied().unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }

    pub fn last(&self) -> Option<Duration> {
        self.samples.back().copied()
    }
}
