use std::time::{Duration, Instant};

use crate::config::SearchConfig;

/// Tracks how much of the search budget has been used.
///
/// The budget is a number of evaluated individuals, a wall-clock limit, or
/// both; the search stops as soon as either is exhausted.
#[derive(Debug, Clone)]
pub struct SearchTimeController {
    max_evaluations: Option<u64>,
    max_time: Option<Duration>,
    evaluated: u64,
    started: Option<Instant>,
}

impl SearchTimeController {
    pub fn new(max_evaluations: Option<u64>, max_time: Option<Duration>) -> Self {
        Self {
            max_evaluations: max_evaluations.filter(|m| *m > 0),
            max_time,
            evaluated: 0,
            started: None,
        }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(
            Some(config.max_evaluations),
            config.max_time_seconds.map(Duration::from_secs),
        )
    }

    pub fn start_search(&mut self) {
        self.evaluated = 0;
        self.started = Some(Instant::now());
    }

    pub fn report_executed_individual(&mut self) {
        self.evaluated += 1;
    }

    pub fn evaluated_individuals(&self) -> u64 {
        self.evaluated
    }

    pub fn elapsed(&self) -> Duration {
        self.started.map(|s| s.elapsed()).unwrap_or_default()
    }

    pub fn remaining_time(&self) -> Option<Duration> {
        self.max_time.map(|m| m.saturating_sub(self.elapsed()))
    }

    pub fn should_continue(&self) -> bool {
        if let Some(max) = self.max_evaluations {
            if self.evaluated >= max {
                return false;
            }
        }
        if let Some(max) = self.max_time {
            if self.elapsed() >= max {
                return false;
            }
        }
        self.max_evaluations.is_some() || self.max_time.is_some()
    }

    /// Used share of the budget in [0, 1]; the larger of the two when both are set
    pub fn percentage_used_budget(&self) -> f64 {
        let by_evaluations = self
            .max_evaluations
            .map(|m| self.evaluated as f64 / m as f64)
            .unwrap_or(0.0);
        let by_time = self
            .max_time
            .filter(|m| !m.is_zero())
            .map(|m| self.elapsed().as_secs_f64() / m.as_secs_f64())
            .unwrap_or(0.0);
        by_evaluations.max(by_time).min(1.0)
    }
}
