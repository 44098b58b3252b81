use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::individual::Individual;
use crate::types::TargetId;

/// Heuristic distance of every target reached by one execution; 0 means covered
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitnessValue {
    targets: BTreeMap<TargetId, f64>,
}

impl FitnessValue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `distance` for `target`, keeping the smallest one seen
    pub fn update_target(&mut self, target: TargetId, distance: f64) {
        let distance = if distance.is_nan() { f64::MAX } else { distance.max(0.0) };
        let entry = self.targets.entry(target).or_insert(distance);
        if distance < *entry {
            *entry = distance;
        }
    }

    pub fn cover_target(&mut self, target: TargetId) {
        self.update_target(target, 0.0);
    }

    pub fn distance(&self, target: TargetId) -> Option<f64> {
        self.targets.get(&target).copied()
    }

    pub fn is_covered(&self, target: TargetId) -> bool {
        self.distance(target) == Some(0.0)
    }

    pub fn targets(&self) -> impl Iterator<Item = (TargetId, f64)> + '_ {
        self.targets.iter().map(|(t, d)| (*t, *d))
    }

    pub fn covered_targets(&self) -> Vec<TargetId> {
        self.targets().filter(|(_, d)| *d == 0.0).map(|(t, _)| t).collect()
    }

    pub fn covered_count(&self) -> usize {
        self.targets.values().filter(|d| **d == 0.0).count()
    }
}

/// Raw outcome of executing one action
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub status_code: Option<u16>,
    /// Location of a resource created by the action
    pub location: Option<String>,
    /// The remaining actions were not executed
    pub stopping: bool,
}

/// Individual with the result of its execution; never modified once built
#[derive(Debug, Clone)]
pub struct EvaluatedIndividual {
    pub individual: Individual,
    pub fitness: FitnessValue,
    pub results: Vec<ActionResult>,
}

impl EvaluatedIndividual {
    pub fn new(individual: Individual, fitness: FitnessValue, results: Vec<ActionResult>) -> Self {
        Self {
            individual,
            fitness,
            results,
        }
    }

    pub fn size(&self) -> usize {
        self.individual.size()
    }
}

/// Executes individuals against the system under test
pub trait FitnessFunction {
    /// Execute `individual` and report the distance of every target reached.
    /// `None` when it could not be executed at all.
    fn calculate_coverage(&mut self, individual: &Individual) -> Option<FitnessValue>;

    /// Raw action results of the last execution, when the executor keeps them
    fn take_action_results(&mut self) -> Vec<ActionResult> {
        Vec::new()
    }

    fn evaluate(&mut self, individual: Individual) -> Option<EvaluatedIndividual> {
        let fitness = self.calculate_coverage(&individual)?;
        let results = self.take_action_results();
        Some(EvaluatedIndividual::new(individual, fitness, results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_keeps_best_distance() {
        let mut fv = FitnessValue::new();
        fv.update_target(1, 0.5);
        fv.update_target(1, 0.8);
        assert_eq!(fv.distance(1), Some(0.5));
        fv.cover_target(1);
        fv.update_target(2, -3.0);
        assert!(fv.is_covered(1));
        assert_eq!(fv.covered_targets(), vec![1, 2]);
        assert_eq!(fv.distance(3), None);
    }
}
