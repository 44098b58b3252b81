use super::apc::AdaptiveParameterControl;
use super::randomness::Randomness;

/// Weighted selection of the subset of genes to mutate
#[derive(Debug, Clone)]
pub struct MutationWeightControl {
    /// Share of candidates mutated at the very start of the search
    starting_percentage_of_genes_to_mutate: f64,
}

impl MutationWeightControl {
    pub fn new(starting_percentage_of_genes_to_mutate: f64) -> Self {
        Self {
            starting_percentage_of_genes_to_mutate: starting_percentage_of_genes_to_mutate.max(0.0).min(1.0),
        }
    }

    /// Pick a non-empty subset of `candidates` (when there is at least one),
    /// each one with probability proportional to its weight. The expected
    /// subset size shrinks towards 1 as the search progresses.
    pub fn select_sub_genes<T: Clone>(
        &self,
        candidates: &[(T, f64)],
        rng: &mut Randomness,
        apc: &AdaptiveParameterControl,
    ) -> Vec<T> {
        if candidates.is_empty() {
            return Vec::new();
        }
        if candidates.len() == 1 {
            return vec![candidates[0].0.clone()];
        }

        let start = (self.starting_percentage_of_genes_to_mutate * candidates.len() as f64).max(1.0);
        let num_to_mutate = apc.get_base_probability(start, 1.0);
        let total: f64 = candidates.iter().map(|(_, w)| w.max(0.0)).sum();

        let mut selected = Vec::new();
        if total > 0.0 {
            for (c, w) in candidates {
                if rng.next_bool_with(num_to_mutate * w.max(0.0) / total) {
                    selected.push(c.clone());
                }
            }
        }

        if selected.is_empty() {
            if let Some(c) = rng.choose_weighted(candidates) {
                selected.push(c.clone());
            }
        }
        selected
    }
}

impl Default for MutationWeightControl {
    fn default() -> Self {
        Self::new(0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_empty() {
        let mwc = MutationWeightControl::default();
        let apc = AdaptiveParameterControl::default();
        let mut rng = Randomness::with_seed(5);
        let candidates = vec![("a", 1.0), ("b", 1.0), ("c", 5.0)];
        for _ in 0..200 {
            assert!(!mwc.select_sub_genes(&candidates, &mut rng, &apc).is_empty());
        }
    }

    #[test]
    fn test_heavier_gene_selected_more_often() {
        let mwc = MutationWeightControl::default();
        let mut apc = AdaptiveParameterControl::default();
        apc.set_progress(1.0);
        let mut rng = Randomness::with_seed(6);
        let candidates = vec![("light", 1.0), ("heavy", 9.0)];

        let mut heavy = 0;
        for _ in 0..1000 {
            if mwc.select_sub_genes(&candidates, &mut rng, &apc).contains(&"heavy") {
                heavy += 1;
            }
        }
        assert!(heavy > 700);
    }
}
