/// Adaptive parameter control.
///
/// Parameters move linearly from an exploratory `start` value to an
/// exploitative `end` value as the search budget is consumed, reaching `end`
/// once the focused-search phase begins.
#[derive(Debug, Clone)]
pub struct AdaptiveParameterControl {
    focused_search_activation_time: f64,
    progress: f64,
}

impl AdaptiveParameterControl {
    pub fn new(focused_search_activation_time: f64) -> Self {
        Self {
            focused_search_activation_time: focused_search_activation_time.max(0.0).min(1.0),
            progress: 0.0,
        }
    }

    /// Fraction of the budget used so far, in [0, 1]
    pub fn set_progress(&mut self, progress: f64) {
        self.progress = progress.max(0.0).min(1.0);
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn is_focused_search(&self) -> bool {
        self.progress >= self.focused_search_activation_time
    }

    pub fn get_exploratory_value(&self, start: usize, end: usize) -> usize {
        self.get_base_probability(start as f64, end as f64).round().max(0.0) as usize
    }

    pub fn get_base_probability(&self, start: f64, end: f64) -> f64 {
        let threshold = self.focused_search_activation_time;
        if self.progress >= threshold || threshold <= 0.0 {
            return end;
        }
        let scale = (threshold - self.progress) / threshold;
        end + scale * (start - end)
    }
}

impl Default for AdaptiveParameterControl {
    fn default() -> Self {
        Self::new(0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exploratory_value_moves_to_end() {
        let mut apc = AdaptiveParameterControl::new(0.5);
        assert_eq!(apc.get_exploratory_value(31, 10), 31);

        apc.set_progress(0.25);
        assert_eq!(apc.get_exploratory_value(30, 10), 20);

        apc.set_progress(0.8);
        assert_eq!(apc.get_exploratory_value(31, 10), 10);
        assert!(apc.is_focused_search());
    }

    #[test]
    fn test_base_probability() {
        let mut apc = AdaptiveParameterControl::new(0.5);
        assert!((apc.get_base_probability(0.5, 0.0) - 0.5).abs() < 1e-9);
        apc.set_progress(1.0);
        assert_eq!(apc.get_base_probability(0.5, 0.0), 0.0);
    }
}
