use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Single source of non-determinism for a search run.
///
/// Every random decision taken by samplers, mutators and genes goes through
/// this type, so a fixed seed reproduces a whole run.
pub struct Randomness {
    rng: StdRng,
}

impl Randomness {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::new(Some(seed))
    }

    /// Coin flip
    pub fn next_bool(&mut self) -> bool {
        self.rng.gen_bool(0.5)
    }

    /// `true` with probability `p`, clamped to [0, 1]
    pub fn next_bool_with(&mut self, p: f64) -> bool {
        if p <= 0.0 {
            return false;
        }
        if p >= 1.0 {
            return true;
        }
        self.rng.gen_bool(p)
    }

    /// Uniform integer in `[min, max]` (both inclusive)
    pub fn next_int(&mut self, min: i64, max: i64) -> i64 {
        if min >= max {
            return min;
        }
        self.rng.gen_range(min..=max)
    }

    /// Uniform over the whole `i64` range
    pub fn next_long(&mut self) -> i64 {
        self.rng.gen::<i64>()
    }

    /// Uniform index in `[0, bound)`
    pub fn next_index(&mut self, bound: usize) -> usize {
        if bound <= 1 {
            return 0;
        }
        self.rng.gen_range(0..bound)
    }

    /// Uniform double in `[0, 1)`
    pub fn next_double(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    pub fn next_double_in(&mut self, min: f64, max: f64) -> f64 {
        if min >= max {
            return min;
        }
        // interpolate, `max - min` overflows on full-range genes
        let t = self.next_double();
        min * (1.0 - t) + max * t
    }

    /// Standard normal sample (Box-Muller)
    pub fn next_gaussian(&mut self) -> f64 {
        let u1 = self.next_double().max(f64::MIN_POSITIVE);
        let u2 = self.next_double();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }

    /// Printable ASCII character
    pub fn next_char(&mut self) -> char {
        self.rng.gen_range(32u8..127u8) as char
    }

    /// Alphanumeric ASCII character
    pub fn next_letter_or_digit(&mut self) -> char {
        const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
        CHARS[self.next_index(CHARS.len())] as char
    }

    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        items.choose(&mut self.rng)
    }

    /// Choose among the first `n` elements only
    pub fn choose_up_to<'a, T>(&mut self, items: &'a [T], n: usize) -> Option<&'a T> {
        let n = n.min(items.len());
        if n == 0 {
            return None;
        }
        items.get(self.next_index(n))
    }

    /// Weighted choice; non-positive weights are never chosen unless all are
    pub fn choose_weighted<'a, T>(&mut self, items: &'a [(T, f64)]) -> Option<&'a T> {
        let total: f64 = items.iter().map(|(_, w)| w.max(0.0)).sum();
        if total <= 0.0 {
            return self.choose(items).map(|(t, _)| t);
        }

        let mut spin = self.next_double() * total;
        for (item, weight) in items {
            spin -= weight.max(0.0);
            if spin <= 0.0 {
                return Some(item);
            }
        }

        items.iter().rev().find(|(_, w)| *w > 0.0).map(|(t, _)| t)
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.rng);
    }
}
