use super::kind::{EnumGene, IntegerGene};
use super::spec::{GeneSpec, SpecKind};
use crate::error::{Result, SearchError};

impl IntegerGene {
    /// Range satisfying every lower and upper bound: the largest lower bound
    /// and the smallest upper bound. Missing bounds default to the i32 range.
    pub fn from_bounds(lower_bounds: &[i32], upper_bounds: &[i32]) -> Result<Self> {
        let min = lower_bounds.iter().copied().max().unwrap_or(i32::MIN);
        let max = upper_bounds.iter().copied().min().unwrap_or(i32::MAX);
        if min > max {
            return Err(SearchError::EmptyDomain(format!(
                "lower bound {} is above upper bound {}",
                min, max
            )));
        }
        let value = if min > 0 {
            min
        } else if max < 0 {
            max
        } else {
            0
        };
        Ok(Self { value, min, max })
    }
}

impl EnumGene {
    /// Values allowed by all the given sets, in the order of the first one
    pub fn from_constraints(sets: &[Vec<String>]) -> Result<Self> {
        let first = match sets.first() {
            Some(f) => f,
            None => return Err(SearchError::EmptyDomain("no enum constraint given".to_string())),
        };

        let mut values: Vec<String> = Vec::new();
        for v in first {
            if sets[1..].iter().all(|s| s.contains(v)) && !values.contains(v) {
                values.push(v.clone());
            }
        }

        if values.is_empty() {
            return Err(SearchError::EmptyDomain(format!(
                "no value satisfies all of {:?}",
                sets
            )));
        }
        Ok(Self { values, index: 0 })
    }
}

impl GeneSpec {
    pub fn integer_from_bounds(name: &str, lower_bounds: &[i32], upper_bounds: &[i32]) -> Result<Self> {
        Ok(Self::new(
            name,
            SpecKind::Integer(IntegerGene::from_bounds(lower_bounds, upper_bounds)?),
        ))
    }

    pub fn enum_from_constraints(name: &str, sets: &[Vec<String>]) -> Result<Self> {
        Ok(Self::new(name, SpecKind::Enum(EnumGene::from_constraints(sets)?)))
    }
}
