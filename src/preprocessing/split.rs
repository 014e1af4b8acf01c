//! Train/validation/test partitioning

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::{Subset, Table};
use crate::error::{Result, WorkbenchError};

const STEP: &str = "split";
const TOLERANCE: f64 = 1e-6;
pub const DEFAULT_SEED: u64 = 42;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitParams {
    #[serde(alias = "train_size", default = "default_train")]
    pub train: f64,
    #[serde(alias = "validation_size", alias = "val", default = "default_holdout")]
    pub validation: f64,
    #[serde(alias = "test_size", default = "default_holdout")]
    pub test: f64,
    #[serde(alias = "random_state", default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_train() -> f64 {
    0.7
}

fn default_holdout() -> f64 {
    0.15
}

impl Default for SplitParams {
    fn default() -> Self {
        Self {
            train: default_train(),
            validation: default_holdout(),
            test: default_holdout(),
            seed: None,
        }
    }
}

/// Number of rows per subset for `n` rows
pub fn partition_sizes(n: usize, train: f64, validation: f64) -> (usize, usize, usize) {
    let n_train = ((n as f64) * train).round() as usize;
    let n_train = n_train.min(n);
    let n_val = (((n as f64) * validation).round() as usize).min(n - n_train);
    (n_train, n_val, n - n_train - n_val)
}

/// Subset tag per row after a seeded shuffle of the row indices
pub fn assign_subsets(n: usize, train: f64, validation: f64, seed: u64) -> Vec<Subset> {
    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    order.shuffle(&mut rng);

    let (n_train, n_val, n_test) = partition_sizes(n, train, validation);
    let mut subsets = vec![Subset::Test; n];
    for (rank, &row) in order.iter().enumerate() {
        subsets[row] = if rank < n_train {
            Subset::Train
        } else if rank < n_train + n_val {
            Subset::Validation
        } else {
            Subset::Test
        };
    }
    debug!(seed, train = n_train, validation = n_val, test = n_test, "split rows");
    subsets
}

pub(crate) fn split(table: &mut Table, params: &mut SplitParams) -> Result<()> {
    let fractions = [params.train, params.validation, params.test];
    if fractions.iter().any(|f| !(0.0..=1.0).contains(f)) {
        return Err(WorkbenchError::pipeline_step(
            STEP,
            None,
            format!("fractions must lie in [0, 1], got {:?}", fractions),
        ));
    }
    let total: f64 = fractions.iter().sum();
    if (total - 1.0).abs() > TOLERANCE {
        return Err(WorkbenchError::pipeline_step(
            STEP,
            None,
            format!("fractions must sum to 1, got {}", total),
        ));
    }

    let seed = *params.seed.get_or_insert(DEFAULT_SEED);
    let subsets = assign_subsets(table.n_rows(), params.train, params.validation, seed);

    table
        .set_subsets(subsets)
        .map_err(|e| WorkbenchError::pipeline_step(STEP, None, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Column;

    fn table(n: usize) -> Table {
        Table::new(vec![Column::numeric("x", (0..n).map(|i| i as f64).collect())]).unwrap()
    }

    #[test]
    fn test_split_sizes_within_one_row() {
        let mut t = table(101);
        let mut params = SplitParams::default();
        split(&mut t, &mut params).unwrap();

        let subsets = t.subsets().unwrap();
        let count = |s: Subset| subsets.iter().filter(|x| **x == s).count();
        let (tr, va, te) = (count(Subset::Train), count(Subset::Validation), count(Subset::Test));
        assert_eq!(tr + va + te, 101);
        assert!((tr as f64 - 70.7).abs() <= 1.0);
        assert!((va as f64 - 15.15).abs() <= 1.0);
        assert!((te as f64 - 15.15).abs() <= 1.0);
        assert_eq!(params.seed, Some(DEFAULT_SEED));
    }

    #[test]
    fn test_split_is_deterministic() {
        let mut a = table(50);
        let mut b = table(50);
        split(&mut a, &mut SplitParams { seed: Some(7), ..Default::default() }).unwrap();
        split(&mut b, &mut SplitParams { seed: Some(7), ..Default::default() }).unwrap();
        assert_eq!(a.subsets(), b.subsets());
    }

    #[test]
    fn test_fractions_must_sum_to_one() {
        let mut t = table(10);
        let mut params = SplitParams {
            train: 0.6,
            validation: 0.2,
            test: 0.1,
            seed: None,
        };
        let err = split(&mut t, &mut params).unwrap_err();
        assert!(matches!(err, WorkbenchError::PipelineStep { ref step, .. } if step == "split"));
    }
}
