//! Synthetic oversampling for small training sets.
//!
//! This inflates volume only. Resampled rows get Gaussian noise on the four
//! core stats and a result recomputed from the noisy goals; nothing about the
//! resulting distribution is guaranteed. Callers must keep synthetic rows out
//! of any evaluation split.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use tracing::info;

use crate::encoding::win_target;
use crate::match_record::{MatchRecord, MatchResult, StatColumn};
use crate::model_data::TrainingRow;

pub const NOISE_SIGMA: f64 = 0.5;

pub trait Perturbable: Clone {
    fn record_mut(&mut self) -> &mut MatchRecord;

    /// Hook for types that cache values derived from the record.
    fn refresh_derived(&mut self) {}

    fn mark_synthetic(&mut self) {}
}

impl Perturbable for MatchRecord {
    fn record_mut(&mut self) -> &mut MatchRecord {
        self
    }
}

impl Perturbable for TrainingRow {
    fn record_mut(&mut self) -> &mut MatchRecord {
        &mut self.record
    }

    fn refresh_derived(&mut self) {
        self.target = win_target(self.record.result);
    }

    fn mark_synthetic(&mut self) {
        self.synthetic = true;
    }
}

/// Returns `rows` followed by `n_synthetic` perturbed resamples.
pub fn augment_data<T: Perturbable>(rows: &[T], n_synthetic: usize, seed: u64) -> Vec<T> {
    let mut out = rows.to_vec();
    if rows.is_empty() || n_synthetic == 0 {
        return out;
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let Ok(noise) = Normal::new(0.0, NOISE_SIGMA) else {
        return out;
    };
    out.reserve(n_synthetic);
    for _ in 0..n_synthetic {
        let mut row = rows[rng.gen_range(0..rows.len())].clone();
        let record = row.record_mut();
        for column in StatColumn::CORE {
            let base = record.stats.get(column).unwrap_or(column.prior());
            let value = (base + noise.sample(&mut rng)).max(0.0);
            record.stats.set(column, value);
        }
        record.result = MatchResult::from_goals(record.stats.goals_for, record.stats.goals_against);
        row.refresh_derived();
        row.mark_synthetic();
        out.push(row);
    }
    info!(original = rows.len(), synthetic = n_synthetic, "augmented training rows");
    out
}
