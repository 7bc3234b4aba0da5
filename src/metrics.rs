use serde::{Deserialize, Serialize};

pub const DECISION_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinaryMetrics {
    pub samples: usize,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub auc: f64,
    pub brier: f64,
    pub log_loss: f64,
}

pub fn predicted_label(p: f64) -> u8 {
    u8::from(p > DECISION_THRESHOLD)
}

/// Scores win probabilities against 0/1 outcomes. Undefined ratios are 0.
pub fn evaluate_binary(probs: &[f64], targets: &[u8]) -> BinaryMetrics {
    let n = probs.len().min(targets.len());
    if n == 0 {
        return BinaryMetrics {
            samples: 0,
            accuracy: 0.0,
            precision: 0.0,
            recall: 0.0,
            f1: 0.0,
            auc: 0.5,
            brier: 0.0,
            log_loss: 0.0,
        };
    }

    let (mut tp, mut fp, mut fn_, mut correct) = (0usize, 0usize, 0usize, 0usize);
    let mut brier_sum = 0.0_f64;
    let mut log_loss_sum = 0.0_f64;
    for (&p, &t) in probs.iter().zip(targets).take(n) {
        let label = predicted_label(p);
        match (label, t) {
            (1, 1) => tp += 1,
            (1, _) => fp += 1,
            (_, 1) => fn_ += 1,
            _ => {}
        }
        if label == t {
            correct += 1;
        }
        let y = f64::from(t);
        brier_sum += (p - y).powi(2);
        let actual = if t == 1 { p } else { 1.0 - p };
        log_loss_sum += -actual.clamp(1e-12, 1.0).ln();
    }

    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    let nf = n as f64;
    BinaryMetrics {
        samples: n,
        accuracy: correct as f64 / nf,
        precision,
        recall,
        f1,
        auc: roc_auc(&probs[..n], &targets[..n]),
        brier: brier_sum / nf,
        log_loss: log_loss_sum / nf,
    }
}

/// Area under the ROC curve via the rank-sum statistic, ties averaged.
/// Returns 0.5 when only one class is present.
pub fn roc_auc(probs: &[f64], targets: &[u8]) -> f64 {
    let positives = targets.iter().filter(|&&t| t == 1).count();
    let negatives = targets.len() - positives;
    if positives == 0 || negatives == 0 {
        return 0.5;
    }

    let mut order: Vec<usize> = (0..probs.len()).collect();
    order.sort_by(|&a, &b| probs[a].total_cmp(&probs[b]));

    let mut rank_sum = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && probs[order[j + 1]] == probs[order[i]] {
            j += 1;
        }
        // ranks are 1-based; a tie group shares the mean rank
        let mean_rank = (i + j) as f64 / 2.0 + 1.0;
        for &k in &order[i..=j] {
            if targets[k] == 1 {
                rank_sum += mean_rank;
            }
        }
        i = j + 1;
    }

    let p = positives as f64;
    (rank_sum - p * (p + 1.0) / 2.0) / (p * negatives as f64)
}
