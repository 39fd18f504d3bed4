// Evaluation Metrics — top-k classification accuracy
//
// Scores are `[B, num_classes]` row-major probabilities or logits; targets
// are true class indices. A one-hot bridge converts label matrices coming
// out of the batch generators.

/// Fraction of samples whose true class is among the k highest scores.
pub fn top_k_accuracy(scores: &[f64], targets: &[usize], num_classes: usize, k: usize) -> f64 {
    let n = targets.len();
    if n == 0 {
        return 0.0;
    }
    let mut correct = 0usize;
    for (i, &target) in targets.iter().enumerate() {
        let row = &scores[i * num_classes..(i + 1) * num_classes];
        let mut ranked: Vec<usize> = (0..num_classes).collect();
        ranked.sort_unstable_by(|&a, &b| {
            row[b].partial_cmp(&row[a]).unwrap_or(std::cmp::Ordering::Equal)
        });
        if ranked[..k.min(num_classes)].contains(&target) {
            correct += 1;
        }
    }
    correct as f64 / n as f64
}

/// Turn a one-hot `[B, num_classes]` label matrix into class indices.
///
/// Rows with no set column fall back to class zero; generators never emit
/// such rows.
pub fn one_hot_to_indices(labels: &[i32], num_classes: usize) -> Vec<usize> {
    labels
        .chunks_exact(num_classes)
        .map(|row| row.iter().position(|&v| v != 0).unwrap_or(0))
        .collect()
}

/// A named metric evaluated at the end of each epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// Top-k categorical accuracy.
    TopK(usize),
}

impl Metric {
    /// Column name used by the CSV logger.
    pub fn name(&self) -> String {
        match self {
            Metric::TopK(1) => "acc".to_string(),
            Metric::TopK(k) => format!("top_{k}_acc"),
        }
    }

    pub fn evaluate(&self, scores: &[f64], targets: &[usize], num_classes: usize) -> f64 {
        match *self {
            Metric::TopK(k) => top_k_accuracy(scores, targets, num_classes, k),
        }
    }
}

/// The standard classification pair: top-1 and top-5 accuracy.
pub fn default_metrics() -> Vec<Metric> {
    vec![Metric::TopK(1), Metric::TopK(5)]
}

#[cfg(test)]
mod tests {
    use super::*;

    // 3 samples, 4 classes
    fn scores() -> Vec<f64> {
        vec![
            0.7, 0.1, 0.1, 0.1, // argmax 0
            0.1, 0.2, 0.6, 0.1, // argmax 2
            0.3, 0.4, 0.2, 0.1, // argmax 1, runner-up 0
        ]
    }

    #[test]
    fn top_1_counts_exact_argmax() {
        let acc = top_k_accuracy(&scores(), &[0, 2, 0], 4, 1);
        assert!((acc - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn top_2_admits_the_runner_up() {
        let acc = top_k_accuracy(&scores(), &[0, 2, 0], 4, 2);
        assert_eq!(acc, 1.0);
    }

    #[test]
    fn k_larger_than_classes_is_always_correct() {
        let acc = top_k_accuracy(&scores(), &[3, 3, 3], 4, 10);
        assert_eq!(acc, 1.0);
    }

    #[test]
    fn empty_batch_scores_zero() {
        assert_eq!(top_k_accuracy(&[], &[], 4, 1), 0.0);
    }

    #[test]
    fn one_hot_bridge() {
        let labels = vec![0, 1, 0, 0, 0, 0, 0, 1];
        assert_eq!(one_hot_to_indices(&labels, 4), vec![1, 3]);
    }

    #[test]
    fn metric_names() {
        assert_eq!(Metric::TopK(1).name(), "acc");
        assert_eq!(Metric::TopK(5).name(), "top_5_acc");
        let names: Vec<String> = default_metrics().iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["acc", "top_5_acc"]);
    }
}
