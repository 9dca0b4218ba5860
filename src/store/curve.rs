use super::RunRecord;
use crate::NNVFloat;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mean metrics over every record sharing one epsilon.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct RobustnessCurvePoint {
    pub epsilon: NNVFloat,
    pub avg_clean_accuracy: NNVFloat,
    pub avg_robust_accuracy: NNVFloat,
    pub avg_attack_success_rate: NNVFloat,
    pub num_tests: usize,
}

#[derive(Default)]
struct Sums {
    clean: NNVFloat,
    robust: NNVFloat,
    success: NNVFloat,
    count: usize,
}

/// Groups `records` by exact epsilon and averages each group, ascending by
/// epsilon. Epsilons that differ in their last bit land in separate points.
pub fn aggregate_curve(records: &[RunRecord]) -> Vec<RobustnessCurvePoint> {
    let mut groups: BTreeMap<OrderedFloat<NNVFloat>, Sums> = BTreeMap::new();
    for run in records {
        let sums = groups.entry(OrderedFloat(run.record.epsilon)).or_default();
        sums.clean += run.record.clean_accuracy;
        sums.robust += run.record.robust_accuracy;
        sums.success += run.record.attack_success_rate;
        sums.count += 1;
    }
    groups
        .into_iter()
        .map(|(epsilon, sums)| {
            let n = sums.count as NNVFloat;
            RobustnessCurvePoint {
                epsilon: epsilon.into_inner(),
                avg_clean_accuracy: sums.clean / n,
                avg_robust_accuracy: sums.robust / n,
                avg_attack_success_rate: sums.success / n,
                num_tests: sums.count,
            }
        })
        .collect()
}
