use serde::Serialize;

use crate::models::submission::Submission;
use crate::models::types::GradingStatus;

pub(crate) const PASS_SCORE: f64 = 5.0;
const EXCELLENT_SCORE: f64 = 9.0;
const GOOD_SCORE: f64 = 7.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub(crate) struct ScoreDistribution {
    pub(crate) excellent: usize,
    pub(crate) good: usize,
    pub(crate) average: usize,
    pub(crate) poor: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub(crate) struct BatchAggregate {
    pub(crate) total: usize,
    pub(crate) graded_count: usize,
    pub(crate) idle_count: usize,
    pub(crate) processing_count: usize,
    pub(crate) error_count: usize,
    pub(crate) average_score: f64,
    pub(crate) pass_rate: u32,
    pub(crate) distribution: ScoreDistribution,
}

/// Class-level statistics over the current working set. Recomputed on every
/// call; nothing is cached.
pub(crate) fn compute_aggregate(submissions: &[Submission]) -> BatchAggregate {
    let mut aggregate = BatchAggregate { total: submissions.len(), ..BatchAggregate::default() };
    let mut score_sum = 0.0;
    let mut passed = 0usize;

    for submission in submissions {
        match submission.status() {
            GradingStatus::Idle => aggregate.idle_count += 1,
            GradingStatus::Processing => aggregate.processing_count += 1,
            GradingStatus::Error => aggregate.error_count += 1,
            GradingStatus::Completed => {}
        }

        let Some(result) = submission.result() else {
            continue;
        };
        let score = result.score;

        aggregate.graded_count += 1;
        score_sum += score;
        if score >= PASS_SCORE {
            passed += 1;
        }

        let bucket = if score >= EXCELLENT_SCORE {
            &mut aggregate.distribution.excellent
        } else if score >= GOOD_SCORE {
            &mut aggregate.distribution.good
        } else if score >= PASS_SCORE {
            &mut aggregate.distribution.average
        } else {
            &mut aggregate.distribution.poor
        };
        *bucket += 1;
    }

    if aggregate.graded_count > 0 {
        let graded = aggregate.graded_count as f64;
        aggregate.average_score = round_to_tenth(score_sum / graded);
        aggregate.pass_rate = (passed as f64 / graded * 100.0).round() as u32;
    }

    aggregate
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
