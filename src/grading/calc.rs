//! Pure grade arithmetic
//!
//! Every function here is side-effect free; the engine feeds it rows loaded
//! from the database and persists what comes back.

use crate::utils::round2;

/// Full-mark value of a task score when nothing else is configured
pub const DEFAULT_TASK_SCORE_SCALE: f64 = 100.0;

/// One task as seen by the aggregation: its weight and the student's score
/// (0 when the student has no score row for it).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedScore {
    pub score: f64,
    pub weight: i32,
}

impl WeightedScore {
    pub fn new(score: f64, weight: i32) -> Self {
        Self { score, weight }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradingPolicy {
    pub task_score_scale: f64,
}

impl Default for GradingPolicy {
    fn default() -> Self {
        Self {
            task_score_scale: DEFAULT_TASK_SCORE_SCALE,
        }
    }
}

impl GradingPolicy {
    pub fn from_config() -> Self {
        let scale = crate::config::get_config().grading.task_score_scale;
        if scale > 0.0 {
            Self {
                task_score_scale: scale,
            }
        } else {
            tracing::warn!(
                "grading.task_score_scale must be positive (got {}), using {}",
                scale,
                DEFAULT_TASK_SCORE_SCALE
            );
            Self::default()
        }
    }

    /// Whether a raw task score is inside `[0, scale]`
    pub fn accepts_task_score(&self, score: f64) -> bool {
        score.is_finite() && (0.0..=self.task_score_scale).contains(&score)
    }

    /// Points a sub-criterion earns from its tasks.
    ///
    /// `None` when the tasks carry no weight; the caller leaves the stored score alone.
    pub fn sub_criterion_score<I>(&self, tasks: I, percentage: f64) -> Option<f64>
    where
        I: IntoIterator<Item = WeightedScore>,
    {
        let average = weighted_average(tasks)?;
        Some(round2(criterion_points(
            average,
            percentage,
            self.task_score_scale,
        )))
    }
}

/// Σ(score × weight) / Σ(weight), or `None` when the total weight is not positive
pub fn weighted_average<I>(tasks: I) -> Option<f64>
where
    I: IntoIterator<Item = WeightedScore>,
{
    let (weighted_sum, total_weight) = tasks
        .into_iter()
        .fold((0.0_f64, 0_i64), |(sum, total), task| {
            (
                sum + task.score * f64::from(task.weight),
                total + i64::from(task.weight),
            )
        });

    if total_weight <= 0 {
        return None;
    }
    Some(weighted_sum / total_weight as f64)
}

/// Scale an average task score into sub-criterion points, capped at `percentage`
pub fn criterion_points(average: f64, percentage: f64, scale: f64) -> f64 {
    let percentage = percentage.max(0.0);
    (average / scale * percentage).clamp(0.0, percentage)
}

/// Cap a manually entered criterion score at its percentage
pub fn cap_manual_score(score: f64, percentage: f64) -> f64 {
    round2(score.clamp(0.0, percentage.max(0.0)))
}

/// The children of one top-level criterion and the weight that bounds them
#[derive(Debug, Clone, PartialEq)]
pub struct CriterionGroup {
    pub criterion_id: i32,
    pub weight: f64,
    pub children: Vec<f64>,
}

impl CriterionGroup {
    pub fn raw_total(&self) -> f64 {
        self.children.iter().sum()
    }

    /// `min(Σ children, weight)`
    pub fn capped_total(&self) -> f64 {
        self.raw_total().min(self.weight.max(0.0))
    }
}

/// Σ over criteria of `min(children_sum, weight)`
pub fn final_grade(groups: &[CriterionGroup]) -> f64 {
    round2(groups.iter().map(CriterionGroup::capped_total).sum())
}

/// Legacy total for courses whose subject has no evaluation template
pub fn uncapped_total<I>(scores: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    round2(scores.into_iter().sum())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> GradingPolicy {
        GradingPolicy::default()
    }

    #[test]
    fn test_worked_example() {
        let tasks = [WeightedScore::new(80.0, 1), WeightedScore::new(90.0, 2)];
        let average = weighted_average(tasks).expect("weights are positive");
        assert!((average - 86.666_666).abs() < 1e-4);
        assert_eq!(policy().sub_criterion_score(tasks, 20.0), Some(17.33));
    }

    #[test]
    fn test_zero_total_weight_leaves_score_unset() {
        assert_eq!(weighted_average([]), None);
        assert_eq!(
            policy().sub_criterion_score([WeightedScore::new(100.0, 0)], 20.0),
            None
        );
    }

    #[test]
    fn test_missing_scores_count_as_zero() {
        // two equally weighted tasks, only one graded
        let tasks = [WeightedScore::new(100.0, 1), WeightedScore::new(0.0, 1)];
        assert_eq!(policy().sub_criterion_score(tasks, 30.0), Some(15.0));
    }

    #[test]
    fn test_points_capped_at_percentage() {
        let tasks = [WeightedScore::new(150.0, 1)];
        assert_eq!(policy().sub_criterion_score(tasks, 25.0), Some(25.0));
        assert_eq!(criterion_points(-10.0, 25.0, 100.0), 0.0);
    }

    #[test]
    fn test_unit_scale_reproduces_ratio_scores() {
        let unit = GradingPolicy {
            task_score_scale: 1.0,
        };
        let tasks = [WeightedScore::new(0.8, 1), WeightedScore::new(0.9, 2)];
        assert_eq!(unit.sub_criterion_score(tasks, 20.0), Some(17.33));
    }

    #[test]
    fn test_accepts_task_score() {
        assert!(policy().accepts_task_score(0.0));
        assert!(policy().accepts_task_score(100.0));
        assert!(!policy().accepts_task_score(100.5));
        assert!(!policy().accepts_task_score(-1.0));
        assert!(!policy().accepts_task_score(f64::NAN));
    }

    #[test]
    fn test_criterion_group_capping() {
        let group = CriterionGroup {
            criterion_id: 1,
            weight: 30.0,
            children: vec![20.0, 15.0],
        };
        assert_eq!(group.raw_total(), 35.0);
        assert_eq!(group.capped_total(), 30.0);

        let under = CriterionGroup {
            criterion_id: 2,
            weight: 30.0,
            children: vec![10.0, 5.5],
        };
        assert_eq!(under.capped_total(), 15.5);
    }

    #[test]
    fn test_final_grade_sums_capped_groups() {
        let groups = vec![
            CriterionGroup {
                criterion_id: 1,
                weight: 40.0,
                children: vec![30.0, 20.0],
            },
            CriterionGroup {
                criterion_id: 2,
                weight: 60.0,
                children: vec![17.33, 25.0],
            },
            CriterionGroup {
                criterion_id: 3,
                weight: 10.0,
                children: vec![],
            },
        ];
        assert_eq!(final_grade(&groups), 82.33);
        for group in &groups {
            assert!(group.capped_total() <= group.weight);
        }
    }

    #[test]
    fn test_uncapped_total_and_manual_cap() {
        assert_eq!(uncapped_total([10.0, 20.5, 0.25]), 30.75);
        assert_eq!(cap_manual_score(12.0, 10.0), 10.0);
        assert_eq!(cap_manual_score(-3.0, 10.0), 0.0);
        assert_eq!(cap_manual_score(7.456, 10.0), 7.46);
    }
}
