//! 成绩聚合引擎
//!
//! Loads tasks and scores, runs them through [`calc`](super::calc) and
//! persists the derived rows. Every method is generic over
//! [`ConnectionTrait`] so callers can run it on the pool or inside a transaction.

use std::collections::HashMap;

use migration::entities::{
    CourseEntity, CourseSpecialCriterionEntity, CourseSubCriterionEntity, CourseTaskEntity,
    CriterionScoreEntity, EnrollmentEntity, EvaluationCriterionEntity, ProjectEntity,
    ProjectMemberEntity, SpecialCriterionScoreEntity, SubjectEntity, TaskScoreEntity, course,
    course_special_criterion, course_sub_criterion, course_task, criterion_score, enrollment,
    evaluation_criterion, project, project_member, special_criterion_score, subject, task_score,
};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use tracing::{debug, info, warn};
use ts_rs::TS;

use super::calc::{self, CriterionGroup, GradingPolicy, WeightedScore};
use crate::api::services::school::TS_EXPORT_PATH;
use crate::errors::Result;
use crate::storage::backend::retry::{self, RetryConfig};
use crate::storage::{SeaOrmStorage, find_required};

/// One template criterion as it contributes to an enrollment's final grade
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct CriterionBreakdown {
    pub criterion_id: i32,
    pub name: String,
    pub weight: f64,
    pub raw_total: f64,
    pub capped_total: f64,
}

/// 课程级重算的结果摘要
#[derive(Debug, Clone, Default, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct RecalculationSummary {
    pub sub_criteria: usize,
    pub special_criteria: usize,
    pub skipped_criteria: usize,
    pub enrollments: usize,
}

/// What the final grade of an enrollment is computed from
enum GradeBasis {
    Template(Vec<(evaluation_criterion::Model, CriterionGroup)>),
    Legacy(Vec<f64>),
}

/// A derived score row (sub or special criterion) with its parent criterion
struct Contribution {
    parent_criterion_id: Option<i32>,
    score: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct GradeEngine {
    policy: GradingPolicy,
    retry: RetryConfig,
}

impl GradeEngine {
    pub fn new(policy: GradingPolicy, retry: RetryConfig) -> Self {
        Self { policy, retry }
    }

    pub fn from_storage(storage: &SeaOrmStorage) -> Self {
        Self::new(GradingPolicy::from_config(), storage.retry_config())
    }

    pub fn policy(&self) -> GradingPolicy {
        self.policy
    }

    /// Recompute the CriterionScore rows of one sub-criterion.
    ///
    /// Restricted to `enrollment_ids` when given, otherwise every enrollment of
    /// the owning course. Returns the number of enrollments written; zero when
    /// the tasks carry no weight, in which case existing rows are left as they are.
    pub async fn recalculate_sub_criterion<C: ConnectionTrait>(
        &self,
        db: &C,
        sub_criterion_id: i32,
        enrollment_ids: Option<&[i32]>,
    ) -> Result<usize> {
        let sub = find_required::<CourseSubCriterionEntity, _>(db, sub_criterion_id, "Sub-criterion")
            .await?;
        let tasks = CourseTaskEntity::find()
            .filter(course_task::Column::SubCriterionId.eq(sub.id))
            .all(db)
            .await?;
        let enrollments = target_enrollments(db, sub.course_id, enrollment_ids).await?;

        let Some(scores) = self
            .compute_scores(db, &tasks, &enrollments, sub.percentage)
            .await?
        else {
            debug!(
                "Sub-criterion {} has no weighted tasks, leaving scores untouched",
                sub.id
            );
            return Ok(0);
        };

        for (enrollment_id, score) in &scores {
            self.upsert_criterion_score(db, *enrollment_id, sub.id, *score)
                .await?;
            self.update_final_grade(db, *enrollment_id).await?;
        }

        debug!(
            "Recalculated sub-criterion {} for {} enrollments",
            sub.id,
            scores.len()
        );
        Ok(scores.len())
    }

    /// Same as [`recalculate_sub_criterion`](Self::recalculate_sub_criterion) for
    /// a special criterion. Without tasks the criterion holds manual scores and
    /// nothing is touched.
    pub async fn recalculate_special_criterion<C: ConnectionTrait>(
        &self,
        db: &C,
        special_criterion_id: i32,
        enrollment_ids: Option<&[i32]>,
    ) -> Result<usize> {
        let special = find_required::<CourseSpecialCriterionEntity, _>(
            db,
            special_criterion_id,
            "Special criterion",
        )
        .await?;
        let tasks = CourseTaskEntity::find()
            .filter(course_task::Column::SpecialCriterionId.eq(special.id))
            .all(db)
            .await?;
        if tasks.is_empty() {
            return Ok(0);
        }

        let enrollments = target_enrollments(db, special.course_id, enrollment_ids).await?;
        let Some(scores) = self
            .compute_scores(db, &tasks, &enrollments, special.percentage)
            .await?
        else {
            return Ok(0);
        };

        for (enrollment_id, score) in &scores {
            self.upsert_special_score(db, *enrollment_id, special.id, *score)
                .await?;
            self.update_final_grade(db, *enrollment_id).await?;
        }
        Ok(scores.len())
    }

    /// Clamp stored rows of a sub-criterion to its current percentage.
    ///
    /// Covers what recalculation does not rewrite: manual scores, scores of a
    /// criterion whose tasks were all deleted, and project scores together with
    /// their members' rows. Returns the enrollments whose score was lowered;
    /// their final grades are left to the caller.
    pub async fn cap_sub_criterion_scores<C: ConnectionTrait>(
        &self,
        db: &C,
        sub: &course_sub_criterion::Model,
    ) -> Result<Vec<i32>> {
        let cap = sub.percentage.max(0.0);
        let affected: Vec<i32> = CriterionScoreEntity::find()
            .filter(criterion_score::Column::SubCriterionId.eq(sub.id))
            .filter(criterion_score::Column::Score.gt(cap))
            .all(db)
            .await?
            .into_iter()
            .map(|s| s.enrollment_id)
            .collect();

        if !affected.is_empty() {
            CriterionScoreEntity::update_many()
                .col_expr(criterion_score::Column::Score, Expr::value(cap))
                .filter(criterion_score::Column::SubCriterionId.eq(sub.id))
                .filter(criterion_score::Column::Score.gt(cap))
                .exec(db)
                .await?;
        }
        if sub.is_project {
            ProjectEntity::update_many()
                .col_expr(project::Column::Score, Expr::value(cap))
                .filter(project::Column::SubCriterionId.eq(sub.id))
                .filter(project::Column::Score.gt(cap))
                .exec(db)
                .await?;
        }

        if !affected.is_empty() {
            info!(
                "Sub-criterion {} capped at {}, lowered {} scores",
                sub.id,
                cap,
                affected.len()
            );
        }
        Ok(affected)
    }

    /// [`cap_sub_criterion_scores`](Self::cap_sub_criterion_scores) for a special criterion
    pub async fn cap_special_criterion_scores<C: ConnectionTrait>(
        &self,
        db: &C,
        special: &course_special_criterion::Model,
    ) -> Result<Vec<i32>> {
        let cap = special.percentage.max(0.0);
        let affected: Vec<i32> = SpecialCriterionScoreEntity::find()
            .filter(special_criterion_score::Column::SpecialCriterionId.eq(special.id))
            .filter(special_criterion_score::Column::Score.gt(cap))
            .all(db)
            .await?
            .into_iter()
            .map(|s| s.enrollment_id)
            .collect();
        if affected.is_empty() {
            return Ok(affected);
        }

        SpecialCriterionScoreEntity::update_many()
            .col_expr(special_criterion_score::Column::Score, Expr::value(cap))
            .filter(special_criterion_score::Column::SpecialCriterionId.eq(special.id))
            .filter(special_criterion_score::Column::Score.gt(cap))
            .exec(db)
            .await?;
        info!(
            "Special criterion {} capped at {}, lowered {} scores",
            special.id,
            cap,
            affected.len()
        );
        Ok(affected)
    }

    /// Recompute whichever criterion owns the task
    pub async fn recalculate_for_task<C: ConnectionTrait>(
        &self,
        db: &C,
        task: &course_task::Model,
        enrollment_ids: Option<&[i32]>,
    ) -> Result<usize> {
        match (task.sub_criterion_id, task.special_criterion_id) {
            (Some(sub_id), _) => {
                self.recalculate_sub_criterion(db, sub_id, enrollment_ids)
                    .await
            }
            (None, Some(special_id)) => {
                self.recalculate_special_criterion(db, special_id, enrollment_ids)
                    .await
            }
            (None, None) => Ok(0),
        }
    }

    /// Recompute and store `enrollment.final_grade`
    pub async fn update_final_grade<C: ConnectionTrait>(
        &self,
        db: &C,
        enrollment_id: i32,
    ) -> Result<f64> {
        let enrollment =
            find_required::<EnrollmentEntity, _>(db, enrollment_id, "Enrollment").await?;

        let grade = match self.grade_basis(db, &enrollment).await? {
            GradeBasis::Template(groups) => {
                let groups: Vec<CriterionGroup> = groups.into_iter().map(|(_, g)| g).collect();
                calc::final_grade(&groups)
            }
            GradeBasis::Legacy(scores) => {
                warn!(
                    "Course {} has no evaluation template, summing scores of enrollment {} uncapped",
                    enrollment.course_id, enrollment.id
                );
                calc::uncapped_total(scores)
            }
        };

        retry::with_retry(
            &format!("update_final_grade({})", enrollment.id),
            self.retry,
            || {
                EnrollmentEntity::update_many()
                    .col_expr(enrollment::Column::FinalGrade, Expr::value(grade))
                    .filter(enrollment::Column::Id.eq(enrollment.id))
                    .exec(db)
            },
        )
        .await?;

        Ok(grade)
    }

    /// Final grades for a batch of enrollments.
    ///
    /// Failures are logged per enrollment; returns how many succeeded.
    pub async fn update_final_grades<C: ConnectionTrait>(
        &self,
        db: &C,
        enrollment_ids: &[i32],
    ) -> usize {
        let mut updated = 0;
        for &enrollment_id in enrollment_ids {
            match self.update_final_grade(db, enrollment_id).await {
                Ok(_) => updated += 1,
                Err(e) => warn!(
                    "Failed to update final grade for enrollment {}: {}",
                    enrollment_id, e
                ),
            }
        }
        updated
    }

    /// Copy the project's score into every member's CriterionScore
    pub async fn sync_project_scores<C: ConnectionTrait>(
        &self,
        db: &C,
        project_id: i32,
    ) -> Result<usize> {
        let project = find_required::<ProjectEntity, _>(db, project_id, "Project").await?;
        let members = ProjectMemberEntity::find()
            .filter(project_member::Column::ProjectId.eq(project.id))
            .all(db)
            .await?;

        for member in &members {
            self.upsert_criterion_score(
                db,
                member.enrollment_id,
                project.sub_criterion_id,
                project.score,
            )
            .await?;
        }

        let member_ids: Vec<i32> = members.iter().map(|m| m.enrollment_id).collect();
        self.update_final_grades(db, &member_ids).await;

        info!(
            "Project {} score {} synced to {} members",
            project.id,
            project.score,
            members.len()
        );
        Ok(members.len())
    }

    /// Full recompute of one course: every criterion with tasks, then every final grade
    pub async fn recalculate_course<C: ConnectionTrait>(
        &self,
        db: &C,
        course_id: i32,
    ) -> Result<RecalculationSummary> {
        let course = find_required::<CourseEntity, _>(db, course_id, "Course").await?;
        let mut summary = RecalculationSummary::default();

        let subs = CourseSubCriterionEntity::find()
            .filter(course_sub_criterion::Column::CourseId.eq(course.id))
            .order_by_asc(course_sub_criterion::Column::Id)
            .all(db)
            .await?;
        for sub in &subs {
            if sub.is_project {
                // 项目型子项的分数由项目同步写入
                continue;
            }
            if self.recalculate_sub_criterion(db, sub.id, None).await? > 0 {
                summary.sub_criteria += 1;
            } else {
                summary.skipped_criteria += 1;
            }
        }

        let specials = CourseSpecialCriterionEntity::find()
            .filter(course_special_criterion::Column::CourseId.eq(course.id))
            .order_by_asc(course_special_criterion::Column::Id)
            .all(db)
            .await?;
        for special in &specials {
            if self
                .recalculate_special_criterion(db, special.id, None)
                .await?
                > 0
            {
                summary.special_criteria += 1;
            }
        }

        let enrollment_ids: Vec<i32> = target_enrollments(db, course.id, None)
            .await?
            .iter()
            .map(|e| e.id)
            .collect();
        summary.enrollments = self.update_final_grades(db, &enrollment_ids).await;

        info!(
            "Course {} recalculated: {} sub-criteria, {} special criteria, {} skipped, {} enrollments",
            course.id,
            summary.sub_criteria,
            summary.special_criteria,
            summary.skipped_criteria,
            summary.enrollments
        );
        Ok(summary)
    }

    /// Final grades of every enrollment in a course whose subject uses the template
    pub async fn recalculate_template_enrollments<C: ConnectionTrait>(
        &self,
        db: &C,
        template_id: i32,
    ) -> Result<usize> {
        let subject_ids: Vec<i32> = SubjectEntity::find()
            .filter(subject::Column::EvaluationTemplateId.eq(template_id))
            .all(db)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        if subject_ids.is_empty() {
            return Ok(0);
        }

        let course_ids: Vec<i32> = CourseEntity::find()
            .filter(course::Column::SubjectId.is_in(subject_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();
        if course_ids.is_empty() {
            return Ok(0);
        }

        let enrollment_ids: Vec<i32> = EnrollmentEntity::find()
            .filter(enrollment::Column::CourseId.is_in(course_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|e| e.id)
            .collect();

        let updated = self.update_final_grades(db, &enrollment_ids).await;
        info!(
            "Template {} changed, recalculated {} final grades",
            template_id, updated
        );
        Ok(updated)
    }

    /// Per-criterion view of an enrollment's grade; empty for courses without a template
    pub async fn breakdown<C: ConnectionTrait>(
        &self,
        db: &C,
        enrollment_id: i32,
    ) -> Result<Vec<CriterionBreakdown>> {
        let enrollment =
            find_required::<EnrollmentEntity, _>(db, enrollment_id, "Enrollment").await?;
        Ok(match self.grade_basis(db, &enrollment).await? {
            GradeBasis::Template(groups) => groups
                .into_iter()
                .map(|(criterion, group)| CriterionBreakdown {
                    criterion_id: criterion.id,
                    name: criterion.name,
                    weight: criterion.weight,
                    raw_total: calc::uncapped_total(group.children.iter().copied()),
                    capped_total: group.capped_total(),
                })
                .collect(),
            GradeBasis::Legacy(_) => Vec::new(),
        })
    }

    /// Weighted scores for each enrollment, or `None` when the tasks carry no weight
    async fn compute_scores<C: ConnectionTrait>(
        &self,
        db: &C,
        tasks: &[course_task::Model],
        enrollments: &[enrollment::Model],
        percentage: f64,
    ) -> Result<Option<Vec<(i32, f64)>>> {
        let total_weight: i64 = tasks.iter().map(|t| i64::from(t.weight)).sum();
        if total_weight <= 0 {
            return Ok(None);
        }
        if enrollments.is_empty() {
            return Ok(Some(Vec::new()));
        }

        let task_ids: Vec<i32> = tasks.iter().map(|t| t.id).collect();
        let enrollment_ids: Vec<i32> = enrollments.iter().map(|e| e.id).collect();
        let stored: HashMap<(i32, i32), f64> = TaskScoreEntity::find()
            .filter(task_score::Column::TaskId.is_in(task_ids))
            .filter(task_score::Column::EnrollmentId.is_in(enrollment_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|s| ((s.enrollment_id, s.task_id), s.score))
            .collect();

        let scores = enrollments
            .iter()
            .filter_map(|e| {
                let weighted = tasks.iter().map(|t| {
                    WeightedScore::new(
                        stored.get(&(e.id, t.id)).copied().unwrap_or(0.0),
                        t.weight,
                    )
                });
                self.policy
                    .sub_criterion_score(weighted, percentage)
                    .map(|score| (e.id, score))
            })
            .collect();
        Ok(Some(scores))
    }

    async fn grade_basis<C: ConnectionTrait>(
        &self,
        db: &C,
        enrollment: &enrollment::Model,
    ) -> Result<GradeBasis> {
        let course = find_required::<CourseEntity, _>(db, enrollment.course_id, "Course").await?;
        let template_id = SubjectEntity::find_by_id(course.subject_id)
            .one(db)
            .await?
            .and_then(|s| s.evaluation_template_id);
        let contributions = load_contributions(db, enrollment.id).await?;

        let Some(template_id) = template_id else {
            return Ok(GradeBasis::Legacy(
                contributions.iter().map(|c| c.score).collect(),
            ));
        };

        let criteria = EvaluationCriterionEntity::find()
            .filter(evaluation_criterion::Column::TemplateId.eq(template_id))
            .order_by_asc(evaluation_criterion::Column::Id)
            .all(db)
            .await?;

        let groups = criteria
            .into_iter()
            .map(|criterion| {
                let group = CriterionGroup {
                    criterion_id: criterion.id,
                    weight: criterion.weight,
                    children: contributions
                        .iter()
                        .filter(|c| c.parent_criterion_id == Some(criterion.id))
                        .map(|c| c.score)
                        .collect(),
                };
                (criterion, group)
            })
            .collect();
        Ok(GradeBasis::Template(groups))
    }

    async fn upsert_criterion_score<C: ConnectionTrait>(
        &self,
        db: &C,
        enrollment_id: i32,
        sub_criterion_id: i32,
        score: f64,
    ) -> Result<()> {
        let model = criterion_score::ActiveModel {
            enrollment_id: Set(enrollment_id),
            sub_criterion_id: Set(sub_criterion_id),
            score: Set(score),
            ..Default::default()
        };
        retry::with_retry("upsert_criterion_score", self.retry, || {
            CriterionScoreEntity::insert(model.clone())
                .on_conflict(
                    OnConflict::columns([
                        criterion_score::Column::EnrollmentId,
                        criterion_score::Column::SubCriterionId,
                    ])
                    .update_column(criterion_score::Column::Score)
                    .to_owned(),
                )
                .exec(db)
        })
        .await?;
        Ok(())
    }

    pub(crate) async fn upsert_special_score<C: ConnectionTrait>(
        &self,
        db: &C,
        enrollment_id: i32,
        special_criterion_id: i32,
        score: f64,
    ) -> Result<()> {
        let model = special_criterion_score::ActiveModel {
            enrollment_id: Set(enrollment_id),
            special_criterion_id: Set(special_criterion_id),
            score: Set(score),
            ..Default::default()
        };
        retry::with_retry("upsert_special_score", self.retry, || {
            SpecialCriterionScoreEntity::insert(model.clone())
                .on_conflict(
                    OnConflict::columns([
                        special_criterion_score::Column::EnrollmentId,
                        special_criterion_score::Column::SpecialCriterionId,
                    ])
                    .update_column(special_criterion_score::Column::Score)
                    .to_owned(),
                )
                .exec(db)
        })
        .await?;
        Ok(())
    }

    /// Store a manually entered sub-criterion score, capped at its percentage
    pub(crate) async fn save_manual_criterion_score<C: ConnectionTrait>(
        &self,
        db: &C,
        enrollment_id: i32,
        sub: &course_sub_criterion::Model,
        score: f64,
    ) -> Result<f64> {
        let capped = calc::cap_manual_score(score, sub.percentage);
        self.upsert_criterion_score(db, enrollment_id, sub.id, capped)
            .await?;
        Ok(capped)
    }
}

async fn target_enrollments<C: ConnectionTrait>(
    db: &C,
    course_id: i32,
    enrollment_ids: Option<&[i32]>,
) -> Result<Vec<enrollment::Model>> {
    let mut query = EnrollmentEntity::find().filter(enrollment::Column::CourseId.eq(course_id));
    if let Some(ids) = enrollment_ids {
        query = query.filter(enrollment::Column::Id.is_in(ids.to_vec()));
    }
    Ok(query.order_by_asc(enrollment::Column::Id).all(db).await?)
}

async fn load_contributions<C: ConnectionTrait>(
    db: &C,
    enrollment_id: i32,
) -> Result<Vec<Contribution>> {
    let sub_scores = CriterionScoreEntity::find()
        .filter(criterion_score::Column::EnrollmentId.eq(enrollment_id))
        .all(db)
        .await?;
    let special_scores = SpecialCriterionScoreEntity::find()
        .filter(special_criterion_score::Column::EnrollmentId.eq(enrollment_id))
        .all(db)
        .await?;

    let sub_parents: HashMap<i32, i32> = if sub_scores.is_empty() {
        HashMap::new()
    } else {
        CourseSubCriterionEntity::find()
            .filter(
                course_sub_criterion::Column::Id
                    .is_in(sub_scores.iter().map(|s| s.sub_criterion_id).collect::<Vec<_>>()),
            )
            .all(db)
            .await?
            .into_iter()
            .map(|s| (s.id, s.parent_criterion_id))
            .collect()
    };
    let special_parents: HashMap<i32, Option<i32>> = if special_scores.is_empty() {
        HashMap::new()
    } else {
        CourseSpecialCriterionEntity::find()
            .filter(
                course_special_criterion::Column::Id.is_in(
                    special_scores
                        .iter()
                        .map(|s| s.special_criterion_id)
                        .collect::<Vec<_>>(),
                ),
            )
            .all(db)
            .await?
            .into_iter()
            .map(|s| (s.id, s.parent_criterion_id))
            .collect()
    };

    let subs = sub_scores.into_iter().map(|s| Contribution {
        parent_criterion_id: sub_parents.get(&s.sub_criterion_id).copied(),
        score: s.score,
    });
    let specials = special_scores.into_iter().map(|s| Contribution {
        parent_criterion_id: special_parents
            .get(&s.special_criterion_id)
            .copied()
            .flatten(),
        score: s.score,
    });
    Ok(subs.chain(specials).collect())
}
