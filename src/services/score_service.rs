//! Score entry and the gradesheet
//!
//! Task scores are saved row by row; failures are collected and the affected
//! criteria are recalculated for the touched enrollments only. Criterion
//! scores are saved in one transaction and stop at the first bad row.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use migration::entities::{
    CourseSpecialCriterionEntity, CourseSubCriterionEntity, CourseTaskEntity,
    CriterionScoreEntity, EnrollmentEntity, EvaluationCriterionEntity, ProjectEntity,
    SpecialCriterionScoreEntity, SubjectEntity, TaskScoreEntity, course_special_criterion,
    course_sub_criterion, course_task, criterion_score, enrollment, evaluation_criterion, project,
    special_criterion_score, task_score,
};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use ts_rs::TS;

use crate::api::services::school::TS_EXPORT_PATH;
use crate::errors::{Result, SchoolError};
use crate::grading::GradeEngine;
use crate::services::auth_service::AuthUser;
use crate::services::course_service::{
    children_of, course_enrollment_views, ensure_course_access, ensure_course_staff,
};
use crate::services::task_service::task_course_id;
use crate::services::views::{CriterionKey, RowError, TaskScoreView};
use crate::storage::backend::retry;
use crate::storage::{Role, SeaOrmStorage, find_required};

// ============ Request/Response DTOs ============

#[derive(Debug, Clone, Default, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct TaskScoreQuery {
    #[serde(default)]
    pub task_id: Option<i32>,
    #[serde(default)]
    pub enrollment_id: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct TaskScoreInput {
    #[serde(alias = "enrollment_id")]
    pub enrollment: i32,
    #[serde(alias = "task_id")]
    pub task: i32,
    pub score: f64,
}

#[derive(Debug, Clone, Default, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct TaskScoreBulkResult {
    pub saved: usize,
    pub recalculated_criteria: usize,
    pub errors: Vec<RowError>,
}

#[derive(Debug, Clone, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct CourseScopedQuery {
    pub course_id: i32,
}

#[derive(Debug, Clone, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct CriterionScoreInput {
    #[serde(alias = "enrollment_id")]
    pub enrollment: i32,
    /// Sub-criterion id or `special-{id}`
    #[serde(alias = "criterion_id", alias = "sub_criterion")]
    pub criterion: CriterionKey,
    pub score: f64,
}

#[derive(Debug, Clone, Default, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct CriterionScoreBulkResult {
    pub saved: usize,
    pub final_grades_updated: usize,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct CriterionScoreView {
    pub id: i32,
    pub enrollment_id: i32,
    pub criterion: CriterionKey,
    pub is_special: bool,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct GradesheetColumn {
    /// `"{id}"` or `"special-{id}"`, the key used in row grades
    pub id: String,
    pub actual_id: i32,
    pub name: String,
    pub percentage: f64,
    pub visible: bool,
    pub editable: bool,
    pub has_tasks: bool,
    pub has_projects: bool,
    pub is_special: bool,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct GradesheetGroup {
    /// `None` for special criteria outside the template
    pub criterion_id: Option<i32>,
    pub name: String,
    pub weight: Option<f64>,
    pub sub_criteria: Vec<GradesheetColumn>,
    pub special_criteria: Vec<GradesheetColumn>,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct GradesheetRow {
    pub enrollment_id: i32,
    pub student_id: i32,
    pub first_name: String,
    pub paternal_surname: String,
    pub maternal_surname: String,
    pub ci_number: Option<String>,
    pub grades: BTreeMap<String, f64>,
    pub final_grade: Option<f64>,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct Gradesheet {
    pub course_id: i32,
    pub groups: Vec<GradesheetGroup>,
    pub rows: Vec<GradesheetRow>,
}

/// Cached per-course permission result inside a bulk batch
#[derive(Default)]
struct CourseGate {
    allowed: HashMap<i32, bool>,
}

impl CourseGate {
    async fn check<C: ConnectionTrait>(&mut self, db: &C, current: &AuthUser, course_id: i32) -> Result<()> {
        if let Some(&ok) = self.allowed.get(&course_id) {
            return if ok {
                Ok(())
            } else {
                Err(SchoolError::permission_denied(format!(
                    "You are not the teacher of course {}",
                    course_id
                )))
            };
        }
        let outcome = ensure_course_staff(db, current, course_id).await;
        self.allowed.insert(course_id, outcome.is_ok());
        outcome.map(|_| ())
    }
}

// ============ ScoreService Implementation ============

pub struct ScoreService {
    storage: Arc<SeaOrmStorage>,
    engine: GradeEngine,
}

impl ScoreService {
    pub fn new(storage: Arc<SeaOrmStorage>, engine: GradeEngine) -> Self {
        Self { storage, engine }
    }

    /// Enrollment ids of a course the user may see scores of
    async fn visible_enrollments<C: ConnectionTrait>(
        &self,
        db: &C,
        current: &AuthUser,
        course_id: i32,
    ) -> Result<Option<HashSet<i32>>> {
        let students = match current.role {
            Role::Admin | Role::Teacher => return Ok(None),
            Role::Student => vec![current.id],
            Role::Parent => children_of(db, current.id).await?,
        };
        Ok(Some(
            EnrollmentEntity::find()
                .filter(enrollment::Column::CourseId.eq(course_id))
                .filter(enrollment::Column::StudentId.is_in(students))
                .all(db)
                .await?
                .into_iter()
                .map(|e| e.id)
                .collect(),
        ))
    }

    // ---------- task scores ----------

    pub async fn list_task_scores(
        &self,
        current: &AuthUser,
        query: TaskScoreQuery,
    ) -> Result<Vec<TaskScoreView>> {
        let db = self.storage.get_db();
        let mut select = TaskScoreEntity::find();
        let course_id = match (query.task_id, query.enrollment_id) {
            (Some(task_id), _) => {
                let task = find_required::<CourseTaskEntity, _>(db, task_id, "Task").await?;
                select = select.filter(task_score::Column::TaskId.eq(task_id));
                task_course_id(db, &task).await?
            }
            (None, Some(enrollment_id)) => {
                find_required::<EnrollmentEntity, _>(db, enrollment_id, "Enrollment")
                    .await?
                    .course_id
            }
            (None, None) => {
                return Err(SchoolError::validation("task_id or enrollment_id is required"));
            }
        };
        if let Some(enrollment_id) = query.enrollment_id {
            select = select.filter(task_score::Column::EnrollmentId.eq(enrollment_id));
        }
        ensure_course_access(db, current, course_id).await?;

        let visible = self.visible_enrollments(db, current, course_id).await?;
        Ok(select
            .order_by_asc(task_score::Column::Id)
            .all(db)
            .await?
            .into_iter()
            .filter(|s| visible.as_ref().is_none_or(|v| v.contains(&s.enrollment_id)))
            .map(TaskScoreView::from)
            .collect())
    }

    async fn save_task_score_row<C: ConnectionTrait>(
        &self,
        db: &C,
        current: &AuthUser,
        gate: &mut CourseGate,
        input: &TaskScoreInput,
    ) -> Result<course_task::Model> {
        if !self.engine.policy().accepts_task_score(input.score) {
            return Err(SchoolError::validation(format!(
                "Score {} is out of range (0-{})",
                input.score,
                self.engine.policy().task_score_scale
            )));
        }
        let task = find_required::<CourseTaskEntity, _>(db, input.task, "Task").await?;
        let enrollment =
            find_required::<EnrollmentEntity, _>(db, input.enrollment, "Enrollment").await?;
        let course_id = task_course_id(db, &task).await?;
        if enrollment.course_id != course_id {
            return Err(SchoolError::validation(format!(
                "Enrollment {} is not part of the task's course",
                enrollment.id
            )));
        }
        gate.check(db, current, course_id).await?;
        if task.is_locked && !current.is_admin() {
            return Err(SchoolError::permission_denied(format!(
                "Task '{}' is locked",
                task.name
            )));
        }

        let model = task_score::ActiveModel {
            enrollment_id: Set(enrollment.id),
            task_id: Set(task.id),
            score: Set(input.score),
            ..Default::default()
        };
        retry::with_retry("upsert_task_score", self.storage.retry_config(), || {
            TaskScoreEntity::insert(model.clone())
                .on_conflict(
                    OnConflict::columns([
                        task_score::Column::EnrollmentId,
                        task_score::Column::TaskId,
                    ])
                    .update_column(task_score::Column::Score)
                    .to_owned(),
                )
                .exec(db)
        })
        .await?;
        Ok(task)
    }

    pub async fn bulk_task_scores(
        &self,
        current: &AuthUser,
        items: Vec<TaskScoreInput>,
    ) -> Result<TaskScoreBulkResult> {
        current.require_staff()?;
        let db = self.storage.get_db();
        let mut result = TaskScoreBulkResult::default();
        let mut gate = CourseGate::default();
        // 受影响的评分项 -> 需要重算的注册
        let mut affected: HashMap<CriterionKey, BTreeSet<i32>> = HashMap::new();

        for (index, input) in items.iter().enumerate() {
            match self.save_task_score_row(db, current, &mut gate, input).await {
                Ok(task) => {
                    result.saved += 1;
                    let key = match (task.sub_criterion_id, task.special_criterion_id) {
                        (Some(id), _) => CriterionKey::Sub(id),
                        (None, Some(id)) => CriterionKey::Special(id),
                        (None, None) => continue,
                    };
                    affected.entry(key).or_default().insert(input.enrollment);
                }
                Err(e) => {
                    warn!(
                        "Task score row {} (enrollment {}, task {}) rejected: {}",
                        index, input.enrollment, input.task, e
                    );
                    result.errors.push(RowError {
                        index,
                        message: e.message().to_string(),
                    });
                }
            }
        }

        for (key, enrollments) in affected {
            let ids: Vec<i32> = enrollments.into_iter().collect();
            let outcome = match key {
                CriterionKey::Sub(id) => {
                    self.engine
                        .recalculate_sub_criterion(db, id, Some(&ids))
                        .await
                }
                CriterionKey::Special(id) => {
                    self.engine
                        .recalculate_special_criterion(db, id, Some(&ids))
                        .await
                }
            };
            match outcome {
                Ok(_) => result.recalculated_criteria += 1,
                Err(e) => warn!("Recalculation of criterion {} failed: {}", key, e),
            }
        }

        info!(
            "ScoreService: saved {} task scores ({} rejected), recalculated {} criteria",
            result.saved,
            result.errors.len(),
            result.recalculated_criteria
        );
        Ok(result)
    }

    // ---------- criterion scores ----------

    pub async fn list_criterion_scores(
        &self,
        current: &AuthUser,
        course_id: i32,
    ) -> Result<Vec<CriterionScoreView>> {
        let db = self.storage.get_db();
        ensure_course_access(db, current, course_id).await?;
        let visible = self.visible_enrollments(db, current, course_id).await?;

        let sub_ids: Vec<i32> = CourseSubCriterionEntity::find()
            .filter(course_sub_criterion::Column::CourseId.eq(course_id))
            .all(db)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        let special_ids: Vec<i32> = CourseSpecialCriterionEntity::find()
            .filter(course_special_criterion::Column::CourseId.eq(course_id))
            .all(db)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();

        let mut views: Vec<CriterionScoreView> = Vec::new();
        if !sub_ids.is_empty() {
            views.extend(
                CriterionScoreEntity::find()
                    .filter(criterion_score::Column::SubCriterionId.is_in(sub_ids))
                    .order_by_asc(criterion_score::Column::Id)
                    .all(db)
                    .await?
                    .into_iter()
                    .map(|s| CriterionScoreView {
                        id: s.id,
                        enrollment_id: s.enrollment_id,
                        criterion: CriterionKey::Sub(s.sub_criterion_id),
                        is_special: false,
                        score: s.score,
                    }),
            );
        }
        if !special_ids.is_empty() {
            views.extend(
                SpecialCriterionScoreEntity::find()
                    .filter(special_criterion_score::Column::SpecialCriterionId.is_in(special_ids))
                    .order_by_asc(special_criterion_score::Column::Id)
                    .all(db)
                    .await?
                    .into_iter()
                    .map(|s| CriterionScoreView {
                        id: s.id,
                        enrollment_id: s.enrollment_id,
                        criterion: CriterionKey::Special(s.special_criterion_id),
                        is_special: true,
                        score: s.score,
                    }),
            );
        }
        views.retain(|v| visible.as_ref().is_none_or(|set| set.contains(&v.enrollment_id)));
        Ok(views)
    }

    async fn save_criterion_score_row<C: ConnectionTrait>(
        &self,
        db: &C,
        current: &AuthUser,
        gate: &mut CourseGate,
        input: &CriterionScoreInput,
    ) -> Result<()> {
        if !input.score.is_finite() || input.score < 0.0 {
            return Err(SchoolError::validation(format!(
                "Invalid score {} for criterion {}",
                input.score, input.criterion
            )));
        }
        let enrollment =
            find_required::<EnrollmentEntity, _>(db, input.enrollment, "Enrollment").await?;

        match input.criterion {
            CriterionKey::Sub(id) => {
                let sub = find_required::<CourseSubCriterionEntity, _>(db, id, "Sub-criterion").await?;
                if sub.course_id != enrollment.course_id {
                    return Err(SchoolError::validation(format!(
                        "Sub-criterion {} is not part of enrollment {}'s course",
                        sub.id, enrollment.id
                    )));
                }
                gate.check(db, current, sub.course_id).await?;
                if sub.is_project {
                    return Err(SchoolError::validation(format!(
                        "'{}' is graded through its projects",
                        sub.name
                    )));
                }
                if has_tasks(db, input.criterion).await? {
                    return Err(SchoolError::validation(format!(
                        "'{}' is computed from its tasks",
                        sub.name
                    )));
                }
                if !sub.editable_on_gradesheet && !current.is_admin() {
                    return Err(SchoolError::permission_denied(format!(
                        "'{}' is not editable on the gradesheet",
                        sub.name
                    )));
                }
                self.engine
                    .save_manual_criterion_score(db, enrollment.id, &sub, input.score)
                    .await?;
            }
            CriterionKey::Special(id) => {
                let special =
                    find_required::<CourseSpecialCriterionEntity, _>(db, id, "Special criterion")
                        .await?;
                if special.course_id != enrollment.course_id {
                    return Err(SchoolError::validation(format!(
                        "Special criterion {} is not part of enrollment {}'s course",
                        special.id, enrollment.id
                    )));
                }
                gate.check(db, current, special.course_id).await?;
                if has_tasks(db, input.criterion).await? {
                    return Err(SchoolError::validation(format!(
                        "'{}' is computed from its tasks",
                        special.name
                    )));
                }
                if !special.editable_on_gradesheet && !current.is_admin() {
                    return Err(SchoolError::permission_denied(format!(
                        "'{}' is not editable on the gradesheet",
                        special.name
                    )));
                }
                let capped = crate::grading::calc::cap_manual_score(input.score, special.percentage);
                self.engine
                    .upsert_special_score(db, enrollment.id, special.id, capped)
                    .await?;
            }
        }
        Ok(())
    }

    /// Save manual criterion scores; the first invalid row aborts the whole batch
    pub async fn bulk_criterion_scores(
        &self,
        current: &AuthUser,
        items: Vec<CriterionScoreInput>,
    ) -> Result<CriterionScoreBulkResult> {
        current.require_staff()?;
        let txn = self.storage.get_db().begin().await?;
        let mut gate = CourseGate::default();
        let mut touched = BTreeSet::new();

        for (index, input) in items.iter().enumerate() {
            self.save_criterion_score_row(&txn, current, &mut gate, input)
                .await
                .map_err(|e| {
                    warn!("Criterion score row {} rejected: {}", index, e);
                    e
                })?;
            touched.insert(input.enrollment);
        }

        let ids: Vec<i32> = touched.into_iter().collect();
        let mut final_grades_updated = 0;
        for id in &ids {
            self.engine.update_final_grade(&txn, *id).await?;
            final_grades_updated += 1;
        }
        txn.commit().await?;

        info!(
            "ScoreService: saved {} criterion scores, updated {} final grades",
            items.len(),
            final_grades_updated
        );
        Ok(CriterionScoreBulkResult {
            saved: items.len(),
            final_grades_updated,
        })
    }

    // ---------- gradesheet ----------

    pub async fn gradesheet(&self, current: &AuthUser, course_id: i32) -> Result<Gradesheet> {
        let db = self.storage.get_db();
        let c = ensure_course_access(db, current, course_id).await?;
        let staff = current.role.can_manage_grades();

        let subs = CourseSubCriterionEntity::find()
            .filter(course_sub_criterion::Column::CourseId.eq(c.id))
            .order_by_asc(course_sub_criterion::Column::Id)
            .all(db)
            .await?;
        let specials = CourseSpecialCriterionEntity::find()
            .filter(course_special_criterion::Column::CourseId.eq(c.id))
            .order_by_asc(course_special_criterion::Column::Id)
            .all(db)
            .await?;

        let sub_ids: Vec<i32> = subs.iter().map(|s| s.id).collect();
        let special_ids: Vec<i32> = specials.iter().map(|s| s.id).collect();
        let tasks = CourseTaskEntity::find()
            .filter(
                sea_orm::Condition::any()
                    .add(course_task::Column::SubCriterionId.is_in(sub_ids.clone()))
                    .add(course_task::Column::SpecialCriterionId.is_in(special_ids.clone())),
            )
            .all(db)
            .await?;
        let subs_with_tasks: HashSet<i32> = tasks.iter().filter_map(|t| t.sub_criterion_id).collect();
        let specials_with_tasks: HashSet<i32> =
            tasks.iter().filter_map(|t| t.special_criterion_id).collect();
        let subs_with_projects: HashSet<i32> = ProjectEntity::find()
            .filter(project::Column::CourseId.eq(c.id))
            .all(db)
            .await?
            .into_iter()
            .map(|p| p.sub_criterion_id)
            .collect();

        // 分组顺序：模板中的评分标准在前
        let template_id = SubjectEntity::find_by_id(c.subject_id)
            .one(db)
            .await?
            .and_then(|s| s.evaluation_template_id);
        let mut criteria: Vec<evaluation_criterion::Model> = match template_id {
            Some(tid) => {
                EvaluationCriterionEntity::find()
                    .filter(evaluation_criterion::Column::TemplateId.eq(tid))
                    .order_by_asc(evaluation_criterion::Column::Id)
                    .all(db)
                    .await?
            }
            None => Vec::new(),
        };
        let known: HashSet<i32> = criteria.iter().map(|c| c.id).collect();
        let stray: BTreeSet<i32> = subs
            .iter()
            .map(|s| s.parent_criterion_id)
            .chain(specials.iter().filter_map(|s| s.parent_criterion_id))
            .filter(|id| !known.contains(id))
            .collect();
        if !stray.is_empty() {
            criteria.extend(
                EvaluationCriterionEntity::find()
                    .filter(evaluation_criterion::Column::Id.is_in(stray))
                    .order_by_asc(evaluation_criterion::Column::Id)
                    .all(db)
                    .await?,
            );
        }

        let sub_column = |s: &course_sub_criterion::Model| GradesheetColumn {
            id: CriterionKey::Sub(s.id).to_string(),
            actual_id: s.id,
            name: s.name.clone(),
            percentage: s.percentage,
            visible: s.visible_on_gradesheet,
            editable: s.editable_on_gradesheet
                && !s.is_project
                && !subs_with_tasks.contains(&s.id),
            has_tasks: subs_with_tasks.contains(&s.id),
            has_projects: s.is_project || subs_with_projects.contains(&s.id),
            is_special: false,
        };
        let special_column = |s: &course_special_criterion::Model| GradesheetColumn {
            id: CriterionKey::Special(s.id).to_string(),
            actual_id: s.id,
            name: s.name.clone(),
            percentage: s.percentage,
            visible: s.visible_on_gradesheet,
            editable: s.editable_on_gradesheet && !specials_with_tasks.contains(&s.id),
            has_tasks: specials_with_tasks.contains(&s.id),
            has_projects: false,
            is_special: true,
        };
        let shown = |col: &GradesheetColumn| staff || col.visible;

        let mut groups: Vec<GradesheetGroup> = criteria
            .iter()
            .map(|criterion| GradesheetGroup {
                criterion_id: Some(criterion.id),
                name: criterion.name.clone(),
                weight: Some(criterion.weight),
                sub_criteria: subs
                    .iter()
                    .filter(|s| s.parent_criterion_id == criterion.id)
                    .map(sub_column)
                    .filter(shown)
                    .collect(),
                special_criteria: specials
                    .iter()
                    .filter(|s| s.parent_criterion_id == Some(criterion.id))
                    .map(special_column)
                    .filter(shown)
                    .collect(),
            })
            .collect();
        let loose: Vec<GradesheetColumn> = specials
            .iter()
            .filter(|s| s.parent_criterion_id.is_none())
            .map(special_column)
            .filter(shown)
            .collect();
        if !loose.is_empty() {
            groups.push(GradesheetGroup {
                criterion_id: None,
                name: "Extra".to_string(),
                weight: None,
                sub_criteria: Vec::new(),
                special_criteria: loose,
            });
        }

        let visible_keys: HashSet<String> = groups
            .iter()
            .flat_map(|g| g.sub_criteria.iter().chain(&g.special_criteria))
            .map(|col| col.id.clone())
            .collect();

        let mut grades: HashMap<i32, BTreeMap<String, f64>> = HashMap::new();
        if !sub_ids.is_empty() {
            for s in CriterionScoreEntity::find()
                .filter(criterion_score::Column::SubCriterionId.is_in(sub_ids))
                .all(db)
                .await?
            {
                grades
                    .entry(s.enrollment_id)
                    .or_default()
                    .insert(CriterionKey::Sub(s.sub_criterion_id).to_string(), s.score);
            }
        }
        if !special_ids.is_empty() {
            for s in SpecialCriterionScoreEntity::find()
                .filter(special_criterion_score::Column::SpecialCriterionId.is_in(special_ids))
                .all(db)
                .await?
            {
                grades.entry(s.enrollment_id).or_default().insert(
                    CriterionKey::Special(s.special_criterion_id).to_string(),
                    s.score,
                );
            }
        }

        let visible = self.visible_enrollments(db, current, c.id).await?;
        let rows = course_enrollment_views(db, c.id)
            .await?
            .into_iter()
            .filter(|e| visible.as_ref().is_none_or(|v| v.contains(&e.id)))
            .map(|e| {
                let mut row_grades = grades.remove(&e.id).unwrap_or_default();
                row_grades.retain(|key, _| visible_keys.contains(key));
                let student = e.student;
                GradesheetRow {
                    enrollment_id: e.id,
                    student_id: e.student_id,
                    first_name: student.as_ref().map(|s| s.first_name.clone()).unwrap_or_default(),
                    paternal_surname: student
                        .as_ref()
                        .map(|s| s.paternal_surname.clone())
                        .unwrap_or_default(),
                    maternal_surname: student
                        .as_ref()
                        .map(|s| s.maternal_surname.clone())
                        .unwrap_or_default(),
                    ci_number: student.and_then(|s| s.ci_number),
                    grades: row_grades,
                    final_grade: e.final_grade,
                }
            })
            .collect();

        Ok(Gradesheet {
            course_id: c.id,
            groups,
            rows,
        })
    }
}

async fn has_tasks<C: ConnectionTrait>(db: &C, key: CriterionKey) -> Result<bool> {
    let column_filter = match key {
        CriterionKey::Sub(id) => course_task::Column::SubCriterionId.eq(id),
        CriterionKey::Special(id) => course_task::Column::SpecialCriterionId.eq(id),
    };
    Ok(CourseTaskEntity::find()
        .filter(column_filter)
        .one(db)
        .await?
        .is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_criterion_score_input_accepts_both_id_forms() {
        let items: Vec<CriterionScoreInput> = serde_json::from_str(
            r#"[{"enrollment":1,"criterion":3,"score":10},{"enrollment_id":2,"criterion":"special-9","score":2.5}]"#,
        )
        .expect("valid rows");
        assert_eq!(items[0].criterion, CriterionKey::Sub(3));
        assert_eq!(items[1].enrollment, 2);
        assert_eq!(items[1].criterion, CriterionKey::Special(9));
    }

    #[test]
    fn test_task_score_input_aliases() {
        let item: TaskScoreInput =
            serde_json::from_str(r#"{"enrollment_id":4,"task_id":5,"score":88}"#).expect("row");
        assert_eq!((item.enrollment, item.task), (4, 5));
        assert_eq!(item.score, 88.0);
    }
}
