//! Course tasks and the task sheet
//!
//! Every write recalculates the criterion that owns the task.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use migration::entities::{
    CourseSpecialCriterionEntity, CourseSubCriterionEntity, CourseTaskEntity, TaskScoreEntity,
    course_special_criterion, course_sub_criterion, course_task, task_score,
};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait, EntityTrait,
    QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use ts_rs::TS;

use crate::api::services::school::TS_EXPORT_PATH;
use crate::errors::{Result, SchoolError};
use crate::grading::GradeEngine;
use crate::services::auth_service::AuthUser;
use crate::services::course_service::{
    children_of, course_enrollment_views, ensure_course_access, ensure_course_staff,
};
use crate::services::views::{CriterionKey, TaskView};
use crate::storage::{Role, SeaOrmStorage, find_required};

/// Course that owns the task, through its sub or special criterion
pub async fn task_course_id<C: ConnectionTrait>(db: &C, task: &course_task::Model) -> Result<i32> {
    match (task.sub_criterion_id, task.special_criterion_id) {
        (Some(sub_id), _) => Ok(
            find_required::<CourseSubCriterionEntity, _>(db, sub_id, "Sub-criterion")
                .await?
                .course_id,
        ),
        (None, Some(special_id)) => Ok(find_required::<CourseSpecialCriterionEntity, _>(
            db,
            special_id,
            "Special criterion",
        )
        .await?
        .course_id),
        (None, None) => Err(SchoolError::grading(format!(
            "Task {} has no owning criterion",
            task.id
        ))),
    }
}

/// Course of a sub or special criterion
pub async fn criterion_course_id<C: ConnectionTrait>(db: &C, key: CriterionKey) -> Result<i32> {
    Ok(match key {
        CriterionKey::Sub(id) => {
            find_required::<CourseSubCriterionEntity, _>(db, id, "Sub-criterion")
                .await?
                .course_id
        }
        CriterionKey::Special(id) => {
            find_required::<CourseSpecialCriterionEntity, _>(db, id, "Special criterion")
                .await?
                .course_id
        }
    })
}

/// All tasks of a course, optionally narrowed to one criterion
pub async fn course_tasks<C: ConnectionTrait>(
    db: &C,
    course_id: i32,
    criterion: Option<CriterionKey>,
) -> Result<Vec<course_task::Model>> {
    let condition = match criterion {
        Some(CriterionKey::Sub(id)) => Condition::all().add(course_task::Column::SubCriterionId.eq(id)),
        Some(CriterionKey::Special(id)) => {
            Condition::all().add(course_task::Column::SpecialCriterionId.eq(id))
        }
        None => {
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
            Condition::any()
                .add(course_task::Column::SubCriterionId.is_in(sub_ids))
                .add(course_task::Column::SpecialCriterionId.is_in(special_ids))
        }
    };
    Ok(CourseTaskEntity::find()
        .filter(condition)
        .order_by_asc(course_task::Column::Id)
        .all(db)
        .await?)
}

// ============ Request/Response DTOs ============

#[derive(Debug, Clone, Default, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct TaskQuery {
    #[serde(default)]
    pub course_id: Option<i32>,
    #[serde(default)]
    pub sub_criterion_id: Option<i32>,
    #[serde(default)]
    pub special_criterion_id: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct TaskRequest {
    #[serde(default)]
    pub sub_criterion_id: Option<i32>,
    #[serde(default)]
    pub special_criterion_id: Option<i32>,
    pub name: String,
    #[serde(default = "default_weight")]
    pub weight: i32,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default = "default_true")]
    pub is_public: bool,
}

#[derive(Debug, Clone, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct TaskSheetQuery {
    pub course_id: i32,
    /// Sub-criterion id or `special-{id}`
    #[serde(default)]
    pub criterion: Option<String>,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct TaskSheetRow {
    pub enrollment_id: i32,
    pub student_id: i32,
    pub first_name: String,
    pub paternal_surname: String,
    pub maternal_surname: String,
    pub ci_number: Option<String>,
    /// task id -> score
    pub scores: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct TaskSheet {
    pub course_id: i32,
    pub tasks: Vec<TaskView>,
    pub rows: Vec<TaskSheetRow>,
}

fn default_weight() -> i32 {
    1
}

fn default_true() -> bool {
    true
}

fn check_task(req: &TaskRequest) -> Result<()> {
    match (req.sub_criterion_id, req.special_criterion_id) {
        (Some(_), None) | (None, Some(_)) => {}
        _ => {
            return Err(SchoolError::validation(
                "A task belongs to exactly one of sub_criterion_id or special_criterion_id",
            ));
        }
    }
    if req.name.trim().is_empty() {
        return Err(SchoolError::validation("Task name is required"));
    }
    if req.weight < 0 {
        return Err(SchoolError::validation("Task weight must not be negative"));
    }
    Ok(())
}

// ============ TaskService Implementation ============

pub struct TaskService {
    storage: Arc<SeaOrmStorage>,
    engine: GradeEngine,
}

impl TaskService {
    pub fn new(storage: Arc<SeaOrmStorage>, engine: GradeEngine) -> Self {
        Self { storage, engine }
    }

    async fn request_course_id<C: ConnectionTrait>(&self, db: &C, req: &TaskRequest) -> Result<i32> {
        let probe = course_task::Model {
            id: 0,
            sub_criterion_id: req.sub_criterion_id,
            special_criterion_id: req.special_criterion_id,
            name: String::new(),
            weight: 0,
            is_locked: false,
            is_public: false,
        };
        task_course_id(db, &probe).await
    }

    pub async fn list_tasks(&self, current: &AuthUser, query: TaskQuery) -> Result<Vec<TaskView>> {
        let db = self.storage.get_db();
        let (course_id, criterion) = match (query.sub_criterion_id, query.special_criterion_id) {
            (Some(id), _) => (
                find_required::<CourseSubCriterionEntity, _>(db, id, "Sub-criterion")
                    .await?
                    .course_id,
                Some(CriterionKey::Sub(id)),
            ),
            (None, Some(id)) => (
                find_required::<CourseSpecialCriterionEntity, _>(db, id, "Special criterion")
                    .await?
                    .course_id,
                Some(CriterionKey::Special(id)),
            ),
            (None, None) => {
                let course_id = query.course_id.ok_or_else(|| {
                    SchoolError::validation(
                        "course_id, sub_criterion_id or special_criterion_id is required",
                    )
                })?;
                (course_id, None)
            }
        };
        ensure_course_access(db, current, course_id).await?;

        let student_view = !current.role.can_manage_grades();
        Ok(course_tasks(db, course_id, criterion)
            .await?
            .into_iter()
            .filter(|t| !student_view || t.is_public)
            .map(TaskView::from)
            .collect())
    }

    pub async fn get_task(&self, current: &AuthUser, id: i32) -> Result<TaskView> {
        let db = self.storage.get_db();
        let task = find_required::<CourseTaskEntity, _>(db, id, "Task").await?;
        ensure_course_access(db, current, task_course_id(db, &task).await?).await?;
        if !task.is_public && !current.role.can_manage_grades() {
            return Err(SchoolError::not_found(format!("Task {} not found", id)));
        }
        Ok(TaskView::from(task))
    }

    pub async fn create_task(&self, current: &AuthUser, req: TaskRequest) -> Result<TaskView> {
        check_task(&req)?;
        let txn = self.storage.get_db().begin().await?;
        let course_id = self.request_course_id(&txn, &req).await?;
        ensure_course_staff(&txn, current, course_id).await?;

        let task = course_task::ActiveModel {
            sub_criterion_id: Set(req.sub_criterion_id),
            special_criterion_id: Set(req.special_criterion_id),
            name: Set(req.name.trim().to_string()),
            weight: Set(req.weight),
            is_locked: Set(req.is_locked),
            is_public: Set(req.is_public),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        // 有任务的子项由任务计算，不能再在成绩单上直接编辑
        if let Some(sub_id) = task.sub_criterion_id {
            CourseSubCriterionEntity::update_many()
                .col_expr(
                    course_sub_criterion::Column::EditableOnGradesheet,
                    Expr::value(false),
                )
                .filter(course_sub_criterion::Column::Id.eq(sub_id))
                .exec(&txn)
                .await?;
        }
        let recalculated = self.engine.recalculate_for_task(&txn, &task, None).await?;
        txn.commit().await?;

        info!(
            "TaskService: created task {} in course {}, recalculated {} enrollments",
            task.id, course_id, recalculated
        );
        Ok(TaskView::from(task))
    }

    pub async fn update_task(&self, current: &AuthUser, id: i32, req: TaskRequest) -> Result<TaskView> {
        check_task(&req)?;
        let txn = self.storage.get_db().begin().await?;
        let existing = find_required::<CourseTaskEntity, _>(&txn, id, "Task").await?;
        let old_course = task_course_id(&txn, &existing).await?;
        ensure_course_staff(&txn, current, old_course).await?;
        let new_course = self.request_course_id(&txn, &req).await?;
        if new_course != old_course {
            return Err(SchoolError::validation(
                "A task cannot move to another course",
            ));
        }

        let owner_changed = existing.sub_criterion_id != req.sub_criterion_id
            || existing.special_criterion_id != req.special_criterion_id;
        let previous = existing.clone();

        let mut am: course_task::ActiveModel = existing.into();
        am.sub_criterion_id = Set(req.sub_criterion_id);
        am.special_criterion_id = Set(req.special_criterion_id);
        am.name = Set(req.name.trim().to_string());
        am.weight = Set(req.weight);
        am.is_locked = Set(req.is_locked);
        am.is_public = Set(req.is_public);
        let updated = am.update(&txn).await?;

        if owner_changed {
            self.engine.recalculate_for_task(&txn, &previous, None).await?;
        }
        self.engine.recalculate_for_task(&txn, &updated, None).await?;
        txn.commit().await?;
        Ok(TaskView::from(updated))
    }

    pub async fn delete_task(&self, current: &AuthUser, id: i32) -> Result<()> {
        let txn = self.storage.get_db().begin().await?;
        let task = find_required::<CourseTaskEntity, _>(&txn, id, "Task").await?;
        ensure_course_staff(&txn, current, task_course_id(&txn, &task).await?).await?;
        if task.is_locked && !current.is_admin() {
            return Err(SchoolError::permission_denied("Task is locked"));
        }

        CourseTaskEntity::delete_by_id(id).exec(&txn).await?;
        self.engine.recalculate_for_task(&txn, &task, None).await?;
        txn.commit().await?;
        info!("TaskService: deleted task {}", id);
        Ok(())
    }

    /// Tasks of a course with one row of scores per enrollment
    pub async fn task_sheet(&self, current: &AuthUser, query: TaskSheetQuery) -> Result<TaskSheet> {
        let db = self.storage.get_db();
        ensure_course_access(db, current, query.course_id).await?;
        let criterion = query
            .criterion
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .map(CriterionKey::parse)
            .transpose()?;
        if let Some(key) = criterion
            && criterion_course_id(db, key).await? != query.course_id
        {
            return Err(SchoolError::validation(format!(
                "Criterion {} does not belong to course {}",
                key, query.course_id
            )));
        }

        let mut tasks = course_tasks(db, query.course_id, criterion).await?;
        if current.role == Role::Student || current.role == Role::Parent {
            tasks.retain(|t| t.is_public);
        }
        let mut enrollments = course_enrollment_views(db, query.course_id).await?;
        match current.role {
            Role::Student => enrollments.retain(|e| e.student_id == current.id),
            Role::Parent => {
                let children = children_of(db, current.id).await?;
                enrollments.retain(|e| children.contains(&e.student_id));
            }
            Role::Admin | Role::Teacher => {}
        }

        let task_ids: Vec<i32> = tasks.iter().map(|t| t.id).collect();
        let mut scores: HashMap<i32, BTreeMap<String, f64>> = HashMap::new();
        if !task_ids.is_empty() {
            for s in TaskScoreEntity::find()
                .filter(task_score::Column::TaskId.is_in(task_ids))
                .all(db)
                .await?
            {
                scores
                    .entry(s.enrollment_id)
                    .or_default()
                    .insert(s.task_id.to_string(), s.score);
            }
        }

        let rows = enrollments
            .into_iter()
            .map(|e| {
                let student = e.student.clone();
                TaskSheetRow {
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
                    scores: scores.remove(&e.id).unwrap_or_default(),
                }
            })
            .collect();

        Ok(TaskSheet {
            course_id: query.course_id,
            tasks: tasks.into_iter().map(TaskView::from).collect(),
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(sub: Option<i32>, special: Option<i32>, weight: i32) -> TaskRequest {
        TaskRequest {
            sub_criterion_id: sub,
            special_criterion_id: special,
            name: "Quiz".into(),
            weight,
            is_locked: false,
            is_public: true,
        }
    }

    #[test]
    fn test_task_needs_exactly_one_owner() {
        assert!(check_task(&req(Some(1), None, 1)).is_ok());
        assert!(check_task(&req(None, Some(2), 1)).is_ok());
        assert!(check_task(&req(Some(1), Some(2), 1)).is_err());
        assert!(check_task(&req(None, None, 1)).is_err());
    }

    #[test]
    fn test_task_weight_not_negative() {
        assert!(check_task(&req(Some(1), None, 0)).is_ok());
        assert!(check_task(&req(Some(1), None, -2)).is_err());
    }
}
