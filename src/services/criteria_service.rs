//! Course sub-criteria and special criteria
//!
//! Percentage changes and bulk setting updates trigger recalculation of the
//! criterion's scores; deletions refresh the final grades of the course.

use std::sync::Arc;

use chrono::NaiveDate;
use migration::entities::{
    CourseSpecialCriterionEntity, CourseSubCriterionEntity, EnrollmentEntity,
    EvaluationCriterionEntity, ProjectEntity, SubjectEntity, course, course_special_criterion,
    course_sub_criterion, enrollment, project,
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use ts_rs::TS;

use crate::api::services::school::TS_EXPORT_PATH;
use crate::errors::{Result, SchoolError};
use crate::grading::GradeEngine;
use crate::services::auth_service::AuthUser;
use crate::services::course_service::{ensure_course_access, ensure_course_staff};
use crate::services::views::{CriterionKey, SpecialCriterionView, SubCriterionView};
use crate::storage::{SeaOrmStorage, find_required};

// ============ Request DTOs ============

#[derive(Debug, Clone, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct CriteriaQuery {
    pub course_id: i32,
}

#[derive(Debug, Clone, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct SubCriterionRequest {
    pub course_id: i32,
    pub parent_criterion_id: i32,
    pub name: String,
    pub percentage: f64,
    #[serde(default = "default_true")]
    pub visible_on_gradesheet: bool,
    #[serde(default = "default_true")]
    pub editable_on_gradesheet: bool,
    #[serde(default)]
    pub is_project: bool,
    #[serde(default)]
    pub is_project_registration_open: bool,
    #[serde(default)]
    pub registration_start: Option<NaiveDate>,
    #[serde(default)]
    pub registration_end: Option<NaiveDate>,
    #[serde(default)]
    pub max_members: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct SpecialCriterionRequest {
    pub course_id: i32,
    #[serde(default)]
    pub parent_criterion_id: Option<i32>,
    pub name: String,
    pub percentage: f64,
    #[serde(default = "default_true")]
    pub visible_on_gradesheet: bool,
    #[serde(default = "default_true")]
    pub editable_on_gradesheet: bool,
}

#[derive(Debug, Clone, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct SettingUpdate {
    pub id: CriterionKey,
    #[serde(default, alias = "visible")]
    pub visible_on_gradesheet: Option<bool>,
    #[serde(default, alias = "editable")]
    pub editable_on_gradesheet: Option<bool>,
    #[serde(default)]
    pub percentage: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct BulkSettingsRequest {
    pub updates: Vec<SettingUpdate>,
}

#[derive(Debug, Clone, Default, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct BulkSettingsResult {
    pub updated: usize,
    pub recalculated: usize,
}

fn default_true() -> bool {
    true
}

fn check_percentage(percentage: f64) -> Result<()> {
    if !percentage.is_finite() || percentage < 0.0 {
        return Err(SchoolError::validation("percentage must be a non-negative number"));
    }
    Ok(())
}

fn check_max_members(max_members: Option<i32>) -> Result<()> {
    if max_members.is_some_and(|n| n < 1) {
        return Err(SchoolError::validation("max_members must be at least 1"));
    }
    Ok(())
}

// ============ CriteriaService Implementation ============

pub struct CriteriaService {
    storage: Arc<SeaOrmStorage>,
    engine: GradeEngine,
}

impl CriteriaService {
    pub fn new(storage: Arc<SeaOrmStorage>, engine: GradeEngine) -> Self {
        Self { storage, engine }
    }

    /// Non-admins may not add or remove sub-criteria of a locked subject
    async fn ensure_unlocked<C: ConnectionTrait>(
        &self,
        db: &C,
        current: &AuthUser,
        c: &course::Model,
    ) -> Result<()> {
        if current.is_admin() {
            return Ok(());
        }
        let locked = SubjectEntity::find_by_id(c.subject_id)
            .one(db)
            .await?
            .is_some_and(|s| s.subcriteria_locked);
        if locked {
            return Err(SchoolError::permission_denied(
                "Sub-criteria of this subject are locked",
            ));
        }
        Ok(())
    }

    /// The parent must belong to the template of the course's subject, when it has one
    async fn check_parent<C: ConnectionTrait>(
        &self,
        db: &C,
        c: &course::Model,
        parent_id: i32,
    ) -> Result<()> {
        let parent =
            find_required::<EvaluationCriterionEntity, _>(db, parent_id, "Evaluation criterion")
                .await?;
        let template_id = SubjectEntity::find_by_id(c.subject_id)
            .one(db)
            .await?
            .and_then(|s| s.evaluation_template_id);
        if let Some(template_id) = template_id
            && parent.template_id != Some(template_id)
        {
            return Err(SchoolError::validation(format!(
                "Criterion {} is not part of the course's evaluation template",
                parent_id
            )));
        }
        Ok(())
    }

    async fn refresh_course_grades<C: ConnectionTrait>(&self, db: &C, course_id: i32) -> Result<usize> {
        let ids: Vec<i32> = EnrollmentEntity::find()
            .filter(enrollment::Column::CourseId.eq(course_id))
            .all(db)
            .await?
            .into_iter()
            .map(|e| e.id)
            .collect();
        Ok(self.engine.update_final_grades(db, &ids).await)
    }

    // ---------- sub-criteria ----------

    pub async fn list_sub_criteria(
        &self,
        current: &AuthUser,
        course_id: i32,
    ) -> Result<Vec<SubCriterionView>> {
        let db = self.storage.get_db();
        ensure_course_access(db, current, course_id).await?;
        Ok(CourseSubCriterionEntity::find()
            .filter(course_sub_criterion::Column::CourseId.eq(course_id))
            .order_by_asc(course_sub_criterion::Column::ParentCriterionId)
            .order_by_asc(course_sub_criterion::Column::Id)
            .all(db)
            .await?
            .into_iter()
            .map(SubCriterionView::from)
            .collect())
    }

    pub async fn get_sub_criterion(&self, current: &AuthUser, id: i32) -> Result<SubCriterionView> {
        let db = self.storage.get_db();
        let sub = find_required::<CourseSubCriterionEntity, _>(db, id, "Sub-criterion").await?;
        ensure_course_access(db, current, sub.course_id).await?;
        Ok(SubCriterionView::from(sub))
    }

    pub async fn create_sub_criterion(
        &self,
        current: &AuthUser,
        req: SubCriterionRequest,
    ) -> Result<SubCriterionView> {
        let db = self.storage.get_db();
        let c = ensure_course_staff(db, current, req.course_id).await?;
        self.ensure_unlocked(db, current, &c).await?;
        self.check_parent(db, &c, req.parent_criterion_id).await?;
        check_percentage(req.percentage)?;
        check_max_members(req.max_members)?;
        if req.name.trim().is_empty() {
            return Err(SchoolError::validation("Sub-criterion name is required"));
        }

        let created = course_sub_criterion::ActiveModel {
            course_id: Set(req.course_id),
            parent_criterion_id: Set(req.parent_criterion_id),
            name: Set(req.name.trim().to_string()),
            percentage: Set(req.percentage),
            visible_on_gradesheet: Set(req.visible_on_gradesheet),
            editable_on_gradesheet: Set(req.editable_on_gradesheet),
            is_project: Set(req.is_project),
            is_project_registration_open: Set(req.is_project_registration_open),
            registration_start: Set(req.registration_start),
            registration_end: Set(req.registration_end),
            max_members: Set(req.max_members),
            ..Default::default()
        }
        .insert(db)
        .await?;
        info!(
            "CriteriaService: created sub-criterion {} in course {}",
            created.id, created.course_id
        );
        Ok(SubCriterionView::from(created))
    }

    pub async fn update_sub_criterion(
        &self,
        current: &AuthUser,
        id: i32,
        req: SubCriterionRequest,
    ) -> Result<SubCriterionView> {
        let txn = self.storage.get_db().begin().await?;
        let existing = find_required::<CourseSubCriterionEntity, _>(&txn, id, "Sub-criterion").await?;
        if existing.course_id != req.course_id {
            return Err(SchoolError::validation(
                "A sub-criterion cannot move to another course",
            ));
        }
        let c = ensure_course_staff(&txn, current, existing.course_id).await?;
        if existing.parent_criterion_id != req.parent_criterion_id {
            self.check_parent(&txn, &c, req.parent_criterion_id).await?;
        }
        check_percentage(req.percentage)?;
        check_max_members(req.max_members)?;

        let percentage_changed = existing.percentage != req.percentage;
        let project_disabled = existing.is_project && !req.is_project;

        let mut am: course_sub_criterion::ActiveModel = existing.into();
        am.parent_criterion_id = Set(req.parent_criterion_id);
        am.name = Set(req.name.trim().to_string());
        am.percentage = Set(req.percentage);
        am.visible_on_gradesheet = Set(req.visible_on_gradesheet);
        am.editable_on_gradesheet = Set(req.editable_on_gradesheet);
        am.is_project = Set(req.is_project);
        am.is_project_registration_open = Set(req.is_project && req.is_project_registration_open);
        am.registration_start = Set(req.registration_start);
        am.registration_end = Set(req.registration_end);
        am.max_members = Set(req.max_members);
        let updated = am.update(&txn).await?;

        if project_disabled {
            let removed = ProjectEntity::delete_many()
                .filter(project::Column::SubCriterionId.eq(updated.id))
                .exec(&txn)
                .await?;
            info!(
                "Sub-criterion {} is no longer a project, removed {} projects",
                updated.id, removed.rows_affected
            );
        }
        if percentage_changed {
            if !updated.is_project {
                self.engine
                    .recalculate_sub_criterion(&txn, updated.id, None)
                    .await?;
            }
            self.engine.cap_sub_criterion_scores(&txn, &updated).await?;
        }
        // 父项变化会影响封顶分组
        self.refresh_course_grades(&txn, updated.course_id).await?;
        txn.commit().await?;
        Ok(SubCriterionView::from(updated))
    }

    pub async fn delete_sub_criterion(&self, current: &AuthUser, id: i32) -> Result<()> {
        let txn = self.storage.get_db().begin().await?;
        let sub = find_required::<CourseSubCriterionEntity, _>(&txn, id, "Sub-criterion").await?;
        let c = ensure_course_staff(&txn, current, sub.course_id).await?;
        self.ensure_unlocked(&txn, current, &c).await?;

        CourseSubCriterionEntity::delete_by_id(id).exec(&txn).await?;
        let refreshed = self.refresh_course_grades(&txn, c.id).await?;
        txn.commit().await?;
        info!(
            "CriteriaService: deleted sub-criterion {}, refreshed {} final grades",
            id, refreshed
        );
        Ok(())
    }

    pub async fn bulk_sub_settings(
        &self,
        current: &AuthUser,
        req: BulkSettingsRequest,
    ) -> Result<BulkSettingsResult> {
        current.require_staff()?;
        let txn = self.storage.get_db().begin().await?;
        let mut result = BulkSettingsResult::default();

        for update in &req.updates {
            let CriterionKey::Sub(id) = update.id else {
                return Err(SchoolError::validation(format!(
                    "'{}' is not a sub-criterion id",
                    update.id
                )));
            };
            let sub = find_required::<CourseSubCriterionEntity, _>(&txn, id, "Sub-criterion").await?;
            ensure_course_staff(&txn, current, sub.course_id).await?;

            let mut am: course_sub_criterion::ActiveModel = sub.clone().into();
            if let Some(v) = update.visible_on_gradesheet {
                am.visible_on_gradesheet = Set(v);
            }
            if let Some(v) = update.editable_on_gradesheet {
                am.editable_on_gradesheet = Set(v);
            }
            if let Some(p) = update.percentage {
                check_percentage(p)?;
                am.percentage = Set(p);
            }
            let updated = am.update(&txn).await?;
            result.updated += 1;

            if !updated.is_project
                && self
                    .engine
                    .recalculate_sub_criterion(&txn, updated.id, None)
                    .await?
                    > 0
            {
                result.recalculated += 1;
            }
            if update.percentage.is_some() {
                let capped = self.engine.cap_sub_criterion_scores(&txn, &updated).await?;
                self.engine.update_final_grades(&txn, &capped).await;
            }
        }

        txn.commit().await?;
        info!(
            "CriteriaService: bulk settings updated {} sub-criteria, recalculated {}",
            result.updated, result.recalculated
        );
        Ok(result)
    }

    // ---------- special criteria ----------

    pub async fn list_special_criteria(
        &self,
        current: &AuthUser,
        course_id: i32,
    ) -> Result<Vec<SpecialCriterionView>> {
        let db = self.storage.get_db();
        ensure_course_access(db, current, course_id).await?;
        Ok(CourseSpecialCriterionEntity::find()
            .filter(course_special_criterion::Column::CourseId.eq(course_id))
            .order_by_asc(course_special_criterion::Column::Id)
            .all(db)
            .await?
            .into_iter()
            .map(SpecialCriterionView::from)
            .collect())
    }

    pub async fn get_special_criterion(
        &self,
        current: &AuthUser,
        id: i32,
    ) -> Result<SpecialCriterionView> {
        let db = self.storage.get_db();
        let special =
            find_required::<CourseSpecialCriterionEntity, _>(db, id, "Special criterion").await?;
        ensure_course_access(db, current, special.course_id).await?;
        Ok(SpecialCriterionView::from(special))
    }

    pub async fn create_special_criterion(
        &self,
        current: &AuthUser,
        req: SpecialCriterionRequest,
    ) -> Result<SpecialCriterionView> {
        let db = self.storage.get_db();
        let c = ensure_course_staff(db, current, req.course_id).await?;
        if let Some(parent_id) = req.parent_criterion_id {
            self.check_parent(db, &c, parent_id).await?;
        }
        check_percentage(req.percentage)?;
        if req.name.trim().is_empty() {
            return Err(SchoolError::validation("Special criterion name is required"));
        }

        let created = course_special_criterion::ActiveModel {
            course_id: Set(req.course_id),
            parent_criterion_id: Set(req.parent_criterion_id),
            name: Set(req.name.trim().to_string()),
            percentage: Set(req.percentage),
            visible_on_gradesheet: Set(req.visible_on_gradesheet),
            editable_on_gradesheet: Set(req.editable_on_gradesheet),
            ..Default::default()
        }
        .insert(db)
        .await?;
        info!(
            "CriteriaService: created special criterion {} in course {}",
            created.id, created.course_id
        );
        Ok(SpecialCriterionView::from(created))
    }

    pub async fn update_special_criterion(
        &self,
        current: &AuthUser,
        id: i32,
        req: SpecialCriterionRequest,
    ) -> Result<SpecialCriterionView> {
        let txn = self.storage.get_db().begin().await?;
        let existing =
            find_required::<CourseSpecialCriterionEntity, _>(&txn, id, "Special criterion").await?;
        if existing.course_id != req.course_id {
            return Err(SchoolError::validation(
                "A special criterion cannot move to another course",
            ));
        }
        let c = ensure_course_staff(&txn, current, existing.course_id).await?;
        if let Some(parent_id) = req.parent_criterion_id
            && existing.parent_criterion_id != Some(parent_id)
        {
            self.check_parent(&txn, &c, parent_id).await?;
        }
        check_percentage(req.percentage)?;
        let percentage_changed = existing.percentage != req.percentage;

        let mut am: course_special_criterion::ActiveModel = existing.into();
        am.parent_criterion_id = Set(req.parent_criterion_id);
        am.name = Set(req.name.trim().to_string());
        am.percentage = Set(req.percentage);
        am.visible_on_gradesheet = Set(req.visible_on_gradesheet);
        am.editable_on_gradesheet = Set(req.editable_on_gradesheet);
        let updated = am.update(&txn).await?;

        if percentage_changed {
            self.engine
                .recalculate_special_criterion(&txn, updated.id, None)
                .await?;
            self.engine
                .cap_special_criterion_scores(&txn, &updated)
                .await?;
        }
        self.refresh_course_grades(&txn, updated.course_id).await?;
        txn.commit().await?;
        Ok(SpecialCriterionView::from(updated))
    }

    pub async fn delete_special_criterion(&self, current: &AuthUser, id: i32) -> Result<()> {
        let txn = self.storage.get_db().begin().await?;
        let special =
            find_required::<CourseSpecialCriterionEntity, _>(&txn, id, "Special criterion").await?;
        ensure_course_staff(&txn, current, special.course_id).await?;
        CourseSpecialCriterionEntity::delete_by_id(id).exec(&txn).await?;
        self.refresh_course_grades(&txn, special.course_id).await?;
        txn.commit().await?;
        info!("CriteriaService: deleted special criterion {}", id);
        Ok(())
    }

    /// Same as [`bulk_sub_settings`](Self::bulk_sub_settings); ids may carry the `special-` prefix
    pub async fn bulk_special_settings(
        &self,
        current: &AuthUser,
        req: BulkSettingsRequest,
    ) -> Result<BulkSettingsResult> {
        current.require_staff()?;
        let txn = self.storage.get_db().begin().await?;
        let mut result = BulkSettingsResult::default();

        for update in &req.updates {
            let id = match update.id {
                CriterionKey::Special(id) | CriterionKey::Sub(id) => id,
            };
            let special =
                find_required::<CourseSpecialCriterionEntity, _>(&txn, id, "Special criterion")
                    .await?;
            ensure_course_staff(&txn, current, special.course_id).await?;

            let mut am: course_special_criterion::ActiveModel = special.into();
            if let Some(v) = update.visible_on_gradesheet {
                am.visible_on_gradesheet = Set(v);
            }
            if let Some(v) = update.editable_on_gradesheet {
                am.editable_on_gradesheet = Set(v);
            }
            if let Some(p) = update.percentage {
                check_percentage(p)?;
                am.percentage = Set(p);
            }
            let updated = am.update(&txn).await?;
            result.updated += 1;

            if self
                .engine
                .recalculate_special_criterion(&txn, updated.id, None)
                .await?
                > 0
            {
                result.recalculated += 1;
            }
            if update.percentage.is_some() {
                let capped = self
                    .engine
                    .cap_special_criterion_scores(&txn, &updated)
                    .await?;
                self.engine.update_final_grades(&txn, &capped).await;
            }
        }

        txn.commit().await?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setting_update_accepts_prefixed_ids() {
        let req: BulkSettingsRequest = serde_json::from_str(
            r#"{"updates":[{"id":"special-4","visible":false},{"id":7,"editable":true,"percentage":12.5}]}"#,
        )
        .expect("valid payload");
        assert_eq!(req.updates[0].id, CriterionKey::Special(4));
        assert_eq!(req.updates[0].visible_on_gradesheet, Some(false));
        assert_eq!(req.updates[1].id, CriterionKey::Sub(7));
        assert_eq!(req.updates[1].editable_on_gradesheet, Some(true));
        assert_eq!(req.updates[1].percentage, Some(12.5));
    }

    #[test]
    fn test_check_percentage() {
        assert!(check_percentage(0.0).is_ok());
        assert!(check_percentage(25.0).is_ok());
        assert!(check_percentage(-0.5).is_err());
        assert!(check_percentage(f64::NAN).is_err());
    }
}
