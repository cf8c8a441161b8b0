//! Academic structure: periods, programs, subjects and evaluation templates

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use migration::entities::{
    AcademicPeriodEntity, CourseEntity, CourseSubCriterionEntity, EnrollmentEntity,
    EvaluationCriterionEntity, EvaluationTemplateEntity, ProgramEntity, SubjectEntity,
    academic_period, course, course_sub_criterion, enrollment, evaluation_criterion,
    evaluation_template, program, subject,
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, TransactionTrait,
};
use serde::Deserialize;
use tracing::info;
use ts_rs::TS;

use crate::api::services::school::TS_EXPORT_PATH;
use crate::errors::{Result, SchoolError};
use crate::grading::GradeEngine;
use crate::services::views::{CriterionView, PeriodView, ProgramView, SubjectView, TemplateView};
use crate::storage::{SeaOrmStorage, find_required};
use crate::utils::{non_empty, round2};

// ============ Request DTOs ============

#[derive(Debug, Clone, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct PeriodRequest {
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub parent_period_id: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct ProgramRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct SubjectRequest {
    pub name: String,
    pub code: String,
    pub program_id: i32,
    #[serde(default)]
    pub period_id: Option<i32>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub evaluation_template_id: Option<i32>,
    #[serde(default)]
    pub subcriteria_locked: bool,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct SubjectQuery {
    #[serde(default)]
    pub program_id: Option<i32>,
    #[serde(default)]
    pub period_id: Option<i32>,
    #[serde(default)]
    pub show_archived: bool,
}

#[derive(Debug, Clone, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct CriterionInput {
    /// Present for criteria that already exist
    #[serde(default)]
    pub id: Option<i32>,
    pub name: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct TemplateRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub criteria: Vec<CriterionInput>,
}

fn default_true() -> bool {
    true
}

fn validate_criteria(criteria: &[CriterionInput]) -> Result<()> {
    for c in criteria {
        if c.name.trim().is_empty() {
            return Err(SchoolError::validation("Criterion name is required"));
        }
        if !c.weight.is_finite() || c.weight < 0.0 {
            return Err(SchoolError::validation(format!(
                "Criterion '{}' has an invalid weight",
                c.name
            )));
        }
    }
    Ok(())
}

/// A subject tied to a period that already ended is archived
fn should_archive(period: Option<&academic_period::Model>, today: NaiveDate) -> bool {
    period.is_some_and(|p| p.end_date < today)
}

// ============ AcademicService Implementation ============

pub struct AcademicService {
    storage: Arc<SeaOrmStorage>,
    engine: GradeEngine,
}

impl AcademicService {
    pub fn new(storage: Arc<SeaOrmStorage>, engine: GradeEngine) -> Self {
        Self { storage, engine }
    }

    // ---------- periods ----------

    pub async fn list_periods(&self) -> Result<Vec<PeriodView>> {
        Ok(AcademicPeriodEntity::find()
            .order_by_desc(academic_period::Column::StartDate)
            .all(self.storage.get_db())
            .await?
            .into_iter()
            .map(PeriodView::from)
            .collect())
    }

    pub async fn get_period(&self, id: i32) -> Result<PeriodView> {
        find_required::<AcademicPeriodEntity, _>(self.storage.get_db(), id, "Period")
            .await
            .map(PeriodView::from)
    }

    async fn check_period(&self, req: &PeriodRequest, own_id: Option<i32>) -> Result<()> {
        if req.name.trim().is_empty() {
            return Err(SchoolError::validation("Period name is required"));
        }
        if req.end_date < req.start_date {
            return Err(SchoolError::validation(
                "end_date must not be before start_date",
            ));
        }
        if let Some(parent_id) = req.parent_period_id {
            if Some(parent_id) == own_id {
                return Err(SchoolError::validation("A period cannot be its own parent"));
            }
            find_required::<AcademicPeriodEntity, _>(self.storage.get_db(), parent_id, "Period")
                .await?;
        }
        Ok(())
    }

    pub async fn create_period(&self, req: PeriodRequest) -> Result<PeriodView> {
        self.check_period(&req, None).await?;
        let created = academic_period::ActiveModel {
            name: Set(req.name.trim().to_string()),
            start_date: Set(req.start_date),
            end_date: Set(req.end_date),
            active: Set(req.active),
            parent_period_id: Set(req.parent_period_id),
            ..Default::default()
        }
        .insert(self.storage.get_db())
        .await?;
        info!("AcademicService: created period {}", created.id);
        Ok(PeriodView::from(created))
    }

    pub async fn update_period(&self, id: i32, req: PeriodRequest) -> Result<PeriodView> {
        let db = self.storage.get_db();
        let existing = find_required::<AcademicPeriodEntity, _>(db, id, "Period").await?;
        self.check_period(&req, Some(id)).await?;
        let mut am: academic_period::ActiveModel = existing.into();
        am.name = Set(req.name.trim().to_string());
        am.start_date = Set(req.start_date);
        am.end_date = Set(req.end_date);
        am.active = Set(req.active);
        am.parent_period_id = Set(req.parent_period_id);
        Ok(PeriodView::from(am.update(db).await?))
    }

    pub async fn delete_period(&self, id: i32) -> Result<()> {
        let db = self.storage.get_db();
        find_required::<AcademicPeriodEntity, _>(db, id, "Period").await?;
        AcademicPeriodEntity::delete_by_id(id).exec(db).await?;
        info!("AcademicService: deleted period {}", id);
        Ok(())
    }

    // ---------- programs ----------

    pub async fn list_programs(&self) -> Result<Vec<ProgramView>> {
        Ok(ProgramEntity::find()
            .order_by_asc(program::Column::Name)
            .all(self.storage.get_db())
            .await?
            .into_iter()
            .map(ProgramView::from)
            .collect())
    }

    pub async fn get_program(&self, id: i32) -> Result<ProgramView> {
        find_required::<ProgramEntity, _>(self.storage.get_db(), id, "Program")
            .await
            .map(ProgramView::from)
    }

    pub async fn create_program(&self, req: ProgramRequest) -> Result<ProgramView> {
        if req.name.trim().is_empty() {
            return Err(SchoolError::validation("Program name is required"));
        }
        let created = program::ActiveModel {
            name: Set(req.name.trim().to_string()),
            description: Set(non_empty(req.description.as_deref())),
            ..Default::default()
        }
        .insert(self.storage.get_db())
        .await?;
        Ok(ProgramView::from(created))
    }

    pub async fn update_program(&self, id: i32, req: ProgramRequest) -> Result<ProgramView> {
        let db = self.storage.get_db();
        let existing = find_required::<ProgramEntity, _>(db, id, "Program").await?;
        if req.name.trim().is_empty() {
            return Err(SchoolError::validation("Program name is required"));
        }
        let mut am: program::ActiveModel = existing.into();
        am.name = Set(req.name.trim().to_string());
        am.description = Set(non_empty(req.description.as_deref()));
        Ok(ProgramView::from(am.update(db).await?))
    }

    pub async fn delete_program(&self, id: i32) -> Result<()> {
        let db = self.storage.get_db();
        find_required::<ProgramEntity, _>(db, id, "Program").await?;
        ProgramEntity::delete_by_id(id).exec(db).await?;
        info!("AcademicService: deleted program {}", id);
        Ok(())
    }

    // ---------- subjects ----------

    pub async fn list_subjects(&self, query: SubjectQuery) -> Result<Vec<SubjectView>> {
        let mut select = SubjectEntity::find();
        if let Some(program_id) = query.program_id {
            select = select.filter(subject::Column::ProgramId.eq(program_id));
        }
        if let Some(period_id) = query.period_id {
            select = select.filter(subject::Column::PeriodId.eq(period_id));
        }
        if !query.show_archived {
            select = select.filter(subject::Column::Archived.eq(false));
        }
        Ok(select
            .order_by_asc(subject::Column::Name)
            .all(self.storage.get_db())
            .await?
            .into_iter()
            .map(SubjectView::from)
            .collect())
    }

    pub async fn get_subject(&self, id: i32) -> Result<SubjectView> {
        find_required::<SubjectEntity, _>(self.storage.get_db(), id, "Subject")
            .await
            .map(SubjectView::from)
    }

    /// Validate references and work out the archived flag
    async fn check_subject(&self, req: &SubjectRequest) -> Result<bool> {
        let db = self.storage.get_db();
        if req.name.trim().is_empty() || req.code.trim().is_empty() {
            return Err(SchoolError::validation("Subject name and code are required"));
        }
        find_required::<ProgramEntity, _>(db, req.program_id, "Program").await?;
        if let Some(template_id) = req.evaluation_template_id {
            find_required::<EvaluationTemplateEntity, _>(db, template_id, "Evaluation template")
                .await?;
        }
        let period = match req.period_id {
            Some(period_id) => {
                Some(find_required::<AcademicPeriodEntity, _>(db, period_id, "Period").await?)
            }
            None => None,
        };
        let archived = req.archived || should_archive(period.as_ref(), Utc::now().date_naive());
        if archived && !req.archived {
            info!(
                "Subject '{}' belongs to an ended period, archiving",
                req.code
            );
        }
        Ok(archived)
    }

    pub async fn create_subject(&self, req: SubjectRequest) -> Result<SubjectView> {
        let archived = self.check_subject(&req).await?;
        let created = subject::ActiveModel {
            name: Set(req.name.trim().to_string()),
            code: Set(req.code.trim().to_string()),
            program_id: Set(req.program_id),
            period_id: Set(req.period_id),
            description: Set(non_empty(req.description.as_deref())),
            archived: Set(archived),
            evaluation_template_id: Set(req.evaluation_template_id),
            subcriteria_locked: Set(req.subcriteria_locked),
            ..Default::default()
        }
        .insert(self.storage.get_db())
        .await?;
        info!("AcademicService: created subject {}", created.id);
        Ok(SubjectView::from(created))
    }

    pub async fn update_subject(&self, id: i32, req: SubjectRequest) -> Result<SubjectView> {
        let db = self.storage.get_db();
        let existing = find_required::<SubjectEntity, _>(db, id, "Subject").await?;
        let archived = self.check_subject(&req).await?;
        let template_changed = existing.evaluation_template_id != req.evaluation_template_id;

        let mut am: subject::ActiveModel = existing.into();
        am.name = Set(req.name.trim().to_string());
        am.code = Set(req.code.trim().to_string());
        am.program_id = Set(req.program_id);
        am.period_id = Set(req.period_id);
        am.description = Set(non_empty(req.description.as_deref()));
        am.archived = Set(archived);
        am.evaluation_template_id = Set(req.evaluation_template_id);
        am.subcriteria_locked = Set(req.subcriteria_locked);
        let updated = am.update(db).await?;

        if template_changed {
            let recalculated = self.recalculate_subject(db, updated.id).await?;
            info!(
                "Subject {} template changed, recalculated {} final grades",
                updated.id, recalculated
            );
        }
        Ok(SubjectView::from(updated))
    }

    async fn recalculate_subject<C: ConnectionTrait>(&self, db: &C, subject_id: i32) -> Result<usize> {
        let course_ids: Vec<i32> = CourseEntity::find()
            .filter(course::Column::SubjectId.eq(subject_id))
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
        Ok(self.engine.update_final_grades(db, &enrollment_ids).await)
    }

    pub async fn delete_subject(&self, id: i32) -> Result<()> {
        let db = self.storage.get_db();
        find_required::<SubjectEntity, _>(db, id, "Subject").await?;
        SubjectEntity::delete_by_id(id).exec(db).await?;
        info!("AcademicService: deleted subject {}", id);
        Ok(())
    }

    // ---------- evaluation templates ----------

    async fn template_view<C: ConnectionTrait>(
        &self,
        db: &C,
        template: evaluation_template::Model,
    ) -> Result<TemplateView> {
        let criteria: Vec<CriterionView> = EvaluationCriterionEntity::find()
            .filter(evaluation_criterion::Column::TemplateId.eq(template.id))
            .order_by_asc(evaluation_criterion::Column::Id)
            .all(db)
            .await?
            .into_iter()
            .map(CriterionView::from)
            .collect();
        Ok(TemplateView {
            id: template.id,
            name: template.name,
            description: template.description,
            total_weight: round2(criteria.iter().map(|c| c.weight).sum()),
            criteria,
        })
    }

    pub async fn list_templates(&self) -> Result<Vec<TemplateView>> {
        let db = self.storage.get_db();
        let templates = EvaluationTemplateEntity::find()
            .order_by_asc(evaluation_template::Column::Name)
            .all(db)
            .await?;
        let mut views = Vec::with_capacity(templates.len());
        for template in templates {
            views.push(self.template_view(db, template).await?);
        }
        Ok(views)
    }

    pub async fn get_template(&self, id: i32) -> Result<TemplateView> {
        let db = self.storage.get_db();
        let template =
            find_required::<EvaluationTemplateEntity, _>(db, id, "Evaluation template").await?;
        self.template_view(db, template).await
    }

    pub async fn create_template(&self, req: TemplateRequest) -> Result<TemplateView> {
        if req.name.trim().is_empty() {
            return Err(SchoolError::validation("Template name is required"));
        }
        validate_criteria(&req.criteria)?;

        let txn = self.storage.get_db().begin().await?;
        let template = evaluation_template::ActiveModel {
            name: Set(req.name.trim().to_string()),
            description: Set(non_empty(req.description.as_deref())),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        for c in &req.criteria {
            evaluation_criterion::ActiveModel {
                template_id: Set(Some(template.id)),
                name: Set(c.name.trim().to_string()),
                weight: Set(c.weight),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
        }
        let view = self.template_view(&txn, template).await?;
        txn.commit().await?;

        info!(
            "AcademicService: created template {} with {} criteria",
            view.id,
            view.criteria.len()
        );
        Ok(view)
    }

    /// Replace the template's criteria list.
    ///
    /// Entries with an id update that criterion, entries without one are
    /// created, and criteria missing from the list are removed. A removed
    /// criterion must not have course sub-criteria attached.
    pub async fn update_template(&self, id: i32, req: TemplateRequest) -> Result<TemplateView> {
        if req.name.trim().is_empty() {
            return Err(SchoolError::validation("Template name is required"));
        }
        validate_criteria(&req.criteria)?;

        let txn = self.storage.get_db().begin().await?;
        let template =
            find_required::<EvaluationTemplateEntity, _>(&txn, id, "Evaluation template").await?;
        let existing: HashMap<i32, evaluation_criterion::Model> = EvaluationCriterionEntity::find()
            .filter(evaluation_criterion::Column::TemplateId.eq(id))
            .all(&txn)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        let mut kept = HashSet::new();
        let mut weights_changed = false;
        for input in &req.criteria {
            match input.id {
                Some(cid) => {
                    let current = existing.get(&cid).ok_or_else(|| {
                        SchoolError::validation(format!(
                            "Criterion {} does not belong to template {}",
                            cid, id
                        ))
                    })?;
                    weights_changed |= current.weight != input.weight;
                    let mut am: evaluation_criterion::ActiveModel = current.clone().into();
                    am.name = Set(input.name.trim().to_string());
                    am.weight = Set(input.weight);
                    am.update(&txn).await?;
                    kept.insert(cid);
                }
                None => {
                    evaluation_criterion::ActiveModel {
                        template_id: Set(Some(id)),
                        name: Set(input.name.trim().to_string()),
                        weight: Set(input.weight),
                        ..Default::default()
                    }
                    .insert(&txn)
                    .await?;
                    weights_changed = true;
                }
            }
        }

        let removed: Vec<i32> = existing
            .keys()
            .filter(|cid| !kept.contains(cid))
            .copied()
            .collect();
        if !removed.is_empty() {
            let in_use = CourseSubCriterionEntity::find()
                .filter(course_sub_criterion::Column::ParentCriterionId.is_in(removed.clone()))
                .one(&txn)
                .await?;
            if let Some(sub) = in_use {
                return Err(SchoolError::validation(format!(
                    "Criterion {} is used by course sub-criteria and cannot be removed",
                    sub.parent_criterion_id
                )));
            }
            EvaluationCriterionEntity::delete_many()
                .filter(evaluation_criterion::Column::Id.is_in(removed))
                .exec(&txn)
                .await?;
            weights_changed = true;
        }

        let mut am: evaluation_template::ActiveModel = template.into();
        am.name = Set(req.name.trim().to_string());
        am.description = Set(non_empty(req.description.as_deref()));
        let template = am.update(&txn).await?;

        if weights_changed {
            self.engine
                .recalculate_template_enrollments(&txn, template.id)
                .await?;
        }
        let view = self.template_view(&txn, template).await?;
        txn.commit().await?;
        Ok(view)
    }

    pub async fn delete_template(&self, id: i32) -> Result<()> {
        let db = self.storage.get_db();
        find_required::<EvaluationTemplateEntity, _>(db, id, "Evaluation template").await?;
        EvaluationTemplateEntity::delete_by_id(id).exec(db).await?;
        info!("AcademicService: deleted template {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn period(end: NaiveDate) -> academic_period::Model {
        academic_period::Model {
            id: 1,
            name: "2025-I".into(),
            start_date: NaiveDate::from_ymd_opt(2025, 2, 1).expect("date"),
            end_date: end,
            active: true,
            parent_period_id: None,
        }
    }

    #[test]
    fn test_should_archive_after_period_end() {
        let today = NaiveDate::from_ymd_opt(2025, 8, 1).expect("date");
        let ended = period(NaiveDate::from_ymd_opt(2025, 7, 31).expect("date"));
        let running = period(NaiveDate::from_ymd_opt(2025, 8, 1).expect("date"));
        assert!(should_archive(Some(&ended), today));
        assert!(!should_archive(Some(&running), today));
        assert!(!should_archive(None, today));
    }

    #[test]
    fn test_validate_criteria() {
        let ok = vec![CriterionInput {
            id: None,
            name: "Exams".into(),
            weight: 40.0,
        }];
        assert!(validate_criteria(&ok).is_ok());

        let negative = vec![CriterionInput {
            id: None,
            name: "Exams".into(),
            weight: -1.0,
        }];
        assert!(validate_criteria(&negative).is_err());

        let unnamed = vec![CriterionInput {
            id: Some(3),
            name: "  ".into(),
            weight: 10.0,
        }];
        assert!(validate_criteria(&unnamed).is_err());
    }
}
