//! Group projects
//!
//! A project belongs to a project sub-criterion; its single score is copied
//! to every member. Students can also form groups themselves while the
//! sub-criterion's registration window is open.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use migration::entities::{
    CourseSubCriterionEntity, EnrollmentEntity, ProjectEntity, ProjectMemberEntity,
    course_sub_criterion, enrollment, project, project_member,
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
use crate::services::course_service::{ensure_course_access, ensure_course_staff, users_by_id, window_contains};
use crate::services::enrollment_service::find_enrollment_by_ci;
use crate::services::views::{EnrollmentView, StudentSummary};
use crate::storage::{SeaOrmStorage, find_required};
use crate::utils::non_empty;

// ============ Request/Response DTOs ============

#[derive(Debug, Clone, Default, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct ProjectQuery {
    #[serde(default)]
    pub course_id: Option<i32>,
    #[serde(default)]
    pub sub_criterion_id: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct ProjectRequest {
    pub sub_criterion_id: i32,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub student_in_charge_id: Option<i32>,
    #[serde(default)]
    pub score: f64,
    /// Enrollment ids; `None` keeps the current members on update
    #[serde(default)]
    pub member_ids: Option<Vec<i32>>,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct ProjectView {
    pub id: i32,
    pub course_id: i32,
    pub sub_criterion_id: i32,
    pub name: String,
    pub description: Option<String>,
    pub student_in_charge_id: Option<i32>,
    pub score: f64,
    pub members: Vec<EnrollmentView>,
}

#[derive(Debug, Clone, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct AvailableProjectsQuery {
    pub course_id: i32,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct AvailableProject {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub member_count: usize,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct OpenProjectCriterion {
    pub sub_criterion_id: i32,
    pub name: String,
    pub max_members: Option<i32>,
    pub registration_start: Option<NaiveDate>,
    pub registration_end: Option<NaiveDate>,
    pub projects: Vec<AvailableProject>,
}

#[derive(Debug, Clone, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct ValidateStudentRequest {
    pub course_id: i32,
    pub sub_criterion_id: i32,
    pub ci: String,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct ValidatedStudent {
    pub enrollment_id: i32,
    pub student: StudentSummary,
}

#[derive(Debug, Clone, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct ProjectRegistrationRequest {
    pub course_id: i32,
    pub sub_criterion_id: i32,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub leader_ci: String,
    #[serde(default)]
    pub member_cis: Vec<String>,
}

// ============ Shared helpers ============

async fn project_views<C: ConnectionTrait>(db: &C, projects: Vec<project::Model>) -> Result<Vec<ProjectView>> {
    if projects.is_empty() {
        return Ok(Vec::new());
    }
    let members = ProjectMemberEntity::find()
        .filter(project_member::Column::ProjectId.is_in(projects.iter().map(|p| p.id)))
        .all(db)
        .await?;
    let enrollments: HashMap<i32, enrollment::Model> = EnrollmentEntity::find()
        .filter(enrollment::Column::Id.is_in(members.iter().map(|m| m.enrollment_id)))
        .all(db)
        .await?
        .into_iter()
        .map(|e| (e.id, e))
        .collect();
    let students = users_by_id(db, enrollments.values().map(|e| e.student_id)).await?;

    let mut by_project: HashMap<i32, Vec<EnrollmentView>> = HashMap::new();
    for member in members {
        if let Some(e) = enrollments.get(&member.enrollment_id) {
            by_project
                .entry(member.project_id)
                .or_default()
                .push(EnrollmentView::new(e.clone(), students.get(&e.student_id)));
        }
    }

    Ok(projects
        .into_iter()
        .map(|p| ProjectView {
            members: by_project.remove(&p.id).unwrap_or_default(),
            id: p.id,
            course_id: p.course_id,
            sub_criterion_id: p.sub_criterion_id,
            name: p.name,
            description: p.description,
            student_in_charge_id: p.student_in_charge_id,
            score: p.score,
        })
        .collect())
}

async fn project_view<C: ConnectionTrait>(db: &C, p: project::Model) -> Result<ProjectView> {
    project_views(db, vec![p])
        .await?
        .pop()
        .ok_or_else(|| SchoolError::not_found("Project not found"))
}

/// Enrollments of `candidates` already grouped in another project of the sub-criterion
async fn already_grouped<C: ConnectionTrait>(
    db: &C,
    sub_criterion_id: i32,
    candidates: &[i32],
    except_project: Option<i32>,
) -> Result<Vec<i32>> {
    let mut projects = ProjectEntity::find().filter(project::Column::SubCriterionId.eq(sub_criterion_id));
    if let Some(id) = except_project {
        projects = projects.filter(project::Column::Id.ne(id));
    }
    let project_ids: Vec<i32> = projects.all(db).await?.into_iter().map(|p| p.id).collect();
    if project_ids.is_empty() || candidates.is_empty() {
        return Ok(Vec::new());
    }
    Ok(ProjectMemberEntity::find()
        .filter(project_member::Column::ProjectId.is_in(project_ids))
        .filter(project_member::Column::EnrollmentId.is_in(candidates.to_vec()))
        .all(db)
        .await?
        .into_iter()
        .map(|m| m.enrollment_id)
        .collect())
}

/// Replace the member list of a project.
///
/// Removed members keep the CriterionScore last synced from the project;
/// it is not reset, so their grade stays as it was when they left.
async fn replace_members<C: ConnectionTrait>(db: &C, project_id: i32, members: &[i32]) -> Result<()> {
    let removed: Vec<i32> = ProjectMemberEntity::find()
        .filter(project_member::Column::ProjectId.eq(project_id))
        .all(db)
        .await?
        .into_iter()
        .map(|m| m.enrollment_id)
        .filter(|id| !members.contains(id))
        .collect();
    if !removed.is_empty() {
        info!(
            "Project {}: enrollments {:?} left the group and keep their last project score",
            project_id, removed
        );
    }

    ProjectMemberEntity::delete_many()
        .filter(project_member::Column::ProjectId.eq(project_id))
        .exec(db)
        .await?;
    if members.is_empty() {
        return Ok(());
    }
    ProjectMemberEntity::insert_many(members.iter().map(|&enrollment_id| project_member::ActiveModel {
        project_id: Set(project_id),
        enrollment_id: Set(enrollment_id),
    }))
    .exec(db)
    .await?;
    Ok(())
}

fn check_project_criterion(sub: &course_sub_criterion::Model) -> Result<()> {
    if sub.is_project {
        Ok(())
    } else {
        Err(SchoolError::validation(format!(
            "Sub-criterion '{}' is not a project criterion",
            sub.name
        )))
    }
}

/// `max_members` of `None` leaves the group size unbounded
fn check_group_size(sub: &course_sub_criterion::Model, size: usize) -> Result<()> {
    match sub.max_members {
        Some(max) if size > max.max(0) as usize => Err(SchoolError::validation(format!(
            "A project of '{}' has at most {} members",
            sub.name, max
        ))),
        _ => Ok(()),
    }
}

/// Registration of a project sub-criterion is open today
fn registration_open(sub: &course_sub_criterion::Model, today: NaiveDate) -> bool {
    sub.is_project_registration_open && window_contains(sub.registration_start, sub.registration_end, today)
}

// ============ ProjectService Implementation ============

pub struct ProjectService {
    storage: Arc<SeaOrmStorage>,
    engine: GradeEngine,
}

impl ProjectService {
    pub fn new(storage: Arc<SeaOrmStorage>, engine: GradeEngine) -> Self {
        Self { storage, engine }
    }

    pub async fn list_projects(&self, current: &AuthUser, query: ProjectQuery) -> Result<Vec<ProjectView>> {
        let db = self.storage.get_db();
        let course_id = match (query.course_id, query.sub_criterion_id) {
            (Some(course_id), _) => course_id,
            (None, Some(sub_id)) => {
                find_required::<CourseSubCriterionEntity, _>(db, sub_id, "Sub-criterion")
                    .await?
                    .course_id
            }
            (None, None) => {
                return Err(SchoolError::validation("course_id or sub_criterion_id is required"));
            }
        };
        ensure_course_access(db, current, course_id).await?;

        let mut select = ProjectEntity::find().filter(project::Column::CourseId.eq(course_id));
        if let Some(sub_id) = query.sub_criterion_id {
            select = select.filter(project::Column::SubCriterionId.eq(sub_id));
        }
        let projects = select.order_by_asc(project::Column::Id).all(db).await?;
        project_views(db, projects).await
    }

    pub async fn get_project(&self, current: &AuthUser, id: i32) -> Result<ProjectView> {
        let db = self.storage.get_db();
        let p = find_required::<ProjectEntity, _>(db, id, "Project").await?;
        ensure_course_access(db, current, p.course_id).await?;
        project_view(db, p).await
    }

    /// Check members and score against the sub-criterion; returns the member ids
    async fn validate_request<C: ConnectionTrait>(
        &self,
        db: &C,
        sub: &course_sub_criterion::Model,
        req: &ProjectRequest,
        project_id: Option<i32>,
    ) -> Result<Option<Vec<i32>>> {
        if req.name.trim().is_empty() {
            return Err(SchoolError::validation("Project name is required"));
        }
        if !req.score.is_finite() || req.score < 0.0 || req.score > sub.percentage {
            return Err(SchoolError::validation(format!(
                "Project score must be between 0 and {}",
                sub.percentage
            )));
        }

        let mut check_ids: Vec<i32> = req.member_ids.clone().unwrap_or_default();
        check_ids.extend(req.student_in_charge_id);
        let check_ids: Vec<i32> = check_ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        if !check_ids.is_empty() {
            let found = EnrollmentEntity::find()
                .filter(enrollment::Column::Id.is_in(check_ids.clone()))
                .filter(enrollment::Column::CourseId.eq(sub.course_id))
                .all(db)
                .await?;
            if found.len() != check_ids.len() {
                return Err(SchoolError::validation(
                    "Every member must be enrolled in the project's course",
                ));
            }
        }

        let Some(members) = &req.member_ids else {
            return Ok(None);
        };
        let mut members: Vec<i32> = members.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        if let Some(leader) = req.student_in_charge_id
            && !members.contains(&leader)
        {
            members.push(leader);
        }
        check_group_size(sub, members.len())?;
        let taken = already_grouped(db, sub.id, &members, project_id).await?;
        if !taken.is_empty() {
            return Err(SchoolError::validation(format!(
                "Enrollments {:?} already belong to another project",
                taken
            )));
        }
        Ok(Some(members))
    }

    pub async fn create_project(&self, current: &AuthUser, req: ProjectRequest) -> Result<ProjectView> {
        let txn = self.storage.get_db().begin().await?;
        let sub = find_required::<CourseSubCriterionEntity, _>(&txn, req.sub_criterion_id, "Sub-criterion").await?;
        check_project_criterion(&sub)?;
        ensure_course_staff(&txn, current, sub.course_id).await?;
        let members = self.validate_request(&txn, &sub, &req, None).await?;

        let created = project::ActiveModel {
            course_id: Set(sub.course_id),
            sub_criterion_id: Set(sub.id),
            name: Set(req.name.trim().to_string()),
            description: Set(non_empty(req.description.as_deref())),
            student_in_charge_id: Set(req.student_in_charge_id),
            score: Set(req.score),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        replace_members(&txn, created.id, &members.unwrap_or_default()).await?;
        let synced = self.engine.sync_project_scores(&txn, created.id).await?;
        txn.commit().await?;

        info!(
            "ProjectService: created project '{}' ({}) with {} members",
            created.name, created.id, synced
        );
        project_view(self.storage.get_db(), created).await
    }

    pub async fn update_project(&self, current: &AuthUser, id: i32, req: ProjectRequest) -> Result<ProjectView> {
        let txn = self.storage.get_db().begin().await?;
        let existing = find_required::<ProjectEntity, _>(&txn, id, "Project").await?;
        if req.sub_criterion_id != existing.sub_criterion_id {
            return Err(SchoolError::validation("A project cannot move to another sub-criterion"));
        }
        let sub = find_required::<CourseSubCriterionEntity, _>(&txn, existing.sub_criterion_id, "Sub-criterion").await?;
        ensure_course_staff(&txn, current, sub.course_id).await?;
        let members = self.validate_request(&txn, &sub, &req, Some(existing.id)).await?;

        let mut active: project::ActiveModel = existing.into();
        active.name = Set(req.name.trim().to_string());
        active.description = Set(non_empty(req.description.as_deref()));
        active.student_in_charge_id = Set(req.student_in_charge_id);
        active.score = Set(req.score);
        let updated = active.update(&txn).await?;
        if let Some(members) = members {
            replace_members(&txn, updated.id, &members).await?;
        }
        self.engine.sync_project_scores(&txn, updated.id).await?;
        txn.commit().await?;

        info!("ProjectService: updated project {} (score {})", updated.id, updated.score);
        project_view(self.storage.get_db(), updated).await
    }

    /// Members keep the score they were last given
    pub async fn delete_project(&self, current: &AuthUser, id: i32) -> Result<()> {
        let db = self.storage.get_db();
        let existing = find_required::<ProjectEntity, _>(db, id, "Project").await?;
        ensure_course_staff(db, current, existing.course_id).await?;
        ProjectEntity::delete_by_id(existing.id).exec(db).await?;
        info!("ProjectService: deleted project {}", existing.id);
        Ok(())
    }

    // ---------- public registration ----------

    pub async fn available_projects(&self, course_id: i32) -> Result<Vec<OpenProjectCriterion>> {
        let db = self.storage.get_db();
        let today = Utc::now().date_naive();
        let subs: Vec<course_sub_criterion::Model> = CourseSubCriterionEntity::find()
            .filter(course_sub_criterion::Column::CourseId.eq(course_id))
            .filter(course_sub_criterion::Column::IsProject.eq(true))
            .order_by_asc(course_sub_criterion::Column::Id)
            .all(db)
            .await?
            .into_iter()
            .filter(|s| registration_open(s, today))
            .collect();
        if subs.is_empty() {
            return Ok(Vec::new());
        }

        let projects = ProjectEntity::find()
            .filter(project::Column::SubCriterionId.is_in(subs.iter().map(|s| s.id)))
            .order_by_asc(project::Column::Id)
            .all(db)
            .await?;
        let mut counts: HashMap<i32, usize> = HashMap::new();
        if !projects.is_empty() {
            for member in ProjectMemberEntity::find()
                .filter(project_member::Column::ProjectId.is_in(projects.iter().map(|p| p.id)))
                .all(db)
                .await?
            {
                *counts.entry(member.project_id).or_default() += 1;
            }
        }

        Ok(subs
            .into_iter()
            .map(|s| OpenProjectCriterion {
                projects: projects
                    .iter()
                    .filter(|p| p.sub_criterion_id == s.id)
                    .map(|p| AvailableProject {
                        id: p.id,
                        name: p.name.clone(),
                        description: p.description.clone(),
                        member_count: counts.get(&p.id).copied().unwrap_or(0),
                    })
                    .collect(),
                sub_criterion_id: s.id,
                name: s.name,
                max_members: s.max_members,
                registration_start: s.registration_start,
                registration_end: s.registration_end,
            })
            .collect())
    }

    async fn open_project_criterion<C: ConnectionTrait>(
        &self,
        db: &C,
        course_id: i32,
        sub_criterion_id: i32,
    ) -> Result<course_sub_criterion::Model> {
        let sub = find_required::<CourseSubCriterionEntity, _>(db, sub_criterion_id, "Sub-criterion").await?;
        if sub.course_id != course_id {
            return Err(SchoolError::validation("Sub-criterion does not belong to this course"));
        }
        check_project_criterion(&sub)?;
        if !registration_open(&sub, Utc::now().date_naive()) {
            return Err(SchoolError::validation(format!(
                "Project registration for '{}' is closed",
                sub.name
            )));
        }
        Ok(sub)
    }

    /// Resolve one CI to an enrollment that is free to join a group
    async fn free_enrollment<C: ConnectionTrait>(
        &self,
        db: &C,
        sub: &course_sub_criterion::Model,
        ci: &str,
    ) -> Result<ValidatedStudent> {
        let Some((e, student)) = find_enrollment_by_ci(db, ci, sub.course_id).await? else {
            return Err(SchoolError::validation(format!(
                "No student with CI {} is enrolled in this course",
                ci.trim()
            )));
        };
        if !already_grouped(db, sub.id, &[e.id], None).await?.is_empty() {
            return Err(SchoolError::validation(format!(
                "Student with CI {} is already in a project",
                ci.trim()
            )));
        }
        Ok(ValidatedStudent {
            enrollment_id: e.id,
            student: StudentSummary::from(&student),
        })
    }

    pub async fn validate_student(&self, req: ValidateStudentRequest) -> Result<ValidatedStudent> {
        let db = self.storage.get_db();
        let sub = self
            .open_project_criterion(db, req.course_id, req.sub_criterion_id)
            .await?;
        self.free_enrollment(db, &sub, &req.ci).await
    }

    pub async fn register_project(&self, req: ProjectRegistrationRequest) -> Result<ProjectView> {
        if req.name.trim().is_empty() {
            return Err(SchoolError::validation("Project name is required"));
        }
        let txn = self.storage.get_db().begin().await?;
        let sub = self
            .open_project_criterion(&txn, req.course_id, req.sub_criterion_id)
            .await?;

        let leader = self.free_enrollment(&txn, &sub, &req.leader_ci).await?;
        let mut members = vec![leader.enrollment_id];
        for ci in req.member_cis.iter().filter(|ci| !ci.trim().is_empty()) {
            let member = self.free_enrollment(&txn, &sub, ci).await?;
            if !members.contains(&member.enrollment_id) {
                members.push(member.enrollment_id);
            }
        }
        check_group_size(&sub, members.len())?;

        let created = project::ActiveModel {
            course_id: Set(sub.course_id),
            sub_criterion_id: Set(sub.id),
            name: Set(req.name.trim().to_string()),
            description: Set(non_empty(req.description.as_deref())),
            student_in_charge_id: Set(Some(leader.enrollment_id)),
            score: Set(0.0),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        replace_members(&txn, created.id, &members).await?;
        txn.commit().await?;

        info!(
            "ProjectService: group '{}' registered for sub-criterion {} with {} members",
            created.name,
            sub.id,
            members.len()
        );
        project_view(self.storage.get_db(), created).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(open: bool, start: Option<NaiveDate>, end: Option<NaiveDate>) -> course_sub_criterion::Model {
        course_sub_criterion::Model {
            id: 1,
            course_id: 1,
            parent_criterion_id: 1,
            name: "Proyecto".into(),
            percentage: 20.0,
            visible_on_gradesheet: true,
            editable_on_gradesheet: true,
            is_project: true,
            is_project_registration_open: open,
            registration_start: start,
            registration_end: end,
            max_members: Some(3),
        }
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).expect("date")
    }

    #[test]
    fn test_registration_open_requires_flag_and_window() {
        let today = d(2025, 5, 10);
        assert!(registration_open(&sub(true, None, None), today));
        assert!(registration_open(&sub(true, Some(d(2025, 5, 1)), Some(d(2025, 5, 10))), today));
        assert!(!registration_open(&sub(false, None, None), today));
        assert!(!registration_open(&sub(true, Some(d(2025, 5, 11)), None), today));
        assert!(!registration_open(&sub(true, None, Some(d(2025, 5, 9))), today));
    }

    #[test]
    fn test_group_size_limit() {
        let mut s = sub(true, None, None);
        assert!(check_group_size(&s, 3).is_ok());
        let err = check_group_size(&s, 4).unwrap_err();
        assert!(err.to_string().contains("at most 3 members"));

        s.max_members = None;
        assert!(check_group_size(&s, 2).is_ok());
        assert!(check_group_size(&s, 40).is_ok());
    }

    #[test]
    fn test_non_project_criterion_rejected() {
        let mut s = sub(true, None, None);
        assert!(check_project_criterion(&s).is_ok());
        s.is_project = false;
        assert!(check_project_criterion(&s).is_err());
    }
}
