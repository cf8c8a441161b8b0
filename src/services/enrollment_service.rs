//! Enrollment service
//!
//! Single enrollments plus roster-driven bulk enrollment of a course.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use migration::entities::{CourseEntity, EnrollmentEntity, UserEntity, course, enrollment, user};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use ts_rs::TS;

use crate::api::services::school::TS_EXPORT_PATH;
use crate::errors::{Result, SchoolError};
use crate::import::RosterEntry;
use crate::services::auth_service::AuthUser;
use crate::services::course_service::{
    children_of, ensure_course_access, ensure_course_staff, users_by_id,
};
use crate::services::user_service::{create_student, find_by_ci};
use crate::services::views::{EnrollmentView, RowError};
use crate::storage::{Role, SeaOrmStorage, find_required};
use crate::utils::digits_only;

/// Enroll a student, returning the existing row when already enrolled
pub async fn enroll_student<C: ConnectionTrait>(
    db: &C,
    student_id: i32,
    course_id: i32,
) -> Result<(enrollment::Model, bool)> {
    if let Some(existing) = find_enrollment(db, student_id, course_id).await? {
        return Ok((existing, false));
    }
    let student = find_required::<UserEntity, _>(db, student_id, "User").await?;
    if Role::from_db(&student.role) != Role::Student {
        return Err(SchoolError::validation(format!(
            "User {} is not a student",
            student_id
        )));
    }
    let created = enrollment::ActiveModel {
        student_id: Set(student_id),
        course_id: Set(course_id),
        date_enrolled: Set(Utc::now().date_naive()),
        final_grade: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok((created, true))
}

pub async fn find_enrollment<C: ConnectionTrait>(
    db: &C,
    student_id: i32,
    course_id: i32,
) -> Result<Option<enrollment::Model>> {
    Ok(EnrollmentEntity::find()
        .filter(enrollment::Column::StudentId.eq(student_id))
        .filter(enrollment::Column::CourseId.eq(course_id))
        .one(db)
        .await?)
}

/// Enrollment of the student with this CI in the course
pub async fn find_enrollment_by_ci<C: ConnectionTrait>(
    db: &C,
    ci: &str,
    course_id: i32,
) -> Result<Option<(enrollment::Model, user::Model)>> {
    let ci = digits_only(ci);
    if ci.is_empty() {
        return Ok(None);
    }
    let Some(student) = find_by_ci(db, &ci).await? else {
        return Ok(None);
    };
    Ok(find_enrollment(db, student.id, course_id)
        .await?
        .map(|e| (e, student)))
}

// ============ Request/Response DTOs ============

#[derive(Debug, Clone, Default, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct EnrollmentQuery {
    #[serde(default)]
    pub course_id: Option<i32>,
    #[serde(default)]
    pub student_id: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct CreateEnrollmentRequest {
    pub student_id: i32,
    pub course_id: i32,
    #[serde(default)]
    pub date_enrolled: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct UpdateEnrollmentRequest {
    pub date_enrolled: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentRowStatus {
    /// No account with this CI yet
    NewStudent,
    /// Account exists, not enrolled in the course
    ExistingStudent,
    AlreadyEnrolled,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct EnrollmentPreviewRow {
    #[serde(flatten)]
    pub entry: RosterEntry,
    pub status: EnrollmentRowStatus,
    pub user_id: Option<i32>,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct EnrollmentPreview {
    pub course_id: i32,
    pub rows: Vec<EnrollmentPreviewRow>,
    pub new_students: usize,
    pub existing_students: usize,
    pub already_enrolled: usize,
}

#[derive(Debug, Clone, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct BulkEnrollmentConfirmRequest {
    pub course_id: i32,
    pub rows: Vec<RosterEntry>,
}

#[derive(Debug, Clone, Default, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct BulkEnrollmentResult {
    pub created_users: usize,
    pub enrolled: usize,
    pub already_enrolled: usize,
    pub errors: Vec<RowError>,
}

// ============ EnrollmentService Implementation ============

pub struct EnrollmentService {
    storage: Arc<SeaOrmStorage>,
}

impl EnrollmentService {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        Self { storage }
    }

    pub async fn list_enrollments(
        &self,
        current: &AuthUser,
        query: EnrollmentQuery,
    ) -> Result<Vec<EnrollmentView>> {
        let db = self.storage.get_db();
        let mut select = EnrollmentEntity::find();

        if let Some(course_id) = query.course_id {
            ensure_course_access(db, current, course_id).await?;
            select = select.filter(enrollment::Column::CourseId.eq(course_id));
        } else {
            match current.role {
                Role::Admin => {}
                Role::Teacher => {
                    let own: Vec<i32> = CourseEntity::find()
                        .filter(course::Column::TeacherId.eq(current.id))
                        .all(db)
                        .await?
                        .into_iter()
                        .map(|c| c.id)
                        .collect();
                    select = select.filter(enrollment::Column::CourseId.is_in(own));
                }
                Role::Student => {
                    select = select.filter(enrollment::Column::StudentId.eq(current.id));
                }
                Role::Parent => {
                    let children = children_of(db, current.id).await?;
                    select = select.filter(enrollment::Column::StudentId.is_in(children));
                }
            }
        }
        if let Some(student_id) = query.student_id {
            select = select.filter(enrollment::Column::StudentId.eq(student_id));
        }

        let enrollments = select.order_by_asc(enrollment::Column::Id).all(db).await?;
        let students = users_by_id(db, enrollments.iter().map(|e| e.student_id)).await?;
        Ok(enrollments
            .into_iter()
            .map(|e| {
                let student = students.get(&e.student_id);
                EnrollmentView::new(e, student)
            })
            .collect())
    }

    pub async fn get_enrollment(&self, current: &AuthUser, id: i32) -> Result<EnrollmentView> {
        let db = self.storage.get_db();
        let e = find_required::<EnrollmentEntity, _>(db, id, "Enrollment").await?;
        ensure_course_access(db, current, e.course_id).await?;
        let student = UserEntity::find_by_id(e.student_id).one(db).await?;
        Ok(EnrollmentView::new(e, student.as_ref()))
    }

    pub async fn create_enrollment(
        &self,
        current: &AuthUser,
        req: CreateEnrollmentRequest,
    ) -> Result<EnrollmentView> {
        let db = self.storage.get_db();
        ensure_course_staff(db, current, req.course_id).await?;
        if find_enrollment(db, req.student_id, req.course_id)
            .await?
            .is_some()
        {
            return Err(SchoolError::conflict(
                "Student is already enrolled in this course",
            ));
        }

        let (mut created, _) = enroll_student(db, req.student_id, req.course_id).await?;
        if let Some(date) = req.date_enrolled
            && date != created.date_enrolled
        {
            let mut am: enrollment::ActiveModel = created.into();
            am.date_enrolled = Set(date);
            created = am.update(db).await?;
        }
        info!(
            "EnrollmentService: student {} enrolled in course {}",
            created.student_id, created.course_id
        );
        let student = UserEntity::find_by_id(created.student_id).one(db).await?;
        Ok(EnrollmentView::new(created, student.as_ref()))
    }

    pub async fn update_enrollment(
        &self,
        current: &AuthUser,
        id: i32,
        req: UpdateEnrollmentRequest,
    ) -> Result<EnrollmentView> {
        let db = self.storage.get_db();
        let e = find_required::<EnrollmentEntity, _>(db, id, "Enrollment").await?;
        ensure_course_staff(db, current, e.course_id).await?;
        let mut am: enrollment::ActiveModel = e.into();
        am.date_enrolled = Set(req.date_enrolled);
        let updated = am.update(db).await?;
        let student = UserEntity::find_by_id(updated.student_id).one(db).await?;
        Ok(EnrollmentView::new(updated, student.as_ref()))
    }

    pub async fn delete_enrollment(&self, current: &AuthUser, id: i32) -> Result<()> {
        let db = self.storage.get_db();
        let e = find_required::<EnrollmentEntity, _>(db, id, "Enrollment").await?;
        ensure_course_staff(db, current, e.course_id).await?;
        EnrollmentEntity::delete_by_id(id).exec(db).await?;
        info!(
            "EnrollmentService: removed student {} from course {}",
            e.student_id, e.course_id
        );
        Ok(())
    }

    // ============ Bulk enrollment ============

    pub async fn bulk_preview(
        &self,
        current: &AuthUser,
        course_id: i32,
        entries: Vec<RosterEntry>,
    ) -> Result<EnrollmentPreview> {
        let db = self.storage.get_db();
        ensure_course_staff(db, current, course_id).await?;

        let cis: Vec<String> = entries.iter().map(|e| e.ci_number.clone()).collect();
        let users: HashMap<String, i32> = if cis.is_empty() {
            HashMap::new()
        } else {
            UserEntity::find()
                .filter(user::Column::CiNumber.is_in(cis))
                .all(db)
                .await?
                .into_iter()
                .filter_map(|u| u.ci_number.map(|ci| (ci, u.id)))
                .collect()
        };
        let enrolled: HashSet<i32> = EnrollmentEntity::find()
            .filter(enrollment::Column::CourseId.eq(course_id))
            .all(db)
            .await?
            .into_iter()
            .map(|e| e.student_id)
            .collect();

        let rows: Vec<EnrollmentPreviewRow> = entries
            .into_iter()
            .map(|entry| {
                let user_id = users.get(&entry.ci_number).copied();
                let status = match user_id {
                    None => EnrollmentRowStatus::NewStudent,
                    Some(id) if enrolled.contains(&id) => EnrollmentRowStatus::AlreadyEnrolled,
                    Some(_) => EnrollmentRowStatus::ExistingStudent,
                };
                EnrollmentPreviewRow {
                    entry,
                    status,
                    user_id,
                }
            })
            .collect();

        let count = |s: EnrollmentRowStatus| rows.iter().filter(|r| r.status == s).count();
        Ok(EnrollmentPreview {
            course_id,
            new_students: count(EnrollmentRowStatus::NewStudent),
            existing_students: count(EnrollmentRowStatus::ExistingStudent),
            already_enrolled: count(EnrollmentRowStatus::AlreadyEnrolled),
            rows,
        })
    }

    pub async fn bulk_confirm(
        &self,
        current: &AuthUser,
        req: BulkEnrollmentConfirmRequest,
    ) -> Result<BulkEnrollmentResult> {
        ensure_course_staff(self.storage.get_db(), current, req.course_id).await?;
        let txn = self.storage.get_db().begin().await?;
        let mut result = BulkEnrollmentResult::default();

        for (index, entry) in req.rows.iter().enumerate() {
            let outcome = async {
                let ci = digits_only(&entry.ci_number);
                if ci.is_empty() {
                    return Err(SchoolError::validation("CI number is required"));
                }
                let (student, created_user) = match find_by_ci(&txn, &ci).await? {
                    Some(u) => (u, false),
                    None => (create_student(&txn, entry).await?, true),
                };
                let (_, enrolled) = enroll_student(&txn, student.id, req.course_id).await?;
                Ok::<_, SchoolError>((created_user, enrolled))
            }
            .await;

            match outcome {
                Ok((created_user, enrolled)) => {
                    if created_user {
                        result.created_users += 1;
                    }
                    if enrolled {
                        result.enrolled += 1;
                    } else {
                        result.already_enrolled += 1;
                    }
                }
                Err(e) => {
                    warn!(
                        "Bulk enrollment row {} ({}) failed: {}",
                        index, entry.ci_number, e
                    );
                    result.errors.push(RowError {
                        index,
                        message: e.message().to_string(),
                    });
                }
            }
        }

        txn.commit().await?;
        info!(
            "EnrollmentService: course {} bulk enrollment: {} enrolled, {} new users, {} already enrolled, {} failed",
            req.course_id,
            result.enrolled,
            result.created_users,
            result.already_enrolled,
            result.errors.len()
        );
        Ok(result)
    }
}
