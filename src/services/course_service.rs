//! Course service
//!
//! Role-scoped course listing plus admin CRUD. The access helpers at the
//! bottom are shared by every service that works on a single course.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use migration::entities::{
    AcademicPeriodEntity, CourseEntity, EnrollmentEntity, FamilyRelationshipEntity,
    SubjectEntity, UserEntity, academic_period, course, enrollment, family_relationship, subject,
    user,
};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, TransactionTrait,
};
use serde::Deserialize;
use tracing::{debug, info};
use ts_rs::TS;

use crate::api::services::school::TS_EXPORT_PATH;
use crate::errors::{Result, SchoolError};
use crate::services::auth_service::AuthUser;
use crate::services::enrollment_service::enroll_student;
use crate::services::views::{CourseView, EnrollmentView};
use crate::storage::{Role, SeaOrmStorage, find_required};
use crate::utils::non_empty;

#[derive(Debug, Clone, Default, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct CourseQuery {
    #[serde(default)]
    pub show_archived: bool,
    #[serde(default)]
    pub period_id: Option<i32>,
    #[serde(default)]
    pub subject_id: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct CourseRequest {
    pub subject_id: i32,
    pub period_id: i32,
    #[serde(default)]
    pub teacher_id: Option<i32>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub parallel: String,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub whatsapp_link: Option<String>,
    #[serde(default)]
    pub is_registration_open: bool,
    #[serde(default)]
    pub registration_start: Option<NaiveDate>,
    #[serde(default)]
    pub registration_end: Option<NaiveDate>,
    /// Students to enroll; existing enrollments are kept
    #[serde(default)]
    pub student_ids: Option<Vec<i32>>,
}

fn default_true() -> bool {
    true
}

fn check_window(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<()> {
    if let (Some(start), Some(end)) = (start, end)
        && end < start
    {
        return Err(SchoolError::validation(
            "registration_end must not be before registration_start",
        ));
    }
    Ok(())
}

/// Whether a registration window contains `today`; open-ended on either side
pub fn window_contains(start: Option<NaiveDate>, end: Option<NaiveDate>, today: NaiveDate) -> bool {
    start.is_none_or(|s| s <= today) && end.is_none_or(|e| e >= today)
}

pub struct CourseService {
    storage: Arc<SeaOrmStorage>,
}

impl CourseService {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        Self { storage }
    }

    /// Close registration of courses whose window has ended
    pub async fn close_expired_registrations<C: ConnectionTrait>(db: &C, today: NaiveDate) -> Result<u64> {
        let result = CourseEntity::update_many()
            .col_expr(course::Column::IsRegistrationOpen, Expr::value(false))
            .col_expr(
                course::Column::RegistrationEnd,
                Expr::value(Option::<NaiveDate>::None),
            )
            .filter(course::Column::IsRegistrationOpen.eq(true))
            .filter(course::Column::RegistrationEnd.lt(today))
            .exec(db)
            .await?;
        if result.rows_affected > 0 {
            info!(
                "Closed registration of {} courses past their window",
                result.rows_affected
            );
        }
        Ok(result.rows_affected)
    }

    pub async fn list_courses(&self, current: &AuthUser, query: CourseQuery) -> Result<Vec<CourseView>> {
        let db = self.storage.get_db();
        Self::close_expired_registrations(db, Utc::now().date_naive()).await?;

        let mut select = CourseEntity::find();
        match current.role {
            Role::Admin => {}
            Role::Teacher => {
                select = select.filter(course::Column::TeacherId.eq(current.id));
            }
            Role::Student => {
                let ids = enrolled_course_ids(db, &[current.id]).await?;
                select = select.filter(course::Column::Id.is_in(ids));
            }
            Role::Parent => {
                let children = children_of(db, current.id).await?;
                let ids = enrolled_course_ids(db, &children).await?;
                select = select.filter(course::Column::Id.is_in(ids));
            }
        }
        if let Some(period_id) = query.period_id {
            select = select.filter(course::Column::PeriodId.eq(period_id));
        }
        if let Some(subject_id) = query.subject_id {
            select = select.filter(course::Column::SubjectId.eq(subject_id));
        }
        if !query.show_archived {
            let archived_subjects: Vec<i32> = SubjectEntity::find()
                .filter(subject::Column::Archived.eq(true))
                .all(db)
                .await?
                .into_iter()
                .map(|s| s.id)
                .collect();
            select = select.filter(course::Column::Active.eq(true));
            if !archived_subjects.is_empty() {
                select = select.filter(course::Column::SubjectId.is_not_in(archived_subjects));
            }
        }

        let courses = select.order_by_asc(course::Column::Id).all(db).await?;
        debug!(
            "Listing {} courses for user {} ({})",
            courses.len(),
            current.id,
            current.role
        );
        course_views(db, courses).await
    }

    pub async fn get_course(&self, current: &AuthUser, id: i32) -> Result<CourseView> {
        let db = self.storage.get_db();
        let c = ensure_course_access(db, current, id).await?;
        let mut views = course_views(db, vec![c]).await?;
        views
            .pop()
            .ok_or_else(|| SchoolError::not_found(format!("Course {} not found", id)))
    }

    async fn check_refs<C: ConnectionTrait>(&self, db: &C, req: &CourseRequest) -> Result<()> {
        find_required::<SubjectEntity, _>(db, req.subject_id, "Subject").await?;
        find_required::<AcademicPeriodEntity, _>(db, req.period_id, "Period").await?;
        if let Some(teacher_id) = req.teacher_id {
            let teacher = find_required::<UserEntity, _>(db, teacher_id, "User").await?;
            if !Role::from_db(&teacher.role).can_manage_grades() {
                return Err(SchoolError::validation(format!(
                    "User {} cannot teach a course",
                    teacher_id
                )));
            }
        }
        check_window(req.registration_start, req.registration_end)
    }

    async fn enroll_all<C: ConnectionTrait>(&self, db: &C, course_id: i32, student_ids: &[i32]) -> Result<usize> {
        let mut created = 0;
        for &student_id in student_ids {
            let (_, is_new) = enroll_student(db, student_id, course_id).await?;
            if is_new {
                created += 1;
            }
        }
        Ok(created)
    }

    pub async fn create_course(&self, req: CourseRequest) -> Result<CourseView> {
        let txn = self.storage.get_db().begin().await?;
        self.check_refs(&txn, &req).await?;

        let created = course::ActiveModel {
            subject_id: Set(req.subject_id),
            period_id: Set(req.period_id),
            teacher_id: Set(req.teacher_id),
            active: Set(req.active),
            parallel: Set(req.parallel.trim().to_string()),
            schedule: Set(non_empty(req.schedule.as_deref())),
            whatsapp_link: Set(non_empty(req.whatsapp_link.as_deref())),
            is_registration_open: Set(req.is_registration_open),
            registration_start: Set(req.registration_start),
            registration_end: Set(req.registration_end),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let enrolled = match &req.student_ids {
            Some(ids) => self.enroll_all(&txn, created.id, ids).await?,
            None => 0,
        };
        let mut views = course_views(&txn, vec![created]).await?;
        txn.commit().await?;

        let view = views
            .pop()
            .ok_or_else(|| SchoolError::database_operation("Created course vanished"))?;
        info!(
            "CourseService: created course {} with {} students",
            view.id, enrolled
        );
        Ok(view)
    }

    pub async fn update_course(&self, id: i32, req: CourseRequest) -> Result<CourseView> {
        let txn = self.storage.get_db().begin().await?;
        let existing = find_required::<CourseEntity, _>(&txn, id, "Course").await?;
        self.check_refs(&txn, &req).await?;

        let mut am: course::ActiveModel = existing.into();
        am.subject_id = Set(req.subject_id);
        am.period_id = Set(req.period_id);
        am.teacher_id = Set(req.teacher_id);
        am.active = Set(req.active);
        am.parallel = Set(req.parallel.trim().to_string());
        am.schedule = Set(non_empty(req.schedule.as_deref()));
        am.whatsapp_link = Set(non_empty(req.whatsapp_link.as_deref()));
        am.is_registration_open = Set(req.is_registration_open);
        am.registration_start = Set(req.registration_start);
        am.registration_end = Set(req.registration_end);
        let updated = am.update(&txn).await?;

        if let Some(ids) = &req.student_ids {
            self.enroll_all(&txn, updated.id, ids).await?;
        }
        let mut views = course_views(&txn, vec![updated]).await?;
        txn.commit().await?;
        views
            .pop()
            .ok_or_else(|| SchoolError::database_operation("Updated course vanished"))
    }

    pub async fn delete_course(&self, id: i32) -> Result<()> {
        let db = self.storage.get_db();
        find_required::<CourseEntity, _>(db, id, "Course").await?;
        CourseEntity::delete_by_id(id).exec(db).await?;
        info!("CourseService: deleted course {}", id);
        Ok(())
    }

    /// Students of a course through its enrollments, sorted by surname
    pub async fn course_students(&self, current: &AuthUser, id: i32) -> Result<Vec<EnrollmentView>> {
        let db = self.storage.get_db();
        let c = ensure_course_access(db, current, id).await?;
        course_enrollment_views(db, c.id).await
    }
}

/// Enrollment views of a course sorted by paternal surname and first name
pub async fn course_enrollment_views<C: ConnectionTrait>(db: &C, course_id: i32) -> Result<Vec<EnrollmentView>> {
    let enrollments = EnrollmentEntity::find()
        .filter(enrollment::Column::CourseId.eq(course_id))
        .all(db)
        .await?;
    let students = users_by_id(db, enrollments.iter().map(|e| e.student_id)).await?;

    let mut views: Vec<EnrollmentView> = enrollments
        .into_iter()
        .map(|e| {
            let student = students.get(&e.student_id);
            EnrollmentView::new(e, student)
        })
        .collect();
    views.sort_by(|a, b| {
        let key = |v: &EnrollmentView| {
            v.student
                .as_ref()
                .map(|s| (s.paternal_surname.to_lowercase(), s.first_name.to_lowercase()))
        };
        key(a).cmp(&key(b)).then(a.id.cmp(&b.id))
    });
    Ok(views)
}

pub async fn users_by_id<C: ConnectionTrait>(
    db: &C,
    ids: impl IntoIterator<Item = i32>,
) -> Result<HashMap<i32, user::Model>> {
    let ids: Vec<i32> = ids.into_iter().collect::<HashSet<_>>().into_iter().collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    Ok(UserEntity::find()
        .filter(user::Column::Id.is_in(ids))
        .all(db)
        .await?
        .into_iter()
        .map(|u| (u.id, u))
        .collect())
}

/// Attach subject, period and teacher details
pub async fn course_views<C: ConnectionTrait>(db: &C, courses: Vec<course::Model>) -> Result<Vec<CourseView>> {
    if courses.is_empty() {
        return Ok(Vec::new());
    }
    let subject_ids: Vec<i32> = courses.iter().map(|c| c.subject_id).collect();
    let period_ids: Vec<i32> = courses.iter().map(|c| c.period_id).collect();

    let subjects: HashMap<i32, subject::Model> = SubjectEntity::find()
        .filter(subject::Column::Id.is_in(subject_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();
    let periods: HashMap<i32, academic_period::Model> = AcademicPeriodEntity::find()
        .filter(academic_period::Column::Id.is_in(period_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();
    let teachers = users_by_id(db, courses.iter().filter_map(|c| c.teacher_id)).await?;

    Ok(courses
        .into_iter()
        .map(|c| {
            let subject = subjects.get(&c.subject_id);
            let period = periods.get(&c.period_id);
            let teacher = c.teacher_id.and_then(|t| teachers.get(&t));
            CourseView::new(c, subject, period, teacher)
        })
        .collect())
}

pub async fn children_of<C: ConnectionTrait>(db: &C, parent_id: i32) -> Result<Vec<i32>> {
    Ok(FamilyRelationshipEntity::find()
        .filter(family_relationship::Column::ParentId.eq(parent_id))
        .all(db)
        .await?
        .into_iter()
        .map(|r| r.student_id)
        .collect())
}

pub async fn enrolled_course_ids<C: ConnectionTrait>(db: &C, student_ids: &[i32]) -> Result<Vec<i32>> {
    if student_ids.is_empty() {
        return Ok(Vec::new());
    }
    Ok(EnrollmentEntity::find()
        .filter(enrollment::Column::StudentId.is_in(student_ids.to_vec()))
        .all(db)
        .await?
        .into_iter()
        .map(|e| e.course_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect())
}

/// Load the course if the user may read it
pub async fn ensure_course_access<C: ConnectionTrait>(
    db: &C,
    current: &AuthUser,
    course_id: i32,
) -> Result<course::Model> {
    let c = find_required::<CourseEntity, _>(db, course_id, "Course").await?;
    let allowed = match current.role {
        Role::Admin => true,
        Role::Teacher => c.teacher_id == Some(current.id),
        Role::Student => enrolled_course_ids(db, &[current.id]).await?.contains(&c.id),
        Role::Parent => {
            let children = children_of(db, current.id).await?;
            enrolled_course_ids(db, &children).await?.contains(&c.id)
        }
    };
    if allowed {
        Ok(c)
    } else {
        Err(SchoolError::permission_denied(format!(
            "You do not have access to course {}",
            course_id
        )))
    }
}

/// Load the course if the user may change its grading (admin or its teacher)
pub async fn ensure_course_staff<C: ConnectionTrait>(
    db: &C,
    current: &AuthUser,
    course_id: i32,
) -> Result<course::Model> {
    current.require_staff()?;
    let c = find_required::<CourseEntity, _>(db, course_id, "Course").await?;
    if current.is_admin() || c.teacher_id == Some(current.id) {
        Ok(c)
    } else {
        Err(SchoolError::permission_denied(format!(
            "You are not the teacher of course {}",
            course_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).expect("date")
    }

    #[test]
    fn test_window_contains() {
        let today = d(2025, 3, 10);
        assert!(window_contains(None, None, today));
        assert!(window_contains(Some(d(2025, 3, 1)), Some(d(2025, 3, 10)), today));
        assert!(!window_contains(Some(d(2025, 3, 11)), None, today));
        assert!(!window_contains(None, Some(d(2025, 3, 9)), today));
    }

    #[test]
    fn test_check_window() {
        assert!(check_window(Some(d(2025, 1, 1)), Some(d(2025, 1, 2))).is_ok());
        assert!(check_window(Some(d(2025, 1, 2)), Some(d(2025, 1, 1))).is_err());
        assert!(check_window(None, Some(d(2025, 1, 1))).is_ok());
    }
}
