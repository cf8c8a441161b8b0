//! Self-registration requests
//!
//! Prospective students submit a request for a course while its registration
//! window is open; an administrator approves or rejects it.

use std::sync::Arc;

use chrono::Utc;
use migration::entities::{CourseEntity, RegistrationRequestEntity, course, registration_request};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use ts_rs::TS;

use crate::api::services::school::TS_EXPORT_PATH;
use crate::errors::{Result, SchoolError};
use crate::import::RosterEntry;
use crate::services::course_service::{CourseService, course_views, window_contains};
use crate::services::enrollment_service::{enroll_student, find_enrollment_by_ci};
use crate::services::user_service::{create_student, find_by_ci};
use crate::services::views::{CourseView, EnrollmentView, RegistrationRequestView};
use crate::storage::{RequestStatus, Role, SeaOrmStorage, find_required};
use crate::utils::{digits_only, non_empty, title_case};

// ============ Request/Response DTOs ============

#[derive(Debug, Clone, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct SubmitRegistrationRequest {
    pub course_id: i32,
    pub ci: String,
    pub first_name: String,
    pub paternal_surname: String,
    #[serde(default)]
    pub maternal_surname: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub cellphone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct RegistrationQuery {
    #[serde(default)]
    pub status: Option<RequestStatus>,
    #[serde(default)]
    pub course_id: Option<i32>,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct ApprovalResult {
    pub request: RegistrationRequestView,
    pub enrollment: EnrollmentView,
    pub user_created: bool,
}

// ============ RegistrationService Implementation ============

pub struct RegistrationService {
    storage: Arc<SeaOrmStorage>,
}

impl RegistrationService {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        Self { storage }
    }

    /// Active courses accepting registrations today
    pub async fn open_courses(&self) -> Result<Vec<CourseView>> {
        let db = self.storage.get_db();
        let today = Utc::now().date_naive();
        CourseService::close_expired_registrations(db, today).await?;

        let courses: Vec<course::Model> = CourseEntity::find()
            .filter(course::Column::Active.eq(true))
            .filter(course::Column::IsRegistrationOpen.eq(true))
            .order_by_asc(course::Column::Id)
            .all(db)
            .await?
            .into_iter()
            .filter(|c| window_contains(c.registration_start, c.registration_end, today))
            .collect();
        course_views(db, courses).await
    }

    pub async fn submit(&self, req: SubmitRegistrationRequest) -> Result<RegistrationRequestView> {
        let db = self.storage.get_db();
        let ci = digits_only(&req.ci);
        if ci.is_empty() {
            return Err(SchoolError::validation("CI number is required"));
        }
        if req.first_name.trim().is_empty() || req.paternal_surname.trim().is_empty() {
            return Err(SchoolError::validation("First name and paternal surname are required"));
        }

        let c = find_required::<CourseEntity, _>(db, req.course_id, "Course").await?;
        let today = Utc::now().date_naive();
        if !c.active
            || !c.is_registration_open
            || !window_contains(c.registration_start, c.registration_end, today)
        {
            return Err(SchoolError::validation("Registration for this course is closed"));
        }
        if find_enrollment_by_ci(db, &ci, c.id).await?.is_some() {
            return Err(SchoolError::conflict(
                "A student with this CI is already enrolled in the course",
            ));
        }

        let existing = RegistrationRequestEntity::find()
            .filter(registration_request::Column::CourseId.eq(c.id))
            .filter(registration_request::Column::Ci.eq(ci.as_str()))
            .one(db)
            .await?;

        let reopened = existing.is_some();
        let mut active: registration_request::ActiveModel = match existing {
            Some(previous) if previous.status == RequestStatus::Pending.as_ref() => {
                return Err(SchoolError::conflict(
                    "A pending request for this CI already exists",
                ));
            }
            Some(previous) => {
                info!("Reopening registration request {} for CI {}", previous.id, ci);
                previous.into()
            }
            None => registration_request::ActiveModel {
                course_id: Set(c.id),
                ci: Set(ci.clone()),
                ..Default::default()
            },
        };
        active.first_name = Set(title_case(req.first_name.trim()));
        active.paternal_surname = Set(title_case(req.paternal_surname.trim()));
        active.maternal_surname = Set(title_case(req.maternal_surname.trim()));
        active.email = Set(non_empty(req.email.as_deref()).map(|e| e.to_lowercase()));
        active.cellphone = Set(non_empty(req.cellphone.as_deref()));
        active.status = Set(RequestStatus::Pending.to_string());
        active.created_at = Set(Utc::now());

        let saved = if reopened {
            active.update(db).await?
        } else {
            active.insert(db).await?
        };
        info!("Registration request {} submitted for course {}", saved.id, c.id);
        Ok(saved.into())
    }

    pub async fn list_requests(&self, query: RegistrationQuery) -> Result<Vec<RegistrationRequestView>> {
        let mut select = RegistrationRequestEntity::find();
        if let Some(status) = query.status {
            select = select.filter(registration_request::Column::Status.eq(status.as_ref()));
        }
        if let Some(course_id) = query.course_id {
            select = select.filter(registration_request::Column::CourseId.eq(course_id));
        }
        Ok(select
            .order_by_desc(registration_request::Column::CreatedAt)
            .all(self.storage.get_db())
            .await?
            .into_iter()
            .map(RegistrationRequestView::from)
            .collect())
    }

    /// Create or reuse the student by CI, enroll them and mark the request approved
    pub async fn approve(&self, id: i32) -> Result<ApprovalResult> {
        let txn = self.storage.get_db().begin().await?;
        let request = find_required::<RegistrationRequestEntity, _>(&txn, id, "Registration request").await?;
        if request.status != RequestStatus::Pending.as_ref() {
            return Err(SchoolError::validation(format!(
                "Registration request {} is already {}",
                request.id,
                request.status.to_lowercase()
            )));
        }

        let (student, user_created) = match find_by_ci(&txn, &request.ci).await? {
            Some(existing) => {
                if Role::from_db(&existing.role) != Role::Student {
                    return Err(SchoolError::validation(format!(
                        "CI {} belongs to a non-student account",
                        request.ci
                    )));
                }
                (existing, false)
            }
            None => {
                let entry = RosterEntry {
                    ci_number: request.ci.clone(),
                    paternal_surname: request.paternal_surname.clone(),
                    maternal_surname: request.maternal_surname.clone(),
                    first_name: request.first_name.clone(),
                    email: request.email.clone(),
                    phone: request.cellphone.clone(),
                };
                (create_student(&txn, &entry).await?, true)
            }
        };
        let (enrollment, _) = enroll_student(&txn, student.id, request.course_id).await?;

        let mut active: registration_request::ActiveModel = request.into();
        active.status = Set(RequestStatus::Approved.to_string());
        let request = active.update(&txn).await?;
        txn.commit().await?;

        info!(
            "Registration request {} approved: student {} enrolled in course {}",
            request.id, student.id, request.course_id
        );
        Ok(ApprovalResult {
            request: request.into(),
            enrollment: EnrollmentView::new(enrollment, Some(&student)),
            user_created,
        })
    }

    pub async fn reject(&self, id: i32) -> Result<RegistrationRequestView> {
        let db = self.storage.get_db();
        let request = find_required::<RegistrationRequestEntity, _>(db, id, "Registration request").await?;
        if request.status != RequestStatus::Pending.as_ref() {
            return Err(SchoolError::validation(format!(
                "Registration request {} is already {}",
                request.id,
                request.status.to_lowercase()
            )));
        }
        let mut active: registration_request::ActiveModel = request.into();
        active.status = Set(RequestStatus::Rejected.to_string());
        let request = active.update(db).await?;
        info!("Registration request {} rejected", request.id);
        Ok(request.into())
    }
}
