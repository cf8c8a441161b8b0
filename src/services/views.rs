//! Response and shared request types
//!
//! Entity models stay inside the `migration` crate; everything the API
//! returns goes through one of these views.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use migration::entities::{
    academic_period, course, course_special_criterion, course_sub_criterion, course_task,
    enrollment, evaluation_criterion, family_relationship, program, registration_request,
    subject, task_score, user,
};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::api::services::school::TS_EXPORT_PATH;
use crate::errors::{Result, SchoolError};
use crate::storage::{RequestStatus, Role};

pub(crate) fn full_name(first: &str, paternal: &str, maternal: &str) -> String {
    [first, paternal, maternal]
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct UserView {
    pub id: i32,
    pub email: Option<String>,
    pub first_name: String,
    pub paternal_surname: String,
    pub maternal_surname: String,
    pub full_name: String,
    pub ci_number: Option<String>,
    pub phone: Option<String>,
    pub role: Role,
    pub active_course_id: Option<i32>,
    pub is_active: bool,
    pub is_staff: bool,
    pub date_joined: DateTime<Utc>,
}

impl From<user::Model> for UserView {
    fn from(u: user::Model) -> Self {
        Self {
            full_name: full_name(&u.first_name, &u.paternal_surname, &u.maternal_surname),
            role: Role::from_db(&u.role),
            id: u.id,
            email: u.email,
            first_name: u.first_name,
            paternal_surname: u.paternal_surname,
            maternal_surname: u.maternal_surname,
            ci_number: u.ci_number,
            phone: u.phone,
            active_course_id: u.active_course_id,
            is_active: u.is_active,
            is_staff: u.is_staff,
            date_joined: u.date_joined,
        }
    }
}

/// Compact student identity used in rosters and sheets
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct StudentSummary {
    pub id: i32,
    pub ci_number: Option<String>,
    pub first_name: String,
    pub paternal_surname: String,
    pub maternal_surname: String,
    pub email: Option<String>,
}

impl From<&user::Model> for StudentSummary {
    fn from(u: &user::Model) -> Self {
        Self {
            id: u.id,
            ci_number: u.ci_number.clone(),
            first_name: u.first_name.clone(),
            paternal_surname: u.paternal_surname.clone(),
            maternal_surname: u.maternal_surname.clone(),
            email: u.email.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct FamilyRelationshipView {
    pub id: i32,
    pub parent_id: i32,
    pub student_id: i32,
    pub relationship: String,
}

impl From<family_relationship::Model> for FamilyRelationshipView {
    fn from(m: family_relationship::Model) -> Self {
        Self {
            id: m.id,
            parent_id: m.parent_id,
            student_id: m.student_id,
            relationship: m.relationship,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct PeriodView {
    pub id: i32,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub active: bool,
    pub parent_period_id: Option<i32>,
}

impl From<academic_period::Model> for PeriodView {
    fn from(m: academic_period::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            start_date: m.start_date,
            end_date: m.end_date,
            active: m.active,
            parent_period_id: m.parent_period_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct ProgramView {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
}

impl From<program::Model> for ProgramView {
    fn from(m: program::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            description: m.description,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct SubjectView {
    pub id: i32,
    pub name: String,
    pub code: String,
    pub program_id: i32,
    pub period_id: Option<i32>,
    pub description: Option<String>,
    pub archived: bool,
    pub evaluation_template_id: Option<i32>,
    pub subcriteria_locked: bool,
}

impl From<subject::Model> for SubjectView {
    fn from(m: subject::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            code: m.code,
            program_id: m.program_id,
            period_id: m.period_id,
            description: m.description,
            archived: m.archived,
            evaluation_template_id: m.evaluation_template_id,
            subcriteria_locked: m.subcriteria_locked,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct CriterionView {
    pub id: i32,
    pub name: String,
    pub weight: f64,
}

impl From<evaluation_criterion::Model> for CriterionView {
    fn from(m: evaluation_criterion::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            weight: m.weight,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct TemplateView {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub criteria: Vec<CriterionView>,
    pub total_weight: f64,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct CourseView {
    pub id: i32,
    pub subject_id: i32,
    pub subject_name: Option<String>,
    pub subject_code: Option<String>,
    pub period_id: i32,
    pub period_name: Option<String>,
    pub teacher_id: Option<i32>,
    pub teacher_name: Option<String>,
    pub active: bool,
    pub parallel: String,
    pub schedule: Option<String>,
    pub whatsapp_link: Option<String>,
    pub is_registration_open: bool,
    pub registration_start: Option<NaiveDate>,
    pub registration_end: Option<NaiveDate>,
}

impl CourseView {
    pub fn new(
        c: course::Model,
        subject: Option<&subject::Model>,
        period: Option<&academic_period::Model>,
        teacher: Option<&user::Model>,
    ) -> Self {
        Self {
            id: c.id,
            subject_id: c.subject_id,
            subject_name: subject.map(|s| s.name.clone()),
            subject_code: subject.map(|s| s.code.clone()),
            period_id: c.period_id,
            period_name: period.map(|p| p.name.clone()),
            teacher_id: c.teacher_id,
            teacher_name: teacher
                .map(|t| full_name(&t.first_name, &t.paternal_surname, &t.maternal_surname)),
            active: c.active,
            parallel: c.parallel,
            schedule: c.schedule,
            whatsapp_link: c.whatsapp_link,
            is_registration_open: c.is_registration_open,
            registration_start: c.registration_start,
            registration_end: c.registration_end,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct EnrollmentView {
    pub id: i32,
    pub student_id: i32,
    pub course_id: i32,
    pub date_enrolled: NaiveDate,
    pub final_grade: Option<f64>,
    pub student: Option<StudentSummary>,
}

impl EnrollmentView {
    pub fn new(e: enrollment::Model, student: Option<&user::Model>) -> Self {
        Self {
            id: e.id,
            student_id: e.student_id,
            course_id: e.course_id,
            date_enrolled: e.date_enrolled,
            final_grade: e.final_grade,
            student: student.map(StudentSummary::from),
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct SubCriterionView {
    pub id: i32,
    pub course_id: i32,
    pub parent_criterion_id: i32,
    pub name: String,
    pub percentage: f64,
    pub visible_on_gradesheet: bool,
    pub editable_on_gradesheet: bool,
    pub is_project: bool,
    pub is_project_registration_open: bool,
    pub registration_start: Option<NaiveDate>,
    pub registration_end: Option<NaiveDate>,
    pub max_members: Option<i32>,
}

impl From<course_sub_criterion::Model> for SubCriterionView {
    fn from(m: course_sub_criterion::Model) -> Self {
        Self {
            id: m.id,
            course_id: m.course_id,
            parent_criterion_id: m.parent_criterion_id,
            name: m.name,
            percentage: m.percentage,
            visible_on_gradesheet: m.visible_on_gradesheet,
            editable_on_gradesheet: m.editable_on_gradesheet,
            is_project: m.is_project,
            is_project_registration_open: m.is_project_registration_open,
            registration_start: m.registration_start,
            registration_end: m.registration_end,
            max_members: m.max_members,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct SpecialCriterionView {
    pub id: i32,
    pub course_id: i32,
    pub parent_criterion_id: Option<i32>,
    pub name: String,
    pub percentage: f64,
    pub visible_on_gradesheet: bool,
    pub editable_on_gradesheet: bool,
}

impl From<course_special_criterion::Model> for SpecialCriterionView {
    fn from(m: course_special_criterion::Model) -> Self {
        Self {
            id: m.id,
            course_id: m.course_id,
            parent_criterion_id: m.parent_criterion_id,
            name: m.name,
            percentage: m.percentage,
            visible_on_gradesheet: m.visible_on_gradesheet,
            editable_on_gradesheet: m.editable_on_gradesheet,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct TaskView {
    pub id: i32,
    pub sub_criterion_id: Option<i32>,
    pub special_criterion_id: Option<i32>,
    pub name: String,
    pub weight: i32,
    pub is_locked: bool,
    pub is_public: bool,
}

impl From<course_task::Model> for TaskView {
    fn from(m: course_task::Model) -> Self {
        Self {
            id: m.id,
            sub_criterion_id: m.sub_criterion_id,
            special_criterion_id: m.special_criterion_id,
            name: m.name,
            weight: m.weight,
            is_locked: m.is_locked,
            is_public: m.is_public,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct TaskScoreView {
    pub id: i32,
    pub enrollment_id: i32,
    pub task_id: i32,
    pub score: f64,
}

impl From<task_score::Model> for TaskScoreView {
    fn from(m: task_score::Model) -> Self {
        Self {
            id: m.id,
            enrollment_id: m.enrollment_id,
            task_id: m.task_id,
            score: m.score,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct RegistrationRequestView {
    pub id: i32,
    pub course_id: i32,
    pub ci: String,
    pub first_name: String,
    pub paternal_surname: String,
    pub maternal_surname: String,
    pub email: Option<String>,
    pub cellphone: Option<String>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

impl From<registration_request::Model> for RegistrationRequestView {
    fn from(m: registration_request::Model) -> Self {
        Self {
            id: m.id,
            course_id: m.course_id,
            status: m.status.parse().unwrap_or(RequestStatus::Pending),
            ci: m.ci,
            first_name: m.first_name,
            paternal_surname: m.paternal_surname,
            maternal_surname: m.maternal_surname,
            email: m.email,
            cellphone: m.cellphone,
            created_at: m.created_at,
        }
    }
}

/// Per-row failure inside a bulk operation
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct RowError {
    pub index: usize,
    pub message: String,
}

/// Simple acknowledgement payload
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Reference to a gradesheet column: a sub-criterion id or `"special-{id}"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CriterionKey {
    Sub(i32),
    Special(i32),
}

impl CriterionKey {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let invalid = || SchoolError::validation(format!("Invalid criterion id: '{}'", raw));
        match raw.strip_prefix("special-") {
            Some(id) => id.parse().map(CriterionKey::Special).map_err(|_| invalid()),
            None => raw.parse().map(CriterionKey::Sub).map_err(|_| invalid()),
        }
    }
}

impl fmt::Display for CriterionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CriterionKey::Sub(id) => write!(f, "{}", id),
            CriterionKey::Special(id) => write!(f, "special-{}", id),
        }
    }
}

impl Serialize for CriterionKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CriterionKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct KeyVisitor;

        impl Visitor<'_> for KeyVisitor {
            type Value = CriterionKey;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a criterion id or \"special-{id}\"")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Self::Value, E> {
                i32::try_from(v)
                    .map(CriterionKey::Sub)
                    .map_err(|_| E::custom("criterion id out of range"))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Self::Value, E> {
                i32::try_from(v)
                    .map(CriterionKey::Sub)
                    .map_err(|_| E::custom("criterion id out of range"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
                CriterionKey::parse(v).map_err(|e| E::custom(e.message()))
            }
        }

        deserializer.deserialize_any(KeyVisitor)
    }
}

impl TS for CriterionKey {
    type WithoutGenerics = Self;
    type OptionInnerType = Self;

    fn name(_: &ts_rs::Config) -> String {
        "number | string".to_string()
    }

    fn inline(cfg: &ts_rs::Config) -> String {
        Self::name(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_criterion_key_parse() {
        assert_eq!(CriterionKey::parse("12").expect("sub"), CriterionKey::Sub(12));
        assert_eq!(
            CriterionKey::parse("special-3").expect("special"),
            CriterionKey::Special(3)
        );
        assert!(CriterionKey::parse("special-").is_err());
        assert!(CriterionKey::parse("abc").is_err());
    }

    #[test]
    fn test_criterion_key_serde() {
        let keys: Vec<CriterionKey> =
            serde_json::from_str(r#"[4, "5", "special-6"]"#).expect("valid keys");
        assert_eq!(
            keys,
            vec![
                CriterionKey::Sub(4),
                CriterionKey::Sub(5),
                CriterionKey::Special(6)
            ]
        );
        assert_eq!(
            serde_json::to_string(&keys).expect("serialize"),
            r#"["4","5","special-6"]"#
        );
    }

    #[test]
    fn test_full_name_skips_blanks() {
        assert_eq!(full_name("Ana", "Rojas", ""), "Ana Rojas");
        assert_eq!(full_name(" ", "", "Vaca"), "Vaca");
    }
}
