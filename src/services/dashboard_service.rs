//! Dashboard statistics, shaped by the caller's role

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{Datelike, Months, NaiveDate, Utc};
use migration::entities::{
    CourseEntity, CourseSpecialCriterionEntity, CourseSubCriterionEntity, CourseTaskEntity,
    EnrollmentEntity, ProjectEntity, ProjectMemberEntity, SubjectEntity, TaskScoreEntity,
    UserEntity, course, course_special_criterion, course_sub_criterion, course_task, enrollment,
    project, project_member, subject, task_score, user,
};
use sea_orm::{ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use ts_rs::TS;

use crate::api::services::school::TS_EXPORT_PATH;
use crate::errors::Result;
use crate::grading::{CriterionBreakdown, GradeEngine};
use crate::services::auth_service::AuthUser;
use crate::services::course_service::{children_of, course_views, users_by_id};
use crate::services::views::{CourseView, StudentSummary};
use crate::storage::{Role, SeaOrmStorage};
use crate::utils::round2;

const TOP_COURSES: usize = 5;
const TOP_STUDENTS: usize = 5;
const GROWTH_MONTHS: u32 = 12;

// ============ Response DTOs ============

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct MonthCount {
    /// `YYYY-MM`
    pub month: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct CourseCount {
    pub course: CourseView,
    pub enrollments: u64,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct AdminStats {
    pub students: u64,
    pub teachers: u64,
    pub active_courses: u64,
    pub subjects: u64,
    pub enrollment_growth: Vec<MonthCount>,
    pub top_courses: Vec<CourseCount>,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct TopStudent {
    pub enrollment_id: i32,
    pub course_id: i32,
    pub student: Option<StudentSummary>,
    pub final_grade: f64,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct TeacherStats {
    pub courses: u64,
    pub students: u64,
    pub tasks: u64,
    pub projects: u64,
    pub enrollments_per_course: Vec<CourseCount>,
    pub top_students: Vec<TopStudent>,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct CourseGrade {
    pub course: CourseView,
    pub enrollment_id: i32,
    pub final_grade: Option<f64>,
    pub breakdown: Vec<CriterionBreakdown>,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct StudentStats {
    pub courses: u64,
    pub scored_tasks: u64,
    pub average_final_grade: Option<f64>,
    pub projects: u64,
    pub grades: Vec<CourseGrade>,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct ChildOverview {
    pub student: StudentSummary,
    pub grades: Vec<CourseGrade>,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct ParentStats {
    pub children: Vec<ChildOverview>,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
#[serde(tag = "role", rename_all = "UPPERCASE")]
pub enum DashboardStats {
    Admin(AdminStats),
    Teacher(TeacherStats),
    Student(StudentStats),
    Parent(ParentStats),
}

/// Bucket enrollment dates into the last `months` calendar months, oldest first
fn monthly_counts(today: NaiveDate, months: u32, dates: impl IntoIterator<Item = NaiveDate>) -> Vec<MonthCount> {
    let mut buckets: BTreeMap<(i32, u32), u64> = BTreeMap::new();
    let first = first_month(today, months);
    let mut cursor = first;
    while cursor <= today {
        buckets.insert((cursor.year(), cursor.month()), 0);
        cursor = match cursor.checked_add_months(Months::new(1)) {
            Some(next) => next,
            None => break,
        };
    }
    for date in dates {
        if let Some(count) = buckets.get_mut(&(date.year(), date.month())) {
            *count += 1;
        }
    }
    buckets
        .into_iter()
        .map(|((year, month), count)| MonthCount {
            month: format!("{:04}-{:02}", year, month),
            count,
        })
        .collect()
}

/// First day of the oldest month in the growth window
fn first_month(today: NaiveDate, months: u32) -> NaiveDate {
    let start = today.with_day(1).unwrap_or(today);
    start
        .checked_sub_months(Months::new(months.saturating_sub(1)))
        .unwrap_or(start)
}

// ============ DashboardService Implementation ============

pub struct DashboardService {
    storage: Arc<SeaOrmStorage>,
    engine: GradeEngine,
}

impl DashboardService {
    pub fn new(storage: Arc<SeaOrmStorage>, engine: GradeEngine) -> Self {
        Self { storage, engine }
    }

    pub async fn stats(&self, current: &AuthUser) -> Result<DashboardStats> {
        Ok(match current.role {
            Role::Admin => DashboardStats::Admin(self.admin_stats().await?),
            Role::Teacher => DashboardStats::Teacher(self.teacher_stats(current.id).await?),
            Role::Student => DashboardStats::Student(self.student_stats(current.id).await?),
            Role::Parent => DashboardStats::Parent(self.parent_stats(current.id).await?),
        })
    }

    async fn enrollment_counts(&self, course_ids: &[i32]) -> Result<HashMap<i32, u64>> {
        let mut counts = HashMap::new();
        if course_ids.is_empty() {
            return Ok(counts);
        }
        for e in EnrollmentEntity::find()
            .filter(enrollment::Column::CourseId.is_in(course_ids.to_vec()))
            .all(self.storage.get_db())
            .await?
        {
            *counts.entry(e.course_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn admin_stats(&self) -> Result<AdminStats> {
        let db = self.storage.get_db();
        let students = UserEntity::find()
            .filter(user::Column::Role.eq(Role::Student.as_ref()))
            .count(db)
            .await?;
        let teachers = UserEntity::find()
            .filter(user::Column::Role.eq(Role::Teacher.as_ref()))
            .count(db)
            .await?;
        let active_courses = CourseEntity::find()
            .filter(course::Column::Active.eq(true))
            .count(db)
            .await?;
        let subjects = SubjectEntity::find()
            .filter(subject::Column::Archived.eq(false))
            .count(db)
            .await?;

        let today = Utc::now().date_naive();
        let since = first_month(today, GROWTH_MONTHS);
        let recent = EnrollmentEntity::find()
            .filter(enrollment::Column::DateEnrolled.gte(since))
            .all(db)
            .await?;
        let enrollment_growth = monthly_counts(today, GROWTH_MONTHS, recent.iter().map(|e| e.date_enrolled));

        let mut counts: HashMap<i32, u64> = HashMap::new();
        for e in EnrollmentEntity::find().all(db).await? {
            *counts.entry(e.course_id).or_insert(0) += 1;
        }
        let mut ranked: Vec<(i32, u64)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(TOP_COURSES);
        let top_courses = self.course_counts(&ranked).await?;

        Ok(AdminStats {
            students,
            teachers,
            active_courses,
            subjects,
            enrollment_growth,
            top_courses,
        })
    }

    /// Attach course details, keeping the order of `ranked`
    async fn course_counts(&self, ranked: &[(i32, u64)]) -> Result<Vec<CourseCount>> {
        if ranked.is_empty() {
            return Ok(Vec::new());
        }
        let db = self.storage.get_db();
        let courses = CourseEntity::find()
            .filter(course::Column::Id.is_in(ranked.iter().map(|(id, _)| *id)))
            .all(db)
            .await?;
        let mut views: HashMap<i32, CourseView> = course_views(db, courses)
            .await?
            .into_iter()
            .map(|v| (v.id, v))
            .collect();
        Ok(ranked
            .iter()
            .filter_map(|(id, enrollments)| {
                views.remove(id).map(|course| CourseCount {
                    course,
                    enrollments: *enrollments,
                })
            })
            .collect())
    }

    async fn teacher_stats(&self, teacher_id: i32) -> Result<TeacherStats> {
        let db = self.storage.get_db();
        let courses = CourseEntity::find()
            .filter(course::Column::TeacherId.eq(teacher_id))
            .order_by_asc(course::Column::Id)
            .all(db)
            .await?;
        let course_ids: Vec<i32> = courses.iter().map(|c| c.id).collect();
        if course_ids.is_empty() {
            return Ok(TeacherStats {
                courses: 0,
                students: 0,
                tasks: 0,
                projects: 0,
                enrollments_per_course: Vec::new(),
                top_students: Vec::new(),
            });
        }

        let enrollments = EnrollmentEntity::find()
            .filter(enrollment::Column::CourseId.is_in(course_ids.clone()))
            .all(db)
            .await?;
        let students: HashSet<i32> = enrollments.iter().map(|e| e.student_id).collect();

        let sub_ids: Vec<i32> = CourseSubCriterionEntity::find()
            .filter(course_sub_criterion::Column::CourseId.is_in(course_ids.clone()))
            .all(db)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        let special_ids: Vec<i32> = CourseSpecialCriterionEntity::find()
            .filter(course_special_criterion::Column::CourseId.is_in(course_ids.clone()))
            .all(db)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        let tasks = CourseTaskEntity::find()
            .filter(
                Condition::any()
                    .add(course_task::Column::SubCriterionId.is_in(sub_ids))
                    .add(course_task::Column::SpecialCriterionId.is_in(special_ids)),
            )
            .count(db)
            .await?;
        let projects = ProjectEntity::find()
            .filter(project::Column::CourseId.is_in(course_ids.clone()))
            .count(db)
            .await?;

        let counts = self.enrollment_counts(&course_ids).await?;
        let per_course: Vec<(i32, u64)> = course_ids
            .iter()
            .map(|id| (*id, counts.get(id).copied().unwrap_or(0)))
            .collect();
        let enrollments_per_course = self.course_counts(&per_course).await?;

        let mut graded: Vec<&enrollment::Model> =
            enrollments.iter().filter(|e| e.final_grade.is_some()).collect();
        graded.sort_by(|a, b| {
            b.final_grade
                .unwrap_or(0.0)
                .total_cmp(&a.final_grade.unwrap_or(0.0))
                .then(a.id.cmp(&b.id))
        });
        graded.truncate(TOP_STUDENTS);
        let users = users_by_id(db, graded.iter().map(|e| e.student_id)).await?;
        let top_students = graded
            .into_iter()
            .map(|e| TopStudent {
                enrollment_id: e.id,
                course_id: e.course_id,
                student: users.get(&e.student_id).map(StudentSummary::from),
                final_grade: e.final_grade.unwrap_or(0.0),
            })
            .collect();

        Ok(TeacherStats {
            courses: courses.len() as u64,
            students: students.len() as u64,
            tasks,
            projects,
            enrollments_per_course,
            top_students,
        })
    }

    /// Final grade and breakdown of every enrollment of one student
    async fn course_grades(&self, enrollments: &[enrollment::Model]) -> Result<Vec<CourseGrade>> {
        let db = self.storage.get_db();
        if enrollments.is_empty() {
            return Ok(Vec::new());
        }
        let courses = CourseEntity::find()
            .filter(course::Column::Id.is_in(enrollments.iter().map(|e| e.course_id)))
            .all(db)
            .await?;
        let views: HashMap<i32, CourseView> = course_views(db, courses)
            .await?
            .into_iter()
            .map(|v| (v.id, v))
            .collect();

        let mut grades = Vec::with_capacity(enrollments.len());
        for e in enrollments {
            let Some(course) = views.get(&e.course_id) else {
                continue;
            };
            grades.push(CourseGrade {
                course: course.clone(),
                enrollment_id: e.id,
                final_grade: e.final_grade,
                breakdown: self.engine.breakdown(db, e.id).await?,
            });
        }
        Ok(grades)
    }

    async fn student_enrollments(&self, student_id: i32) -> Result<Vec<enrollment::Model>> {
        Ok(EnrollmentEntity::find()
            .filter(enrollment::Column::StudentId.eq(student_id))
            .order_by_asc(enrollment::Column::Id)
            .all(self.storage.get_db())
            .await?)
    }

    async fn student_stats(&self, student_id: i32) -> Result<StudentStats> {
        let db = self.storage.get_db();
        let enrollments = self.student_enrollments(student_id).await?;
        let ids: Vec<i32> = enrollments.iter().map(|e| e.id).collect();

        let (scored_tasks, projects) = if ids.is_empty() {
            (0, 0)
        } else {
            (
                TaskScoreEntity::find()
                    .filter(task_score::Column::EnrollmentId.is_in(ids.clone()))
                    .count(db)
                    .await?,
                ProjectMemberEntity::find()
                    .filter(project_member::Column::EnrollmentId.is_in(ids))
                    .count(db)
                    .await?,
            )
        };

        let finals: Vec<f64> = enrollments.iter().filter_map(|e| e.final_grade).collect();
        let average_final_grade =
            (!finals.is_empty()).then(|| round2(finals.iter().sum::<f64>() / finals.len() as f64));

        Ok(StudentStats {
            courses: enrollments.len() as u64,
            scored_tasks,
            average_final_grade,
            projects,
            grades: self.course_grades(&enrollments).await?,
        })
    }

    async fn parent_stats(&self, parent_id: i32) -> Result<ParentStats> {
        let db = self.storage.get_db();
        let child_ids = children_of(db, parent_id).await?;
        let users = users_by_id(db, child_ids.iter().copied()).await?;

        let mut children = Vec::with_capacity(child_ids.len());
        for id in child_ids {
            let Some(child) = users.get(&id) else {
                continue;
            };
            let enrollments = self.student_enrollments(id).await?;
            children.push(ChildOverview {
                student: StudentSummary::from(child),
                grades: self.course_grades(&enrollments).await?,
            });
        }
        Ok(ParentStats { children })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).expect("date")
    }

    #[test]
    fn test_monthly_counts_covers_window() {
        let counts = monthly_counts(d(2025, 3, 15), 12, Vec::new());
        assert_eq!(counts.len(), 12);
        assert_eq!(counts[0].month, "2024-04");
        assert_eq!(counts[11].month, "2025-03");
        assert!(counts.iter().all(|c| c.count == 0));
    }

    #[test]
    fn test_monthly_counts_buckets_dates() {
        let dates = vec![
            d(2025, 3, 1),
            d(2025, 3, 14),
            d(2025, 1, 31),
            d(2023, 12, 1), // outside the window
        ];
        let counts = monthly_counts(d(2025, 3, 15), 3, dates);
        assert_eq!(
            counts,
            vec![
                MonthCount { month: "2025-01".into(), count: 1 },
                MonthCount { month: "2025-02".into(), count: 0 },
                MonthCount { month: "2025-03".into(), count: 2 },
            ]
        );
    }

    #[test]
    fn test_first_month() {
        assert_eq!(first_month(d(2025, 1, 20), 12), d(2024, 2, 1));
        assert_eq!(first_month(d(2025, 1, 20), 1), d(2025, 1, 1));
    }
}
