//! Service layer for business logic
//!
//! Each service owns a handle to the shared storage; grading services also
//! carry a copy of the [`GradeEngine`]. HTTP handlers and CLI commands both
//! go through this layer.

pub mod academic_service;
pub mod auth_service;
pub mod course_service;
pub mod criteria_service;
pub mod dashboard_service;
pub mod enrollment_service;
pub mod project_service;
pub mod registration_service;
pub mod score_service;
pub mod task_service;
pub mod user_service;
pub mod views;

use std::sync::Arc;

pub use academic_service::AcademicService;
pub use auth_service::{AuthService, AuthUser};
pub use course_service::CourseService;
pub use criteria_service::CriteriaService;
pub use dashboard_service::DashboardService;
pub use enrollment_service::EnrollmentService;
pub use project_service::ProjectService;
pub use registration_service::RegistrationService;
pub use score_service::ScoreService;
pub use task_service::TaskService;
pub use user_service::UserService;

use crate::grading::GradeEngine;
use crate::storage::SeaOrmStorage;

/// All services, built once at startup and shared by the HTTP workers
#[derive(Clone)]
pub struct ServiceRegistry {
    pub storage: Arc<SeaOrmStorage>,
    pub engine: GradeEngine,
    pub auth: Arc<AuthService>,
    pub users: Arc<UserService>,
    pub academic: Arc<AcademicService>,
    pub courses: Arc<CourseService>,
    pub enrollments: Arc<EnrollmentService>,
    pub criteria: Arc<CriteriaService>,
    pub tasks: Arc<TaskService>,
    pub scores: Arc<ScoreService>,
    pub projects: Arc<ProjectService>,
    pub registration: Arc<RegistrationService>,
    pub dashboard: Arc<DashboardService>,
}

impl ServiceRegistry {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        let engine = GradeEngine::from_storage(&storage);
        let auth = Arc::new(AuthService::new(storage.clone()));

        Self {
            users: Arc::new(UserService::new(storage.clone(), auth.clone())),
            academic: Arc::new(AcademicService::new(storage.clone(), engine)),
            courses: Arc::new(CourseService::new(storage.clone())),
            enrollments: Arc::new(EnrollmentService::new(storage.clone())),
            criteria: Arc::new(CriteriaService::new(storage.clone(), engine)),
            tasks: Arc::new(TaskService::new(storage.clone(), engine)),
            scores: Arc::new(ScoreService::new(storage.clone(), engine)),
            projects: Arc::new(ProjectService::new(storage.clone(), engine)),
            registration: Arc::new(RegistrationService::new(storage.clone())),
            dashboard: Arc::new(DashboardService::new(storage.clone(), engine)),
            auth,
            engine,
            storage,
        }
    }
}
