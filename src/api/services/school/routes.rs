//! School API 路由配置
//!
//! 每个业务模块一个 scope，统一挂在 `api_prefix` 下。

use actix_web::web;

use super::academic::{
    create_period, create_program, create_subject, create_template, delete_period,
    delete_program, delete_subject, delete_template, get_period, get_program, get_subject,
    get_template, list_periods, list_programs, list_subjects, list_templates, update_period,
    update_program, update_subject, update_template,
};
use super::auth::{
    check_session, get_profile, login, login_rate_limiter, logout, register, update_credentials,
    update_profile,
};
use super::courses::{
    self, course_students, create_course, create_enrollment, delete_course, delete_enrollment,
    get_course, get_enrollment, list_courses, list_enrollments, update_course, update_enrollment,
};
use super::dashboard::dashboard_stats;
use super::grading::{
    bulk_criterion_scores, bulk_special_settings, bulk_sub_settings, bulk_task_scores,
    create_special_criterion, create_sub_criterion, create_task, delete_special_criterion,
    delete_sub_criterion, delete_task, get_special_criterion, get_sub_criterion, get_task,
    gradesheet, list_criterion_scores, list_special_criteria, list_sub_criteria,
    list_task_scores, list_tasks, task_sheet, update_special_criterion, update_sub_criterion,
    update_task,
};
use super::health::health_check;
use super::projects::{
    available_projects, create_project, delete_project, get_project, list_projects,
    register_project, update_project, validate_student,
};
use super::registration::{approve, list_requests, open_courses, reject, submit};
use super::users::{
    self, create_family, create_user, delete_family, delete_user, get_user, list_family,
    list_users, update_user,
};

/// 认证路由 `/auth`
///
/// 包含：
/// - POST /auth/login - 登录（带限流）
/// - POST /auth/register - 注册
/// - GET /auth/check-session - 校验会话并返回当前用户
/// - POST /auth/logout - 注销当前会话
/// - POST /auth/update-credentials - 修改邮箱/密码
/// - GET/PATCH /auth/profile - 个人资料
pub fn auth_routes() -> actix_web::Scope {
    web::scope("/auth")
        .route("/login", web::post().to(login).wrap(login_rate_limiter()))
        .route("/register", web::post().to(register))
        .route("/check-session", web::get().to(check_session))
        .route("/logout", web::post().to(logout))
        .route("/update-credentials", web::post().to(update_credentials))
        .route("/profile", web::get().to(get_profile))
        .route("/profile", web::patch().to(update_profile))
}

/// 用户管理路由 `/manage-users`
pub fn user_routes() -> actix_web::Scope {
    web::scope("/manage-users")
        .route("", web::get().to(list_users))
        .route("", web::post().to(create_user))
        // bulk 必须在 {id} 之前
        .route("/bulk/preview", web::post().to(users::bulk_preview))
        .route("/bulk/confirm", web::post().to(users::bulk_confirm))
        .route("/{id}", web::get().to(get_user))
        .route("/{id}", web::put().to(update_user))
        .route("/{id}", web::patch().to(update_user))
        .route("/{id}", web::delete().to(delete_user))
}

/// 家庭关系路由 `/family-relationships`
pub fn family_routes() -> actix_web::Scope {
    web::scope("/family-relationships")
        .route("", web::get().to(list_family))
        .route("", web::post().to(create_family))
        .route("/{id}", web::delete().to(delete_family))
}

/// 学期、专业、科目、评价模板
pub fn academic_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/periods")
            .route("", web::get().to(list_periods))
            .route("", web::post().to(create_period))
            .route("/{id}", web::get().to(get_period))
            .route("/{id}", web::put().to(update_period))
            .route("/{id}", web::delete().to(delete_period)),
    )
    .service(
        web::scope("/programs")
            .route("", web::get().to(list_programs))
            .route("", web::post().to(create_program))
            .route("/{id}", web::get().to(get_program))
            .route("/{id}", web::put().to(update_program))
            .route("/{id}", web::delete().to(delete_program)),
    )
    .service(
        web::scope("/subjects")
            .route("", web::get().to(list_subjects))
            .route("", web::post().to(create_subject))
            .route("/{id}", web::get().to(get_subject))
            .route("/{id}", web::put().to(update_subject))
            .route("/{id}", web::delete().to(delete_subject)),
    )
    .service(
        web::scope("/evaluation-templates")
            .route("", web::get().to(list_templates))
            .route("", web::post().to(create_template))
            .route("/{id}", web::get().to(get_template))
            .route("/{id}", web::put().to(update_template))
            .route("/{id}", web::delete().to(delete_template)),
    );
}

/// 课程路由 `/courses`
///
/// 包含：
/// - GET /courses - 按角色过滤的课程列表（`show_archived` 可选）
/// - POST /courses - 创建课程（ADMIN）
/// - GET/PUT/DELETE /courses/{id}
/// - GET /courses/{id}/students - 课程学生名单
pub fn course_routes() -> actix_web::Scope {
    web::scope("/courses")
        .route("", web::get().to(list_courses))
        .route("", web::post().to(create_course))
        .route("/{id}/students", web::get().to(course_students))
        .route("/{id}", web::get().to(get_course))
        .route("/{id}", web::put().to(update_course))
        .route("/{id}", web::delete().to(delete_course))
}

/// 选课路由 `/enrollments`
pub fn enrollment_routes() -> actix_web::Scope {
    web::scope("/enrollments")
        .route("", web::get().to(list_enrollments))
        .route("", web::post().to(create_enrollment))
        .route("/bulk/preview", web::post().to(courses::bulk_preview))
        .route("/bulk/confirm", web::post().to(courses::bulk_confirm))
        .route("/{id}", web::get().to(get_enrollment))
        .route("/{id}", web::put().to(update_enrollment))
        .route("/{id}", web::patch().to(update_enrollment))
        .route("/{id}", web::delete().to(delete_enrollment))
}

/// 评分项路由 `/sub-criteria` 与 `/special-criteria`
pub fn criteria_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/sub-criteria")
            .route("", web::get().to(list_sub_criteria))
            .route("", web::post().to(create_sub_criterion))
            .route("/bulk-settings", web::post().to(bulk_sub_settings))
            .route("/{id}", web::get().to(get_sub_criterion))
            .route("/{id}", web::put().to(update_sub_criterion))
            .route("/{id}", web::delete().to(delete_sub_criterion)),
    )
    .service(
        web::scope("/special-criteria")
            .route("", web::get().to(list_special_criteria))
            .route("", web::post().to(create_special_criterion))
            .route("/bulk-settings", web::post().to(bulk_special_settings))
            .route("/{id}", web::get().to(get_special_criterion))
            .route("/{id}", web::put().to(update_special_criterion))
            .route("/{id}", web::delete().to(delete_special_criterion)),
    );
}

/// 任务与分数路由
///
/// 包含：
/// - /tasks CRUD，GET /tasks/sheet - 任务成绩表
/// - GET /task-scores，POST /task-scores/bulk - 逐行收集错误
/// - GET /criterion-scores，POST /criterion-scores/bulk - 整批失败即回滚
/// - GET /criterion-scores/gradesheet - 课程成绩单
pub fn score_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/tasks")
            .route("", web::get().to(list_tasks))
            .route("", web::post().to(create_task))
            // sheet 必须在 {id} 之前
            .route("/sheet", web::get().to(task_sheet))
            .route("/{id}", web::get().to(get_task))
            .route("/{id}", web::put().to(update_task))
            .route("/{id}", web::delete().to(delete_task)),
    )
    .service(
        web::scope("/task-scores")
            .route("", web::get().to(list_task_scores))
            .route("/bulk", web::post().to(bulk_task_scores)),
    )
    .service(
        web::scope("/criterion-scores")
            .route("", web::get().to(list_criterion_scores))
            .route("/bulk", web::post().to(bulk_criterion_scores))
            .route("/gradesheet", web::get().to(gradesheet)),
    );
}

/// 项目路由 `/projects` 与公开的 `/project-registration`
pub fn project_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/projects")
            .route("", web::get().to(list_projects))
            .route("", web::post().to(create_project))
            .route("/{id}", web::get().to(get_project))
            .route("/{id}", web::put().to(update_project))
            .route("/{id}", web::delete().to(delete_project)),
    )
    .service(
        web::scope("/project-registration")
            .route("/available", web::get().to(available_projects))
            .route("/validate-student", web::post().to(validate_student))
            .route("/register", web::post().to(register_project)),
    );
}

/// 自助报名路由 `/registration`
///
/// 包含：
/// - GET /registration/open-courses - 公开
/// - POST /registration/submit - 公开
/// - GET /registration/requests - ADMIN
/// - POST /registration/requests/{id}/approve|reject - ADMIN
pub fn registration_routes() -> actix_web::Scope {
    web::scope("/registration")
        .route("/open-courses", web::get().to(open_courses))
        .route("/submit", web::post().to(submit))
        .route("/requests", web::get().to(list_requests))
        .route("/requests/{id}/approve", web::post().to(approve))
        .route("/requests/{id}/reject", web::post().to(reject))
}

/// 组合所有 API 路由
pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/dashboard/stats", web::get().to(dashboard_stats))
        .service(auth_routes())
        .service(user_routes())
        .service(family_routes())
        .configure(academic_routes)
        .service(course_routes())
        .service(enrollment_routes())
        .configure(criteria_routes)
        .configure(score_routes)
        .configure(project_routes)
        .service(registration_routes());
}
