//! 课程与选课端点

use actix_multipart::Multipart;
use actix_web::{Responder, Result as ActixResult, web};
use std::sync::Arc;
use tracing::info;

use crate::config::get_config;
use crate::errors::SchoolError;
use crate::import::parse_upload;
use crate::services::AuthUser;
use crate::services::course_service::{CourseQuery, CourseRequest, CourseService};
use crate::services::enrollment_service::{
    BulkEnrollmentConfirmRequest, CreateEnrollmentRequest, EnrollmentQuery, EnrollmentService,
    UpdateEnrollmentRequest,
};
use crate::services::views::MessageResponse;

use super::helpers::{api_result, check_batch_size};
use super::types::IdPath;
use super::upload::read_upload;

// ============ 课程 ============

/// 课程列表按角色过滤
pub async fn list_courses(
    user: AuthUser,
    query: web::Query<CourseQuery>,
    service: web::Data<Arc<CourseService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        service.list_courses(&user, query.into_inner()).await,
    ))
}

pub async fn get_course(
    user: AuthUser,
    path: web::Path<IdPath>,
    service: web::Data<Arc<CourseService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(service.get_course(&user, path.id).await))
}

pub async fn create_course(
    user: AuthUser,
    body: web::Json<CourseRequest>,
    service: web::Data<Arc<CourseService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        async {
            user.require_admin()?;
            service.create_course(body.into_inner()).await
        }
        .await,
    ))
}

pub async fn update_course(
    user: AuthUser,
    path: web::Path<IdPath>,
    body: web::Json<CourseRequest>,
    service: web::Data<Arc<CourseService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        async {
            user.require_admin()?;
            service.update_course(path.id, body.into_inner()).await
        }
        .await,
    ))
}

pub async fn delete_course(
    user: AuthUser,
    path: web::Path<IdPath>,
    service: web::Data<Arc<CourseService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        async {
            user.require_admin()?;
            service.delete_course(path.id).await?;
            Ok::<_, SchoolError>(MessageResponse::new("Course deleted"))
        }
        .await,
    ))
}

pub async fn course_students(
    user: AuthUser,
    path: web::Path<IdPath>,
    service: web::Data<Arc<CourseService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(service.course_students(&user, path.id).await))
}

// ============ 选课 ============

pub async fn list_enrollments(
    user: AuthUser,
    query: web::Query<EnrollmentQuery>,
    service: web::Data<Arc<EnrollmentService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        service.list_enrollments(&user, query.into_inner()).await,
    ))
}

pub async fn get_enrollment(
    user: AuthUser,
    path: web::Path<IdPath>,
    service: web::Data<Arc<EnrollmentService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(service.get_enrollment(&user, path.id).await))
}

pub async fn create_enrollment(
    user: AuthUser,
    body: web::Json<CreateEnrollmentRequest>,
    service: web::Data<Arc<EnrollmentService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        service.create_enrollment(&user, body.into_inner()).await,
    ))
}

pub async fn update_enrollment(
    user: AuthUser,
    path: web::Path<IdPath>,
    body: web::Json<UpdateEnrollmentRequest>,
    service: web::Data<Arc<EnrollmentService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        service
            .update_enrollment(&user, path.id, body.into_inner())
            .await,
    ))
}

pub async fn delete_enrollment(
    user: AuthUser,
    path: web::Path<IdPath>,
    service: web::Data<Arc<EnrollmentService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        service
            .delete_enrollment(&user, path.id)
            .await
            .map(|_| MessageResponse::new("Enrollment deleted")),
    ))
}

/// multipart：`file` 为 CSV/XLSX 名单，`course_id` 为目标课程
pub async fn bulk_preview(
    user: AuthUser,
    payload: Multipart,
    service: web::Data<Arc<EnrollmentService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        async {
            user.require_staff()?;
            let upload = read_upload(payload).await?;
            let course_id = upload.int_field("course_id")?;
            let entries = parse_upload(&upload.filename, &upload.bytes, &get_config().import)?;
            info!(
                "API: enrollment roster '{}' for course {} parsed into {} rows",
                upload.filename,
                course_id,
                entries.len()
            );
            service.bulk_preview(&user, course_id, entries).await
        }
        .await,
    ))
}

pub async fn bulk_confirm(
    user: AuthUser,
    body: web::Json<BulkEnrollmentConfirmRequest>,
    service: web::Data<Arc<EnrollmentService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(
        async {
            check_batch_size(body.rows.len())?;
            service.bulk_confirm(&user, body.into_inner()).await
        }
        .await,
    ))
}
