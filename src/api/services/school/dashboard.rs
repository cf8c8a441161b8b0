//! 仪表盘统计端点

use actix_web::{Responder, Result as ActixResult, web};
use std::sync::Arc;

use crate::services::AuthUser;
use crate::services::dashboard_service::DashboardService;

use super::helpers::api_result;

/// 按当前用户角色返回不同结构的统计
pub async fn dashboard_stats(
    user: AuthUser,
    service: web::Data<Arc<DashboardService>>,
) -> ActixResult<impl Responder> {
    Ok(api_result(service.stats(&user).await))
}
