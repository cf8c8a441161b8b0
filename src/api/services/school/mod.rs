//! School API 服务模块
//!
//! 该模块包含后台 API 的所有端点，包括：
//! - 认证与个人资料
//! - 用户、家庭关系与学籍结构管理
//! - 课程、选课与批量导入
//! - 评分项、任务、分数与成绩单
//! - 项目与自助报名
//! - 仪表盘与健康检查

pub mod academic;
pub mod auth;
pub mod courses;
pub mod dashboard;
pub mod error_code;
pub mod grading;
pub mod health;
mod helpers;
pub mod projects;
pub mod registration;
pub mod routes;
mod types;
mod upload;
pub mod users;

// 重新导出类型
pub use types::*;

// 重新导出帮助函数
pub use helpers::{
    api_result, check_batch_size, error_from_school, error_response, json_response,
    success_response,
};

// 重新导出错误码
pub use error_code::ErrorCode;

pub use routes::configure_api;
