//! 维护命令：重算课程成绩、清理过期会话

use colored::Colorize;
use std::sync::Arc;

use crate::grading::GradeEngine;
use crate::interfaces::cli::CliError;
use crate::services::AuthService;
use crate::storage::SeaOrmStorage;

/// 重新计算一个课程的所有评分项与最终成绩
pub async fn recalculate_course(
    storage: Arc<SeaOrmStorage>,
    course_id: i32,
) -> Result<(), CliError> {
    let engine = GradeEngine::from_storage(&storage);
    let summary = engine
        .recalculate_course(storage.get_db(), course_id)
        .await?;

    println!(
        "{} Course {} recalculated",
        "✓".green().bold(),
        course_id.to_string().cyan()
    );
    println!("  sub-criteria:      {}", summary.sub_criteria);
    println!("  special criteria:  {}", summary.special_criteria);
    println!("  skipped (no data): {}", summary.skipped_criteria);
    println!("  final grades:      {}", summary.enrollments);
    Ok(())
}

/// 删除已过期的会话记录
pub async fn purge_sessions(storage: Arc<SeaOrmStorage>) -> Result<(), CliError> {
    let auth = AuthService::new(storage);
    let purged = auth.purge_expired_sessions().await?;
    println!("{} Removed {} expired sessions", "✓".green().bold(), purged);
    Ok(())
}
