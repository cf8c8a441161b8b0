//! 存储层集成测试

use std::sync::{Arc, Once};

use migration::entities::{
    CourseEntity, CourseSubCriterionEntity, CriterionScoreEntity, EnrollmentEntity,
    RegistrationRequestEntity, UserEntity,
};
use sea_orm::{EntityTrait, PaginatorTrait};
use tempfile::TempDir;

use schoolhub::config::init_config;
use schoolhub::errors::SchoolError;
use schoolhub::services::ServiceRegistry;
use schoolhub::services::academic_service::ProgramRequest;
use schoolhub::storage::SeaOrmStorage;
use schoolhub::storage::backend::infer_backend_from_url;

static INIT: Once = Once::new();

fn init_static_config() {
    INIT.call_once(|| {
        init_config();
    });
}

async fn temp_storage(dir: &TempDir) -> Arc<SeaOrmStorage> {
    init_static_config();
    let db_url = format!("sqlite://{}?mode=rwc", dir.path().join("school.db").display());
    Arc::new(
        SeaOrmStorage::new(&db_url, "sqlite")
            .await
            .expect("创建存储失败"),
    )
}

#[test]
fn test_infer_backend_from_url() {
    assert_eq!(infer_backend_from_url("sqlite://school.db").unwrap(), "sqlite");
    assert_eq!(infer_backend_from_url("school.sqlite").unwrap(), "sqlite");
    assert_eq!(infer_backend_from_url(":memory:").unwrap(), "sqlite");
    assert_eq!(
        infer_backend_from_url("mysql://root@localhost/school").unwrap(),
        "mysql"
    );
    assert_eq!(
        infer_backend_from_url("mariadb://root@localhost/school").unwrap(),
        "mysql"
    );
    assert_eq!(
        infer_backend_from_url("postgresql://localhost/school").unwrap(),
        "postgres"
    );

    let err = infer_backend_from_url("redis://localhost").unwrap_err();
    assert!(matches!(err, SchoolError::DatabaseConfig(_)));
}

#[tokio::test]
async fn test_empty_url_rejected() {
    init_static_config();
    let result = SeaOrmStorage::new("", "sqlite").await;
    assert!(matches!(result, Err(SchoolError::DatabaseConfig(_))));
}

#[tokio::test]
async fn test_migrations_create_schema() {
    let dir = TempDir::new().unwrap();
    let storage = temp_storage(&dir).await;
    storage.ping().await.expect("ping 失败");
    assert_eq!(storage.backend_name(), "sqlite");

    // 空表计数成功即说明迁移已建表
    let db = storage.get_db();
    assert_eq!(UserEntity::find().count(db).await.unwrap(), 0);
    assert_eq!(CourseEntity::find().count(db).await.unwrap(), 0);
    assert_eq!(EnrollmentEntity::find().count(db).await.unwrap(), 0);
    assert_eq!(CourseSubCriterionEntity::find().count(db).await.unwrap(), 0);
    assert_eq!(CriterionScoreEntity::find().count(db).await.unwrap(), 0);
    assert_eq!(RegistrationRequestEntity::find().count(db).await.unwrap(), 0);
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let dir = TempDir::new().unwrap();
    {
        let storage = temp_storage(&dir).await;
        let services = ServiceRegistry::new(storage.clone());
        services
            .academic
            .create_program(ProgramRequest {
                name: "Ingeniería".to_string(),
                description: None,
            })
            .await
            .unwrap();
        storage.close().await.unwrap();
    }

    // 重新打开同一个库，数据保留
    let storage = temp_storage(&dir).await;
    let services = ServiceRegistry::new(storage);
    let programs = services.academic.list_programs().await.unwrap();
    assert_eq!(programs.len(), 1);
    assert_eq!(programs[0].name, "Ingeniería");
}
