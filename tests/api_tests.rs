//! HTTP API 集成测试
//!
//! 每个测试使用独立的 SQLite 临时库，经由 `configure_app` 挂载完整路由。

use std::net::SocketAddr;
use std::sync::{Arc, Once};

use actix_http::Request;
use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceResponse};
use actix_web::http::StatusCode;
use actix_web::test::{self, TestRequest};
use actix_web::{App, Error};
use serde_json::{Value, json};
use tempfile::TempDir;

use schoolhub::config::init_config;
use schoolhub::runtime::modes::configure_app;
use schoolhub::services::ServiceRegistry;
use schoolhub::services::user_service::CreateUserRequest;
use schoolhub::storage::{Role, SeaOrmStorage};

static INIT: Once = Once::new();

const ADMIN_EMAIL: &str = "admin@school.test";
const ADMIN_PASSWORD: &str = "admin-pass-123";

fn init_static_config() {
    INIT.call_once(|| {
        init_config();
    });
}

/// 测试环境：临时目录必须与存储同生命周期
struct TestEnv {
    _dir: TempDir,
    services: ServiceRegistry,
}

async fn setup() -> TestEnv {
    init_static_config();
    let dir = TempDir::new().expect("创建临时目录失败");
    let db_url = format!("sqlite://{}?mode=rwc", dir.path().join("api.db").display());
    let storage = Arc::new(
        SeaOrmStorage::new(&db_url, "sqlite")
            .await
            .expect("创建存储失败"),
    );
    let services = ServiceRegistry::new(storage);

    create_account(&services, Some(ADMIN_EMAIL), ADMIN_PASSWORD, Role::Admin, "Root").await;

    TestEnv {
        _dir: dir,
        services,
    }
}

async fn create_account(
    services: &ServiceRegistry,
    email: Option<&str>,
    password: &str,
    role: Role,
    first_name: &str,
) -> i32 {
    services
        .users
        .create_user(CreateUserRequest {
            email: email.map(str::to_string),
            password: Some(password.to_string()),
            first_name: first_name.to_string(),
            paternal_surname: "Quispe".to_string(),
            maternal_surname: String::new(),
            ci_number: None,
            phone: None,
            role,
            is_active: Some(true),
            is_staff: Some(role == Role::Admin),
        })
        .await
        .expect("创建用户失败")
        .id
}

/// 挂载完整 API（与生产环境相同的中间件和路由）
macro_rules! init_app {
    ($env:expr) => {{
        let services = $env.services.clone();
        test::init_service(App::new().configure(move |cfg| configure_app(cfg, &services, "/api")))
            .await
    }};
}

fn peer() -> SocketAddr {
    "127.0.0.1:40000".parse().expect("valid socket addr")
}

async fn call<S, B>(app: &S, req: TestRequest) -> (StatusCode, Value)
where
    S: Service<Request, Response = ServiceResponse<B>, Error = Error>,
    B: MessageBody,
{
    let resp = test::call_service(app, req.to_request()).await;
    let status = resp.status();
    let body = test::read_body(resp).await;
    let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, value)
}

async fn login<S, B>(app: &S, username: &str, password: &str) -> String
where
    S: Service<Request, Response = ServiceResponse<B>, Error = Error>,
    B: MessageBody,
{
    let (status, body) = call(
        app,
        TestRequest::post()
            .uri("/api/auth/login")
            .peer_addr(peer())
            .set_json(json!({ "username": username, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);
    body["data"]["token"]
        .as_str()
        .expect("token in login response")
        .to_string()
}

fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Token {}", token))
}

async fn post_ok<S, B>(app: &S, token: &str, uri: &str, payload: Value) -> Value
where
    S: Service<Request, Response = ServiceResponse<B>, Error = Error>,
    B: MessageBody,
{
    let (status, body) = call(
        app,
        TestRequest::post()
            .uri(uri)
            .insert_header(bearer(token))
            .set_json(payload),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "POST {} failed: {}", uri, body);
    assert_eq!(body["code"], 0);
    body["data"].clone()
}

async fn put_ok<S, B>(app: &S, token: &str, uri: &str, payload: Value) -> Value
where
    S: Service<Request, Response = ServiceResponse<B>, Error = Error>,
    B: MessageBody,
{
    let (status, body) = call(
        app,
        TestRequest::put()
            .uri(uri)
            .insert_header(bearer(token))
            .set_json(payload),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "PUT {} failed: {}", uri, body);
    assert_eq!(body["code"], 0);
    body["data"].clone()
}

fn approx(value: &Value, expected: f64) -> bool {
    value
        .as_f64()
        .is_some_and(|v| (v - expected).abs() < 1e-9)
}

// =============================================================================
// 公共端点
// =============================================================================

#[actix_rt::test]
async fn test_health_check() {
    let env = setup().await;
    let app = init_app!(env);

    let (status, body) = call(&app, TestRequest::get().uri("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["data"]["database"], "connected");
}

#[actix_rt::test]
async fn test_protected_path_requires_token() {
    let env = setup().await;
    let app = init_app!(env);

    let (status, body) = call(&app, TestRequest::get().uri("/api/courses")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 2001);
    assert_eq!(body["message"], "User is not logged on.");

    let (status, _) = call(
        &app,
        TestRequest::get()
            .uri("/api/courses")
            .insert_header(bearer("not-a-real-token")),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_rt::test]
async fn test_open_courses_is_public() {
    let env = setup().await;
    let app = init_app!(env);

    let (status, body) = call(&app, TestRequest::get().uri("/api/registration/open-courses")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
}

// =============================================================================
// 认证
// =============================================================================

#[actix_rt::test]
async fn test_login_and_check_session() {
    let env = setup().await;
    let app = init_app!(env);

    let token = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let (status, body) = call(
        &app,
        TestRequest::get()
            .uri("/api/auth/check-session")
            .insert_header(bearer(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], ADMIN_EMAIL);
    assert_eq!(body["data"]["role"], "ADMIN");
}

#[actix_rt::test]
async fn test_login_wrong_password() {
    let env = setup().await;
    let app = init_app!(env);

    let (status, body) = call(
        &app,
        TestRequest::post()
            .uri("/api/auth/login")
            .peer_addr(peer())
            .set_json(json!({ "email": ADMIN_EMAIL, "password": "nope-nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 2000);
    assert_eq!(body["message"], "Wrong credentials");
}

#[actix_rt::test]
async fn test_logout_revokes_token() {
    let env = setup().await;
    let app = init_app!(env);

    let token = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    post_ok(&app, &token, "/api/auth/logout", json!({})).await;

    let (status, _) = call(
        &app,
        TestRequest::get()
            .uri("/api/auth/check-session")
            .insert_header(bearer(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_rt::test]
async fn test_student_cannot_manage_users() {
    let env = setup().await;
    create_account(
        &env.services,
        Some("ana@school.test"),
        "student-pass-1",
        Role::Student,
        "Ana",
    )
    .await;
    let app = init_app!(env);

    let token = login(&app, "ana@school.test", "student-pass-1").await;
    let (status, body) = call(
        &app,
        TestRequest::get()
            .uri("/api/manage-users")
            .insert_header(bearer(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 2002);
}

// =============================================================================
// 评分流程
// =============================================================================

struct GradingFixture {
    token: String,
    template_id: i32,
    practice_id: i32,
    exam_id: i32,
    course_id: i32,
    enrollment_id: i32,
    sub_criterion_id: i32,
    task_ids: Vec<i32>,
}

fn criterion_id(template: &Value, name: &str) -> i32 {
    template["criteria"]
        .as_array()
        .and_then(|c| c.iter().find(|c| c["name"] == name))
        .and_then(|c| c["id"].as_i64())
        .expect("template criterion id") as i32
}

fn id_of(data: &Value) -> i32 {
    data["id"].as_i64().expect("id in response") as i32
}

async fn grading_fixture<S, B>(app: &S, env: &TestEnv) -> GradingFixture
where
    S: Service<Request, Response = ServiceResponse<B>, Error = Error>,
    B: MessageBody,
{
    let student_id = create_account(&env.services, None, "student-pass-1", Role::Student, "Luis").await;
    let token = login(app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let period = post_ok(
        app,
        &token,
        "/api/periods",
        json!({ "name": "2026-I", "start_date": "2026-02-01", "end_date": "2026-07-15" }),
    )
    .await;
    let program = post_ok(app, &token, "/api/programs", json!({ "name": "Sistemas" })).await;
    let template = post_ok(
        app,
        &token,
        "/api/evaluation-templates",
        json!({
            "name": "Estándar",
            "criteria": [
                { "name": "Prácticas", "weight": 30.0 },
                { "name": "Examen final", "weight": 70.0 }
            ]
        }),
    )
    .await;
    let practice_id = criterion_id(&template, "Prácticas");
    let exam_id = criterion_id(&template, "Examen final");

    let subject = post_ok(
        app,
        &token,
        "/api/subjects",
        json!({
            "name": "Bases de Datos",
            "code": "SIS-210",
            "program_id": program["id"],
            "evaluation_template_id": template["id"]
        }),
    )
    .await;
    let course = post_ok(
        app,
        &token,
        "/api/courses",
        json!({
            "subject_id": subject["id"],
            "period_id": period["id"],
            "parallel": "A"
        }),
    )
    .await;
    let course_id = course["id"].as_i64().expect("course id") as i32;

    let enrollment = post_ok(
        app,
        &token,
        "/api/enrollments",
        json!({ "student_id": student_id, "course_id": course_id }),
    )
    .await;
    let sub = post_ok(
        app,
        &token,
        "/api/sub-criteria",
        json!({
            "course_id": course_id,
            "parent_criterion_id": practice_id,
            "name": "Laboratorios",
            "percentage": 20.0
        }),
    )
    .await;
    let sub_criterion_id = sub["id"].as_i64().expect("sub-criterion id") as i32;

    let mut task_ids = Vec::new();
    for (name, weight) in [("Lab 1", 1), ("Lab 2", 2)] {
        let task = post_ok(
            app,
            &token,
            "/api/tasks",
            json!({ "sub_criterion_id": sub_criterion_id, "name": name, "weight": weight }),
        )
        .await;
        task_ids.push(task["id"].as_i64().expect("task id") as i32);
    }

    GradingFixture {
        token,
        template_id: id_of(&template),
        practice_id,
        exam_id,
        course_id,
        enrollment_id: enrollment["id"].as_i64().expect("enrollment id") as i32,
        sub_criterion_id,
        task_ids,
    }
}

async fn enroll<S, B>(app: &S, env: &TestEnv, fx: &GradingFixture, first_name: &str) -> i32
where
    S: Service<Request, Response = ServiceResponse<B>, Error = Error>,
    B: MessageBody,
{
    let student_id =
        create_account(&env.services, None, "student-pass-2", Role::Student, first_name).await;
    let enrollment = post_ok(
        app,
        &fx.token,
        "/api/enrollments",
        json!({ "student_id": student_id, "course_id": fx.course_id }),
    )
    .await;
    id_of(&enrollment)
}

async fn manual_sub_criterion<S, B>(
    app: &S,
    fx: &GradingFixture,
    parent_id: i32,
    name: &str,
    percentage: f64,
) -> i32
where
    S: Service<Request, Response = ServiceResponse<B>, Error = Error>,
    B: MessageBody,
{
    let sub = post_ok(
        app,
        &fx.token,
        "/api/sub-criteria",
        json!({
            "course_id": fx.course_id,
            "parent_criterion_id": parent_id,
            "name": name,
            "percentage": percentage
        }),
    )
    .await;
    id_of(&sub)
}

/// 成绩单中某个选课记录的一行
async fn gradesheet_row<S, B>(app: &S, fx: &GradingFixture, enrollment_id: i32) -> Value
where
    S: Service<Request, Response = ServiceResponse<B>, Error = Error>,
    B: MessageBody,
{
    let (status, body) = call(
        app,
        TestRequest::get()
            .uri(&format!("/api/criterion-scores/gradesheet?course_id={}", fx.course_id))
            .insert_header(bearer(&fx.token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body["data"]["rows"]
        .as_array()
        .and_then(|rows| rows.iter().find(|r| r["enrollment_id"] == enrollment_id))
        .cloned()
        .expect("gradesheet row for enrollment")
}

#[actix_rt::test]
async fn test_task_scores_flow_into_gradesheet() {
    let env = setup().await;
    let app = init_app!(env);
    let fx = grading_fixture(&app, &env).await;

    let result = post_ok(
        &app,
        &fx.token,
        "/api/task-scores/bulk",
        json!([
            { "enrollment": fx.enrollment_id, "task": fx.task_ids[0], "score": 80.0 },
            { "enrollment": fx.enrollment_id, "task": fx.task_ids[1], "score": 90.0 }
        ]),
    )
    .await;
    assert_eq!(result["saved"], 2);
    assert_eq!(result["recalculated_criteria"], 1);
    assert_eq!(result["errors"], json!([]));

    let (status, body) = call(
        &app,
        TestRequest::get()
            .uri(&format!("/api/criterion-scores/gradesheet?course_id={}", fx.course_id))
            .insert_header(bearer(&fx.token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let row = &body["data"]["rows"][0];
    assert_eq!(row["enrollment_id"], fx.enrollment_id);
    // (80×1 + 90×2) / 3 = 86.67 → 20% 的分值 17.33
    assert!(approx(&row["grades"][fx.sub_criterion_id.to_string()], 17.33), "{}", row);
    assert!(approx(&row["final_grade"], 17.33), "{}", row);
}

#[actix_rt::test]
async fn test_out_of_range_task_score_is_row_error() {
    let env = setup().await;
    let app = init_app!(env);
    let fx = grading_fixture(&app, &env).await;

    let result = post_ok(
        &app,
        &fx.token,
        "/api/task-scores/bulk",
        json!([
            { "enrollment": fx.enrollment_id, "task": fx.task_ids[0], "score": 80.0 },
            { "enrollment": fx.enrollment_id, "task": fx.task_ids[1], "score": 150.0 }
        ]),
    )
    .await;
    assert_eq!(result["saved"], 1);
    let errors = result["errors"].as_array().expect("errors array");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["index"], 1);

    // 缺失的任务分数按 0 计：80×1 / 3 = 26.67 → 5.33
    let (_, body) = call(
        &app,
        TestRequest::get()
            .uri(&format!("/api/criterion-scores/gradesheet?course_id={}", fx.course_id))
            .insert_header(bearer(&fx.token)),
    )
    .await;
    assert!(approx(&body["data"]["rows"][0]["final_grade"], 5.33), "{}", body);
}

#[actix_rt::test]
async fn test_registration_submit_and_approve() {
    let env = setup().await;
    let app = init_app!(env);
    let fx = grading_fixture(&app, &env).await;

    let (status, _) = call(
        &app,
        TestRequest::put()
            .uri(&format!("/api/courses/{}", fx.course_id))
            .insert_header(bearer(&fx.token))
            .set_json(json!({
                "subject_id": 1,
                "period_id": 1,
                "parallel": "A",
                "is_registration_open": true
            })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, TestRequest::get().uri("/api/registration/open-courses")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));

    let (status, body) = call(
        &app,
        TestRequest::post()
            .uri("/api/registration/submit")
            .set_json(json!({
                "course_id": fx.course_id,
                "ci": "7.654.321 LP",
                "first_name": "maría",
                "paternal_surname": "mamani"
            })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["ci"], "7654321");
    assert_eq!(body["data"]["status"], "PENDING");
    let request_id = body["data"]["id"].as_i64().expect("request id");

    // 重复提交待处理的申请
    let (status, body) = call(
        &app,
        TestRequest::post()
            .uri("/api/registration/submit")
            .set_json(json!({
                "course_id": fx.course_id,
                "ci": "7654321",
                "first_name": "María",
                "paternal_surname": "Mamani"
            })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 3001);

    let approved = post_ok(
        &app,
        &fx.token,
        &format!("/api/registration/requests/{}/approve", request_id),
        json!({}),
    )
    .await;
    assert_eq!(approved["user_created"], true);
    assert_eq!(approved["request"]["status"], "APPROVED");
    assert_eq!(approved["enrollment"]["course_id"], fx.course_id);
}

// =============================================================================
// 成绩聚合
// =============================================================================

#[actix_rt::test]
async fn test_criterion_total_capped_at_weight() {
    let env = setup().await;
    let app = init_app!(env);
    let fx = grading_fixture(&app, &env).await;

    post_ok(
        &app,
        &fx.token,
        "/api/task-scores/bulk",
        json!([
            { "enrollment": fx.enrollment_id, "task": fx.task_ids[0], "score": 100.0 },
            { "enrollment": fx.enrollment_id, "task": fx.task_ids[1], "score": 100.0 }
        ]),
    )
    .await;
    let oral = manual_sub_criterion(&app, &fx, fx.practice_id, "Oral", 20.0).await;
    post_ok(
        &app,
        &fx.token,
        "/api/criterion-scores/bulk",
        json!([{ "enrollment": fx.enrollment_id, "criterion": oral, "score": 18.0 }]),
    )
    .await;

    // 20 + 18 超过「Prácticas」的权重 30
    let row = gradesheet_row(&app, &fx, fx.enrollment_id).await;
    assert!(approx(&row["grades"][fx.sub_criterion_id.to_string()], 20.0), "{}", row);
    assert!(approx(&row["grades"][oral.to_string()], 18.0), "{}", row);
    assert!(approx(&row["final_grade"], 30.0), "{}", row);
}

#[actix_rt::test]
async fn test_template_weight_change_recomputes_final_grade() {
    let env = setup().await;
    let app = init_app!(env);
    let fx = grading_fixture(&app, &env).await;

    post_ok(
        &app,
        &fx.token,
        "/api/task-scores/bulk",
        json!([
            { "enrollment": fx.enrollment_id, "task": fx.task_ids[0], "score": 100.0 },
            { "enrollment": fx.enrollment_id, "task": fx.task_ids[1], "score": 100.0 }
        ]),
    )
    .await;
    let row = gradesheet_row(&app, &fx, fx.enrollment_id).await;
    assert!(approx(&row["final_grade"], 20.0), "{}", row);

    put_ok(
        &app,
        &fx.token,
        &format!("/api/evaluation-templates/{}", fx.template_id),
        json!({
            "name": "Estándar",
            "criteria": [
                { "id": fx.practice_id, "name": "Prácticas", "weight": 15.0 },
                { "id": fx.exam_id, "name": "Examen final", "weight": 85.0 }
            ]
        }),
    )
    .await;

    let row = gradesheet_row(&app, &fx, fx.enrollment_id).await;
    assert!(approx(&row["grades"][fx.sub_criterion_id.to_string()], 20.0), "{}", row);
    assert!(approx(&row["final_grade"], 15.0), "{}", row);
}

#[actix_rt::test]
async fn test_deleting_last_task_keeps_score() {
    let env = setup().await;
    let app = init_app!(env);
    let fx = grading_fixture(&app, &env).await;

    post_ok(
        &app,
        &fx.token,
        "/api/task-scores/bulk",
        json!([
            { "enrollment": fx.enrollment_id, "task": fx.task_ids[0], "score": 80.0 },
            { "enrollment": fx.enrollment_id, "task": fx.task_ids[1], "score": 90.0 }
        ]),
    )
    .await;

    let delete = |id: i32| {
        TestRequest::delete()
            .uri(&format!("/api/tasks/{}", id))
            .insert_header(bearer(&fx.token))
    };

    // 剩下 Lab 2：90 → 18.0
    let (status, body) = call(&app, delete(fx.task_ids[0])).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let row = gradesheet_row(&app, &fx, fx.enrollment_id).await;
    assert!(approx(&row["grades"][fx.sub_criterion_id.to_string()], 18.0), "{}", row);

    // 没有任务后保留原值
    let (status, body) = call(&app, delete(fx.task_ids[1])).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let row = gradesheet_row(&app, &fx, fx.enrollment_id).await;
    assert!(approx(&row["grades"][fx.sub_criterion_id.to_string()], 18.0), "{}", row);
    assert!(approx(&row["final_grade"], 18.0), "{}", row);
}

#[actix_rt::test]
async fn test_criterion_bulk_rolls_back_on_invalid_row() {
    let env = setup().await;
    let app = init_app!(env);
    let fx = grading_fixture(&app, &env).await;
    let oral = manual_sub_criterion(&app, &fx, fx.practice_id, "Oral", 20.0).await;

    // 第二行指向按任务计算的子项，整批拒绝
    let (status, body) = call(
        &app,
        TestRequest::post()
            .uri("/api/criterion-scores/bulk")
            .insert_header(bearer(&fx.token))
            .set_json(json!([
                { "enrollment": fx.enrollment_id, "criterion": oral, "score": 15.0 },
                { "enrollment": fx.enrollment_id, "criterion": fx.sub_criterion_id, "score": 5.0 }
            ])),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);

    let row = gradesheet_row(&app, &fx, fx.enrollment_id).await;
    assert!(row["grades"].get(oral.to_string()).is_none(), "{}", row);
    assert!(approx(&row["final_grade"], 0.0), "{}", row);
}

#[actix_rt::test]
async fn test_special_criterion_computed_from_tasks() {
    let env = setup().await;
    let app = init_app!(env);
    let fx = grading_fixture(&app, &env).await;

    let special = post_ok(
        &app,
        &fx.token,
        "/api/special-criteria",
        json!({
            "course_id": fx.course_id,
            "parent_criterion_id": fx.exam_id,
            "name": "Participación",
            "percentage": 10.0
        }),
    )
    .await;
    let special_id = id_of(&special);
    let task = post_ok(
        &app,
        &fx.token,
        "/api/tasks",
        json!({ "special_criterion_id": special_id, "name": "Foro", "weight": 1 }),
    )
    .await;

    let result = post_ok(
        &app,
        &fx.token,
        "/api/task-scores/bulk",
        json!([{ "enrollment": fx.enrollment_id, "task": id_of(&task), "score": 70.0 }]),
    )
    .await;
    assert_eq!(result["recalculated_criteria"], 1);

    let row = gradesheet_row(&app, &fx, fx.enrollment_id).await;
    assert!(approx(&row["grades"][format!("special-{}", special_id)], 7.0), "{}", row);
    assert!(approx(&row["final_grade"], 7.0), "{}", row);
}

// =============================================================================
// 百分比调整后的封顶
// =============================================================================

#[actix_rt::test]
async fn test_lowering_percentage_caps_manual_scores() {
    let env = setup().await;
    let app = init_app!(env);
    let fx = grading_fixture(&app, &env).await;
    let oral = manual_sub_criterion(&app, &fx, fx.practice_id, "Oral", 20.0).await;

    post_ok(
        &app,
        &fx.token,
        "/api/criterion-scores/bulk",
        json!([{ "enrollment": fx.enrollment_id, "criterion": oral, "score": 18.0 }]),
    )
    .await;

    put_ok(
        &app,
        &fx.token,
        &format!("/api/sub-criteria/{}", oral),
        json!({
            "course_id": fx.course_id,
            "parent_criterion_id": fx.practice_id,
            "name": "Oral",
            "percentage": 10.0
        }),
    )
    .await;
    let row = gradesheet_row(&app, &fx, fx.enrollment_id).await;
    assert!(approx(&row["grades"][oral.to_string()], 10.0), "{}", row);
    assert!(approx(&row["final_grade"], 10.0), "{}", row);

    // 批量设置同样封顶
    let result = post_ok(
        &app,
        &fx.token,
        "/api/sub-criteria/bulk-settings",
        json!({ "updates": [{ "id": oral, "percentage": 4.0 }] }),
    )
    .await;
    assert_eq!(result["updated"], 1);
    let row = gradesheet_row(&app, &fx, fx.enrollment_id).await;
    assert!(approx(&row["grades"][oral.to_string()], 4.0), "{}", row);
    assert!(approx(&row["final_grade"], 4.0), "{}", row);
}

#[actix_rt::test]
async fn test_lowering_special_percentage_caps_scores() {
    let env = setup().await;
    let app = init_app!(env);
    let fx = grading_fixture(&app, &env).await;

    let special = post_ok(
        &app,
        &fx.token,
        "/api/special-criteria",
        json!({
            "course_id": fx.course_id,
            "parent_criterion_id": fx.exam_id,
            "name": "Bonus",
            "percentage": 10.0
        }),
    )
    .await;
    let special_id = id_of(&special);
    let key = format!("special-{}", special_id);
    post_ok(
        &app,
        &fx.token,
        "/api/criterion-scores/bulk",
        json!([{ "enrollment": fx.enrollment_id, "criterion": key, "score": 8.0 }]),
    )
    .await;

    put_ok(
        &app,
        &fx.token,
        &format!("/api/special-criteria/{}", special_id),
        json!({
            "course_id": fx.course_id,
            "parent_criterion_id": fx.exam_id,
            "name": "Bonus",
            "percentage": 5.0
        }),
    )
    .await;
    let row = gradesheet_row(&app, &fx, fx.enrollment_id).await;
    assert!(approx(&row["grades"][key.as_str()], 5.0), "{}", row);
    assert!(approx(&row["final_grade"], 5.0), "{}", row);
}

// =============================================================================
// 小组项目
// =============================================================================

#[actix_rt::test]
async fn test_project_score_shared_by_members() {
    let env = setup().await;
    let app = init_app!(env);
    let fx = grading_fixture(&app, &env).await;
    let second = enroll(&app, &env, &fx, "Ana").await;

    let sub = post_ok(
        &app,
        &fx.token,
        "/api/sub-criteria",
        json!({
            "course_id": fx.course_id,
            "parent_criterion_id": fx.practice_id,
            "name": "Proyecto",
            "percentage": 25.0,
            "is_project": true
        }),
    )
    .await;
    let project_sub = id_of(&sub);
    assert_eq!(sub["max_members"], Value::Null);

    // 未设置人数上限时允许多人小组
    post_ok(
        &app,
        &fx.token,
        "/api/projects",
        json!({
            "sub_criterion_id": project_sub,
            "name": "Inventario",
            "score": 12.5,
            "member_ids": [fx.enrollment_id, second]
        }),
    )
    .await;

    for enrollment_id in [fx.enrollment_id, second] {
        let row = gradesheet_row(&app, &fx, enrollment_id).await;
        assert!(approx(&row["grades"][project_sub.to_string()], 12.5), "{}", row);
        assert!(approx(&row["final_grade"], 12.5), "{}", row);
    }

    // 百分比降低后项目分与成员分一起封顶
    put_ok(
        &app,
        &fx.token,
        &format!("/api/sub-criteria/{}", project_sub),
        json!({
            "course_id": fx.course_id,
            "parent_criterion_id": fx.practice_id,
            "name": "Proyecto",
            "percentage": 10.0,
            "is_project": true
        }),
    )
    .await;
    for enrollment_id in [fx.enrollment_id, second] {
        let row = gradesheet_row(&app, &fx, enrollment_id).await;
        assert!(approx(&row["grades"][project_sub.to_string()], 10.0), "{}", row);
        assert!(approx(&row["final_grade"], 10.0), "{}", row);
    }
    let (status, body) = call(
        &app,
        TestRequest::get()
            .uri(&format!("/api/projects?course_id={}", fx.course_id))
            .insert_header(bearer(&fx.token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert!(approx(&body["data"][0]["score"], 10.0), "{}", body);
}

#[actix_rt::test]
async fn test_project_member_limit_enforced() {
    let env = setup().await;
    let app = init_app!(env);
    let fx = grading_fixture(&app, &env).await;
    let second = enroll(&app, &env, &fx, "Ana").await;

    let sub = post_ok(
        &app,
        &fx.token,
        "/api/sub-criteria",
        json!({
            "course_id": fx.course_id,
            "parent_criterion_id": fx.practice_id,
            "name": "Ensayo",
            "percentage": 10.0,
            "is_project": true,
            "max_members": 1
        }),
    )
    .await;

    let (status, body) = call(
        &app,
        TestRequest::post()
            .uri("/api/projects")
            .insert_header(bearer(&fx.token))
            .set_json(json!({
                "sub_criterion_id": id_of(&sub),
                "name": "Pareja",
                "member_ids": [fx.enrollment_id, second]
            })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    assert!(
        body["message"]
            .as_str()
            .is_some_and(|m| m.contains("at most 1 members")),
        "{}",
        body
    );
}

#[actix_rt::test]
async fn test_removed_member_keeps_last_project_score() {
    let env = setup().await;
    let app = init_app!(env);
    let fx = grading_fixture(&app, &env).await;
    let second = enroll(&app, &env, &fx, "Ana").await;

    let sub = post_ok(
        &app,
        &fx.token,
        "/api/sub-criteria",
        json!({
            "course_id": fx.course_id,
            "parent_criterion_id": fx.practice_id,
            "name": "Proyecto",
            "percentage": 25.0,
            "is_project": true
        }),
    )
    .await;
    let project_sub = id_of(&sub);
    let project = post_ok(
        &app,
        &fx.token,
        "/api/projects",
        json!({
            "sub_criterion_id": project_sub,
            "name": "Inventario",
            "score": 12.5,
            "member_ids": [fx.enrollment_id, second]
        }),
    )
    .await;

    put_ok(
        &app,
        &fx.token,
        &format!("/api/projects/{}", id_of(&project)),
        json!({
            "sub_criterion_id": project_sub,
            "name": "Inventario",
            "score": 20.0,
            "member_ids": [fx.enrollment_id]
        }),
    )
    .await;

    let row = gradesheet_row(&app, &fx, fx.enrollment_id).await;
    assert!(approx(&row["grades"][project_sub.to_string()], 20.0), "{}", row);
    let row = gradesheet_row(&app, &fx, second).await;
    assert!(approx(&row["grades"][project_sub.to_string()], 12.5), "{}", row);
}
