//! Authentication service
//!
//! Credential login, account claiming, session validation and revocation.
//! Sessions are signed JWTs that must also exist in `active_sessions`, so a
//! logout revokes the token before it expires.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use migration::entities::{ActiveSessionEntity, UserEntity, active_session, user};
use moka::sync::Cache;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use ts_rs::TS;

use crate::api::jwt::get_jwt_service;
use crate::api::services::school::TS_EXPORT_PATH;
use crate::config::get_config;
use crate::errors::{Result, SchoolError};
use crate::services::user_service::{email_taken, find_by_ci};
use crate::services::views::{UserView, full_name};
use crate::storage::{Role, SeaOrmStorage, find_required};
use crate::utils::password::{check_stored_password, hash_password};
use crate::utils::{digits_only, non_empty};

pub const NOT_LOGGED_ON: &str = "User is not logged on.";
const WRONG_CREDENTIALS: &str = "Wrong credentials";

/// 当前请求的已认证用户
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct AuthUser {
    pub id: i32,
    pub role: Role,
    pub email: Option<String>,
    pub full_name: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(SchoolError::permission_denied(
                "Only administrators can perform this action",
            ))
        }
    }

    /// ADMIN or TEACHER
    pub fn require_staff(&self) -> Result<()> {
        if self.role.can_manage_grades() {
            Ok(())
        } else {
            Err(SchoolError::permission_denied(
                "Only teachers or administrators can perform this action",
            ))
        }
    }
}

impl From<&user::Model> for AuthUser {
    fn from(u: &user::Model) -> Self {
        Self {
            id: u.id,
            role: Role::from_db(&u.role),
            email: u.email.clone(),
            full_name: full_name(&u.first_name, &u.paternal_surname, &u.maternal_surname),
        }
    }
}

// ============ Request/Response DTOs ============

#[derive(Debug, Clone, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct LoginRequest {
    /// Email or CI number
    #[serde(alias = "email", alias = "ci", alias = "ci_number")]
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserView,
    /// Set when the account still has no email; the client should ask for credentials
    pub requires_account_update: bool,
}

#[derive(Debug, Clone, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub ci_number: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub paternal_surname: Option<String>,
    #[serde(default)]
    pub maternal_surname: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct UpdateCredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct ProfileUpdateRequest {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub paternal_surname: Option<String>,
    #[serde(default)]
    pub maternal_surname: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

// ============ AuthService Implementation ============

pub struct AuthService {
    storage: Arc<SeaOrmStorage>,
    /// token -> user，短时间缓存避免每个请求都查库
    sessions: Cache<String, AuthUser>,
}

impl AuthService {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        let ttl = get_config().auth.session_cache_ttl_secs;
        Self {
            storage,
            sessions: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(Duration::from_secs(ttl.max(1)))
                .build(),
        }
    }

    /// Look up by email when the identifier looks like one, otherwise by CI
    async fn find_login_user(&self, identifier: &str) -> Result<Option<user::Model>> {
        let db = self.storage.get_db();
        let identifier = identifier.trim();
        if identifier.contains('@') {
            return Ok(UserEntity::find()
                .filter(user::Column::Email.eq(identifier.to_lowercase()))
                .one(db)
                .await?);
        }
        let ci = digits_only(identifier);
        if ci.is_empty() {
            return Ok(None);
        }
        find_by_ci(db, &ci).await
    }

    pub async fn login(&self, req: LoginRequest) -> Result<LoginResponse> {
        if req.username.trim().is_empty() || req.password.is_empty() {
            return Err(SchoolError::validation("Username and password are required"));
        }

        let Some(account) = self.find_login_user(&req.username).await? else {
            info!("Login failed: unknown identifier");
            return Err(SchoolError::unauthorized(WRONG_CREDENTIALS));
        };

        // CI 登录：尚未设置邮箱的学生可用 CI 作为密码
        let ci_login = Role::from_db(&account.role) == Role::Student
            && account.email.is_none()
            && account
                .ci_number
                .as_deref()
                .is_some_and(|ci| !ci.is_empty() && ci == req.password);

        if !ci_login && !check_stored_password(&req.password, account.password.as_deref()) {
            info!("Login failed for user {}: wrong password", account.id);
            return Err(SchoolError::unauthorized(WRONG_CREDENTIALS));
        }
        if !account.is_active {
            info!("Login rejected for inactive user {}", account.id);
            return Err(SchoolError::validation("User is not active"));
        }

        let token = self.session_for(account.id).await?;
        info!("User {} logged in", account.id);

        Ok(LoginResponse {
            token,
            requires_account_update: account.email.is_none(),
            user: UserView::from(account),
        })
    }

    /// Reuse a still-valid session of the user, or open a new one
    async fn session_for(&self, user_id: i32) -> Result<String> {
        let db = self.storage.get_db();
        let jwt = get_jwt_service();

        let existing = ActiveSessionEntity::find()
            .filter(active_session::Column::UserId.eq(user_id))
            .order_by_desc(active_session::Column::CreatedAt)
            .all(db)
            .await?;

        for session in existing {
            if jwt.validate_session_token(&session.token).is_ok() {
                debug!("Reusing session {} for user {}", session.id, user_id);
                return Ok(session.token);
            }
            // 过期的会话顺手清理
            ActiveSessionEntity::delete_by_id(session.id).exec(db).await?;
        }

        let token = jwt
            .generate_session_token(user_id)
            .map_err(|e| SchoolError::database_operation(format!("Failed to sign token: {}", e)))?;
        active_session::ActiveModel {
            user_id: Set(user_id),
            token: Set(token.clone()),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await?;
        Ok(token)
    }

    /// Self-service registration; claims an existing email-less account with the same CI
    pub async fn register(&self, req: RegisterRequest) -> Result<LoginResponse> {
        let db = self.storage.get_db();
        let email = req.email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(SchoolError::validation("A valid email is required"));
        }
        if req.password.len() < 6 {
            return Err(SchoolError::validation(
                "Password must be at least 6 characters",
            ));
        }
        if email_taken(db, &email, None).await? {
            return Err(SchoolError::conflict("Email is already registered"));
        }

        let ci = req
            .ci_number
            .as_deref()
            .map(digits_only)
            .filter(|ci| !ci.is_empty());
        let password = hash_password(&req.password)?;

        let claimed = match &ci {
            Some(ci) => find_by_ci(db, ci).await?,
            None => None,
        };

        let account = match claimed {
            Some(existing) if existing.email.is_some() => {
                return Err(SchoolError::conflict(
                    "An account with this CI already exists",
                ));
            }
            Some(existing) => {
                let mut am: user::ActiveModel = existing.clone().into();
                am.email = Set(Some(email));
                am.password = Set(Some(password));
                if let Some(v) = non_empty(req.first_name.as_deref()) {
                    am.first_name = Set(v);
                }
                if let Some(v) = non_empty(req.paternal_surname.as_deref()) {
                    am.paternal_surname = Set(v);
                }
                if let Some(v) = non_empty(req.maternal_surname.as_deref()) {
                    am.maternal_surname = Set(v);
                }
                if let Some(v) = non_empty(req.phone.as_deref()) {
                    am.phone = Set(Some(v));
                }
                let updated = am.update(db).await?;
                info!("User {} claimed account by CI", updated.id);
                updated
            }
            None => {
                let created = user::ActiveModel {
                    email: Set(Some(email)),
                    password: Set(Some(password)),
                    first_name: Set(non_empty(req.first_name.as_deref()).unwrap_or_default()),
                    paternal_surname: Set(
                        non_empty(req.paternal_surname.as_deref()).unwrap_or_default()
                    ),
                    maternal_surname: Set(
                        non_empty(req.maternal_surname.as_deref()).unwrap_or_default()
                    ),
                    ci_number: Set(ci),
                    phone: Set(non_empty(req.phone.as_deref())),
                    role: Set(Role::Student.to_string()),
                    active_course_id: Set(None),
                    is_active: Set(true),
                    is_staff: Set(false),
                    date_joined: Set(Utc::now()),
                    ..Default::default()
                }
                .insert(db)
                .await?;
                info!("Registered new student {}", created.id);
                created
            }
        };

        let token = self.session_for(account.id).await?;
        Ok(LoginResponse {
            token,
            requires_account_update: false,
            user: UserView::from(account),
        })
    }

    /// Resolve a bearer token to its user
    pub async fn authenticate(&self, token: &str) -> Result<AuthUser> {
        if let Some(cached) = self.sessions.get(token) {
            return Ok(cached);
        }

        let claims = get_jwt_service()
            .validate_session_token(token)
            .map_err(|e| {
                debug!("Session token rejected: {}", e);
                SchoolError::unauthorized(NOT_LOGGED_ON)
            })?;
        let user_id = claims
            .user_id()
            .ok_or_else(|| SchoolError::unauthorized(NOT_LOGGED_ON))?;

        let db = self.storage.get_db();
        let session = ActiveSessionEntity::find()
            .filter(active_session::Column::Token.eq(token))
            .one(db)
            .await?;
        if session.is_none_or(|s| s.user_id != user_id) {
            return Err(SchoolError::unauthorized(NOT_LOGGED_ON));
        }

        let account = UserEntity::find_by_id(user_id)
            .one(db)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| SchoolError::unauthorized(NOT_LOGGED_ON))?;

        let auth_user = AuthUser::from(&account);
        self.sessions.insert(token.to_string(), auth_user.clone());
        Ok(auth_user)
    }

    pub async fn logout(&self, token: &str) -> Result<()> {
        ActiveSessionEntity::delete_many()
            .filter(active_session::Column::Token.eq(token))
            .exec(self.storage.get_db())
            .await?;
        self.sessions.invalidate(token);
        Ok(())
    }

    /// Drop every session of a user (deactivation, deletion, credential change)
    pub async fn revoke_user_sessions(&self, user_id: i32) -> Result<u64> {
        let db = self.storage.get_db();
        let sessions = ActiveSessionEntity::find()
            .filter(active_session::Column::UserId.eq(user_id))
            .all(db)
            .await?;
        for session in &sessions {
            self.sessions.invalidate(&session.token);
        }
        let result = ActiveSessionEntity::delete_many()
            .filter(active_session::Column::UserId.eq(user_id))
            .exec(db)
            .await?;
        if result.rows_affected > 0 {
            info!(
                "Revoked {} sessions of user {}",
                result.rows_affected, user_id
            );
        }
        Ok(result.rows_affected)
    }

    /// Set email and password after a CI login
    pub async fn update_credentials(
        &self,
        current: &AuthUser,
        req: UpdateCredentialsRequest,
    ) -> Result<UserView> {
        let db = self.storage.get_db();
        let email = req.email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(SchoolError::validation("A valid email is required"));
        }
        if req.password.len() < 6 {
            return Err(SchoolError::validation(
                "Password must be at least 6 characters",
            ));
        }
        if email_taken(db, &email, Some(current.id)).await? {
            return Err(SchoolError::conflict("Email is already registered"));
        }

        let account = find_required::<UserEntity, _>(db, current.id, "User").await?;
        let mut am: user::ActiveModel = account.into();
        am.email = Set(Some(email));
        am.password = Set(Some(hash_password(&req.password)?));
        let updated = am.update(db).await?;

        // 缓存里的 email 已过时
        self.invalidate_cached_user(current.id).await?;
        info!("User {} updated credentials", updated.id);
        Ok(UserView::from(updated))
    }

    pub async fn profile(&self, current: &AuthUser) -> Result<UserView> {
        let account =
            find_required::<UserEntity, _>(self.storage.get_db(), current.id, "User").await?;
        Ok(UserView::from(account))
    }

    pub async fn update_profile(
        &self,
        current: &AuthUser,
        req: ProfileUpdateRequest,
    ) -> Result<UserView> {
        let db = self.storage.get_db();
        let account = find_required::<UserEntity, _>(db, current.id, "User").await?;
        let mut am: user::ActiveModel = account.into();
        if let Some(v) = non_empty(req.first_name.as_deref()) {
            am.first_name = Set(v);
        }
        if let Some(v) = non_empty(req.paternal_surname.as_deref()) {
            am.paternal_surname = Set(v);
        }
        if let Some(v) = req.maternal_surname {
            am.maternal_surname = Set(v.trim().to_string());
        }
        if let Some(v) = req.phone {
            am.phone = Set(non_empty(Some(&v)));
        }
        let updated = am.update(db).await?;
        self.invalidate_cached_user(current.id).await?;
        Ok(UserView::from(updated))
    }

    async fn invalidate_cached_user(&self, user_id: i32) -> Result<()> {
        let sessions = ActiveSessionEntity::find()
            .filter(active_session::Column::UserId.eq(user_id))
            .all(self.storage.get_db())
            .await?;
        for session in &sessions {
            self.sessions.invalidate(&session.token);
        }
        Ok(())
    }

    /// Remove sessions whose JWT has expired
    pub async fn purge_expired_sessions(&self) -> Result<usize> {
        let db = self.storage.get_db();
        let jwt = get_jwt_service();
        let mut purged = 0;
        for session in ActiveSessionEntity::find().all(db).await? {
            if jwt.validate_session_token(&session.token).is_err() {
                ActiveSessionEntity::delete_by_id(session.id).exec(db).await?;
                self.sessions.invalidate(&session.token);
                purged += 1;
            }
        }
        if purged > 0 {
            warn!("Purged {} expired sessions", purged);
        }
        Ok(purged)
    }
}

/// Extract the token from an Authorization header value.
///
/// Accepts `Token <t>`, `Bearer <t>` or the bare token.
pub fn parse_authorization(value: &str) -> Option<&str> {
    let value = value.trim_start();
    let token = value
        .strip_prefix("Token ")
        .or_else(|| value.strip_prefix("Bearer "))
        .unwrap_or(value)
        .trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_authorization() {
        assert_eq!(parse_authorization("Token abc"), Some("abc"));
        assert_eq!(parse_authorization("Bearer abc.def"), Some("abc.def"));
        assert_eq!(parse_authorization("abc"), Some("abc"));
        assert_eq!(parse_authorization("Bearer   "), None);
        assert_eq!(parse_authorization(""), None);
    }

    #[test]
    fn test_role_guards() {
        let mut user = AuthUser {
            id: 1,
            role: Role::Teacher,
            email: None,
            full_name: "T".into(),
        };
        assert!(user.require_staff().is_ok());
        assert!(user.require_admin().is_err());
        user.role = Role::Parent;
        assert!(user.require_staff().is_err());
        user.role = Role::Admin;
        assert!(user.require_admin().is_ok());
    }
}
