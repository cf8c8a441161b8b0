//! User management service
//!
//! Admin CRUD over accounts, roster-based bulk import and family links.
//! The free functions at the top are shared with enrollment and
//! registration, which create students on the fly.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use migration::entities::{FamilyRelationshipEntity, UserEntity, family_relationship, user};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait, EntityTrait,
    QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use ts_rs::TS;

use crate::api::services::school::TS_EXPORT_PATH;
use crate::errors::{Result, SchoolError};
use crate::import::RosterEntry;
use crate::services::auth_service::AuthService;
use crate::services::views::{FamilyRelationshipView, RowError, UserView};
use crate::storage::{Role, SeaOrmStorage, find_required};
use crate::utils::password::{hash_password, process_new_password};
use crate::utils::{digits_only, non_empty};

// ============ Shared helpers ============

pub async fn find_by_ci<C: ConnectionTrait>(db: &C, ci: &str) -> Result<Option<user::Model>> {
    Ok(UserEntity::find()
        .filter(user::Column::CiNumber.eq(ci))
        .order_by_asc(user::Column::Id)
        .one(db)
        .await?)
}

/// Whether another account already uses the email
pub async fn email_taken<C: ConnectionTrait>(
    db: &C,
    email: &str,
    except_user: Option<i32>,
) -> Result<bool> {
    let mut query = UserEntity::find().filter(user::Column::Email.eq(email));
    if let Some(id) = except_user {
        query = query.filter(user::Column::Id.ne(id));
    }
    Ok(query.one(db).await?.is_some())
}

/// Normalize an optional email; keeps it only when no other account uses it
async fn usable_email<C: ConnectionTrait>(
    db: &C,
    email: Option<&str>,
    except_user: Option<i32>,
) -> Result<Option<String>> {
    let Some(email) = non_empty(email).map(|e| e.to_lowercase()) else {
        return Ok(None);
    };
    if email_taken(db, &email, except_user).await? {
        warn!("Email {} already belongs to another account, dropping it", email);
        return Ok(None);
    }
    Ok(Some(email))
}

/// Create a STUDENT from a roster row; the initial password is the CI
pub async fn create_student<C: ConnectionTrait>(db: &C, entry: &RosterEntry) -> Result<user::Model> {
    let ci = digits_only(&entry.ci_number);
    if ci.is_empty() {
        return Err(SchoolError::validation("CI number is required"));
    }
    let email = usable_email(db, entry.email.as_deref(), None).await?;

    Ok(user::ActiveModel {
        email: Set(email),
        password: Set(Some(hash_password(&ci)?)),
        first_name: Set(entry.first_name.trim().to_string()),
        paternal_surname: Set(entry.paternal_surname.trim().to_string()),
        maternal_surname: Set(entry.maternal_surname.trim().to_string()),
        ci_number: Set(Some(ci)),
        phone: Set(non_empty(entry.phone.as_deref())),
        role: Set(Role::Student.to_string()),
        active_course_id: Set(None),
        is_active: Set(true),
        is_staff: Set(false),
        date_joined: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?)
}

// ============ Request/Response DTOs ============

#[derive(Debug, Clone, Default, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct UserQuery {
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub search: Option<String>,
}

#[derive(Debug, Clone, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub first_name: String,
    pub paternal_surname: String,
    #[serde(default)]
    pub maternal_surname: String,
    #[serde(default)]
    pub ci_number: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub is_staff: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub email: Option<String>,
    /// Empty or missing keeps the current password
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub paternal_surname: Option<String>,
    #[serde(default)]
    pub maternal_surname: Option<String>,
    #[serde(default)]
    pub ci_number: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub active_course_id: Option<i32>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub is_staff: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
#[serde(rename_all = "lowercase")]
pub enum RowStatus {
    New,
    Existing,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct BulkUserRow {
    #[serde(flatten)]
    pub entry: RosterEntry,
    pub status: RowStatus,
    pub user_id: Option<i32>,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct BulkUserPreview {
    pub rows: Vec<BulkUserRow>,
    pub new_count: usize,
    pub existing_count: usize,
}

#[derive(Debug, Clone, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct BulkUserConfirmRequest {
    pub rows: Vec<RosterEntry>,
}

#[derive(Debug, Clone, Default, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct BulkUserResult {
    pub created: usize,
    pub updated: usize,
    pub errors: Vec<RowError>,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct FamilyQuery {
    #[serde(default)]
    pub parent_id: Option<i32>,
    #[serde(default)]
    pub student_id: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct CreateFamilyRequest {
    pub parent_id: i32,
    pub student_id: i32,
    #[serde(default)]
    pub relationship: Option<String>,
}

// ============ UserService Implementation ============

pub struct UserService {
    storage: Arc<SeaOrmStorage>,
    auth: Arc<AuthService>,
}

impl UserService {
    pub fn new(storage: Arc<SeaOrmStorage>, auth: Arc<AuthService>) -> Self {
        Self { storage, auth }
    }

    pub async fn list_users(&self, query: UserQuery) -> Result<Vec<UserView>> {
        let mut select = UserEntity::find();
        if let Some(role) = query.role {
            select = select.filter(user::Column::Role.eq(role.as_ref()));
        }
        if let Some(term) = non_empty(query.search.as_deref()) {
            select = select.filter(
                Condition::any()
                    .add(user::Column::Email.contains(&term))
                    .add(user::Column::FirstName.contains(&term))
                    .add(user::Column::PaternalSurname.contains(&term))
                    .add(user::Column::MaternalSurname.contains(&term))
                    .add(user::Column::CiNumber.contains(&term)),
            );
        }
        let users = select
            .order_by_asc(user::Column::PaternalSurname)
            .order_by_asc(user::Column::FirstName)
            .all(self.storage.get_db())
            .await?;
        Ok(users.into_iter().map(UserView::from).collect())
    }

    pub async fn get_user(&self, id: i32) -> Result<UserView> {
        let u = find_required::<UserEntity, _>(self.storage.get_db(), id, "User").await?;
        Ok(UserView::from(u))
    }

    pub async fn create_user(&self, req: CreateUserRequest) -> Result<UserView> {
        let db = self.storage.get_db();
        if req.first_name.trim().is_empty() || req.paternal_surname.trim().is_empty() {
            return Err(SchoolError::validation(
                "first_name and paternal_surname are required",
            ));
        }

        let email = non_empty(req.email.as_deref()).map(|e| e.to_lowercase());
        if let Some(email) = &email
            && email_taken(db, email, None).await?
        {
            return Err(SchoolError::conflict(format!(
                "Email '{}' is already registered",
                email
            )));
        }

        let ci = req
            .ci_number
            .as_deref()
            .map(digits_only)
            .filter(|ci| !ci.is_empty());
        // 学生未设置密码时默认使用 CI
        let password = match non_empty(req.password.as_deref()) {
            Some(pwd) => Some(hash_password(&pwd)?),
            None if req.role == Role::Student => ci.as_deref().map(hash_password).transpose()?,
            None => None,
        };

        let created = user::ActiveModel {
            email: Set(email),
            password: Set(password),
            first_name: Set(req.first_name.trim().to_string()),
            paternal_surname: Set(req.paternal_surname.trim().to_string()),
            maternal_surname: Set(req.maternal_surname.trim().to_string()),
            ci_number: Set(ci),
            phone: Set(non_empty(req.phone.as_deref())),
            role: Set(req.role.to_string()),
            active_course_id: Set(None),
            is_active: Set(req.is_active.unwrap_or(true)),
            is_staff: Set(req.is_staff.unwrap_or(req.role == Role::Admin)),
            date_joined: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await?;

        info!("UserService: created {} user {}", req.role, created.id);
        Ok(UserView::from(created))
    }

    pub async fn update_user(&self, id: i32, req: UpdateUserRequest) -> Result<UserView> {
        let db = self.storage.get_db();
        let existing = find_required::<UserEntity, _>(db, id, "User").await?;
        let was_active = existing.is_active;
        let mut am: user::ActiveModel = existing.into();

        if let Some(email) = req.email {
            let email = non_empty(Some(&email)).map(|e| e.to_lowercase());
            if let Some(e) = &email
                && email_taken(db, e, Some(id)).await?
            {
                return Err(SchoolError::conflict(format!(
                    "Email '{}' is already registered",
                    e
                )));
            }
            am.email = Set(email);
        }
        if let Some(hash) = process_new_password(req.password.as_deref())? {
            am.password = Set(Some(hash));
        }
        if let Some(v) = non_empty(req.first_name.as_deref()) {
            am.first_name = Set(v);
        }
        if let Some(v) = non_empty(req.paternal_surname.as_deref()) {
            am.paternal_surname = Set(v);
        }
        if let Some(v) = req.maternal_surname {
            am.maternal_surname = Set(v.trim().to_string());
        }
        if let Some(v) = req.ci_number {
            am.ci_number = Set(Some(digits_only(&v)).filter(|ci| !ci.is_empty()));
        }
        if let Some(v) = req.phone {
            am.phone = Set(non_empty(Some(&v)));
        }
        if let Some(role) = req.role {
            am.role = Set(role.to_string());
        }
        if let Some(course_id) = req.active_course_id {
            am.active_course_id = Set(Some(course_id));
        }
        if let Some(v) = req.is_active {
            am.is_active = Set(v);
        }
        if let Some(v) = req.is_staff {
            am.is_staff = Set(v);
        }

        let updated = am.update(db).await?;
        if was_active && !updated.is_active {
            self.auth.revoke_user_sessions(id).await?;
        }
        info!("UserService: updated user {}", id);
        Ok(UserView::from(updated))
    }

    pub async fn delete_user(&self, id: i32) -> Result<()> {
        let db = self.storage.get_db();
        find_required::<UserEntity, _>(db, id, "User").await?;
        self.auth.revoke_user_sessions(id).await?;
        UserEntity::delete_by_id(id).exec(db).await?;
        info!("UserService: deleted user {}", id);
        Ok(())
    }

    // ============ Bulk import ============

    /// Classify parsed roster rows as new or existing by CI
    pub async fn bulk_preview(&self, entries: Vec<RosterEntry>) -> Result<BulkUserPreview> {
        let existing = self.existing_by_ci(&entries).await?;
        let rows: Vec<BulkUserRow> = entries
            .into_iter()
            .map(|entry| {
                let user_id = existing.get(&entry.ci_number).map(|u| u.id);
                BulkUserRow {
                    status: if user_id.is_some() {
                        RowStatus::Existing
                    } else {
                        RowStatus::New
                    },
                    user_id,
                    entry,
                }
            })
            .collect();
        let existing_count = rows
            .iter()
            .filter(|r| r.status == RowStatus::Existing)
            .count();
        Ok(BulkUserPreview {
            new_count: rows.len() - existing_count,
            existing_count,
            rows,
        })
    }

    pub async fn bulk_confirm(&self, req: BulkUserConfirmRequest) -> Result<BulkUserResult> {
        let txn = self.storage.get_db().begin().await?;
        let mut result = BulkUserResult::default();

        for (index, entry) in req.rows.iter().enumerate() {
            match self.apply_roster_row(&txn, entry).await {
                Ok(true) => result.created += 1,
                Ok(false) => result.updated += 1,
                Err(e) => {
                    warn!("Bulk user row {} ({}) failed: {}", index, entry.ci_number, e);
                    result.errors.push(RowError {
                        index,
                        message: e.message().to_string(),
                    });
                }
            }
        }

        txn.commit().await?;
        info!(
            "UserService: bulk import created {}, updated {}, failed {}",
            result.created,
            result.updated,
            result.errors.len()
        );
        Ok(result)
    }

    /// Returns true when a user was created
    async fn apply_roster_row<C: ConnectionTrait>(&self, db: &C, entry: &RosterEntry) -> Result<bool> {
        let ci = digits_only(&entry.ci_number);
        if ci.is_empty() {
            return Err(SchoolError::validation("CI number is required"));
        }
        let Some(existing) = find_by_ci(db, &ci).await? else {
            create_student(db, entry).await?;
            return Ok(true);
        };

        let email = usable_email(db, entry.email.as_deref(), Some(existing.id)).await?;
        let mut am: user::ActiveModel = existing.into();
        if let Some(v) = non_empty(Some(&entry.first_name)) {
            am.first_name = Set(v);
        }
        if let Some(v) = non_empty(Some(&entry.paternal_surname)) {
            am.paternal_surname = Set(v);
        }
        if let Some(v) = non_empty(Some(&entry.maternal_surname)) {
            am.maternal_surname = Set(v);
        }
        if email.is_some() {
            am.email = Set(email);
        }
        if let Some(phone) = non_empty(entry.phone.as_deref()) {
            am.phone = Set(Some(phone));
        }
        am.update(db).await?;
        Ok(false)
    }

    async fn existing_by_ci(&self, entries: &[RosterEntry]) -> Result<HashMap<String, user::Model>> {
        if entries.is_empty() {
            return Ok(HashMap::new());
        }
        let cis: Vec<String> = entries.iter().map(|e| e.ci_number.clone()).collect();
        Ok(UserEntity::find()
            .filter(user::Column::CiNumber.is_in(cis))
            .all(self.storage.get_db())
            .await?
            .into_iter()
            .filter_map(|u| u.ci_number.clone().map(|ci| (ci, u)))
            .collect())
    }

    // ============ Family relationships ============

    pub async fn list_family(&self, query: FamilyQuery) -> Result<Vec<FamilyRelationshipView>> {
        let mut select = FamilyRelationshipEntity::find();
        if let Some(parent_id) = query.parent_id {
            select = select.filter(family_relationship::Column::ParentId.eq(parent_id));
        }
        if let Some(student_id) = query.student_id {
            select = select.filter(family_relationship::Column::StudentId.eq(student_id));
        }
        Ok(select
            .order_by_asc(family_relationship::Column::Id)
            .all(self.storage.get_db())
            .await?
            .into_iter()
            .map(FamilyRelationshipView::from)
            .collect())
    }

    pub async fn create_family(&self, req: CreateFamilyRequest) -> Result<FamilyRelationshipView> {
        let db = self.storage.get_db();
        let parent = find_required::<UserEntity, _>(db, req.parent_id, "User").await?;
        let student = find_required::<UserEntity, _>(db, req.student_id, "User").await?;
        if Role::from_db(&parent.role) != Role::Parent {
            return Err(SchoolError::validation(format!(
                "User {} is not a parent",
                parent.id
            )));
        }
        if Role::from_db(&student.role) != Role::Student {
            return Err(SchoolError::validation(format!(
                "User {} is not a student",
                student.id
            )));
        }

        let duplicate = FamilyRelationshipEntity::find()
            .filter(family_relationship::Column::ParentId.eq(parent.id))
            .filter(family_relationship::Column::StudentId.eq(student.id))
            .one(db)
            .await?;
        if duplicate.is_some() {
            return Err(SchoolError::conflict("Relationship already exists"));
        }

        let created = family_relationship::ActiveModel {
            parent_id: Set(parent.id),
            student_id: Set(student.id),
            relationship: Set(
                non_empty(req.relationship.as_deref()).unwrap_or_else(|| "PARENT".to_string())
            ),
            ..Default::default()
        }
        .insert(db)
        .await?;
        Ok(FamilyRelationshipView::from(created))
    }

    pub async fn delete_family(&self, id: i32) -> Result<()> {
        let db = self.storage.get_db();
        find_required::<FamilyRelationshipEntity, _>(db, id, "Family relationship").await?;
        FamilyRelationshipEntity::delete_by_id(id).exec(db).await?;
        Ok(())
    }
}
