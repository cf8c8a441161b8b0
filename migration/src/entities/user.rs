use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub email: Option<String>,
    /// Argon2id hash; `None` for accounts that never set a password
    pub password: Option<String>,
    pub first_name: String,
    pub paternal_surname: String,
    pub maternal_surname: String,
    pub ci_number: Option<String>,
    pub phone: Option<String>,
    pub role: String,
    pub active_course_id: Option<i32>,
    pub is_active: bool,
    pub is_staff: bool,
    pub date_joined: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
