use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "courses")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub subject_id: i32,
    pub period_id: i32,
    pub teacher_id: Option<i32>,
    pub active: bool,
    pub parallel: String,
    pub schedule: Option<String>,
    pub whatsapp_link: Option<String>,
    pub is_registration_open: bool,
    pub registration_start: Option<Date>,
    pub registration_end: Option<Date>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
