use sea_orm::entity::prelude::*;

/// Exactly one of `sub_criterion_id` / `special_criterion_id` is set.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "course_tasks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub sub_criterion_id: Option<i32>,
    pub special_criterion_id: Option<i32>,
    pub name: String,
    pub weight: i32,
    pub is_locked: bool,
    pub is_public: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
