use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "evaluation_criteria")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub template_id: Option<i32>,
    pub name: String,
    /// Upper bound for the summed sub/special criterion scores
    pub weight: f64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
