use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "course_sub_criteria")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub course_id: i32,
    pub parent_criterion_id: i32,
    pub name: String,
    /// Maximum points this sub-criterion contributes
    pub percentage: f64,
    pub visible_on_gradesheet: bool,
    pub editable_on_gradesheet: bool,
    pub is_project: bool,
    pub is_project_registration_open: bool,
    pub registration_start: Option<Date>,
    pub registration_end: Option<Date>,
    /// Group size limit for project criteria; `None` means unlimited
    pub max_members: Option<i32>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
