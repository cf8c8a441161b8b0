use sea_orm_migration::{prelude::*, schema::*};

use crate::m20260301_000001_identity_tables::Users;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AcademicPeriods::Table)
                    .if_not_exists()
                    .col(pk_auto(AcademicPeriods::Id))
                    .col(string_len(AcademicPeriods::Name, 100))
                    .col(date(AcademicPeriods::StartDate))
                    .col(date(AcademicPeriods::EndDate))
                    .col(boolean(AcademicPeriods::Active).default(true))
                    .col(integer_null(AcademicPeriods::ParentPeriodId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_academic_periods_parent")
                            .from(AcademicPeriods::Table, AcademicPeriods::ParentPeriodId)
                            .to(AcademicPeriods::Table, AcademicPeriods::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Programs::Table)
                    .if_not_exists()
                    .col(pk_auto(Programs::Id))
                    .col(string_len(Programs::Name, 200))
                    .col(text_null(Programs::Description))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(EvaluationTemplates::Table)
                    .if_not_exists()
                    .col(pk_auto(EvaluationTemplates::Id))
                    .col(string_len(EvaluationTemplates::Name, 200))
                    .col(text_null(EvaluationTemplates::Description))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(EvaluationCriteria::Table)
                    .if_not_exists()
                    .col(pk_auto(EvaluationCriteria::Id))
                    .col(integer_null(EvaluationCriteria::TemplateId))
                    .col(string_len(EvaluationCriteria::Name, 200))
                    .col(double(EvaluationCriteria::Weight).default(0.0))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_evaluation_criteria_template")
                            .from(EvaluationCriteria::Table, EvaluationCriteria::TemplateId)
                            .to(EvaluationTemplates::Table, EvaluationTemplates::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Subjects::Table)
                    .if_not_exists()
                    .col(pk_auto(Subjects::Id))
                    .col(string_len(Subjects::Name, 200))
                    .col(string_len(Subjects::Code, 20).default(""))
                    .col(integer(Subjects::ProgramId))
                    .col(integer_null(Subjects::PeriodId))
                    .col(text_null(Subjects::Description))
                    .col(boolean(Subjects::Archived).default(false))
                    .col(integer_null(Subjects::EvaluationTemplateId))
                    .col(boolean(Subjects::SubcriteriaLocked).default(false))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_subjects_program")
                            .from(Subjects::Table, Subjects::ProgramId)
                            .to(Programs::Table, Programs::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_subjects_period")
                            .from(Subjects::Table, Subjects::PeriodId)
                            .to(AcademicPeriods::Table, AcademicPeriods::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_subjects_template")
                            .from(Subjects::Table, Subjects::EvaluationTemplateId)
                            .to(EvaluationTemplates::Table, EvaluationTemplates::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Courses::Table)
                    .if_not_exists()
                    .col(pk_auto(Courses::Id))
                    .col(integer(Courses::SubjectId))
                    .col(integer(Courses::PeriodId))
                    .col(integer_null(Courses::TeacherId))
                    .col(boolean(Courses::Active).default(true))
                    .col(string_len(Courses::Parallel, 10).default("A"))
                    .col(string_len_null(Courses::Schedule, 200))
                    .col(string_len_null(Courses::WhatsappLink, 500))
                    .col(boolean(Courses::IsRegistrationOpen).default(false))
                    .col(date_null(Courses::RegistrationStart))
                    .col(date_null(Courses::RegistrationEnd))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_courses_subject")
                            .from(Courses::Table, Courses::SubjectId)
                            .to(Subjects::Table, Subjects::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_courses_period")
                            .from(Courses::Table, Courses::PeriodId)
                            .to(AcademicPeriods::Table, AcademicPeriods::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_courses_teacher")
                            .from(Courses::Table, Courses::TeacherId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Enrollments::Table)
                    .if_not_exists()
                    .col(pk_auto(Enrollments::Id))
                    .col(integer(Enrollments::StudentId))
                    .col(integer(Enrollments::CourseId))
                    .col(date(Enrollments::DateEnrolled))
                    .col(double_null(Enrollments::FinalGrade))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_enrollments_student")
                            .from(Enrollments::Table, Enrollments::StudentId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_enrollments_course")
                            .from(Enrollments::Table, Enrollments::CourseId)
                            .to(Courses::Table, Courses::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // 同一学生在同一课程只能注册一次
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_enrollments_student_course")
                    .table(Enrollments::Table)
                    .col(Enrollments::StudentId)
                    .col(Enrollments::CourseId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FamilyRelationships::Table)
                    .if_not_exists()
                    .col(pk_auto(FamilyRelationships::Id))
                    .col(integer(FamilyRelationships::ParentId))
                    .col(integer(FamilyRelationships::StudentId))
                    .col(string_len(FamilyRelationships::Relationship, 50).default(""))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_family_parent")
                            .from(FamilyRelationships::Table, FamilyRelationships::ParentId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_family_student")
                            .from(FamilyRelationships::Table, FamilyRelationships::StudentId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_family_parent_student")
                    .table(FamilyRelationships::Table)
                    .col(FamilyRelationships::ParentId)
                    .col(FamilyRelationships::StudentId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FamilyRelationships::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Enrollments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Courses::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Subjects::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EvaluationCriteria::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EvaluationTemplates::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Programs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AcademicPeriods::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum AcademicPeriods {
    Table,
    Id,
    Name,
    StartDate,
    EndDate,
    Active,
    ParentPeriodId,
}

#[derive(DeriveIden)]
enum Programs {
    Table,
    Id,
    Name,
    Description,
}

#[derive(DeriveIden)]
enum EvaluationTemplates {
    Table,
    Id,
    Name,
    Description,
}

#[derive(DeriveIden)]
pub(crate) enum EvaluationCriteria {
    Table,
    Id,
    TemplateId,
    Name,
    Weight,
}

#[derive(DeriveIden)]
enum Subjects {
    Table,
    Id,
    Name,
    Code,
    ProgramId,
    PeriodId,
    Description,
    Archived,
    EvaluationTemplateId,
    SubcriteriaLocked,
}

#[derive(DeriveIden)]
pub(crate) enum Courses {
    Table,
    Id,
    SubjectId,
    PeriodId,
    TeacherId,
    Active,
    Parallel,
    Schedule,
    WhatsappLink,
    IsRegistrationOpen,
    RegistrationStart,
    RegistrationEnd,
}

#[derive(DeriveIden)]
pub(crate) enum Enrollments {
    Table,
    Id,
    StudentId,
    CourseId,
    DateEnrolled,
    FinalGrade,
}

#[derive(DeriveIden)]
enum FamilyRelationships {
    Table,
    Id,
    ParentId,
    StudentId,
    Relationship,
}
