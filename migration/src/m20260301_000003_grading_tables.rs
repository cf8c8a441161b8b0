use sea_orm_migration::{prelude::*, schema::*};

use crate::m20260301_000002_academic_tables::{Courses, Enrollments, EvaluationCriteria};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CourseSubCriteria::Table)
                    .if_not_exists()
                    .col(pk_auto(CourseSubCriteria::Id))
                    .col(integer(CourseSubCriteria::CourseId))
                    .col(integer(CourseSubCriteria::ParentCriterionId))
                    .col(string_len(CourseSubCriteria::Name, 200))
                    .col(double(CourseSubCriteria::Percentage).default(0.0))
                    .col(boolean(CourseSubCriteria::VisibleOnGradesheet).default(true))
                    .col(boolean(CourseSubCriteria::EditableOnGradesheet).default(true))
                    .col(boolean(CourseSubCriteria::IsProject).default(false))
                    .col(boolean(CourseSubCriteria::IsProjectRegistrationOpen).default(false))
                    .col(date_null(CourseSubCriteria::RegistrationStart))
                    .col(date_null(CourseSubCriteria::RegistrationEnd))
                    .col(integer_null(CourseSubCriteria::MaxMembers))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sub_criteria_course")
                            .from(CourseSubCriteria::Table, CourseSubCriteria::CourseId)
                            .to(Courses::Table, Courses::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sub_criteria_parent")
                            .from(CourseSubCriteria::Table, CourseSubCriteria::ParentCriterionId)
                            .to(EvaluationCriteria::Table, EvaluationCriteria::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CourseSpecialCriteria::Table)
                    .if_not_exists()
                    .col(pk_auto(CourseSpecialCriteria::Id))
                    .col(integer(CourseSpecialCriteria::CourseId))
                    .col(integer_null(CourseSpecialCriteria::ParentCriterionId))
                    .col(string_len(CourseSpecialCriteria::Name, 200))
                    .col(double(CourseSpecialCriteria::Percentage).default(0.0))
                    .col(boolean(CourseSpecialCriteria::VisibleOnGradesheet).default(true))
                    .col(boolean(CourseSpecialCriteria::EditableOnGradesheet).default(true))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_special_criteria_course")
                            .from(CourseSpecialCriteria::Table, CourseSpecialCriteria::CourseId)
                            .to(Courses::Table, Courses::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_special_criteria_parent")
                            .from(
                                CourseSpecialCriteria::Table,
                                CourseSpecialCriteria::ParentCriterionId,
                            )
                            .to(EvaluationCriteria::Table, EvaluationCriteria::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CourseTasks::Table)
                    .if_not_exists()
                    .col(pk_auto(CourseTasks::Id))
                    .col(integer_null(CourseTasks::SubCriterionId))
                    .col(integer_null(CourseTasks::SpecialCriterionId))
                    .col(string_len(CourseTasks::Name, 200))
                    .col(integer(CourseTasks::Weight).default(1))
                    .col(boolean(CourseTasks::IsLocked).default(false))
                    .col(boolean(CourseTasks::IsPublic).default(false))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tasks_sub_criterion")
                            .from(CourseTasks::Table, CourseTasks::SubCriterionId)
                            .to(CourseSubCriteria::Table, CourseSubCriteria::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tasks_special_criterion")
                            .from(CourseTasks::Table, CourseTasks::SpecialCriterionId)
                            .to(CourseSpecialCriteria::Table, CourseSpecialCriteria::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TaskScores::Table)
                    .if_not_exists()
                    .col(pk_auto(TaskScores::Id))
                    .col(integer(TaskScores::EnrollmentId))
                    .col(integer(TaskScores::TaskId))
                    .col(double(TaskScores::Score).default(0.0))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_task_scores_enrollment")
                            .from(TaskScores::Table, TaskScores::EnrollmentId)
                            .to(Enrollments::Table, Enrollments::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_task_scores_task")
                            .from(TaskScores::Table, TaskScores::TaskId)
                            .to(CourseTasks::Table, CourseTasks::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_task_scores_enrollment_task")
                    .table(TaskScores::Table)
                    .col(TaskScores::EnrollmentId)
                    .col(TaskScores::TaskId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CriterionScores::Table)
                    .if_not_exists()
                    .col(pk_auto(CriterionScores::Id))
                    .col(integer(CriterionScores::EnrollmentId))
                    .col(integer(CriterionScores::SubCriterionId))
                    .col(double(CriterionScores::Score).default(0.0))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_criterion_scores_enrollment")
                            .from(CriterionScores::Table, CriterionScores::EnrollmentId)
                            .to(Enrollments::Table, Enrollments::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_criterion_scores_sub_criterion")
                            .from(CriterionScores::Table, CriterionScores::SubCriterionId)
                            .to(CourseSubCriteria::Table, CourseSubCriteria::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_criterion_scores_enrollment_sub")
                    .table(CriterionScores::Table)
                    .col(CriterionScores::EnrollmentId)
                    .col(CriterionScores::SubCriterionId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(SpecialCriterionScores::Table)
                    .if_not_exists()
                    .col(pk_auto(SpecialCriterionScores::Id))
                    .col(integer(SpecialCriterionScores::EnrollmentId))
                    .col(integer(SpecialCriterionScores::SpecialCriterionId))
                    .col(double(SpecialCriterionScores::Score).default(0.0))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_special_scores_enrollment")
                            .from(SpecialCriterionScores::Table, SpecialCriterionScores::EnrollmentId)
                            .to(Enrollments::Table, Enrollments::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_special_scores_special")
                            .from(
                                SpecialCriterionScores::Table,
                                SpecialCriterionScores::SpecialCriterionId,
                            )
                            .to(CourseSpecialCriteria::Table, CourseSpecialCriteria::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_special_scores_enrollment_special")
                    .table(SpecialCriterionScores::Table)
                    .col(SpecialCriterionScores::EnrollmentId)
                    .col(SpecialCriterionScores::SpecialCriterionId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Projects::Table)
                    .if_not_exists()
                    .col(pk_auto(Projects::Id))
                    .col(integer(Projects::CourseId))
                    .col(integer(Projects::SubCriterionId))
                    .col(string_len(Projects::Name, 200))
                    .col(text_null(Projects::Description))
                    .col(integer_null(Projects::StudentInChargeId))
                    .col(double(Projects::Score).default(0.0))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_projects_course")
                            .from(Projects::Table, Projects::CourseId)
                            .to(Courses::Table, Courses::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_projects_sub_criterion")
                            .from(Projects::Table, Projects::SubCriterionId)
                            .to(CourseSubCriteria::Table, CourseSubCriteria::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_projects_leader")
                            .from(Projects::Table, Projects::StudentInChargeId)
                            .to(Enrollments::Table, Enrollments::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ProjectMembers::Table)
                    .if_not_exists()
                    .col(integer(ProjectMembers::ProjectId))
                    .col(integer(ProjectMembers::EnrollmentId))
                    .primary_key(
                        Index::create()
                            .col(ProjectMembers::ProjectId)
                            .col(ProjectMembers::EnrollmentId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_project_members_project")
                            .from(ProjectMembers::Table, ProjectMembers::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_project_members_enrollment")
                            .from(ProjectMembers::Table, ProjectMembers::EnrollmentId)
                            .to(Enrollments::Table, Enrollments::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RegistrationRequests::Table)
                    .if_not_exists()
                    .col(pk_auto(RegistrationRequests::Id))
                    .col(integer(RegistrationRequests::CourseId))
                    .col(string_len(RegistrationRequests::Ci, 20))
                    .col(string_len(RegistrationRequests::FirstName, 150))
                    .col(string_len(RegistrationRequests::PaternalSurname, 150).default(""))
                    .col(string_len(RegistrationRequests::MaternalSurname, 150).default(""))
                    .col(string_len_null(RegistrationRequests::Email, 254))
                    .col(string_len_null(RegistrationRequests::Cellphone, 20))
                    .col(string_len(RegistrationRequests::Status, 10).default("PENDING"))
                    .col(timestamp_with_time_zone(RegistrationRequests::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_registration_requests_course")
                            .from(RegistrationRequests::Table, RegistrationRequests::CourseId)
                            .to(Courses::Table, Courses::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_registration_requests_course_ci")
                    .table(RegistrationRequests::Table)
                    .col(RegistrationRequests::CourseId)
                    .col(RegistrationRequests::Ci)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RegistrationRequests::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProjectMembers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Projects::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SpecialCriterionScores::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CriterionScores::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TaskScores::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CourseTasks::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CourseSpecialCriteria::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CourseSubCriteria::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CourseSubCriteria {
    Table,
    Id,
    CourseId,
    ParentCriterionId,
    Name,
    Percentage,
    VisibleOnGradesheet,
    EditableOnGradesheet,
    IsProject,
    IsProjectRegistrationOpen,
    RegistrationStart,
    RegistrationEnd,
    MaxMembers,
}

#[derive(DeriveIden)]
enum CourseSpecialCriteria {
    Table,
    Id,
    CourseId,
    ParentCriterionId,
    Name,
    Percentage,
    VisibleOnGradesheet,
    EditableOnGradesheet,
}

#[derive(DeriveIden)]
enum CourseTasks {
    Table,
    Id,
    SubCriterionId,
    SpecialCriterionId,
    Name,
    Weight,
    IsLocked,
    IsPublic,
}

#[derive(DeriveIden)]
enum TaskScores {
    Table,
    Id,
    EnrollmentId,
    TaskId,
    Score,
}

#[derive(DeriveIden)]
enum CriterionScores {
    Table,
    Id,
    EnrollmentId,
    SubCriterionId,
    Score,
}

#[derive(DeriveIden)]
enum SpecialCriterionScores {
    Table,
    Id,
    EnrollmentId,
    SpecialCriterionId,
    Score,
}

#[derive(DeriveIden)]
enum Projects {
    Table,
    Id,
    CourseId,
    SubCriterionId,
    Name,
    Description,
    StudentInChargeId,
    Score,
}

#[derive(DeriveIden)]
enum ProjectMembers {
    Table,
    ProjectId,
    EnrollmentId,
}

#[derive(DeriveIden)]
enum RegistrationRequests {
    Table,
    Id,
    CourseId,
    Ci,
    FirstName,
    PaternalSurname,
    MaternalSurname,
    Email,
    Cellphone,
    Status,
    CreatedAt,
}
