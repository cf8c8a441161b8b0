use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 用户表
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(pk_auto(Users::Id))
                    .col(string_len_null(Users::Email, 254).unique_key())
                    .col(string_null(Users::Password))
                    .col(string_len(Users::FirstName, 150).default(""))
                    .col(string_len(Users::PaternalSurname, 150).default(""))
                    .col(string_len(Users::MaternalSurname, 150).default(""))
                    .col(string_len_null(Users::CiNumber, 20))
                    .col(string_len_null(Users::Phone, 20))
                    .col(string_len(Users::Role, 10).default("STUDENT"))
                    .col(integer_null(Users::ActiveCourseId))
                    .col(boolean(Users::IsActive).default(true))
                    .col(boolean(Users::IsStaff).default(false))
                    .col(timestamp_with_time_zone(Users::DateJoined))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_users_ci_number")
                    .table(Users::Table)
                    .col(Users::CiNumber)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_users_role")
                    .table(Users::Table)
                    .col(Users::Role)
                    .to_owned(),
            )
            .await?;

        // 会话表（登出即删除）
        manager
            .create_table(
                Table::create()
                    .table(ActiveSessions::Table)
                    .if_not_exists()
                    .col(pk_auto(ActiveSessions::Id))
                    .col(integer(ActiveSessions::UserId))
                    .col(string_len_uniq(ActiveSessions::Token, 512))
                    .col(timestamp_with_time_zone(ActiveSessions::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_active_sessions_user")
                            .from(ActiveSessions::Table, ActiveSessions::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ActiveSessions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum Users {
    Table,
    Id,
    Email,
    Password,
    FirstName,
    PaternalSurname,
    MaternalSurname,
    CiNumber,
    Phone,
    Role,
    ActiveCourseId,
    IsActive,
    IsStaff,
    DateJoined,
}

#[derive(DeriveIden)]
enum ActiveSessions {
    Table,
    Id,
    UserId,
    Token,
    CreatedAt,
}
