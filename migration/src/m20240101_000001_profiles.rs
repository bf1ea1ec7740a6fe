use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Profiles {
    Table,
    Id,
    UserId,
    Username,
    FirstName,
    LastName,
    PreferredName,
    AvatarUrl,
    CreatedAt,
    UpdatedAt,
    DeletedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Profiles::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Profiles::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Profiles::UserId).uuid().not_null())
                    .col(ColumnDef::new(Profiles::Username).string_len(128).not_null())
                    .col(ColumnDef::new(Profiles::FirstName).string_len(128).not_null())
                    .col(ColumnDef::new(Profiles::LastName).string_len(128).not_null())
                    .col(ColumnDef::new(Profiles::PreferredName).string_len(128))
                    .col(ColumnDef::new(Profiles::AvatarUrl).string_len(1024))
                    .col(
                        ColumnDef::new(Profiles::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Profiles::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Profiles::DeletedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        // One profile per user, and usernames are handles.
        manager
            .create_index(
                Index::create()
                    .name("idx_profiles_user_id")
                    .table(Profiles::Table)
                    .col(Profiles::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_profiles_username")
                    .table(Profiles::Table)
                    .col(Profiles::Username)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Profiles::Table).to_owned())
            .await?;
        Ok(())
    }
}
