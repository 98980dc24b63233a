use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(HaikuLike::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(HaikuLike::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(HaikuLike::HaikuId).string().not_null())
                    .col(ColumnDef::new(HaikuLike::UserId).string().not_null())
                    .col(
                        ColumnDef::new(HaikuLike::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // One like per (haiku, user); inserts rely on this for conflict detection.
        manager
            .create_index(
                Index::create()
                    .name("idx_haiku_like_haiku_id_user_id")
                    .table(HaikuLike::Table)
                    .col(HaikuLike::HaikuId)
                    .col(HaikuLike::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(HaikuLike::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(Iden)]
enum HaikuLike {
    Table,
    Id,
    HaikuId,
    UserId,
    CreatedAt,
}
