use sea_orm_migration::prelude::*;

/// Play History (成功领取的兑换码记录)
#[derive(DeriveIden)]
enum PlayHistory {
    Table,
    Id,
    PlayId,
    UserId,
    Channel,
    OfferId,
    OfferKind,
    FaceValue,
    Code,
    ClaimedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PlayHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PlayHistory::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PlayHistory::PlayId).string_len(64).not_null())
                    .col(ColumnDef::new(PlayHistory::UserId).string_len(255).not_null())
                    .col(ColumnDef::new(PlayHistory::Channel).string_len(32).not_null())
                    .col(ColumnDef::new(PlayHistory::OfferId).string_len(255).not_null())
                    .col(ColumnDef::new(PlayHistory::OfferKind).string_len(32).not_null())
                    .col(ColumnDef::new(PlayHistory::FaceValue).double().not_null())
                    .col(ColumnDef::new(PlayHistory::Code).string_len(255).not_null())
                    .col(ColumnDef::new(PlayHistory::ClaimedAt).big_integer().not_null())
                    .to_owned(),
            )
            .await?;

        // 同一次 play 只能落一条记录
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_play_history_play_id_unique")
                    .table(PlayHistory::Table)
                    .col(PlayHistory::PlayId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_play_history_user_claimed_at")
                    .table(PlayHistory::Table)
                    .col(PlayHistory::UserId)
                    .col(PlayHistory::ClaimedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PlayHistory::Table).to_owned())
            .await
    }
}
