use sea_orm_migration::prelude::*;

/// Play Records (每个用户一条本地游玩状态)
#[derive(DeriveIden)]
enum PlayRecords {
    Table,
    Id,
    UserId,
    LastPlayAt,
    PlayCount,
    SchemaVersion,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

/// 时间统一以 epoch 毫秒存储 (BIGINT)。
/// last_play_at 为 NULL 表示用户尚未成功领取过任何奖励。
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PlayRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PlayRecords::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PlayRecords::UserId).string_len(255).not_null())
                    .col(ColumnDef::new(PlayRecords::LastPlayAt).big_integer().null())
                    .col(
                        ColumnDef::new(PlayRecords::PlayCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(PlayRecords::SchemaVersion)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(ColumnDef::new(PlayRecords::CreatedAt).big_integer().not_null())
                    .col(ColumnDef::new(PlayRecords::UpdatedAt).big_integer().not_null())
                    .to_owned(),
            )
            .await?;

        // user_id 唯一（upsert 依赖此索引）
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_play_records_user_unique")
                    .table(PlayRecords::Table)
                    .col(PlayRecords::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PlayRecords::Table).to_owned())
            .await
    }
}
