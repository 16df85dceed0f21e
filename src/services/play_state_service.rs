use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};

use crate::config::DatabaseConfig;
use crate::database::connect_and_migrate;
use crate::entities::{play_history_entity as history, play_record_entity as records};
use crate::error::AppResult;
use crate::models::{
    Durability, PLAY_RECORD_SCHEMA_VERSION, PaginatedResponse, PaginationParams,
    PlayHistoryPageResponse, PlayHistoryQuery, PlayHistoryResponse, PlayRecord,
};

/// 带持久化状态的读写结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persisted<T> {
    pub value: T,
    pub durability: Durability,
}

impl<T> Persisted<T> {
    fn durable(value: T) -> Self {
        Self {
            value,
            durability: Durability::Durable,
        }
    }

    fn degraded(value: T) -> Self {
        Self {
            value,
            durability: Durability::Degraded,
        }
    }
}

/// 写入中奖记录所需字段
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    pub play_id: String,
    pub user_id: String,
    pub channel: String,
    pub offer_id: String,
    pub offer_kind: String,
    pub face_value: f64,
    pub code: String,
    pub claimed_at: DateTime<Utc>,
}

enum Backend {
    Durable(DatabaseConnection),
    Degraded { reason: String },
}

/// 本地游玩状态存储 (SQLite)
///
/// 初始化失败时不会报错，而是降级为 "每次都是第一次玩"，
/// 所有读写结果都会带上 `Durability::Degraded` 供前端提示。
pub struct PlayStateStore {
    backend: Backend,
}

impl PlayStateStore {
    pub fn durable(pool: DatabaseConnection) -> Self {
        Self {
            backend: Backend::Durable(pool),
        }
    }

    pub fn degraded(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        log::warn!("Play-state persistence degraded: {reason}");
        Self {
            backend: Backend::Degraded { reason },
        }
    }

    /// 打开并迁移本地库；失败则降级而不是中断启动
    pub async fn open(config: &DatabaseConfig) -> Self {
        match connect_and_migrate(config).await {
            Ok(pool) => Self::durable(pool),
            Err(e) => Self::degraded(format!("failed to open {}: {e}", config.url)),
        }
    }

    pub fn durability(&self) -> Durability {
        match self.backend {
            Backend::Durable(_) => Durability::Durable,
            Backend::Degraded { .. } => Durability::Degraded,
        }
    }

    /// 降级原因（正常时为 None）
    pub fn warning(&self) -> Option<&str> {
        match &self.backend {
            Backend::Durable(_) => None,
            Backend::Degraded { reason } => Some(reason.as_str()),
        }
    }

    pub async fn get(&self, user_id: &str) -> Persisted<Option<PlayRecord>> {
        let Backend::Durable(pool) = &self.backend else {
            return Persisted::degraded(None);
        };
        match self.load(pool, user_id).await {
            Ok(record) => Persisted::durable(record),
            Err(e) => {
                log::warn!("Failed to read play record for {user_id}, treating as first play: {e}");
                Persisted::degraded(None)
            }
        }
    }

    /// 第一次尝试游玩时创建记录
    pub async fn get_or_create(&self, user_id: &str) -> Persisted<PlayRecord> {
        let existing = self.get(user_id).await;
        if let Some(record) = existing.value {
            return Persisted {
                value: record,
                durability: existing.durability,
            };
        }

        let fresh = PlayRecord::new(user_id);
        if existing.durability.is_degraded() {
            return Persisted::degraded(fresh);
        }
        let durability = self.insert_if_absent(&fresh).await;
        Persisted {
            value: fresh,
            durability,
        }
    }

    /// 覆盖写入（upsert）
    pub async fn put(&self, record: &PlayRecord) -> Durability {
        let Backend::Durable(pool) = &self.backend else {
            return Durability::Degraded;
        };
        match self.upsert(pool, record).await {
            Ok(()) => Durability::Durable,
            Err(e) => {
                log::warn!("Failed to write play record for {}: {e}", record.user_id);
                Durability::Degraded
            }
        }
    }

    /// 远端确认领取成功后调用：原子地 play_count + 1 并写入 last_play_at
    pub async fn record_success(&self, user_id: &str, at: DateTime<Utc>) -> Persisted<PlayRecord> {
        let Backend::Durable(pool) = &self.backend else {
            return Persisted::degraded(PlayRecord::new(user_id).after_success(at));
        };
        match self.bump(pool, user_id, at).await {
            Ok(record) => Persisted::durable(record),
            Err(e) => {
                log::error!("Claim for {user_id} succeeded but play record was not saved: {e}");
                Persisted::degraded(PlayRecord::new(user_id).after_success(at))
            }
        }
    }

    pub async fn append_history(&self, entry: NewHistoryEntry) -> Durability {
        let Backend::Durable(pool) = &self.backend else {
            return Durability::Degraded;
        };
        let result = history::ActiveModel {
            play_id: Set(entry.play_id.clone()),
            user_id: Set(entry.user_id),
            channel: Set(entry.channel),
            offer_id: Set(entry.offer_id),
            offer_kind: Set(entry.offer_kind),
            face_value: Set(entry.face_value),
            code: Set(entry.code),
            claimed_at: Set(entry.claimed_at.timestamp_millis()),
            ..Default::default()
        }
        .insert(pool)
        .await;

        match result {
            Ok(_) => Durability::Durable,
            Err(e) => {
                log::warn!("Failed to append history for play {}: {e}", entry.play_id);
                Durability::Degraded
            }
        }
    }

    /// 分页获取中奖记录（倒序）
    pub async fn list_history(
        &self,
        user_id: &str,
        query: &PlayHistoryQuery,
    ) -> AppResult<PlayHistoryPageResponse> {
        let params = PaginationParams::new(query.page, query.per_page);
        let Backend::Durable(pool) = &self.backend else {
            return Ok(PaginatedResponse::new(
                vec![],
                params.get_page(),
                params.get_page_size(),
                0,
            ));
        };

        let base_query = history::Entity::find().filter(history::Column::UserId.eq(user_id));
        let total = base_query.clone().count(pool).await? as i64;
        let items = base_query
            .order_by_desc(history::Column::ClaimedAt)
            .order_by_desc(history::Column::Id)
            .limit(params.get_limit() as u64)
            .offset(params.get_offset() as u64)
            .all(pool)
            .await?;

        let items: Vec<PlayHistoryResponse> = items.into_iter().map(Into::into).collect();
        Ok(PaginatedResponse::new(
            items,
            params.get_page(),
            params.get_page_size(),
            total,
        ))
    }

    // -----------------------------
    // 内部辅助方法
    // -----------------------------

    async fn load(&self, pool: &DatabaseConnection, user_id: &str) -> Result<Option<PlayRecord>, DbErr> {
        let Some(row) = records::Entity::find()
            .filter(records::Column::UserId.eq(user_id))
            .one(pool)
            .await?
        else {
            return Ok(None);
        };

        if row.schema_version < PLAY_RECORD_SCHEMA_VERSION {
            let upgraded = upgrade_row(row.clone());
            log::info!(
                "Upgrading play record for {user_id} from schema v{} to v{}",
                row.schema_version,
                upgraded.schema_version
            );
            let mut am = row.into_active_model();
            am.play_count = Set(upgraded.play_count);
            am.last_play_at = Set(upgraded.last_play_at);
            am.schema_version = Set(upgraded.schema_version);
            am.updated_at = Set(Utc::now().timestamp_millis());
            am.update(pool).await?;
            return Ok(Some(upgraded.into()));
        }
        if row.schema_version > PLAY_RECORD_SCHEMA_VERSION {
            log::warn!(
                "Play record for {user_id} has newer schema v{}, reading known fields only",
                row.schema_version
            );
        }

        Ok(Some(row.into()))
    }

    async fn insert_if_absent(&self, record: &PlayRecord) -> Durability {
        let Backend::Durable(pool) = &self.backend else {
            return Durability::Degraded;
        };
        let now_ms = Utc::now().timestamp_millis();
        let insert = records::Entity::insert(records::ActiveModel {
            user_id: Set(record.user_id.clone()),
            last_play_at: Set(record.last_play_at.map(|t| t.timestamp_millis())),
            play_count: Set(record.play_count),
            schema_version: Set(PLAY_RECORD_SCHEMA_VERSION),
            created_at: Set(now_ms),
            updated_at: Set(now_ms),
            ..Default::default()
        })
        .on_conflict(
            sea_orm::sea_query::OnConflict::column(records::Column::UserId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(pool)
        .await;

        match insert {
            Ok(_) => Durability::Durable,
            Err(e) => {
                log::warn!("Failed to create play record for {}: {e}", record.user_id);
                Durability::Degraded
            }
        }
    }

    async fn upsert(&self, pool: &DatabaseConnection, record: &PlayRecord) -> Result<(), DbErr> {
        let now_ms = Utc::now().timestamp_millis();
        let last_play_at = record.last_play_at.map(|t| t.timestamp_millis());
        let txn = pool.begin().await?;

        let updated = records::Entity::update_many()
            .col_expr(records::Column::LastPlayAt, Expr::value(last_play_at))
            .col_expr(records::Column::PlayCount, Expr::value(record.play_count))
            .col_expr(
                records::Column::SchemaVersion,
                Expr::value(PLAY_RECORD_SCHEMA_VERSION),
            )
            .col_expr(records::Column::UpdatedAt, Expr::value(now_ms))
            .filter(records::Column::UserId.eq(record.user_id.as_str()))
            .exec(&txn)
            .await?;

        if updated.rows_affected == 0 {
            records::ActiveModel {
                user_id: Set(record.user_id.clone()),
                last_play_at: Set(last_play_at),
                play_count: Set(record.play_count),
                schema_version: Set(PLAY_RECORD_SCHEMA_VERSION),
                created_at: Set(now_ms),
                updated_at: Set(now_ms),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await
    }

    async fn bump(
        &self,
        pool: &DatabaseConnection,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<PlayRecord, DbErr> {
        let now_ms = Utc::now().timestamp_millis();
        let txn = pool.begin().await?;

        // 其它会话可能同时写入，用表达式自增而不是读改写
        let updated = records::Entity::update_many()
            .col_expr(
                records::Column::PlayCount,
                Expr::col(records::Column::PlayCount).add(1),
            )
            .col_expr(records::Column::LastPlayAt, Expr::value(at.timestamp_millis()))
            .col_expr(records::Column::UpdatedAt, Expr::value(now_ms))
            .filter(records::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;

        if updated.rows_affected == 0 {
            records::ActiveModel {
                user_id: Set(user_id.to_string()),
                last_play_at: Set(Some(at.timestamp_millis())),
                play_count: Set(1),
                schema_version: Set(PLAY_RECORD_SCHEMA_VERSION),
                created_at: Set(now_ms),
                updated_at: Set(now_ms),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
        }

        let row = records::Entity::find()
            .filter(records::Column::UserId.eq(user_id))
            .one(&txn)
            .await?
            .ok_or_else(|| DbErr::Custom("Play record disappeared after update".into()))?;
        txn.commit().await?;
        Ok(row.into())
    }

    #[cfg(test)]
    pub(crate) async fn raw_row(&self, user_id: &str) -> Option<records::Model> {
        let Backend::Durable(pool) = &self.backend else {
            return None;
        };
        records::Entity::find()
            .filter(records::Column::UserId.eq(user_id))
            .one(pool)
            .await
            .ok()
            .flatten()
    }
}

/// 旧版本行升级到当前结构。v0 行可能带有负数 play_count。
fn upgrade_row(mut row: records::Model) -> records::Model {
    if row.schema_version < 1 {
        row.play_count = row.play_count.max(0);
    }
    row.schema_version = PLAY_RECORD_SCHEMA_VERSION;
    row
}
