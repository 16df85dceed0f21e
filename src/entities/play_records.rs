use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 本地游玩状态实体
/// 说明:
/// - 每个用户一条 (user_id 唯一)
/// - last_play_at / created_at / updated_at 均为 epoch 毫秒
/// - schema_version 记录写入时的结构版本，读取时按需升级
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "play_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: String,
    /// 最近一次成功领取时间 (NULL = 从未成功)
    pub last_play_at: Option<i64>,
    pub play_count: i64,
    pub schema_version: i32,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
