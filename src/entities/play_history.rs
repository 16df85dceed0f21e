use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 中奖记录实体
/// - 每次远端确认领取成功后写入一条
/// - offer_kind / face_value 为历史快照，目录后续变化不影响回溯
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "play_history")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// 幂等键，同时发送给远端
    pub play_id: String,
    pub user_id: String,
    /// spin_wheel / claw_machine
    pub channel: String,
    pub offer_id: String,
    pub offer_kind: String,
    pub face_value: f64,
    pub code: String,
    /// epoch 毫秒
    pub claimed_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
