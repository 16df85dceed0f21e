use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::entities::play_record_entity;

/// 当前本地存储结构版本，行内 schema_version 低于此值时读取时升级
pub const PLAY_RECORD_SCHEMA_VERSION: i32 = 1;

/// 用户本地游玩状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayRecord {
    pub user_id: String,
    /// 最近一次成功领取的时间（仅在远端确认后写入）
    pub last_play_at: Option<DateTime<Utc>>,
    /// 仅用于展示
    pub play_count: i64,
}

impl PlayRecord {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            last_play_at: None,
            play_count: 0,
        }
    }

    /// 成功领取后的新状态
    pub fn after_success(&self, at: DateTime<Utc>) -> Self {
        Self {
            user_id: self.user_id.clone(),
            last_play_at: Some(at),
            play_count: self.play_count + 1,
        }
    }
}

impl From<play_record_entity::Model> for PlayRecord {
    fn from(m: play_record_entity::Model) -> Self {
        PlayRecord {
            user_id: m.user_id,
            last_play_at: m.last_play_at.and_then(DateTime::from_timestamp_millis),
            play_count: m.play_count,
        }
    }
}
