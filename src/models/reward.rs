use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::OfferSummary;
use crate::entities::play_history_entity as history_entity;

/// 两个促销入口共用同一引擎，入口仅用于记录
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PlayChannel {
    SpinWheel,
    ClawMachine,
}

impl PlayChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayChannel::SpinWheel => "spin_wheel",
            PlayChannel::ClawMachine => "claw_machine",
        }
    }
}

/// 资格检查结果（冷却不是错误，是正常状态）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EligibilityResult {
    Eligible,
    Cooldown { remaining_ms: i64 },
    NotAuthenticated,
}

impl EligibilityResult {
    /// 剩余时间按毫秒向上取整，冷却中永远不会显示 0
    pub fn cooldown(remaining: Duration) -> Self {
        let floor = remaining.num_milliseconds();
        let remaining_ms = if remaining > Duration::milliseconds(floor) {
            floor + 1
        } else {
            floor
        };
        EligibilityResult::Cooldown { remaining_ms }
    }

    pub fn is_eligible(&self) -> bool {
        matches!(self, EligibilityResult::Eligible)
    }

    pub fn remaining(&self) -> Option<Duration> {
        match self {
            EligibilityResult::Cooldown { remaining_ms } => {
                Some(Duration::milliseconds(*remaining_ms))
            }
            _ => None,
        }
    }
}

/// 本地存储是否可持久化
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Durability {
    Durable,
    Degraded,
}

impl Durability {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Durability::Degraded)
    }

    /// 任意一侧降级则整体降级
    pub fn and(self, other: Durability) -> Durability {
        if self.is_degraded() || other.is_degraded() {
            Durability::Degraded
        } else {
            Durability::Durable
        }
    }
}

/// 资格查询响应（倒计时展示）
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EligibilityResponse {
    pub eligibility: EligibilityResult,
    pub play_count: i64,
    /// 本地存储不可用时为 true，前端需提示本次游玩不会被记住
    pub persistence_degraded: bool,
}

/// 抽奖请求
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct PlayRequest {
    pub channel: PlayChannel,
}

/// 抽奖结果（终态事件）
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PlayOutcome {
    Won {
        play_id: String,
        offer: OfferSummary,
        code: String,
        play_count: i64,
        persistence_degraded: bool,
    },
    Cooldown {
        remaining_ms: i64,
    },
}

/// 中奖记录查询参数
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct PlayHistoryQuery {
    /// 页码 (默认 1)
    pub page: Option<u32>,
    /// 每页数量 (默认 20)
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlayHistoryResponse {
    pub play_id: String,
    pub channel: String,
    pub offer_id: String,
    pub offer_kind: String,
    pub face_value: f64,
    pub code: String,
    pub claimed_at: DateTime<Utc>,
}

impl From<history_entity::Model> for PlayHistoryResponse {
    fn from(m: history_entity::Model) -> Self {
        PlayHistoryResponse {
            play_id: m.play_id,
            channel: m.channel,
            offer_id: m.offer_id,
            offer_kind: m.offer_kind,
            face_value: m.face_value,
            code: m.code,
            claimed_at: DateTime::from_timestamp_millis(m.claimed_at).unwrap_or_default(),
        }
    }
}
