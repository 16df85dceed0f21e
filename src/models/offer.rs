use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// 优惠类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OfferKind {
    PercentOff,
    AmountOff,
    FreeShipping,
}

impl std::fmt::Display for OfferKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OfferKind::PercentOff => write!(f, "percent_off"),
            OfferKind::AmountOff => write!(f, "amount_off"),
            OfferKind::FreeShipping => write!(f, "free_shipping"),
        }
    }
}

/// 兑换码状态，只允许 Unclaimed -> Claimed 单向变化（由远端保证）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "user_id", rename_all = "snake_case")]
pub enum CodeStatus {
    Unclaimed,
    ReservedBy(String),
    Claimed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedemptionCode {
    pub id: String,
    pub code: String,
    pub status: CodeStatus,
}

impl RedemptionCode {
    pub fn is_unclaimed(&self) -> bool {
        self.status == CodeStatus::Unclaimed
    }
}

/// 目录快照中的一个优惠
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub id: String,
    /// 面值（百分比或金额），决定抽中权重
    pub face_value: f64,
    pub kind: OfferKind,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    #[serde(default)]
    pub code_pool: Vec<RedemptionCode>,
    pub active: bool,
}

impl Offer {
    /// 是否在有效期内（闭区间）
    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        self.valid_from <= now && now <= self.valid_until
    }

    /// 是否还有未领取的兑换码
    pub fn has_unclaimed_code(&self) -> bool {
        self.code_pool.iter().any(RedemptionCode::is_unclaimed)
    }

    /// 可参与抽奖: 启用 + 在有效期内 + 至少一个未领取的码
    pub fn is_selectable(&self, now: DateTime<Utc>) -> bool {
        self.active && self.is_within_window(now) && self.has_unclaimed_code()
    }

    pub fn unclaimed_codes(&self) -> impl Iterator<Item = &RedemptionCode> {
        self.code_pool.iter().filter(|c| c.is_unclaimed())
    }
}

/// 返回给前端的优惠摘要（不暴露兑换码池）
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct OfferSummary {
    pub id: String,
    pub kind: OfferKind,
    pub face_value: f64,
    pub valid_until: DateTime<Utc>,
}

impl From<&Offer> for OfferSummary {
    fn from(o: &Offer) -> Self {
        OfferSummary {
            id: o.id.clone(),
            kind: o.kind,
            face_value: o.face_value,
            valid_until: o.valid_until,
        }
    }
}

/// 奖池展示: 权重与中奖概率
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct OfferOdds {
    pub offer: OfferSummary,
    pub weight: u32,
    /// 0.0 ~ 1.0
    pub probability: f64,
    pub codes_left: usize,
}
