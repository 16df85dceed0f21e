use chrono::{DateTime, Utc};
use rand::Rng;
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::models::{Offer, OfferOdds, OfferSummary};
use crate::utils::Clock;

/// 面值 -> 抽中权重（面值越高越稀有）
///
/// | 面值    | 权重 |
/// |---------|------|
/// | >= 50   | 5    |
/// | >= 30   | 10   |
/// | >= 20   | 15   |
/// | >= 10   | 25   |
/// | 其它    | 45   |
///
/// 负数与 NaN 落入最后一档。
pub fn weight(face_value: f64) -> u32 {
    if face_value >= 50.0 {
        5
    } else if face_value >= 30.0 {
        10
    } else if face_value >= 20.0 {
        15
    } else if face_value >= 10.0 {
        25
    } else {
        45
    }
}

/// 按累计权重走一遍，返回第一个 r <= 累计值 的下标。
/// 走完仍未命中（浮点误差 / NaN）时返回最后一个。调用方保证 weights 非空。
pub(crate) fn walk(weights: &[u32], r: f64) -> usize {
    let mut acc = 0f64;
    for (i, w) in weights.iter().enumerate() {
        acc += f64::from(*w);
        if r <= acc {
            return i;
        }
    }
    weights.len().saturating_sub(1)
}

/// 加权抽奖。时钟和随机源都由调用方注入。
#[derive(Clone)]
pub struct LotteryService {
    clock: Arc<dyn Clock>,
}

impl LotteryService {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// 当前可参与抽奖的优惠（保持目录顺序）
    pub fn selectable<'a>(&self, offers: &'a [Offer]) -> Vec<&'a Offer> {
        selectable_at(offers, self.clock.now())
    }

    /// 抽取一个优惠；没有可选优惠时返回 EmptyPool
    pub fn draw<'a, R: Rng + ?Sized>(&self, offers: &'a [Offer], rng: &mut R) -> AppResult<&'a Offer> {
        let candidates = self.selectable(offers);
        if candidates.is_empty() {
            return Err(AppError::EmptyPool);
        }

        let weights: Vec<u32> = candidates.iter().map(|o| weight(o.face_value)).collect();
        let total: u64 = weights.iter().map(|w| u64::from(*w)).sum();
        let r: f64 = rng.random_range(0.0..total as f64);
        let chosen = candidates[walk(&weights, r)];

        log::debug!(
            "Lottery drew offer {} (r={r:.3}, total={total}, candidates={})",
            chosen.id,
            candidates.len()
        );
        Ok(chosen)
    }

    /// 奖池展示：每个可选优惠的权重和概率
    pub fn odds(&self, offers: &[Offer]) -> Vec<OfferOdds> {
        let candidates = self.selectable(offers);
        let total: u64 = candidates
            .iter()
            .map(|o| u64::from(weight(o.face_value)))
            .sum();

        candidates
            .into_iter()
            .map(|o| {
                let w = weight(o.face_value);
                OfferOdds {
                    offer: OfferSummary::from(o),
                    weight: w,
                    probability: f64::from(w) / total as f64,
                    codes_left: o.unclaimed_codes().count(),
                }
            })
            .collect()
    }
}

fn selectable_at(offers: &[Offer], now: DateTime<Utc>) -> Vec<&Offer> {
    offers.iter().filter(|o| o.is_selectable(now)).collect()
}
