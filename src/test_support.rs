//! 测试辅助：内存版优惠目录、领取权威与时钟

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Notify, Semaphore};

use crate::config::DatabaseConfig;
use crate::error::{AppError, AppResult};
use crate::external::{ClaimAuthority, ClaimRequest, ClaimResponse, ClaimVerdict, OfferCatalog};
use crate::models::{CodeStatus, Offer, OfferKind, RedemptionCode};
use crate::services::PlayStateStore;
use crate::utils::Clock;

/// 跟随 tokio 暂停时间推进的时钟
pub struct TokioClock {
    base: DateTime<Utc>,
    start: tokio::time::Instant,
}

impl TokioClock {
    pub fn starting_at(base: DateTime<Utc>) -> Self {
        Self {
            base,
            start: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = Duration::from_std(self.start.elapsed()).unwrap_or_default();
        self.base + elapsed
    }
}

pub fn epoch() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(1_767_225_600_000).unwrap() // 2026-01-01T00:00:00Z
}

pub fn offer(id: &str, face_value: f64, codes: usize) -> Offer {
    Offer {
        id: id.to_string(),
        face_value,
        kind: OfferKind::PercentOff,
        valid_from: epoch() - Duration::days(30),
        valid_until: epoch() + Duration::days(30),
        code_pool: (0..codes)
            .map(|i| RedemptionCode {
                id: format!("{id}-{i}"),
                code: format!("{}-{i:04}", id.to_uppercase()),
                status: CodeStatus::Unclaimed,
            })
            .collect(),
        active: true,
    }
}

pub async fn memory_store() -> PlayStateStore {
    let config = DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
    };
    let store = PlayStateStore::open(&config).await;
    assert!(!store.durability().is_degraded(), "in-memory sqlite should open");
    store
}

pub struct StaticCatalog {
    offers: Mutex<Vec<Offer>>,
    fail: bool,
}

impl StaticCatalog {
    pub fn new(offers: Vec<Offer>) -> Self {
        Self {
            offers: Mutex::new(offers),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            offers: Mutex::new(vec![]),
            fail: true,
        }
    }
}

#[async_trait]
impl OfferCatalog for StaticCatalog {
    async fn fetch_offers(&self) -> AppResult<Vec<Offer>> {
        if self.fail {
            return Err(AppError::RemoteError("catalog unreachable".into()));
        }
        Ok(self.offers.lock().unwrap().clone())
    }
}

/// 内存版领取权威：按 (offer, code) 串行化，转移单向且幂等
pub struct InMemoryClaimAuthority {
    codes: Mutex<HashMap<String, Vec<RedemptionCode>>>,
    by_play: Mutex<HashMap<String, String>>,
    pub calls: AtomicUsize,
    fail: bool,
    hold: Option<Arc<Semaphore>>,
    pub entered: Arc<Notify>,
}

impl InMemoryClaimAuthority {
    pub fn new(offers: &[Offer]) -> Self {
        Self {
            codes: Mutex::new(
                offers
                    .iter()
                    .map(|o| (o.id.clone(), o.code_pool.clone()))
                    .collect(),
            ),
            by_play: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            fail: false,
            hold: None,
            entered: Arc::new(Notify::new()),
        }
    }

    pub fn failing(offers: &[Offer]) -> Self {
        Self {
            fail: true,
            ..Self::new(offers)
        }
    }

    /// 每次请求都要等待一个 permit 才返回
    pub fn held(offers: &[Offer]) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (
            Self {
                hold: Some(gate.clone()),
                ..Self::new(offers)
            },
            gate,
        )
    }

    /// 模拟其它设备抢先领走某个码
    pub fn steal(&self, offer_id: &str, code_id: &str) {
        let mut codes = self.codes.lock().unwrap();
        if let Some(code) = codes
            .get_mut(offer_id)
            .and_then(|pool| pool.iter_mut().find(|c| c.id == code_id))
        {
            code.status = CodeStatus::Claimed("someone-else".into());
        }
    }

    pub fn claimed_by(&self, user_id: &str) -> usize {
        self.codes
            .lock()
            .unwrap()
            .values()
            .flatten()
            .filter(|c| c.status == CodeStatus::Claimed(user_id.to_string()))
            .count()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClaimAuthority for InMemoryClaimAuthority {
    async fn claim(&self, request: &ClaimRequest) -> AppResult<ClaimResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        if let Some(gate) = &self.hold {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| AppError::RemoteError(e.to_string()))?;
            permit.forget();
        }
        if self.fail {
            return Err(AppError::RemoteError("authority unavailable".into()));
        }

        if let Some(code) = self.by_play.lock().unwrap().get(&request.play_id) {
            return Ok(ClaimResponse {
                result: ClaimVerdict::Claimed,
                code: Some(code.clone()),
            });
        }

        let mut codes = self.codes.lock().unwrap();
        let Some(pool) = codes.get_mut(&request.offer_id) else {
            return Ok(ClaimResponse {
                result: ClaimVerdict::OfferExhausted,
                code: None,
            });
        };

        let any_left = pool.iter().any(|c| c.is_unclaimed());
        match pool.iter_mut().find(|c| c.id == request.code_id) {
            Some(code) if code.is_unclaimed() => {
                code.status = CodeStatus::Claimed(request.user_id.clone());
                self.by_play
                    .lock()
                    .unwrap()
                    .insert(request.play_id.clone(), code.code.clone());
                Ok(ClaimResponse {
                    result: ClaimVerdict::Claimed,
                    code: Some(code.code.clone()),
                })
            }
            _ if any_left => Ok(ClaimResponse {
                result: ClaimVerdict::AlreadyClaimedByOther,
                code: None,
            }),
            _ => Ok(ClaimResponse {
                result: ClaimVerdict::OfferExhausted,
                code: None,
            }),
        }
    }
}
