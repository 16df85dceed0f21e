use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::external::{ClaimAuthority, OfferCatalog};
use crate::models::{
    EligibilityResponse, EligibilityResult, OfferOdds, OfferSummary, PlayChannel,
    PlayHistoryPageResponse, PlayHistoryQuery, PlayOutcome,
};
use crate::services::{
    ClaimCoordinator, CountdownHandle, EligibilityGate, LotteryService, NewHistoryEntry,
    PlayStateStore, check_eligibility, plan_attempts,
};
use crate::utils::Clock;

/// 引擎参数
#[derive(Debug, Clone, Copy)]
pub struct RewardSettings {
    pub claim_timeout: Duration,
    pub max_attempts: Option<usize>,
    pub countdown_tick: Duration,
}

impl RewardSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            claim_timeout: Duration::from_secs(config.claim_authority.timeout_secs.max(1)),
            max_attempts: config.claim_authority.max_attempts,
            countdown_tick: config.rewards.countdown_tick(),
        }
    }
}

impl Default for RewardSettings {
    fn default() -> Self {
        Self {
            claim_timeout: Duration::from_secs(10),
            max_attempts: None,
            countdown_tick: Duration::from_secs(1),
        }
    }
}

/// 同一用户同时只允许一次游玩，Drop 时释放
struct InFlightGuard {
    users: Arc<Mutex<HashSet<String>>>,
    user_id: String,
}

impl InFlightGuard {
    fn acquire(users: &Arc<Mutex<HashSet<String>>>, user_id: &str) -> AppResult<Self> {
        let mut set = users.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(user_id.to_string()) {
            return Err(AppError::PlayInProgress);
        }
        Ok(Self {
            users: users.clone(),
            user_id: user_id.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.users
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.user_id);
    }
}

/// 转盘 / 抓娃娃两个入口共用的抽奖引擎
#[derive(Clone)]
pub struct RewardService {
    catalog: Arc<dyn OfferCatalog>,
    store: Arc<PlayStateStore>,
    gate: EligibilityGate,
    lottery: LotteryService,
    coordinator: ClaimCoordinator,
    clock: Arc<dyn Clock>,
    rng: Arc<Mutex<StdRng>>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl RewardService {
    pub fn new(
        catalog: Arc<dyn OfferCatalog>,
        authority: Arc<dyn ClaimAuthority>,
        store: Arc<PlayStateStore>,
        clock: Arc<dyn Clock>,
        rng: StdRng,
        settings: RewardSettings,
    ) -> Self {
        Self {
            gate: EligibilityGate::new(store.clone(), clock.clone(), settings.countdown_tick),
            lottery: LotteryService::new(clock.clone()),
            coordinator: ClaimCoordinator::new(
                authority,
                settings.claim_timeout,
                settings.max_attempts,
            ),
            catalog,
            store,
            clock,
            rng: Arc::new(Mutex::new(rng)),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// 使用系统熵初始化随机源
    pub fn with_os_rng(
        catalog: Arc<dyn OfferCatalog>,
        authority: Arc<dyn ClaimAuthority>,
        store: Arc<PlayStateStore>,
        clock: Arc<dyn Clock>,
        settings: RewardSettings,
    ) -> Self {
        Self::new(catalog, authority, store, clock, StdRng::from_os_rng(), settings)
    }

    /// 当前资格（倒计时展示）
    pub async fn eligibility(&self, user_id: Option<&str>) -> EligibilityResponse {
        self.gate.evaluate(user_id).await.into_response()
    }

    /// 订阅实时倒计时，返回的句柄 Drop 时释放定时器
    pub async fn watch_eligibility(&self, user_id: Option<&str>) -> CountdownHandle {
        self.gate.watch(user_id).await
    }

    /// 当前奖池及中奖概率
    pub async fn list_offer_odds(&self) -> AppResult<Vec<OfferOdds>> {
        let offers = self.catalog.fetch_offers().await?;
        Ok(self.lottery.odds(&offers))
    }

    pub async fn list_history(
        &self,
        user_id: Option<&str>,
        query: &PlayHistoryQuery,
    ) -> AppResult<PlayHistoryPageResponse> {
        let user_id = user_id.ok_or(AppError::NotAuthenticated)?;
        self.store.list_history(user_id, query).await
    }

    /// 一次完整游玩：资格 -> 抽奖 -> 领取 -> 记录
    ///
    /// 领取和写入在独立任务中执行，调用方中途放弃不会中断领取。
    pub async fn play(&self, user_id: Option<&str>, channel: PlayChannel) -> AppResult<PlayOutcome> {
        let user_id = user_id.ok_or(AppError::NotAuthenticated)?.to_string();
        let guard = InFlightGuard::acquire(&self.in_flight, &user_id)?;

        let record = self.store.get_or_create(&user_id).await;
        if let EligibilityResult::Cooldown { remaining_ms } =
            check_eligibility(Some(&record.value), self.clock.now())
        {
            log::debug!("User {user_id} is cooling down for another {remaining_ms}ms");
            return Ok(PlayOutcome::Cooldown { remaining_ms });
        }

        let offers = self.catalog.fetch_offers().await?;
        let (offer, candidates) = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            let offer = self.lottery.draw(&offers, &mut *rng)?.clone();
            let candidates = plan_attempts(&offer, &mut *rng);
            (offer, candidates)
        };

        let play_id = Uuid::new_v4().to_string();
        log::info!(
            "User {user_id} drew offer {} via {} (play {play_id})",
            offer.id,
            channel.as_str()
        );

        let coordinator = self.coordinator.clone();
        let store = self.store.clone();
        let clock = self.clock.clone();
        let read_durability = record.durability;
        let task = tokio::spawn(async move {
            let _guard = guard;
            let (_code_id, code) = coordinator
                .claim(&offer.id, &user_id, &play_id, candidates)
                .await
                .into_claimed(&offer.id)?;

            let claimed_at = clock.now();
            let saved = store.record_success(&user_id, claimed_at).await;
            let history = store
                .append_history(NewHistoryEntry {
                    play_id: play_id.clone(),
                    user_id: user_id.clone(),
                    channel: channel.as_str().to_string(),
                    offer_id: offer.id.clone(),
                    offer_kind: offer.kind.to_string(),
                    face_value: offer.face_value,
                    code: code.clone(),
                    claimed_at,
                })
                .await;

            let durability = read_durability.and(saved.durability).and(history);
            if durability.is_degraded() {
                log::warn!("Play {play_id} for {user_id} was not persisted durably");
            }

            Ok(PlayOutcome::Won {
                play_id,
                offer: OfferSummary::from(&offer),
                code,
                play_count: saved.value.play_count,
                persistence_degraded: durability.is_degraded(),
            })
        });

        task.await
            .map_err(|e| AppError::InternalError(format!("claim task failed: {e}")))?
    }
}
