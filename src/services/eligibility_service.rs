use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::models::{Durability, EligibilityResponse, EligibilityResult, PlayRecord};
use crate::services::PlayStateStore;
use crate::utils::Clock;

/// 两次成功游玩之间的冷却时间
pub fn cooldown_duration() -> Duration {
    Duration::hours(24)
}

/// 纯函数：根据本地记录判断是否可以游玩
///
/// remaining = max(0, 24h - (now - last_play_at))；last_play_at 在未来时剩余时间会超过 24 小时。
pub fn check_eligibility(record: Option<&PlayRecord>, now: DateTime<Utc>) -> EligibilityResult {
    let Some(last_play_at) = record.and_then(|r| r.last_play_at) else {
        return EligibilityResult::Eligible;
    };

    let remaining = (cooldown_duration() - (now - last_play_at)).max(Duration::zero());
    if remaining <= Duration::zero() {
        EligibilityResult::Eligible
    } else {
        EligibilityResult::cooldown(remaining)
    }
}

/// 一次资格判断及其依据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateDecision {
    pub result: EligibilityResult,
    pub record: Option<PlayRecord>,
    pub durability: Durability,
}

impl GateDecision {
    pub fn into_response(self) -> EligibilityResponse {
        EligibilityResponse {
            eligibility: self.result,
            play_count: self.record.map(|r| r.play_count).unwrap_or(0),
            persistence_degraded: self.durability.is_degraded(),
        }
    }
}

/// 实时倒计时。Drop 时停止后台定时器。
pub struct CountdownHandle {
    rx: watch::Receiver<EligibilityResult>,
    task: Option<JoinHandle<()>>,
}

impl CountdownHandle {
    fn fixed(result: EligibilityResult) -> Self {
        let (_tx, rx) = watch::channel(result);
        Self { rx, task: None }
    }

    pub fn current(&self) -> EligibilityResult {
        *self.rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<EligibilityResult> {
        self.rx.clone()
    }
}

impl Drop for CountdownHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// 启动倒计时：每个 tick 重新计算，剩余时间归零的那一刻切换为 Eligible 并结束
pub fn spawn_countdown(
    record: Option<PlayRecord>,
    clock: Arc<dyn Clock>,
    tick: std::time::Duration,
) -> CountdownHandle {
    let initial = check_eligibility(record.as_ref(), clock.now());
    if initial.is_eligible() {
        return CountdownHandle::fixed(initial);
    }

    let (tx, rx) = watch::channel(initial);
    let task = tokio::spawn(async move {
        let mut current = initial;
        while let Some(remaining) = current.remaining() {
            // 不跨过归零时刻
            let wait = remaining
                .to_std()
                .unwrap_or_default()
                .min(tick)
                .max(std::time::Duration::from_millis(1));
            tokio::time::sleep(wait).await;

            let next = check_eligibility(record.as_ref(), clock.now());
            tx.send_if_modified(|value| {
                if *value == next {
                    false
                } else {
                    *value = next;
                    true
                }
            });
            current = next;
        }
        log::debug!("Countdown finished");
    });

    CountdownHandle {
        rx,
        task: Some(task),
    }
}

/// 资格门：读取本地记录并判断冷却状态。只读，不创建记录。
#[derive(Clone)]
pub struct EligibilityGate {
    store: Arc<PlayStateStore>,
    clock: Arc<dyn Clock>,
    tick: std::time::Duration,
}

impl EligibilityGate {
    pub fn new(store: Arc<PlayStateStore>, clock: Arc<dyn Clock>, tick: std::time::Duration) -> Self {
        Self { store, clock, tick }
    }

    /// 未登录时直接返回 NotAuthenticated，不访问本地存储
    pub async fn evaluate(&self, user_id: Option<&str>) -> GateDecision {
        let Some(user_id) = user_id else {
            return GateDecision {
                result: EligibilityResult::NotAuthenticated,
                record: None,
                durability: self.store.durability(),
            };
        };

        let read = self.store.get(user_id).await;
        GateDecision {
            result: check_eligibility(read.value.as_ref(), self.clock.now()),
            record: read.value,
            durability: read.durability,
        }
    }

    /// 订阅实时倒计时
    pub async fn watch(&self, user_id: Option<&str>) -> CountdownHandle {
        let decision = self.evaluate(user_id).await;
        match decision.result {
            EligibilityResult::Cooldown { .. } => {
                spawn_countdown(decision.record, self.clock.clone(), self.tick)
            }
            other => CountdownHandle::fixed(other),
        }
    }
}
