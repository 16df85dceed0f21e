use rand::Rng;
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;

use crate::error::AppError;
use crate::external::{ClaimAuthority, ClaimRequest, ClaimVerdict, validate_claim_response};
use crate::models::Offer;

/// 领取结果，所有失败都在这里归类
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimResult {
    Claimed { code_id: String, code: String },
    OfferExhausted,
    AlreadyClaimedByOther,
    RemoteError(String),
}

impl ClaimResult {
    pub fn is_claimed(&self) -> bool {
        matches!(self, ClaimResult::Claimed { .. })
    }

    /// 失败结果转换为 AppError；成功返回 (code_id, code)
    pub fn into_claimed(self, offer_id: &str) -> Result<(String, String), AppError> {
        match self {
            ClaimResult::Claimed { code_id, code } => Ok((code_id, code)),
            ClaimResult::OfferExhausted => Err(AppError::OfferExhausted {
                offer_id: offer_id.to_string(),
            }),
            ClaimResult::AlreadyClaimedByOther => Err(AppError::AlreadyClaimedByOther {
                offer_id: offer_id.to_string(),
            }),
            ClaimResult::RemoteError(msg) => Err(AppError::RemoteError(msg)),
        }
    }
}

/// 打乱本地已知的未领取兑换码，作为本次领取的尝试顺序。
/// 打乱是为了让同一优惠的并发会话尽量不撞同一个码。
pub fn plan_attempts<R: Rng + ?Sized>(offer: &Offer, rng: &mut R) -> Vec<String> {
    let mut ids: Vec<String> = offer.unclaimed_codes().map(|c| c.id.clone()).collect();
    ids.shuffle(rng);
    ids
}

/// 领取协调器：按顺序向远端申请，被抢则换下一个码
#[derive(Clone)]
pub struct ClaimCoordinator {
    authority: Arc<dyn ClaimAuthority>,
    timeout: Duration,
    max_attempts: Option<usize>,
}

impl ClaimCoordinator {
    pub fn new(
        authority: Arc<dyn ClaimAuthority>,
        timeout: Duration,
        max_attempts: Option<usize>,
    ) -> Self {
        Self {
            authority,
            timeout,
            max_attempts,
        }
    }

    /// 最多尝试 candidates.len() 次（或 max_attempts），不会无限重试。
    ///
    /// - 候选码全部被抢：OfferExhausted
    /// - 达到 max_attempts 但仍有候选：AlreadyClaimedByOther
    pub async fn claim(
        &self,
        offer_id: &str,
        user_id: &str,
        play_id: &str,
        candidates: Vec<String>,
    ) -> ClaimResult {
        if candidates.is_empty() {
            return ClaimResult::OfferExhausted;
        }
        let limit = self
            .max_attempts
            .map_or(candidates.len(), |cap| cap.clamp(1, candidates.len()));

        for (attempt, code_id) in candidates.iter().take(limit).enumerate() {
            let request = ClaimRequest {
                offer_id: offer_id.to_string(),
                code_id: code_id.clone(),
                user_id: user_id.to_string(),
                play_id: play_id.to_string(),
            };

            let response = match tokio::time::timeout(self.timeout, self.authority.claim(&request)).await
            {
                Err(_) => {
                    log::warn!(
                        "Claim for play {play_id} timed out after {}ms",
                        self.timeout.as_millis()
                    );
                    return ClaimResult::RemoteError("claim request timed out".into());
                }
                Ok(Err(e)) => {
                    log::warn!("Claim for play {play_id} failed: {e}");
                    return ClaimResult::RemoteError(e.to_string());
                }
                Ok(Ok(body)) => match validate_claim_response(body) {
                    Ok(body) => body,
                    Err(e) => {
                        log::error!("Claim for play {play_id} returned an invalid body: {e}");
                        return ClaimResult::RemoteError(e.to_string());
                    }
                },
            };

            match (response.result, response.code) {
                (ClaimVerdict::Claimed, Some(code)) => {
                    log::info!(
                        "Claimed code {code_id} of offer {offer_id} for user {user_id} (attempt {})",
                        attempt + 1
                    );
                    return ClaimResult::Claimed {
                        code_id: code_id.clone(),
                        code,
                    };
                }
                (ClaimVerdict::Claimed, None) => {
                    return ClaimResult::RemoteError("claim confirmed without a code".into());
                }
                (ClaimVerdict::OfferExhausted, _) => {
                    log::info!("Offer {offer_id} exhausted while claiming for play {play_id}");
                    return ClaimResult::OfferExhausted;
                }
                (ClaimVerdict::AlreadyClaimedByOther, _) => {
                    log::debug!("Code {code_id} of offer {offer_id} was taken, trying next");
                }
            }
        }

        if limit < candidates.len() {
            log::warn!("Gave up on offer {offer_id} after {limit} attempts for play {play_id}");
            ClaimResult::AlreadyClaimedByOther
        } else {
            ClaimResult::OfferExhausted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CodeStatus;
    use crate::test_support::{InMemoryClaimAuthority, offer};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn coordinator(authority: Arc<InMemoryClaimAuthority>, max_attempts: Option<usize>) -> ClaimCoordinator {
        ClaimCoordinator::new(authority, Duration::from_secs(5), max_attempts)
    }

    fn ids(offer_id: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{offer_id}-{i}")).collect()
    }

    #[test]
    fn test_plan_attempts_only_includes_unclaimed_codes() {
        let mut o = offer("o", 10.0, 4);
        o.code_pool[1].status = CodeStatus::Claimed("x".into());
        let mut rng = StdRng::seed_from_u64(3);
        let mut plan = plan_attempts(&o, &mut rng);
        plan.sort();
        assert_eq!(plan, vec!["o-0", "o-2", "o-3"]);
    }

    #[tokio::test]
    async fn test_claim_returns_authority_code() {
        let o = offer("o", 10.0, 1);
        let authority = Arc::new(InMemoryClaimAuthority::new(&[o]));
        let result = coordinator(authority.clone(), None)
            .claim("o", "u1", "p1", ids("o", 1))
            .await;
        assert_eq!(
            result,
            ClaimResult::Claimed {
                code_id: "o-0".into(),
                code: "O-0000".into()
            }
        );
        assert_eq!(authority.claimed_by("u1"), 1);
    }

    #[tokio::test]
    async fn test_stale_code_retries_next_candidate() {
        let o = offer("o", 10.0, 3);
        let authority = Arc::new(InMemoryClaimAuthority::new(&[o]));
        authority.steal("o", "o-0");

        let result = coordinator(authority.clone(), None)
            .claim("o", "u1", "p1", ids("o", 3))
            .await;
        assert!(matches!(result, ClaimResult::Claimed { ref code_id, .. } if code_id == "o-1"));
        assert_eq!(authority.call_count(), 2);
    }

    #[tokio::test]
    async fn test_all_codes_taken_is_exhausted() {
        let o = offer("o", 10.0, 2);
        let authority = Arc::new(InMemoryClaimAuthority::new(&[o]));
        authority.steal("o", "o-0");
        authority.steal("o", "o-1");

        let result = coordinator(authority.clone(), None)
            .claim("o", "u1", "p1", ids("o", 2))
            .await;
        assert_eq!(result, ClaimResult::OfferExhausted);
        assert!(authority.call_count() <= 2);
        assert!(coordinator(authority, None).claim("o", "u1", "p2", vec![]).await == ClaimResult::OfferExhausted);
    }

    #[tokio::test]
    async fn test_attempt_cap_gives_up_with_codes_left() {
        let o = offer("o", 10.0, 4);
        let authority = Arc::new(InMemoryClaimAuthority::new(&[o]));
        authority.steal("o", "o-0");
        authority.steal("o", "o-1");

        let result = coordinator(authority.clone(), Some(2))
            .claim("o", "u1", "p1", ids("o", 4))
            .await;
        assert_eq!(result, ClaimResult::AlreadyClaimedByOther);
        assert_eq!(authority.call_count(), 2);
        assert_eq!(authority.claimed_by("u1"), 0);
    }

    #[tokio::test]
    async fn test_remote_failure_is_classified() {
        let o = offer("o", 10.0, 2);
        let authority = Arc::new(InMemoryClaimAuthority::failing(&[o]));
        let result = coordinator(authority.clone(), None)
            .claim("o", "u1", "p1", ids("o", 2))
            .await;
        assert!(matches!(result, ClaimResult::RemoteError(_)));
        // 远端故障不换码重试
        assert_eq!(authority.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_authority_times_out() {
        let o = offer("o", 10.0, 1);
        let (authority, _gate) = InMemoryClaimAuthority::held(&[o]);
        let result = ClaimCoordinator::new(Arc::new(authority), Duration::from_secs(3), None)
            .claim("o", "u1", "p1", ids("o", 1))
            .await;
        assert_eq!(result, ClaimResult::RemoteError("claim request timed out".into()));
    }

    #[tokio::test]
    async fn test_same_play_id_does_not_mint_second_code() {
        let o = offer("o", 10.0, 3);
        let authority = Arc::new(InMemoryClaimAuthority::new(&[o]));
        let c = coordinator(authority.clone(), None);
        let first = c.claim("o", "u1", "p1", ids("o", 3)).await;
        let again = c.claim("o", "u1", "p1", vec!["o-2".into()]).await;
        assert!(first.is_claimed());
        assert!(matches!(
            (&first, &again),
            (ClaimResult::Claimed { code: a, .. }, ClaimResult::Claimed { code: b, .. }) if a == b
        ));
        assert_eq!(authority.claimed_by("u1"), 1);
    }

    #[tokio::test]
    async fn test_concurrent_claims_on_last_code() {
        let o = offer("o", 10.0, 1);
        let authority = Arc::new(InMemoryClaimAuthority::new(&[o]));
        let a = coordinator(authority.clone(), None);
        let b = a.clone();

        let (left, right) = tokio::join!(
            a.claim("o", "u1", "tab-a", ids("o", 1)),
            b.claim("o", "u1", "tab-b", ids("o", 1)),
        );
        let claimed = [&left, &right].iter().filter(|r| r.is_claimed()).count();
        assert_eq!(claimed, 1);
        assert!(
            [&left, &right]
                .iter()
                .any(|r| matches!(r, ClaimResult::OfferExhausted | ClaimResult::AlreadyClaimedByOther))
        );
        assert_eq!(authority.claimed_by("u1"), 1);
    }

    #[test]
    fn test_into_claimed_maps_errors() {
        let err = ClaimResult::OfferExhausted.into_claimed("o").unwrap_err();
        assert!(matches!(err, AppError::OfferExhausted { ref offer_id } if offer_id == "o"));
        let err = ClaimResult::RemoteError("x".into()).into_claimed("o").unwrap_err();
        assert!(matches!(err, AppError::RemoteError(_)));
    }
}
