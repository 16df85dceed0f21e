use crate::error::AppError;
use crate::middlewares::current_user_id;
use crate::models::*;
use crate::services::{CountdownHandle, RewardService};
use actix_web::web::Bytes;
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};
use futures_util::stream;
use tokio::sync::watch;

#[utoipa::path(
    get,
    path = "/rewards/eligibility",
    tag = "rewards",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "当前资格与冷却剩余时间", body = EligibilityResponse)
    )
)]
/// 查询当前是否可以游玩；未登录返回 not_authenticated 状态而不是 401
pub async fn get_eligibility(
    service: web::Data<RewardService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user_id = current_user_id(&req);
    let data = service.eligibility(user_id.as_deref()).await;
    Ok(HttpResponse::Ok().json(ApiResponse::success(data)))
}

#[utoipa::path(
    get,
    path = "/rewards/eligibility/stream",
    tag = "rewards",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "text/event-stream，每次状态变化推送一条 eligibility 事件", body = EligibilityResult)
    )
)]
/// 实时倒计时 (SSE)。冷却结束推送 eligible 后关闭；客户端断开时释放定时器
pub async fn stream_eligibility(
    service: web::Data<RewardService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user_id = current_user_id(&req);
    let handle = service.watch_eligibility(user_id.as_deref()).await;

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(countdown_events(handle)))
}

struct CountdownStream {
    // 持有句柄，流被丢弃时定时器随之停止
    _handle: CountdownHandle,
    rx: watch::Receiver<EligibilityResult>,
    started: bool,
    finished: bool,
}

fn countdown_events(
    handle: CountdownHandle,
) -> impl futures_util::Stream<Item = Result<Bytes, AppError>> {
    let state = CountdownStream {
        rx: handle.subscribe(),
        _handle: handle,
        started: false,
        finished: false,
    };

    stream::unfold(state, |mut s| async move {
        if s.finished {
            return None;
        }
        if s.started && s.rx.changed().await.is_err() {
            return None;
        }
        s.started = true;

        let current = *s.rx.borrow_and_update();
        s.finished = !matches!(current, EligibilityResult::Cooldown { .. });
        Some((sse_event(&current), s))
    })
}

fn sse_event(result: &EligibilityResult) -> Result<Bytes, AppError> {
    let data = serde_json::to_string(result)?;
    Ok(Bytes::from(format!("event: eligibility\ndata: {data}\n\n")))
}

#[utoipa::path(
    get,
    path = "/rewards/offers",
    tag = "rewards",
    responses(
        (status = 200, description = "当前奖池及中奖概率", body = [OfferOdds]),
        (status = 502, description = "优惠目录不可用")
    )
)]
/// 获取当前可抽取的优惠及其权重
pub async fn get_offers(service: web::Data<RewardService>) -> Result<HttpResponse> {
    match service.list_offer_odds().await {
        Ok(list) => Ok(HttpResponse::Ok().json(ApiResponse::success(list))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/rewards/play",
    tag = "rewards",
    request_body = PlayRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "中奖（won）或仍在冷却（cooldown）", body = PlayOutcome),
        (status = 401, description = "未登录"),
        (status = 404, description = "当前没有可抽取的优惠"),
        (status = 409, description = "优惠已领完 / 兑换码被抢 / 上一次游玩尚未结束"),
        (status = 502, description = "领取服务不可用，冷却未消耗")
    )
)]
/// 进行一次游玩:
/// 1. 检查冷却
/// 2. 按面值权重抽取优惠
/// 3. 向领取服务申请兑换码
/// 4. 确认后写入本地记录
pub async fn play(
    service: web::Data<RewardService>,
    req: HttpRequest,
    body: web::Json<PlayRequest>,
) -> Result<HttpResponse> {
    let user_id = current_user_id(&req);
    match service.play(user_id.as_deref(), body.channel).await {
        Ok(outcome) => Ok(HttpResponse::Ok().json(ApiResponse::success(outcome))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/rewards/history",
    tag = "rewards",
    params(
        ("page" = Option<u32>, Query, description = "页码 (默认1)"),
        ("per_page" = Option<u32>, Query, description = "每页数量 (默认20)")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "获取中奖记录成功", body = PlayHistoryPageResponse),
        (status = 401, description = "未登录")
    )
)]
/// 分页获取中奖记录（倒序）
pub async fn get_history(
    service: web::Data<RewardService>,
    req: HttpRequest,
    query: web::Query<PlayHistoryQuery>,
) -> Result<HttpResponse> {
    let user_id = current_user_id(&req);
    match service
        .list_history(user_id.as_deref(), &query.into_inner())
        .await
    {
        Ok(page) => Ok(HttpResponse::Ok().json(ApiResponse::success(page))),
        Err(e) => Ok(e.error_response()),
    }
}

/// 路由配置
pub fn rewards_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/rewards")
            .route("/eligibility", web::get().to(get_eligibility))
            .route("/eligibility/stream", web::get().to(stream_eligibility))
            .route("/offers", web::get().to(get_offers))
            .route("/play", web::post().to(play))
            .route("/history", web::get().to(get_history)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middlewares::AuthMiddleware;
    use crate::services::RewardSettings;
    use crate::test_support::{InMemoryClaimAuthority, StaticCatalog, epoch, memory_store, offer};
    use crate::utils::{JwtService, ManualClock};
    use actix_web::http::StatusCode;
    use actix_web::http::header::AUTHORIZATION;
    use actix_web::{App, test};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use serde_json::{Value, json};
    use std::sync::Arc;

    async fn service() -> RewardService {
        let offers = vec![offer("o", 10.0, 2)];
        RewardService::new(
            Arc::new(StaticCatalog::new(offers.clone())),
            Arc::new(InMemoryClaimAuthority::new(&offers)),
            Arc::new(memory_store().await),
            Arc::new(ManualClock::new(epoch())),
            StdRng::seed_from_u64(5),
            RewardSettings::default(),
        )
    }

    #[actix_web::test]
    async fn test_play_then_cooldown_over_http() {
        let jwt = JwtService::new("secret", 3600);
        let token = jwt.generate_access_token("u1").unwrap();
        let app = test::init_service(
            App::new()
                .wrap(AuthMiddleware::new(jwt))
                .app_data(web::Data::new(service().await))
                .configure(rewards_config),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/rewards/play")
            .insert_header((AUTHORIZATION, format!("Bearer {token}")))
            .set_json(json!({ "channel": "spin_wheel" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["outcome"], "won");
        assert_eq!(body["data"]["offer"]["id"], "o");

        let req = test::TestRequest::get()
            .uri("/rewards/eligibility")
            .insert_header((AUTHORIZATION, format!("Bearer {token}")))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["eligibility"]["status"], "cooldown");
        assert_eq!(body["data"]["play_count"], 1);
    }

    #[actix_web::test]
    async fn test_anonymous_play_is_rejected() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(service().await))
                .configure(rewards_config),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/rewards/play")
            .set_json(json!({ "channel": "claw_machine" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "NOT_AUTHENTICATED");

        let req = test::TestRequest::get().uri("/rewards/offers").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"][0]["weight"], 25);
    }

    #[actix_web::test]
    async fn test_stream_for_anonymous_user_sends_one_event() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(service().await))
                .configure(rewards_config),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/rewards/eligibility/stream")
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(
            body,
            Bytes::from_static(b"event: eligibility\ndata: {\"status\":\"not_authenticated\"}\n\n")
        );
    }

    fn event_statuses(body: &[u8]) -> Vec<String> {
        std::str::from_utf8(body)
            .unwrap()
            .split("\n\n")
            .filter(|chunk| !chunk.is_empty())
            .map(|chunk| {
                let data = chunk
                    .lines()
                    .find_map(|line| line.strip_prefix("data: "))
                    .unwrap();
                let value: Value = serde_json::from_str(data).unwrap();
                value["status"].as_str().unwrap().to_string()
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_events_end_with_eligible() {
        use crate::services::spawn_countdown;
        use crate::test_support::TokioClock;
        use futures_util::StreamExt;

        let last = epoch();
        let record = PlayRecord::new("u1").after_success(last);
        let clock = Arc::new(TokioClock::starting_at(
            last + chrono::Duration::hours(24) - chrono::Duration::milliseconds(2500),
        ));
        let handle = spawn_countdown(Some(record), clock, std::time::Duration::from_secs(1));

        let events: Vec<Bytes> = countdown_events(handle)
            .map(|event| event.unwrap())
            .collect()
            .await;
        let body: Vec<u8> = events.concat();
        assert_eq!(
            String::from_utf8(body).unwrap(),
            concat!(
                "event: eligibility\ndata: {\"status\":\"cooldown\",\"remaining_ms\":2500}\n\n",
                "event: eligibility\ndata: {\"status\":\"cooldown\",\"remaining_ms\":1500}\n\n",
                "event: eligibility\ndata: {\"status\":\"cooldown\",\"remaining_ms\":500}\n\n",
                "event: eligibility\ndata: {\"status\":\"eligible\"}\n\n",
            )
        );
    }

    #[actix_web::test]
    async fn test_stream_for_cooling_user_closes_after_eligible() {
        use crate::utils::SystemClock;
        use chrono::Utc;

        let offers = vec![offer("o", 10.0, 1)];
        let store = Arc::new(memory_store().await);
        store
            .record_success(
                "u1",
                Utc::now() - chrono::Duration::hours(24) + chrono::Duration::milliseconds(300),
            )
            .await;
        let service = RewardService::new(
            Arc::new(StaticCatalog::new(offers.clone())),
            Arc::new(InMemoryClaimAuthority::new(&offers)),
            store,
            Arc::new(SystemClock),
            StdRng::seed_from_u64(5),
            RewardSettings {
                countdown_tick: std::time::Duration::from_millis(100),
                ..RewardSettings::default()
            },
        );

        let jwt = JwtService::new("secret", 3600);
        let token = jwt.generate_access_token("u1").unwrap();
        let app = test::init_service(
            App::new()
                .wrap(AuthMiddleware::new(jwt))
                .app_data(web::Data::new(service))
                .configure(rewards_config),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/rewards/eligibility/stream")
            .insert_header((AUTHORIZATION, format!("Bearer {token}")))
            .to_request();
        // 读完整个 body 即说明流已关闭
        let body = test::call_and_read_body(&app, req).await;
        let statuses = event_statuses(&body);
        assert!(statuses.len() >= 2, "events: {statuses:?}");
        assert_eq!(statuses.first().map(String::as_str), Some("cooldown"));
        assert_eq!(statuses.last().map(String::as_str), Some("eligible"));
        assert!(statuses[..statuses.len() - 1].iter().all(|s| s == "cooldown"));
    }
}
