use actix_web::{App, HttpServer, middleware::Logger, web};
use chrono::Local; // timestamp in log lines
use env_logger::{Env, Target};
use std::io::Write; // for env_logger custom formatter
use std::sync::Arc;

use kkss_rewards::{
    config::Config,
    external::{HttpClaimAuthority, HttpOfferCatalog},
    handlers,
    middlewares::{AuthMiddleware, create_cors},
    services::{PlayStateStore, RewardService, RewardSettings},
    swagger::swagger_config,
    utils::{JwtService, SystemClock},
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");
            let level = record.level().as_str().to_ascii_lowercase();
            let msg_json = serde_json::to_string(&format!("{}", record.args()))
                .unwrap_or_else(|_| "\"<invalid utf8>\"".to_string());
            writeln!(
                buf,
                "{{\"timestamp\":\"{}\",\"level\":\"{}\",\"message\":{},\"target\":\"{}\"}}",
                ts,
                level,
                msg_json,
                record.target(),
            )
        })
        .target(Target::Stdout)
        .init();

    // 加载配置
    let config = Config::from_toml().expect("Failed to load configuration file");

    // 本地游玩状态（打不开时降级运行）
    let store = Arc::new(PlayStateStore::open(&config.database).await);
    if let Some(warning) = store.warning() {
        log::warn!("Starting without durable play state: {warning}");
    }

    // 创建JWT服务（仅校验前台签发的令牌）
    let jwt_service = JwtService::new(&config.jwt.secret, config.jwt.access_token_expires_in);

    // 创建外部服务
    let catalog = HttpOfferCatalog::new(config.catalog.clone())
        .expect("Failed to create offer catalog client");
    let authority = HttpClaimAuthority::new(config.claim_authority.clone())
        .expect("Failed to create claim authority client");

    // 创建服务
    let reward_service = RewardService::with_os_rng(
        Arc::new(catalog),
        Arc::new(authority),
        store,
        Arc::new(SystemClock),
        RewardSettings::from_config(&config),
    );

    // 启动HTTP服务器
    log::info!(
        "Starting HTTP server at {}:{}",
        config.server.host,
        config.server.port
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(create_cors())
            .wrap(AuthMiddleware::new(jwt_service.clone()))
            .app_data(web::Data::new(reward_service.clone()))
            .configure(swagger_config)
            .service(web::scope("/api/v1").configure(handlers::rewards_config))
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await
}
