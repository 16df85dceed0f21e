use actix_cors::Cors;

/// 两个促销前端（转盘 / 抓娃娃）跨域访问
pub fn create_cors() -> Cors {
    Cors::default()
        .allowed_origin_fn(|_, _req_head| true)
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_any_header()
        .expose_headers(vec!["Content-Type"])
        .supports_credentials()
        .max_age(3600)
}
