use actix_web::web;
use utoipa::OpenApi;
use utoipa::{
    Modify,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::error::PlayErrorKind;
use crate::handlers;
use crate::models::*;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            )
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::rewards::get_eligibility,
        handlers::rewards::stream_eligibility,
        handlers::rewards::get_offers,
        handlers::rewards::play,
        handlers::rewards::get_history,
    ),
    components(
        schemas(
            PlayChannel,
            PlayRequest,
            PlayOutcome,
            EligibilityResult,
            EligibilityResponse,
            OfferKind,
            OfferSummary,
            OfferOdds,
            PlayHistoryQuery,
            PlayHistoryResponse,
            PlayHistoryPageResponse,
            PlayErrorKind,
            ApiError,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "rewards", description = "Spin-wheel / claw-machine reward API"),
    ),
    info(
        title = "KKSS Rewards API",
        version = "1.0.0",
        description = "Weighted reward lottery with per-user cooldown",
        contact(
            name = "API Support",
            email = "driftcell@icloud.com"
        )
    ),
    servers(
        (url = "/api/v1", description = "Local server")
    )
)]
pub struct ApiDoc;

pub fn swagger_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
    .route(
        "/swagger-ui",
        web::get().to(|| async {
            actix_web::HttpResponse::Found()
                .append_header(("Location", "/swagger-ui/"))
                .finish()
        }),
    );
}
