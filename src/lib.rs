use std::sync::Arc;

use axum::{
    middleware as axum_mw,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use services::{Dispatcher, FailureMeter, HookRegistry, MembershipManager};

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Arc<Config>,
    pub manager: MembershipManager,
    pub dispatcher: Dispatcher,
    pub hooks: HookRegistry,
    pub failures: FailureMeter,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let game_routes = Router::new()
        .route("/", post(routes::games::create_game))
        .route("/:gameID", put(routes::games::update_game));

    let hook_routes = Router::new()
        .route(
            "/",
            get(routes::hooks::list_hooks).post(routes::hooks::create_hook),
        )
        .route("/:publicID", delete(routes::hooks::remove_hook));

    let player_routes = Router::new()
        .route("/", post(routes::players::create_player))
        .route(
            "/:playerPublicID",
            get(routes::players::get_player).put(routes::players::update_player),
        );

    let membership_routes = Router::new()
        .route("/application", post(routes::memberships::apply))
        .route(
            "/application/:action",
            post(routes::memberships::resolve_application),
        )
        .route("/invitation", post(routes::memberships::invite))
        .route(
            "/invitation/:action",
            post(routes::memberships::resolve_invitation),
        )
        .route("/delete", post(routes::memberships::remove))
        .route("/promote", post(routes::memberships::promote))
        .route("/demote", post(routes::memberships::demote));

    let clan_routes = Router::new()
        .route(
            "/",
            get(routes::clans::list_clans).post(routes::clans::create_clan),
        )
        .route(
            "/:clanPublicID",
            get(routes::clans::get_clan).put(routes::clans::update_clan),
        )
        .route("/:clanPublicID/leave", post(routes::memberships::leave))
        .route(
            "/:clanPublicID/transfer-ownership",
            post(routes::clans::transfer_ownership),
        )
        .nest("/:clanPublicID/memberships", membership_routes);

    Router::new()
        .route("/healthcheck", get(routes::health::healthcheck))
        .route("/status", get(routes::health::status))
        .nest("/games", game_routes)
        .nest("/games/:gameID/hooks", hook_routes)
        .nest("/games/:gameID/players", player_routes)
        .nest("/games/:gameID/clans", clan_routes)
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::track_server_errors,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
