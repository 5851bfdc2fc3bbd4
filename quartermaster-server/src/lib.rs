mod attendance;
mod auth;
mod context;
mod docs;
mod errors;
mod guilds;
mod imports;
mod items;
mod loot;
pub mod logging;
mod players;
mod schemas;
mod serialized;
pub mod sse;

use std::{
    env,
    net::{Ipv6Addr, SocketAddr},
};

use axum::routing::get;
use log::info;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub use context::ServerContext;

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9060;

pub type Router = axum::Router<ServerContext>;

/// Starts the quartermaster server
pub async fn run_server(context: ServerContext) {
    let port = env::var("QUARTERMASTER_SERVER_PORT")
        .map(|x| x.parse::<u16>().expect("Port must be a number"))
        .unwrap_or(DEFAULT_PORT);

    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let version_one_router = Router::new()
        .nest("/guilds", guilds::router())
        .nest("/players", players::router())
        .nest("/items", items::router())
        .nest("/loot", loot::router())
        .nest("/imports", imports::router())
        .nest("/attendance", attendance::router())
        .nest("/events", sse::router());

    let root_router = Router::new()
        .nest("/v1", version_one_router)
        .route("/api.json", get(docs::serve_api))
        .layer(cors)
        .with_state(context);

    let listener = TcpListener::bind(&addr).await.expect("listens on address");

    info!("Listening on port {port}");

    axum::serve(listener, root_router.into_make_service())
        .await
        .expect("server runs");
}
