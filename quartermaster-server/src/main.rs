use std::{env, sync::Arc};

use log::{info, warn};
use quartermaster_core::{event_channel, MemoryDatabase, PgDatabase, Quartermaster};
use quartermaster_server::{logging, run_server, sse::SseBroadcaster, ServerContext};

#[tokio::main]
async fn main() {
    logging::init_logger();

    let (sender, receiver) = event_channel();

    let app = match env::var("DATABASE_URL") {
        Ok(url) => {
            info!("Connecting to Postgres...");

            let database = PgDatabase::connect(&url).await.expect("database connects");

            Arc::new(Quartermaster::new(database, sender))
        }
        Err(_) => {
            warn!("DATABASE_URL is not set, state is kept in memory and lost on shutdown");

            Arc::new(Quartermaster::new(MemoryDatabase::new(), sender))
        }
    };

    let sse = SseBroadcaster::new();
    tokio::spawn(sse.clone().run(receiver));

    run_server(ServerContext { app, sse }).await;
}
