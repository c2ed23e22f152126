use std::error::Error;
use std::sync::{Arc, Mutex};

use log::warn;
use teloxide::prelude::*;

use scrim_lobby_bot::{
    config::Config,
    handlers::{new_async_bot_state, schema},
    player_registry::{flusher::spawn_flusher, local_player_registry::LocalPlayerRegistry},
    shutdown::on_terminate,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();
    pretty_env_logger::init();
    log::info!("Starting scrim lobby bot");

    let config = Config::from_env()?;
    let registry = Arc::new(Mutex::new(LocalPlayerRegistry::load(&config.registry_path)?));
    let flusher = spawn_flusher(registry.clone(), config.flush_debounce);

    let bot_state = new_async_bot_state(registry, flusher.handle(), config);

    let bot = Bot::from_env();
    let mut dispatcher = Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![bot_state])
        .enable_ctrlc_handler()
        .build();

    let token = dispatcher.shutdown_token();
    on_terminate(move || {
        if let Err(e) = token.shutdown() {
            warn!("Dispatcher was not running at SIGTERM: {e:?}");
        }
    })?;

    dispatcher.dispatch().await;

    // An in-flight lobby is intentionally dropped; only the registry survives.
    log::info!("Shutting down, saving player registry");
    flusher.shutdown().await;

    Ok(())
}
