use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use teloxide::{dispatching::DpHandlerDescription, prelude::*, RequestError};

use crate::{
    config::Config,
    confirmation::Confirmations,
    cooldown::Cooldowns,
    lobby_manager::{local_lobby_manager::LocalLobbyManager, LobbyManager},
    player_registry::{
        flusher::FlushHandle, local_player_registry::LocalPlayerRegistry, PlayerRegistry,
    },
};

pub mod admin_handler;
pub mod dm_notifier;
pub mod player_handler;
pub mod presentation;

pub struct BotState<L: LobbyManager, R: PlayerRegistry> {
    pub lobby_manager: L,
    pub registry: Arc<Mutex<R>>,
    pub registry_flush: FlushHandle,
    pub cooldowns: Cooldowns,
    pub confirmations: Confirmations,
    pub config: Config,
}

impl<L: LobbyManager, R: PlayerRegistry> BotState<L, R> {
    pub fn registry(&self) -> MutexGuard<'_, R> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The lobby manager synchronises itself, so the state is shared without an
/// outer lock; long distributions never block check-ins from being answered.
pub type AsyncBotState = Arc<BotState<LocalLobbyManager, LocalPlayerRegistry>>;

pub fn new_async_bot_state(
    registry: Arc<Mutex<LocalPlayerRegistry>>,
    registry_flush: FlushHandle,
    config: Config,
) -> AsyncBotState {
    Arc::new(BotState {
        lobby_manager: LocalLobbyManager::new(),
        registry,
        registry_flush,
        cooldowns: Cooldowns::new(),
        confirmations: Confirmations::new(),
        config,
    })
}

/// The person who sent `msg`. Falls back to the chat for anonymous posts.
pub fn sender_id(msg: &Message) -> ChatId {
    msg.from().map(|user| ChatId::from(user.id)).unwrap_or(msg.chat.id)
}

pub fn schema() -> Handler<'static, DependencyMap, Result<(), RequestError>, DpHandlerDescription>
{
    let message_handler = Update::filter_message()
        .branch(admin_handler::get_admin_handler())
        .branch(player_handler::get_player_handler())
        .branch(
            dptree::filter(|msg: Message| msg.text().is_some_and(|t| t.starts_with('/')))
                .endpoint(unknown_command_handler),
        );

    dptree::entry()
        .branch(message_handler)
        .branch(player_handler::get_unregister_callback_handler())
}

async fn unknown_command_handler(bot: Bot, msg: Message) -> Result<(), RequestError> {
    bot.send_message(msg.chat.id, "Unknown command or missing arguments. Try /help")
        .await?;
    Ok(())
}
