pub mod config;
pub mod confirmation;
pub mod cooldown;
pub mod handlers;
pub mod lobby_manager;
pub mod player_registry;
pub mod shutdown;
