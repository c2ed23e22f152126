use log::info;
use teloxide::{
    dispatching::DpHandlerDescription, prelude::*, types::ParseMode,
    utils::command::BotCommands, RequestError,
};

use super::{
    dm_notifier::DmNotifier,
    presentation::{changed_since, refresh_status_message, render_lobby_status},
    sender_id, AsyncBotState,
};
use crate::{
    lobby_manager::{
        distribution::distribute, Format, LobbyManager, PresentationHandle, SessionState,
    },
    player_registry::{PlayerRegistry, Region},
};

pub fn get_admin_handler(
) -> Handler<'static, DependencyMap, Result<(), RequestError>, DpHandlerDescription> {
    dptree::entry()
        .filter_command::<AdminCommand>()
        .endpoint(admin_handler)
}

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Admin commands")]
pub enum AdminCommand {
    #[command(
        description = "open a scrim lobby: /open <SOLO|DUO|TRIO|SQUAD> <REGION>",
        parse_with = "split"
    )]
    Open { format: String, region: String },
    #[command(description = "lock the lobby (no more check-ins)")]
    Close,
    #[command(description = "send the match code to all checked-in players: /distribute <code>")]
    Distribute { code: String },
    #[command(description = "force end the current session")]
    End,
    #[command(description = "credit prize money: /payout <amount> <epic name>")]
    Payout { args: String },
}

async fn admin_handler(
    bot_state: AsyncBotState,
    bot: Bot,
    msg: Message,
    cmd: AdminCommand,
) -> Result<(), RequestError> {
    let admin = sender_id(&msg);
    if !bot_state.config.is_admin(admin) {
        bot.send_message(msg.chat.id, "Only scrim admins can use this command.")
            .await?;
        return Ok(());
    }

    match cmd {
        AdminCommand::Open { format, region } => {
            open_lobby(&bot_state, &bot, &msg, admin, &format, &region).await
        }
        AdminCommand::Close => close_lobby(&bot_state, &bot, &msg).await,
        AdminCommand::Distribute { code } => distribute_code(&bot_state, &bot, &msg, code).await,
        AdminCommand::End => end_lobby(&bot_state, &bot, &msg).await,
        AdminCommand::Payout { args } => {
            let credited = payout(&mut *bot_state.registry(), &args);
            let text = match credited {
                Ok(text) => {
                    bot_state.registry_flush.request();
                    text
                }
                Err(text) => text,
            };
            bot.send_message(msg.chat.id, text).await?;
            Ok(())
        }
    }
}

async fn open_lobby(
    bot_state: &AsyncBotState,
    bot: &Bot,
    msg: &Message,
    admin: ChatId,
    format: &str,
    region: &str,
) -> Result<(), RequestError> {
    let lobby_manager = &bot_state.lobby_manager;

    // Single-lobby discipline is enforced here; the manager double checks.
    if lobby_manager.snapshot().is_some() {
        bot.send_message(msg.chat.id, "A lobby is already active! End it first.")
            .await?;
        return Ok(());
    }

    let format = match format.parse::<Format>() {
        Ok(format) => format,
        Err(message) => {
            bot.send_message(msg.chat.id, message).await?;
            return Ok(());
        }
    };
    let region = match region.parse::<Region>() {
        Ok(region) => region,
        Err(e) => {
            bot.send_message(msg.chat.id, format!("{e}. Choose one of: {}", Region::keys()))
                .await?;
            return Ok(());
        }
    };

    let session = match lobby_manager.open(admin, format, region.name().to_string()) {
        Ok(session) => session,
        Err(e) => {
            bot.send_message(msg.chat.id, format!("Cannot open lobby: {e}"))
                .await?;
            return Ok(());
        }
    };

    let lobby_chat = bot_state.config.lobby_chat.unwrap_or(msg.chat.id);
    let status = bot
        .send_message(
            lobby_chat,
            render_lobby_status(Some(&session), lobby_manager.capacity()),
        )
        .parse_mode(ParseMode::Html)
        .await?;
    let handle = PresentationHandle {
        chat_id: status.chat.id,
        message_id: status.id,
    };
    if lobby_manager.attach_presentation(session.id, handle).is_err() {
        info!("Lobby {} ended before its status message was posted", session.id);
    }
    // Check-ins that landed while the message was being posted had no handle
    // to refresh.
    if let Some(current) = changed_since(&session, lobby_manager.snapshot()) {
        refresh_status_message(bot, &current, lobby_manager.capacity()).await;
    }

    if lobby_chat != msg.chat.id {
        bot.send_message(msg.chat.id, format!("Lobby #{} opened.", session.id))
            .await?;
    }
    Ok(())
}

async fn close_lobby(
    bot_state: &AsyncBotState,
    bot: &Bot,
    msg: &Message,
) -> Result<(), RequestError> {
    let lobby_manager = &bot_state.lobby_manager;

    let text = match lobby_manager.lock() {
        Ok(session) => {
            refresh_status_message(bot, &session, lobby_manager.capacity()).await;
            format!(
                "🔒 Lobby locked with {} players. No new players can join.",
                session.player_count()
            )
        }
        Err(e) => format!("Cannot lock the lobby: {e}"),
    };

    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

async fn distribute_code(
    bot_state: &AsyncBotState,
    bot: &Bot,
    msg: &Message,
    code: String,
) -> Result<(), RequestError> {
    let lobby_manager = &bot_state.lobby_manager;
    let code = code.trim().to_string();

    if code.is_empty() {
        bot.send_message(msg.chat.id, "Usage: /distribute <code>").await?;
        return Ok(());
    }
    let Some(session) = lobby_manager.snapshot() else {
        bot.send_message(msg.chat.id, "No active session.").await?;
        return Ok(());
    };

    bot.send_message(
        msg.chat.id,
        format!(
            "🚀 Starting distribution of code {} to {} players...",
            code,
            session.player_count()
        ),
    )
    .await?;

    let notifier = DmNotifier::new(bot.clone(), lobby_manager.capacity());
    let report = match distribute(lobby_manager, &notifier, code, bot_state.config.dm_pacing).await
    {
        Ok(report) => report,
        Err(e) => {
            bot.send_message(msg.chat.id, format!("Cannot distribute: {e}"))
                .await?;
            return Ok(());
        }
    };

    // A concurrent /end has already rendered the final status.
    if report.session.state == SessionState::Ended {
        refresh_status_message(bot, &report.session, lobby_manager.capacity()).await;
    }

    let mut text = format!(
        "✅ Distribution complete. DMs sent to {} of {} players. Lobby ended.",
        report.delivered,
        report.session.player_count()
    );
    if !report.failed.is_empty() {
        let missed = report
            .session
            .players
            .iter()
            .filter(|p| report.failed.contains(&p.player_id))
            .map(|p| p.epic_name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        text.push_str(&format!("\nCould not reach: {missed}"));
    }

    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

async fn end_lobby(
    bot_state: &AsyncBotState,
    bot: &Bot,
    msg: &Message,
) -> Result<(), RequestError> {
    let lobby_manager = &bot_state.lobby_manager;

    let text = match lobby_manager.end() {
        Ok(session) => {
            refresh_status_message(bot, &session, lobby_manager.capacity()).await;
            String::from("🛑 Session force-ended.")
        }
        Err(e) => format!("Cannot end the session: {e}"),
    };

    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

/// `args` is "<amount> <epic name>"; the amount may be negative to correct a
/// mistake. `Ok` means the registry changed.
fn payout<R: PlayerRegistry>(registry: &mut R, args: &str) -> Result<String, String> {
    let usage = || String::from("Usage: /payout <amount> <epic name>");
    let (amount, epic_name) = args
        .trim()
        .split_once(char::is_whitespace)
        .ok_or_else(usage)?;
    let amount = amount
        .trim_start_matches('$')
        .parse::<f64>()
        .ok()
        .filter(|a| a.is_finite())
        .ok_or_else(usage)?;
    let epic_name = epic_name.trim();

    let player = registry
        .get_by_epic_name(epic_name)
        .map(|p| p.player_id)
        .ok_or_else(|| format!("No registered player is called {epic_name}."))?;

    match registry.update_earnings(player, amount) {
        Ok(total) => {
            info!("Credited ${amount:.2} to {epic_name}");
            Ok(format!(
                "💰 Credited ${amount:.2} to {epic_name}. Career earnings: ${total:.2}"
            ))
        }
        Err(e) => Err(format!("Cannot credit earnings: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use teloxide::types::{ChatId, MessageId};

    use super::*;
    use crate::lobby_manager::local_lobby_manager::LocalLobbyManager;
    use crate::player_registry::local_player_registry::LocalPlayerRegistry;

    #[test]
    fn check_in_during_posting_is_picked_up() {
        let manager = LocalLobbyManager::new();
        let posted = manager
            .open(ChatId(1), Format::Duo, String::from("Europe"))
            .unwrap();
        manager.check_in(ChatId(2), String::from("alpha")).unwrap();

        let handle = PresentationHandle {
            chat_id: ChatId(-100),
            message_id: MessageId(7),
        };
        manager.attach_presentation(posted.id, handle).unwrap();

        let current = changed_since(&posted, manager.snapshot()).unwrap();
        assert_eq!(current.player_count(), 1);
        assert_eq!(current.presentation, Some(handle));
    }

    #[test]
    fn quiet_posting_needs_no_refresh() {
        let manager = LocalLobbyManager::new();
        let posted = manager
            .open(ChatId(1), Format::Solo, String::from("Brazil"))
            .unwrap();

        assert!(changed_since(&posted, manager.snapshot()).is_none());
        manager.end().unwrap();
        assert!(changed_since(&posted, manager.snapshot()).is_none());
    }

    #[test]
    fn payout_credits_by_epic_name() {
        let mut registry = LocalPlayerRegistry::new();
        registry.register(ChatId(5), "Bugha", Region::NaEast).unwrap();

        assert!(payout(&mut registry, "$250 bugha").is_ok());
        assert!(payout(&mut registry, "-50.5 Bugha").is_ok());
        assert_eq!(registry.get(ChatId(5)).unwrap().earnings, 199.5);

        assert!(payout(&mut registry, "10 nobody").is_err());
        assert!(payout(&mut registry, "lots Bugha").is_err());
        assert!(payout(&mut registry, "100").is_err());
        assert_eq!(registry.get(ChatId(5)).unwrap().earnings, 199.5);
    }
}
