use std::time::{Duration, Instant};

use log::{debug, info, warn};
use teloxide::{
    dispatching::DpHandlerDescription,
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode},
    utils::command::BotCommands,
    RequestError,
};

use super::{
    admin_handler::AdminCommand,
    presentation::{
        refresh_status_message, render_leaderboard, render_lobby_status, render_profile,
        render_roster,
    },
    sender_id, AsyncBotState,
};
use crate::{
    confirmation::Confirmations,
    cooldown::Cooldowns,
    lobby_manager::{CheckInOutcome, LobbyError, LobbyManager},
    player_registry::{PlayerProfile, PlayerRegistry, Region, RegistryError},
};

const CHECKIN_COOLDOWN: Duration = Duration::from_secs(3);
const REGISTER_COOLDOWN: Duration = Duration::from_secs(10);
const UNREGISTER_COOLDOWN: Duration = Duration::from_secs(30);
const UNREGISTER_TIMEOUT: Duration = Duration::from_secs(15);
const LEADERBOARD_SIZE: usize = 10;

pub fn get_player_handler(
) -> Handler<'static, DependencyMap, Result<(), RequestError>, DpHandlerDescription> {
    dptree::entry()
        .filter_command::<PlayerCommand>()
        .endpoint(player_handler)
}

pub fn get_unregister_callback_handler(
) -> Handler<'static, DependencyMap, Result<(), RequestError>, DpHandlerDescription> {
    Update::filter_callback_query()
        .filter_map(|q: CallbackQuery| q.data.as_deref().and_then(UnregisterAnswer::parse))
        .endpoint(unregister_callback)
}

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Player commands")]
pub enum PlayerCommand {
    #[command(description = "shows this message.")]
    Help,
    #[command(description = "join the currently open scrim lobby")]
    Checkin,
    #[command(description = "link your Epic account: /register <epic name> <REGION>")]
    Register { args: String },
    #[command(description = "remove your registration")]
    Unregister,
    #[command(description = "show your registration")]
    Profile,
    #[command(description = "top earners: /leaderboard [REGION]")]
    Leaderboard { region: String },
    #[command(description = "show the current lobby")]
    Lobby,
}

async fn player_handler(
    bot_state: AsyncBotState,
    bot: Bot,
    msg: Message,
    cmd: PlayerCommand,
) -> Result<(), RequestError> {
    let player = sender_id(&msg);

    let text = match cmd {
        PlayerCommand::Help => {
            let mut text = PlayerCommand::descriptions().to_string();
            if bot_state.config.is_admin(player) {
                text.push_str(&format!("\n\n{}", AdminCommand::descriptions()));
            }
            text
        }
        PlayerCommand::Checkin => {
            let cooldown = bot_state
                .cooldowns
                .try_acquire("checkin", player, CHECKIN_COOLDOWN);
            match cooldown {
                Ok(()) => check_in(&bot_state, &bot, player).await,
                Err(wait) => cooldown_message("checkin", wait),
            }
        }
        PlayerCommand::Register { args } => {
            let cooldown = bot_state
                .cooldowns
                .try_acquire("register", player, REGISTER_COOLDOWN);
            match cooldown {
                Ok(()) => register(&bot_state, player, &args),
                Err(wait) => cooldown_message("register", wait),
            }
        }
        PlayerCommand::Unregister => {
            let begun = begin_unregister(
                &bot_state.cooldowns,
                &bot_state.confirmations,
                &*bot_state.registry(),
                player,
                Instant::now(),
            );
            match begun {
                Ok((epic_name, nonce)) => {
                    return ask_unregister(&bot_state, &bot, msg.chat.id, player, &epic_name, nonce)
                        .await;
                }
                Err(text) => text,
            }
        }
        PlayerCommand::Profile => {
            let profile = bot_state.registry().get(player).cloned();
            match profile {
                Some(profile) => render_profile(&profile),
                None => String::from("You are not registered. Use /register first."),
            }
        }
        PlayerCommand::Leaderboard { region } => leaderboard(&bot_state, &region),
        PlayerCommand::Lobby => {
            let lobby_manager = &bot_state.lobby_manager;
            let text = match lobby_manager.snapshot() {
                Some(session) => format!(
                    "{}\n\n{}",
                    render_lobby_status(Some(&session), lobby_manager.capacity()),
                    render_roster(&session)
                ),
                None => render_lobby_status(None, lobby_manager.capacity()),
            };
            bot.send_message(msg.chat.id, text)
                .parse_mode(ParseMode::Html)
                .await?;
            return Ok(());
        }
    };

    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

fn cooldown_message(command: &str, wait: Duration) -> String {
    format!(
        "⏳ Please wait {:.1}s before using /{} again.",
        wait.as_secs_f32(),
        command
    )
}

async fn check_in(bot_state: &AsyncBotState, bot: &Bot, player: ChatId) -> String {
    let lobby_manager = &bot_state.lobby_manager;

    if !lobby_manager.is_open() {
        return String::from("❌ No open lobby right now. Wait for an admin to start one.");
    }

    let profile = bot_state.registry().get(player).cloned();
    let Some(profile) = profile else {
        return String::from("⚠️ You must be registered to play. Use /register first.");
    };

    match lobby_manager.check_in(player, profile.epic_name.clone()) {
        Ok(outcome) => {
            if outcome == CheckInOutcome::CheckedIn {
                if let Some(session) = lobby_manager.snapshot() {
                    refresh_status_message(bot, &session, lobby_manager.capacity()).await;
                }
            } else {
                debug!("{} repeated their check-in", profile.epic_name);
            }
            format!(
                "✅ You are checked in as {} ({}). You are in the queue.",
                profile.epic_name, profile.region
            )
        }
        Err(LobbyError::CapacityReached { capacity }) => {
            format!("❌ Check-in failed. The lobby is full ({capacity} players).")
        }
        Err(e) => format!("❌ Check-in failed: {e}."),
    }
}

/// `args` is "<epic name> <REGION>"; epic names may contain spaces, so the
/// region is the last word.
fn register(bot_state: &AsyncBotState, player: ChatId, args: &str) -> String {
    let Some((epic_name, region)) = args.trim().rsplit_once(char::is_whitespace) else {
        return format!(
            "Usage: /register <epic name> <REGION>\nRegions: {}",
            Region::keys()
        );
    };
    let region = match region.parse::<Region>() {
        Ok(region) => region,
        Err(e) => return format!("❌ {e}. Choose one of: {}", Region::keys()),
    };

    let registered = bot_state.registry().register(player, epic_name, region);
    match registered {
        Ok((is_new, profile)) => {
            bot_state.registry_flush.request();
            let headline = if is_new {
                format!(
                    "🎉 Registration complete! Welcome to the competitive scene, {}.",
                    profile.epic_name
                )
            } else {
                String::from("✅ Profile updated!")
            };
            format!("{headline}\n\n{}", render_profile(&profile))
        }
        Err(e) => format!("❌ Registration failed: {e}"),
    }
}

fn leaderboard(bot_state: &AsyncBotState, region: &str) -> String {
    let region = region.trim();
    let filter = if region.is_empty() {
        None
    } else {
        match region.parse::<Region>() {
            Ok(region) => Some(region),
            Err(e) => return format!("❌ {e}. Choose one of: {}", Region::keys()),
        }
    };

    let registry = bot_state.registry();
    let ranked = registry.leaderboard(filter, LEADERBOARD_SIZE);
    let (title, registered) = match filter {
        Some(region) => (
            format!("🏆 {} leaderboard", region.name()),
            registry.players_by_region(region).len(),
        ),
        None => (String::from("🏆 Global leaderboard"), registry.player_count()),
    };
    render_leaderboard(&title, &ranked, registered)
}

/// Button payload of an unregister prompt:
/// `unregister:<confirm|cancel>:<owner>:<nonce>`.
#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub struct UnregisterAnswer {
    confirm: bool,
    owner: ChatId,
    nonce: u64,
}

impl UnregisterAnswer {
    fn data(self) -> String {
        let answer = if self.confirm { "confirm" } else { "cancel" };
        format!("unregister:{}:{}:{}", answer, self.owner.0, self.nonce)
    }

    fn parse(data: &str) -> Option<UnregisterAnswer> {
        let mut parts = data.split(':');
        if parts.next()? != "unregister" {
            return None;
        }
        let confirm = match parts.next()? {
            "confirm" => true,
            "cancel" => false,
            _ => return None,
        };
        let owner = ChatId(parts.next()?.parse().ok()?);
        let nonce = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(UnregisterAnswer {
            confirm,
            owner,
            nonce,
        })
    }
}

#[derive(Debug)]
enum UnregisterOutcome {
    Removed(PlayerProfile),
    Cancelled,
    NotRegistered,
    Expired,
    Foreign,
    Failed(RegistryError),
}

impl UnregisterOutcome {
    fn reply(&self) -> String {
        match self {
            UnregisterOutcome::Removed(profile) => format!(
                "🗑️ Unlinked {} from your account. Use /register to play again.",
                profile.epic_name
            ),
            UnregisterOutcome::Cancelled => String::from("✅ Unregistration cancelled."),
            UnregisterOutcome::NotRegistered => String::from("You are not registered."),
            UnregisterOutcome::Expired => {
                String::from("⌛ This request has expired. Use /unregister again.")
            }
            UnregisterOutcome::Foreign => String::from("These buttons are not for you."),
            UnregisterOutcome::Failed(e) => {
                format!("❌ Error removing account: {e}. Please contact an admin.")
            }
        }
    }
}

/// Applies the cooldown and opens a confirmation prompt. Returns the epic
/// name to confirm and the prompt nonce, or the reply to send instead.
fn begin_unregister<R: PlayerRegistry>(
    cooldowns: &Cooldowns,
    confirmations: &Confirmations,
    registry: &R,
    player: ChatId,
    now: Instant,
) -> Result<(String, u64), String> {
    if let Err(wait) = cooldowns.try_acquire_at("unregister", player, UNREGISTER_COOLDOWN, now) {
        return Err(cooldown_message("unregister", wait));
    }
    let Some(profile) = registry.get(player) else {
        return Err(String::from(
            "❌ You are not registered yet. Use /register to join.",
        ));
    };

    let nonce = confirmations.open_at(player, UNREGISTER_TIMEOUT, now);
    Ok((profile.epic_name.clone(), nonce))
}

/// Only the prompt's owner can answer it, and only once before it times out.
fn settle_unregister<R: PlayerRegistry>(
    confirmations: &Confirmations,
    registry: &mut R,
    presser: ChatId,
    answer: UnregisterAnswer,
    now: Instant,
) -> UnregisterOutcome {
    if presser != answer.owner {
        return UnregisterOutcome::Foreign;
    }
    if !confirmations.settle_at(answer.owner, answer.nonce, now) {
        return UnregisterOutcome::Expired;
    }
    if !answer.confirm {
        return UnregisterOutcome::Cancelled;
    }

    match registry.delete(presser) {
        Ok(profile) => UnregisterOutcome::Removed(profile),
        Err(RegistryError::NotRegistered) => UnregisterOutcome::NotRegistered,
        Err(e) => UnregisterOutcome::Failed(e),
    }
}

async fn ask_unregister(
    bot_state: &AsyncBotState,
    bot: &Bot,
    chat: ChatId,
    player: ChatId,
    epic_name: &str,
    nonce: u64,
) -> Result<(), RequestError> {
    let button = |label: &str, confirm: bool| {
        let answer = UnregisterAnswer {
            confirm,
            owner: player,
            nonce,
        };
        InlineKeyboardButton::callback(label.to_string(), answer.data())
    };
    let keyboard = InlineKeyboardMarkup::new(vec![vec![
        button("Cancel", false),
        button("🗑️ Yes, unlink my account", true),
    ]]);

    let prompt = bot
        .send_message(
            chat,
            format!(
                "⚠️ Unlink {epic_name} from your account?\n\
                 \n\
                 You will lose your spot on the leaderboard and your earnings, \
                 and you will need to register again to play in scrims.\n\
                 This request expires in {}s.",
                UNREGISTER_TIMEOUT.as_secs()
            ),
        )
        .reply_markup(keyboard)
        .await?;

    let bot = bot.clone();
    let bot_state = bot_state.clone();
    tokio::spawn(async move {
        tokio::time::sleep(UNREGISTER_TIMEOUT).await;
        if !bot_state.confirmations.expire(player, nonce) {
            return;
        }
        let timed_out = "⌛ Request timed out. Your registration was kept.";
        if let Err(e) = bot
            .edit_message_text(prompt.chat.id, prompt.id, timed_out)
            .await
        {
            warn!("Failed to expire unregister prompt for {}: {}", player.0, e);
        }
    });
    Ok(())
}

async fn unregister_callback(
    bot_state: AsyncBotState,
    bot: Bot,
    q: CallbackQuery,
    answer: UnregisterAnswer,
) -> Result<(), RequestError> {
    let presser = ChatId::from(q.from.id);
    let outcome = settle_unregister(
        &bot_state.confirmations,
        &mut *bot_state.registry(),
        presser,
        answer,
        Instant::now(),
    );

    if let UnregisterOutcome::Foreign = outcome {
        bot.answer_callback_query(q.id)
            .text(outcome.reply())
            .await?;
        return Ok(());
    }
    bot.answer_callback_query(q.id).await?;

    if let UnregisterOutcome::Removed(profile) = &outcome {
        info!("{} unregistered", profile.epic_name);
        bot_state.registry_flush.request();
    }
    if let Some(prompt) = q.message {
        bot.edit_message_text(prompt.chat.id, prompt.id, outcome.reply())
            .await?;
    }
    Ok(())
}
