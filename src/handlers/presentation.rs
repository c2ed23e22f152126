use log::warn;
use teloxide::{prelude::*, types::ParseMode, utils::html};

use crate::lobby_manager::{distribution::CodeDelivery, Session, SessionState};
use crate::player_registry::PlayerProfile;

/// HTML, send with `ParseMode::Html`.
pub fn render_lobby_status(session: Option<&Session>, capacity: usize) -> String {
    let Some(session) = session else {
        return String::from("No active lobby.");
    };

    let marker = if session.state == SessionState::Open {
        "🟢"
    } else {
        "🔴"
    };
    let code = if session.code_distributed() {
        "DISTRIBUTED"
    } else {
        "waiting for host..."
    };
    let footer = match session.state {
        SessionState::Open => "Use /checkin to enter this match.",
        SessionState::Locked => "Check-in is closed.",
        SessionState::Distributing => "Sending match codes...",
        SessionState::Ended => "This lobby has ended.",
    };

    format!(
        "{marker} {region} {format} Scrim Lobby #{id}\n\
         \n\
         Host: <a href=\"tg://user?id={host}\">{host}</a>\n\
         Status: {state}\n\
         Match code: {code}\n\
         Players checked in: {count} / {capacity}\n\
         Opened: {opened}\n\
         \n\
         {footer}",
        region = html::escape(&session.region),
        format = session.format,
        id = session.id,
        host = session.host.0,
        state = session.state,
        count = session.player_count(),
        opened = session.start_time.format("%H:%M UTC"),
    )
}

/// HTML, like the status it is shown under.
pub fn render_roster(session: &Session) -> String {
    if session.players.is_empty() {
        return String::from("Nobody has checked in yet.");
    }

    session
        .players
        .iter()
        .enumerate()
        .map(|(idx, p)| format!("{}. {}", idx + 1, html::escape(&p.epic_name)))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_code_message(delivery: &CodeDelivery) -> String {
    format!(
        "🔑 Your scrim code\n\
         \n\
         Here is your matchmaking key for the {format} match.\n\
         Code: {code}\n\
         Region: {region}\n\
         \n\
         DO NOT SHARE THIS CODE",
        format = delivery.format,
        code = delivery.code,
        region = delivery.region,
    )
}

pub fn render_profile(profile: &PlayerProfile) -> String {
    format!(
        "🎮 Epic name: {}\nRegion: {}\nCareer earnings: ${:.2}\nRegistered: {}",
        profile.epic_name,
        profile.region,
        profile.earnings,
        profile.registered_at.format("%Y-%m-%d"),
    )
}

/// `registered` is the number of players the ranking was drawn from.
pub fn render_leaderboard(title: &str, ranked: &[&PlayerProfile], registered: usize) -> String {
    if ranked.is_empty() {
        return format!("{title}\n\nNo registered players yet.");
    }

    let rows = ranked
        .iter()
        .enumerate()
        .map(|(idx, p)| {
            format!(
                "{}. {} ({}) ${:.2}",
                idx + 1,
                p.epic_name,
                p.region.key(),
                p.earnings
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("{title}\n\n{rows}\n\n{registered} registered players")
}

/// The current state of the lobby `posted` was rendered from, if its status
/// has moved on since.
pub fn changed_since(posted: &Session, current: Option<Session>) -> Option<Session> {
    current.filter(|c| {
        c.id == posted.id
            && (c.state != posted.state || c.player_count() != posted.player_count())
    })
}

/// Re-renders the live status message of `session`, if it has one. Failures
/// are logged and otherwise ignored.
pub async fn refresh_status_message(bot: &Bot, session: &Session, capacity: usize) {
    let Some(handle) = session.presentation else {
        return;
    };

    let text = render_lobby_status(Some(session), capacity);
    if let Err(e) = bot
        .edit_message_text(handle.chat_id, handle.message_id, text)
        .parse_mode(ParseMode::Html)
        .await
    {
        warn!("Failed to update live lobby message for {}: {}", session.id, e);
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use teloxide::types::ChatId;

    use super::*;
    use crate::lobby_manager::{CheckIn, Format, SessionId};

    fn session(state: SessionState) -> Session {
        Session {
            id: SessionId(36),
            host: ChatId(1),
            format: Format::Squad,
            region: String::from("Europe"),
            state,
            players: vec![
                CheckIn {
                    player_id: ChatId(2),
                    epic_name: String::from("alpha"),
                    checked_in_at: Utc::now(),
                },
                CheckIn {
                    player_id: ChatId(3),
                    epic_name: String::from("beta"),
                    checked_in_at: Utc::now(),
                },
            ],
            match_code: None,
            presentation: None,
            start_time: Utc::now(),
        }
    }

    #[test]
    fn status_shows_counts_and_state() {
        let text = render_lobby_status(Some(&session(SessionState::Open)), 100);
        assert!(text.contains("Europe SQUAD Scrim Lobby #10"));
        assert!(text.contains("Host: <a href=\"tg://user?id=1\">1</a>"));
        assert!(text.contains("Status: OPEN"));
        assert!(text.contains("2 / 100"));
        assert!(text.contains("waiting for host"));
        assert!(text.contains("/checkin"));
    }

    #[test]
    fn status_hides_the_code() {
        let mut s = session(SessionState::Distributing);
        s.match_code = Some(String::from("SECRET-1"));

        let text = render_lobby_status(Some(&s), 100);
        assert!(text.contains("DISTRIBUTED"));
        assert!(!text.contains("SECRET-1"));
    }

    #[test]
    fn absent_lobby() {
        assert_eq!(render_lobby_status(None, 100), "No active lobby.");
    }

    #[test]
    fn roster_is_numbered() {
        assert_eq!(render_roster(&session(SessionState::Locked)), "1. alpha\n2. beta");
    }

    #[test]
    fn roster_names_are_escaped() {
        let mut s = session(SessionState::Open);
        s.players[0].epic_name = String::from("<b>&co");

        assert!(render_roster(&s).starts_with("1. &lt;b&gt;&amp;co\n"));
    }

    #[test]
    fn leaderboard_counts_registered_players() {
        let profile = PlayerProfile {
            player_id: ChatId(2),
            epic_name: String::from("alpha"),
            region: crate::player_registry::Region::Eu,
            earnings: 12.5,
            registered_at: Utc::now(),
        };

        let text = render_leaderboard("Top", &[&profile], 4);
        assert!(text.contains("1. alpha (EU) $12.50"));
        assert!(text.ends_with("4 registered players"));
    }
}
