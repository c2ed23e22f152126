use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use log::{info, warn};
use teloxide::types::ChatId;

use crate::lobby_manager::{CheckIn, Format, LobbyError, LobbyManager, Session};

/// What every roster member receives during distribution.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CodeDelivery {
    pub code: String,
    pub format: Format,
    pub region: String,
}

/// Point-to-point delivery of the match code to a single player.
pub trait Notifier {
    type Error: Display;

    /// Attempts exactly one delivery.
    fn deliver(
        &self,
        player_id: ChatId,
        delivery: &CodeDelivery,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Called once the roster is frozen, before the first delivery.
    fn roster_frozen(&self, _session: &Session) -> impl Future<Output = ()> + Send {
        async {}
    }
}

#[derive(Debug, Default)]
pub struct FanOutResult {
    pub delivered: usize,
    pub failed: Vec<ChatId>,
}

/// Sends `delivery` to every player in `roster`, in order, pausing `pacing`
/// between attempts. Failures are logged and counted, never raised.
pub async fn fan_out<N>(
    notifier: &N,
    roster: &[CheckIn],
    delivery: &CodeDelivery,
    pacing: Duration,
) -> FanOutResult
where
    N: Notifier + Sync,
{
    let mut result = FanOutResult::default();

    for (idx, player) in roster.iter().enumerate() {
        if idx > 0 && !pacing.is_zero() {
            tokio::time::sleep(pacing).await;
        }

        match notifier.deliver(player.player_id, delivery).await {
            Ok(()) => {
                result.delivered += 1;
                info!("   -> Sent code to {}", player.epic_name);
            }
            Err(e) => {
                warn!(
                    "   x Failed to deliver code to {} ({}): {}",
                    player.epic_name, player.player_id, e
                );
                result.failed.push(player.player_id);
            }
        }
    }

    result
}

#[derive(Debug)]
pub struct DistributionReport {
    /// The lobby as it ended. If the lobby was force-ended while the fan-out
    /// was running, this is the frozen copy in `Distributing`.
    pub session: Session,
    pub delivered: usize,
    pub failed: Vec<ChatId>,
}

/// Freezes the roster, assigns `code`, notifies every checked-in player and
/// ends the lobby. The store is only locked at the start and at the end; the
/// fan-out itself works on the frozen copy.
pub async fn distribute<L, N>(
    manager: &L,
    notifier: &N,
    code: String,
    pacing: Duration,
) -> Result<DistributionReport, LobbyError>
where
    L: LobbyManager,
    N: Notifier + Sync,
{
    let frozen = manager.begin_distribution(code)?;
    let delivery = CodeDelivery {
        code: frozen.match_code.clone().unwrap_or_default(),
        format: frozen.format,
        region: frozen.region.clone(),
    };

    notifier.roster_frozen(&frozen).await;

    info!(
        "Distributing code \"{}\" to {} players...",
        delivery.code,
        frozen.player_count()
    );
    let result = fan_out(notifier, &frozen.players, &delivery, pacing).await;
    info!(
        "Distribution for lobby {} finished: {}/{} delivered",
        frozen.id,
        result.delivered,
        frozen.player_count()
    );

    let session = match manager.complete_distribution(frozen.id) {
        Some(ended) => ended,
        None => {
            warn!(
                "Lobby {} was ended while its code was being distributed",
                frozen.id
            );
            frozen
        }
    };

    Ok(DistributionReport {
        session,
        delivered: result.delivered,
        failed: result.failed,
    })
}
