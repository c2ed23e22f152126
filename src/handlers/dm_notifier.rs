use std::future::Future;

use teloxide::{prelude::*, RequestError};

use super::presentation::{refresh_status_message, render_code_message};
use crate::lobby_manager::{
    distribution::{CodeDelivery, Notifier},
    Session,
};

/// Delivers match codes as private Telegram messages and keeps the lobby's
/// live status message in step with the distribution.
pub struct DmNotifier {
    bot: Bot,
    capacity: usize,
}

impl DmNotifier {
    pub fn new(bot: Bot, capacity: usize) -> DmNotifier {
        DmNotifier { bot, capacity }
    }
}

impl Notifier for DmNotifier {
    type Error = RequestError;

    fn deliver(
        &self,
        player_id: ChatId,
        delivery: &CodeDelivery,
    ) -> impl Future<Output = Result<(), RequestError>> + Send {
        let request = self
            .bot
            .send_message(player_id, render_code_message(delivery));
        async move { request.await.map(|_| ()) }
    }

    fn roster_frozen(&self, session: &Session) -> impl Future<Output = ()> + Send {
        let bot = self.bot.clone();
        let session = session.clone();
        let capacity = self.capacity;
        async move { refresh_status_message(&bot, &session, capacity).await }
    }
}
