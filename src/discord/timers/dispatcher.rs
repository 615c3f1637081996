use crate::core::giveaways::{GiveawayResult, GIVEAWAY_END_EVENT};
use crate::core::reminders::{ReminderDelivery, REMINDER_EVENT};
use crate::core::timers::Timer;
use crate::discord::data::colors;
use crate::discord::{Data, Error};
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Services and HTTP handle the dispatcher needs. Cheap to clone.
#[derive(Clone)]
pub struct TimerDispatcher {
    http: Arc<serenity::Http>,
    data: Data,
}

impl TimerDispatcher {
    pub fn new(http: Arc<serenity::Http>, data: Data) -> Self {
        Self { http, data }
    }

    /// Deliver expired timers until the timer manager shuts down.
    pub async fn run(self, mut expired: mpsc::UnboundedReceiver<Timer>) {
        while let Some(timer) = expired.recv().await {
            let dispatcher = self.clone();
            tokio::spawn(async move {
                if let Err(err) = dispatcher.dispatch(&timer).await {
                    tracing::warn!(
                        id = timer.id,
                        event = %timer.event,
                        error = %err,
                        "Failed to handle expired timer"
                    );
                }
            });
        }
        tracing::info!("Timer dispatcher stopped");
    }

    async fn dispatch(&self, timer: &Timer) -> Result<(), Error> {
        match timer.event.as_str() {
            REMINDER_EVENT => {
                let delivery = self.data.reminders.on_complete(timer).await?;
                send_reminder(&self.http, &delivery).await
            }
            GIVEAWAY_END_EVENT => match self.data.giveaways.finish(timer).await? {
                Some(result) => end_giveaway(&self.http, &result).await,
                None => Ok(()),
            },
            other => {
                tracing::debug!(id = timer.id, event = other, "No handler for timer event");
                Ok(())
            }
        }
    }
}

async fn send_reminder(http: &serenity::Http, delivery: &ReminderDelivery) -> Result<(), Error> {
    let mut builder = serenity::CreateMessage::new()
        .content(&delivery.content)
        .allowed_mentions(serenity::CreateAllowedMentions::new().all_users(true));

    if delivery.jump_url.starts_with("https://") {
        builder = builder.components(vec![serenity::CreateActionRow::Buttons(vec![
            serenity::CreateButton::new_link(&delivery.jump_url).label("Jump to Message"),
        ])]);
    }

    serenity::ChannelId::new(delivery.destination_id)
        .send_message(http, builder)
        .await?;
    Ok(())
}

/// Mark the giveaway message as ended and reply with the winners.
async fn end_giveaway(http: &serenity::Http, result: &GiveawayResult) -> Result<(), Error> {
    let giveaway = &result.giveaway;
    let channel_id = serenity::ChannelId::new(giveaway.channel_id);
    let message_id = serenity::MessageId::new(giveaway.message_id);

    let message = match channel_id.message(http, message_id).await {
        Ok(message) => message,
        Err(e) => {
            tracing::info!(id = giveaway.id(), "Giveaway message is gone: {}", e);
            return Ok(());
        }
    };

    let mut edit = serenity::EditMessage::new()
        .content("\u{1f389}\u{1f389} **GIVEAWAY ENDED** \u{1f389}\u{1f389}")
        .components(Vec::new());
    if let Some(embed) = message.embeds.first() {
        edit = edit.embed(serenity::CreateEmbed::from(embed.clone()).color(colors::ERROR));
    }
    channel_id.edit_message(http, message_id, edit).await?;

    let reply = serenity::CreateMessage::new()
        .content(result.announcement())
        .reference_message(&message)
        .allowed_mentions(serenity::CreateAllowedMentions::new().all_users(true));
    channel_id.send_message(http, reply).await?;
    Ok(())
}
