use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;
use serenity::collector::ComponentInteractionCollector;
use serenity::{CreateActionRow, CreateButton};
use std::time::Duration;

pub const CONFIRM_TIMEOUT: Duration = Duration::from_secs(45);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Accepted,
    Declined,
    TimedOut,
}

impl Confirmation {
    pub fn accepted(self) -> bool {
        self == Self::Accepted
    }
}

/// Ask the command author a yes/no question with two buttons.
///
/// The buttons are disabled once answered or after [`CONFIRM_TIMEOUT`].
pub async fn confirm(ctx: Context<'_>, content: impl Into<String>) -> Result<Confirmation, Error> {
    let content = content.into();
    let accept_id = format!("{}_confirm_yes", ctx.id());
    let deny_id = format!("{}_confirm_no", ctx.id());

    let handle = ctx
        .send(
            poise::CreateReply::default()
                .content(&content)
                .components(create_buttons(&accept_id, &deny_id, false)),
        )
        .await?;
    let message = handle.message().await?;

    let pressed = ComponentInteractionCollector::new(ctx.serenity_context())
        .author_id(ctx.author().id)
        .message_id(message.id)
        .filter({
            let (accept_id, deny_id) = (accept_id.clone(), deny_id.clone());
            move |i| i.data.custom_id == accept_id || i.data.custom_id == deny_id
        })
        .timeout(CONFIRM_TIMEOUT)
        .await;

    let Some(interaction) = pressed else {
        handle
            .edit(
                ctx,
                poise::CreateReply::default()
                    .content(&content)
                    .components(create_buttons(&accept_id, &deny_id, true)),
            )
            .await?;
        return Ok(Confirmation::TimedOut);
    };

    let response = serenity::CreateInteractionResponseMessage::new()
        .content(&content)
        .components(create_buttons(&accept_id, &deny_id, true));
    interaction
        .create_response(
            ctx.serenity_context(),
            serenity::CreateInteractionResponse::UpdateMessage(response),
        )
        .await?;

    if interaction.data.custom_id == accept_id {
        Ok(Confirmation::Accepted)
    } else {
        Ok(Confirmation::Declined)
    }
}

fn create_buttons(accept_id: &str, deny_id: &str, disabled: bool) -> Vec<CreateActionRow> {
    let accept = CreateButton::new(accept_id)
        .label("Yes")
        .style(serenity::ButtonStyle::Success)
        .disabled(disabled);
    let deny = CreateButton::new(deny_id)
        .label("No")
        .style(serenity::ButtonStyle::Danger)
        .disabled(disabled);

    vec![CreateActionRow::Buttons(vec![accept, deny])]
}
