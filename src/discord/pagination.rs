// Button-driven pagination for long embeds.

use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;
use serenity::collector::ComponentInteractionCollector;
use serenity::{ButtonStyle, CreateActionRow, CreateButton};
use std::time::Duration;

pub const DEFAULT_PER_PAGE: usize = 5;
pub const PAGINATION_TIMEOUT: Duration = Duration::from_secs(360);

/// One embed field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl PageField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            inline: false,
        }
    }
}

/// Splits a list of fields into pages laid over a base embed.
pub struct FieldPaginator {
    base: serenity::CreateEmbed,
    fields: Vec<PageField>,
    per_page: usize,
}

impl FieldPaginator {
    pub fn new(base: serenity::CreateEmbed, fields: Vec<PageField>) -> Self {
        Self {
            base,
            fields,
            per_page: DEFAULT_PER_PAGE,
        }
    }

    pub fn per_page(mut self, per_page: usize) -> Self {
        self.per_page = per_page.max(1);
        self
    }

    /// Always at least one, so an empty list still shows the base embed.
    pub fn page_count(&self) -> usize {
        self.fields.len().div_ceil(self.per_page).max(1)
    }

    pub fn clamp_page(&self, page: usize) -> usize {
        page.min(self.page_count() - 1)
    }

    pub fn page_fields(&self, page: usize) -> &[PageField] {
        let start = (self.clamp_page(page) * self.per_page).min(self.fields.len());
        let end = (start + self.per_page).min(self.fields.len());
        &self.fields[start..end]
    }

    pub fn render(&self, page: usize) -> serenity::CreateEmbed {
        let mut embed = self.base.clone();
        for field in self.page_fields(page) {
            embed = embed.field(&field.name, &field.value, field.inline);
        }
        embed
    }

    /// Send the first page and page through the rest.
    pub async fn send(self, ctx: Context<'_>, content: Option<String>) -> Result<(), Error> {
        let total = self.page_count();
        paginate(ctx, content, total, 0, PAGINATION_TIMEOUT, |page, _| {
            (self.render(page), Vec::new())
        })
        .await
    }
}

/// Send `start_page` and swap pages as the author presses the navigation buttons.
pub async fn paginate<F>(
    ctx: Context<'_>,
    content: Option<String>,
    total_pages: usize,
    start_page: usize,
    timeout: Duration,
    mut build_page: F,
) -> Result<(), Error>
where
    F: FnMut(usize, usize) -> (serenity::CreateEmbed, Vec<CreateActionRow>),
{
    if total_pages == 0 {
        return Ok(());
    }

    let mut current_page = start_page.min(total_pages - 1);
    let buttons = PaginationButtons::new(ctx.id());

    let (embed, mut components) = build_page(current_page, total_pages);
    if total_pages > 1 {
        components.push(build_navigation_row(&buttons, current_page, total_pages));
    }

    let mut reply = poise::CreateReply::default().embed(embed).components(components);
    if let Some(content) = content {
        reply = reply.content(content);
    }
    let handle = ctx.send(reply).await?;
    if total_pages <= 1 {
        return Ok(());
    }
    let message = handle.message().await?;

    while let Some(interaction) = ComponentInteractionCollector::new(ctx.serenity_context())
        .author_id(ctx.author().id)
        .message_id(message.id)
        .timeout(timeout)
        .await
    {
        let Some(next_page) = buttons.target(&interaction.data.custom_id, current_page, total_pages)
        else {
            continue;
        };

        current_page = next_page;
        let (embed, mut components) = build_page(current_page, total_pages);
        components.push(build_navigation_row(&buttons, current_page, total_pages));

        let response = serenity::CreateInteractionResponseMessage::new()
            .embed(embed)
            .components(components);
        interaction
            .create_response(
                ctx.serenity_context(),
                serenity::CreateInteractionResponse::UpdateMessage(response),
            )
            .await?;
    }

    // Drop the buttons once nobody can press them anymore.
    let (embed, components) = build_page(current_page, total_pages);
    handle
        .edit(ctx, poise::CreateReply::default().embed(embed).components(components))
        .await?;

    Ok(())
}

fn build_navigation_row(
    buttons: &PaginationButtons,
    current_page: usize,
    total_pages: usize,
) -> CreateActionRow {
    let disable_back = current_page == 0;
    let disable_forward = current_page + 1 >= total_pages;

    CreateActionRow::Buttons(vec![
        CreateButton::new(buttons.first.clone())
            .style(ButtonStyle::Secondary)
            .label("«")
            .disabled(disable_back),
        CreateButton::new(buttons.prev.clone())
            .style(ButtonStyle::Secondary)
            .label("‹")
            .disabled(disable_back),
        CreateButton::new(buttons.page.clone())
            .style(ButtonStyle::Primary)
            .label(format!("Page {}/{}", current_page + 1, total_pages))
            .disabled(true),
        CreateButton::new(buttons.next.clone())
            .style(ButtonStyle::Secondary)
            .label("›")
            .disabled(disable_forward),
        CreateButton::new(buttons.last.clone())
            .style(ButtonStyle::Secondary)
            .label("»")
            .disabled(disable_forward),
    ])
}

struct PaginationButtons {
    first: String,
    prev: String,
    page: String,
    next: String,
    last: String,
}

impl PaginationButtons {
    fn new(ctx_id: u64) -> Self {
        Self {
            first: format!("{ctx_id}_pg_first"),
            prev: format!("{ctx_id}_pg_prev"),
            page: format!("{ctx_id}_pg_page"),
            next: format!("{ctx_id}_pg_next"),
            last: format!("{ctx_id}_pg_last"),
        }
    }

    /// The page a button press leads to, or `None` for foreign buttons.
    fn target(&self, custom_id: &str, current: usize, total: usize) -> Option<usize> {
        let last = total.saturating_sub(1);
        match custom_id {
            id if id == self.first => Some(0),
            id if id == self.prev => Some(current.saturating_sub(1)),
            id if id == self.next => Some((current + 1).min(last)),
            id if id == self.last => Some(last),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(count: usize) -> Vec<PageField> {
        (0..count)
            .map(|i| PageField::new(format!("f{i}"), "v"))
            .collect()
    }

    #[test]
    fn fields_are_chunked_five_per_page_by_default() {
        let paginator = FieldPaginator::new(serenity::CreateEmbed::new(), fields(11));
        assert_eq!(paginator.page_count(), 3);
        assert_eq!(paginator.page_fields(0).len(), 5);
        assert_eq!(paginator.page_fields(2).len(), 1);
        assert_eq!(paginator.page_fields(2)[0].name, "f10");
    }

    #[test]
    fn out_of_range_pages_clamp_to_the_last() {
        let paginator = FieldPaginator::new(serenity::CreateEmbed::new(), fields(7)).per_page(3);
        assert_eq!(paginator.clamp_page(99), 2);
        assert_eq!(paginator.page_fields(99)[0].name, "f6");
    }

    #[test]
    fn empty_lists_still_have_one_page() {
        let paginator = FieldPaginator::new(serenity::CreateEmbed::new(), Vec::new());
        assert_eq!(paginator.page_count(), 1);
        assert!(paginator.page_fields(0).is_empty());
    }

    #[test]
    fn navigation_stays_in_bounds() {
        let buttons = PaginationButtons::new(7);
        assert_eq!(buttons.target("7_pg_prev", 0, 3), Some(0));
        assert_eq!(buttons.target("7_pg_next", 2, 3), Some(2));
        assert_eq!(buttons.target("7_pg_last", 0, 3), Some(2));
        assert_eq!(buttons.target("7_pg_first", 2, 3), Some(0));
        assert_eq!(buttons.target("8_pg_next", 0, 3), None);
    }

    #[test]
    fn rendered_pages_carry_their_fields() {
        let paginator = FieldPaginator::new(serenity::CreateEmbed::new(), fields(6));
        let json = serde_json::to_value(paginator.render(1)).unwrap();
        assert_eq!(json["fields"][0]["name"], "f5");
    }
}
