// {embed(...)} and its setters. Every setter writes into the environment's
// embed, creating it on first use, and renders to nothing.

use crate::core::tags::environment::{
    EmbedAuthorSpec, EmbedFieldSpec, EmbedFooterSpec, EmbedMediaSpec, EmbedSpec,
};
use crate::core::tags::registry::{TagCall, TagDefinition, TagError, TagResult};
use chrono::{TimeZone, Utc};

const MISSING_AUTHOR: &str = "{error: Missing author name}";
const MISSING_FOOTER: &str = "{error: No text specified}";

pub fn definitions() -> Vec<TagDefinition> {
    let author = TagDefinition::new(&["author", "name"], author)
        .unsplit()
        .child(TagDefinition::new(&["icon", "icon-url"], author_icon).unsplit())
        .child(TagDefinition::new(&["url"], author_url).unsplit());

    let footer = TagDefinition::new(&["footer", "foot"], footer)
        .unsplit()
        .child(TagDefinition::new(&["icon", "icon-url"], footer_icon).unsplit());

    vec![TagDefinition::new(&["embed"], embed)
        .raw_modifier()
        .child(TagDefinition::new(&["title"], title).unsplit())
        .child(TagDefinition::new(&["description"], description).unsplit())
        .child(TagDefinition::new(&["url"], url).unsplit())
        .child(TagDefinition::new(&["color", "colour"], color).unsplit())
        .child(author)
        .child(TagDefinition::new(&["thumbnail", "thumb"], thumbnail).unsplit())
        .child(TagDefinition::new(&["image", "img"], image).unsplit())
        .child(footer)
        .child(TagDefinition::new(&["timestamp", "time"], timestamp).unsplit())
        .child(
            TagDefinition::new(&["field", "add-field", "create-field"], field).unsplit(),
        )
        .child(
            TagDefinition::new(
                &[
                    "inline",
                    "inline-field",
                    "add-inline-field",
                    "create-inline-field",
                ],
                inline_field,
            )
            .unsplit(),
        )]
}

fn strip_link(text: &str) -> String {
    text.trim_matches(|c| c == '<' || c == ' ' || c == '>').to_string()
}

fn required<'c>(call: &'c TagCall<'_>, what: &str) -> Result<&'c str, TagError> {
    let arg = call.arg();
    if arg.is_empty() {
        return Err(TagError::invalid(format!("no {what} specified")));
    }
    Ok(arg)
}

fn embed(call: &mut TagCall<'_>) -> TagResult {
    if call.modifier.trim().is_empty() {
        return Err(TagError::invalid("access a subtag or directly use JSON"));
    }

    let spec: EmbedSpec = serde_json::from_str(&call.modifier)
        .map_err(|e| TagError::invalid(format!("invalid embed JSON: {e}")))?;
    call.env.embed = Some(spec);
    Ok(None)
}

fn title(call: &mut TagCall<'_>) -> TagResult {
    let value = required(call, "title")?.to_string();
    call.env.embed_mut().title = Some(value);
    Ok(None)
}

fn description(call: &mut TagCall<'_>) -> TagResult {
    let value = required(call, "description")?.to_string();
    call.env.embed_mut().description = Some(value);
    Ok(None)
}

fn url(call: &mut TagCall<'_>) -> TagResult {
    let value = strip_link(required(call, "url")?);
    call.env.embed_mut().url = Some(value);
    Ok(None)
}

fn color(call: &mut TagCall<'_>) -> TagResult {
    let raw = required(call, "color")?;
    let value =
        parse_color(raw).ok_or_else(|| TagError::invalid("invalid color specified"))?;
    call.env.embed_mut().color = Some(value);
    Ok(None)
}

fn author_mut(spec: &mut EmbedSpec) -> &mut EmbedAuthorSpec {
    spec.author.get_or_insert_with(|| EmbedAuthorSpec {
        name: MISSING_AUTHOR.to_string(),
        ..EmbedAuthorSpec::default()
    })
}

fn author(call: &mut TagCall<'_>) -> TagResult {
    let value = required(call, "author")?.to_string();
    author_mut(call.env.embed_mut()).name = value;
    Ok(None)
}

fn author_icon(call: &mut TagCall<'_>) -> TagResult {
    let value = strip_link(required(call, "author icon")?);
    author_mut(call.env.embed_mut()).icon_url = Some(value);
    Ok(None)
}

fn author_url(call: &mut TagCall<'_>) -> TagResult {
    let value = strip_link(required(call, "author url")?);
    author_mut(call.env.embed_mut()).url = Some(value);
    Ok(None)
}

fn thumbnail(call: &mut TagCall<'_>) -> TagResult {
    let value = strip_link(required(call, "thumbnail")?);
    call.env.embed_mut().thumbnail = Some(EmbedMediaSpec { url: value });
    Ok(None)
}

fn image(call: &mut TagCall<'_>) -> TagResult {
    let value = strip_link(required(call, "image")?);
    call.env.embed_mut().image = Some(EmbedMediaSpec { url: value });
    Ok(None)
}

fn footer_mut(spec: &mut EmbedSpec) -> &mut EmbedFooterSpec {
    spec.footer.get_or_insert_with(|| EmbedFooterSpec {
        text: MISSING_FOOTER.to_string(),
        icon_url: None,
    })
}

fn footer(call: &mut TagCall<'_>) -> TagResult {
    let value = required(call, "footer")?.to_string();
    footer_mut(call.env.embed_mut()).text = value;
    Ok(None)
}

fn footer_icon(call: &mut TagCall<'_>) -> TagResult {
    let value = strip_link(required(call, "footer icon")?);
    footer_mut(call.env.embed_mut()).icon_url = Some(value);
    Ok(None)
}

/// Empty sets the current time, otherwise a unix timestamp in seconds.
fn timestamp(call: &mut TagCall<'_>) -> TagResult {
    let arg = call.arg().trim();
    let when = if arg.is_empty() {
        Utc::now()
    } else {
        let seconds: f64 = arg
            .parse()
            .map_err(|_| TagError::invalid("invalid timestamp specified"))?;
        Utc.timestamp_millis_opt((seconds * 1000.0) as i64)
            .single()
            .ok_or_else(|| TagError::invalid("invalid timestamp specified"))?
    };
    call.env.embed_mut().timestamp = Some(when);
    Ok(None)
}

fn push_field(call: &mut TagCall<'_>, inline: bool) -> TagResult {
    if call.modifier.is_empty() {
        return Err(TagError::invalid(
            "name of this field is required as a modifier",
        ));
    }
    if call.arg().is_empty() {
        return Err(TagError::invalid("no value specified (first argument)"));
    }

    let field = EmbedFieldSpec {
        name: call.modifier.clone(),
        value: call.arg().to_string(),
        inline,
    };
    call.env.embed_mut().fields.push(field);
    Ok(None)
}

fn field(call: &mut TagCall<'_>) -> TagResult {
    push_field(call, false)
}

fn inline_field(call: &mut TagCall<'_>) -> TagResult {
    push_field(call, true)
}

// ============================================================================
// COLORS
// ============================================================================

const NAMED_COLORS: &[(&str, u32)] = &[
    ("default", 0x000000),
    ("teal", 0x1abc9c),
    ("dark_teal", 0x11806a),
    ("brand_green", 0x57f287),
    ("green", 0x2ecc71),
    ("dark_green", 0x1f8b4c),
    ("blue", 0x3498db),
    ("dark_blue", 0x206694),
    ("purple", 0x9b59b6),
    ("dark_purple", 0x71368a),
    ("magenta", 0xe91e63),
    ("dark_magenta", 0xad1457),
    ("gold", 0xf1c40f),
    ("dark_gold", 0xc27c0e),
    ("orange", 0xe67e22),
    ("dark_orange", 0xa84300),
    ("brand_red", 0xed4245),
    ("red", 0xe74c3c),
    ("dark_red", 0x992d22),
    ("lighter_grey", 0x95a5a6),
    ("lighter_gray", 0x95a5a6),
    ("dark_grey", 0x607d8b),
    ("dark_gray", 0x607d8b),
    ("light_grey", 0x979c9f),
    ("light_gray", 0x979c9f),
    ("darker_grey", 0x546e7a),
    ("darker_gray", 0x546e7a),
    ("og_blurple", 0x7289da),
    ("blurple", 0x5865f2),
    ("greyple", 0x99aab5),
    ("dark_theme", 0x313338),
    ("fuchsia", 0xeb459e),
    ("yellow", 0xfee75c),
    ("pink", 0xeb459f),
    ("dark_embed", 0x2b2d31),
    ("light_embed", 0xeeeff1),
];

fn parse_hex(digits: &str) -> Option<u32> {
    let expanded: String = match digits.len() {
        3 => digits.chars().flat_map(|c| [c, c]).collect(),
        6 => digits.to_string(),
        _ => return None,
    };
    u32::from_str_radix(&expanded, 16).ok()
}

fn parse_rgb(text: &str) -> Option<u32> {
    let inner = text.strip_prefix("rgb")?.trim();
    let inner = inner.strip_prefix('(')?.strip_suffix(')')?;
    let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
    let [r, g, b] = parts.as_slice() else {
        return None;
    };

    let channel = |raw: &str| -> Option<u32> {
        let value = match raw.strip_suffix('%') {
            Some(pct) => (pct.parse::<f64>().ok()? / 100.0 * 255.0).round(),
            None => raw.parse::<f64>().ok()?,
        };
        (0.0..=255.0).contains(&value).then_some(value as u32)
    };

    Some((channel(r)? << 16) | (channel(g)? << 8) | channel(b)?)
}

/// Parse `#rgb`, `#rrggbb`, `0xrrggbb`, `rgb(r, g, b)` or a named color.
pub fn parse_color(text: &str) -> Option<u32> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix('#') {
        return parse_hex(hex);
    }
    if let Some(hex) = text.strip_prefix("0x") {
        return parse_hex(hex.trim_start_matches('#'));
    }

    let lower = text.to_lowercase();
    if lower.starts_with("rgb") {
        return parse_rgb(&lower);
    }

    let key = lower.replace(' ', "_");
    if key == "random" {
        return Some(rand::random::<u32>() & 0xffffff);
    }
    NAMED_COLORS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, value)| *value)
}

#[cfg(test)]
mod tests {
    use super::parse_color;
    use crate::core::tags::environment::{Environment, TagUser};
    use crate::core::tags::parser::render;
    use crate::core::tags::registry::TagRegistry;

    fn render_embed(text: &str) -> crate::core::tags::environment::RenderedTag {
        render(
            text,
            Environment::new(TagUser::default()),
            &TagRegistry::with_defaults(),
            false,
        )
    }

    #[test]
    fn colors_parse_every_form() {
        assert_eq!(parse_color("#fff"), Some(0xffffff));
        assert_eq!(parse_color("0x1abc9c"), Some(0x1abc9c));
        assert_eq!(parse_color("rgb(255, 0, 0)"), Some(0xff0000));
        assert_eq!(parse_color("Dark Red"), Some(0x992d22));
        assert_eq!(parse_color("#12"), None);
        assert_eq!(parse_color("not a color"), None);
    }

    #[test]
    fn setters_build_an_embed() {
        let out = render_embed(
            "{embed.title:Hello}{embed.color:#ff0000}{embed.field(A):1}{embed.inline(B):2}",
        );
        assert_eq!(out.content, "");
        let embed = out.embed.expect("embed set");
        assert_eq!(embed.title.as_deref(), Some("Hello"));
        assert_eq!(embed.color, Some(0xff0000));
        assert_eq!(embed.fields.len(), 2);
        assert!(embed.fields[1].inline);
    }

    #[test]
    fn json_modifier_replaces_the_embed() {
        let out = render_embed(r#"{embed({"title": "Raw", "color": 255})}"#);
        let embed = out.embed.expect("embed set");
        assert_eq!(embed.title.as_deref(), Some("Raw"));
        assert_eq!(embed.color, Some(255));
    }

    #[test]
    fn author_and_footer_icons_keep_placeholders() {
        let out = render_embed("{embed.author.icon:<https://a/b.png>}{embed.footer.icon:x}");
        let embed = out.embed.expect("embed set");
        let author = embed.author.expect("author");
        assert_eq!(author.name, "{error: Missing author name}");
        assert_eq!(author.icon_url.as_deref(), Some("https://a/b.png"));
        assert_eq!(embed.footer.expect("footer").text, "{error: No text specified}");
    }

    #[test]
    fn setter_errors_render_inline() {
        assert_eq!(
            render_embed("{embed}").content,
            "{error: access a subtag or directly use JSON}"
        );
        assert_eq!(
            render_embed("{embed.color:nope}").content,
            "{error: invalid color specified}"
        );
        assert_eq!(
            render_embed("{embed.field:x}").content,
            "{error: name of this field is required as a modifier}"
        );
    }

    #[test]
    fn timestamp_accepts_unix_seconds() {
        let out = render_embed("{embed.timestamp:1700000000}");
        let ts = out.embed.and_then(|e| e.timestamp).expect("timestamp");
        assert_eq!(ts.timestamp(), 1_700_000_000);
    }
}
