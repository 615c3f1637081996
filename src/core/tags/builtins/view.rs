use crate::core::tags::environment::{TagButton, MAX_BUTTONS};
use crate::core::tags::registry::{TagCall, TagDefinition, TagError, TagResult};

pub fn definitions() -> Vec<TagDefinition> {
    vec![
        TagDefinition::new(&["link", "url", "hyperlink", "button-link"], link).unsplit(),
        TagDefinition::new(&["button"], button).unsplit(),
    ]
}

fn push_button(call: &mut TagCall<'_>, button: TagButton) -> TagResult {
    if call.env.buttons.len() >= MAX_BUTTONS {
        return Err(TagError::invalid(format!(
            "a message can have at most {MAX_BUTTONS} buttons"
        )));
    }
    call.env.buttons.push(button);
    Ok(None)
}

fn link(call: &mut TagCall<'_>) -> TagResult {
    if call.modifier.is_empty() {
        return Err(TagError::invalid("label of this link required as a modifier"));
    }
    let url = call.arg().trim_matches(|c| c == '<' || c == ' ' || c == '>');
    if url.is_empty() {
        return Err(TagError::invalid("no url specified (first argument)"));
    }

    let button = TagButton::link(call.modifier.clone(), url);
    push_button(call, button)
}

/// Clicking answers ephemerally with the argument text.
fn button(call: &mut TagCall<'_>) -> TagResult {
    if call.modifier.is_empty() {
        return Err(TagError::invalid(
            "label of this button required as a modifier",
        ));
    }
    if call.arg().is_empty() {
        return Err(TagError::invalid(
            "no response text specified (first argument)",
        ));
    }

    let button = TagButton::respond(call.modifier.clone(), call.arg());
    push_button(call, button)
}

#[cfg(test)]
mod tests {
    use crate::core::tags::environment::{ButtonStyleSpec, Environment, TagUser};
    use crate::core::tags::parser::render;
    use crate::core::tags::registry::TagRegistry;

    fn run(text: &str) -> crate::core::tags::environment::RenderedTag {
        render(
            text,
            Environment::new(TagUser::default()),
            &TagRegistry::with_defaults(),
            false,
        )
    }

    #[test]
    fn links_and_buttons_collect_in_order() {
        let out = run("{link(Docs):<https://docs.rs>}{button(Hi):hello; there}");
        assert_eq!(out.content, "");
        assert_eq!(out.buttons.len(), 2);
        assert_eq!(out.buttons[0].style, ButtonStyleSpec::Link);
        assert_eq!(out.buttons[0].url.as_deref(), Some("https://docs.rs"));
        assert_eq!(out.buttons[1].response.as_deref(), Some("hello; there"));
    }

    #[test]
    fn missing_parts_error() {
        assert_eq!(
            run("{link:https://x}").content,
            "{error: label of this link required as a modifier}"
        );
        assert_eq!(
            run("{button(Hi)}").content,
            "{error: no response text specified (first argument)}"
        );
    }

    #[test]
    fn button_count_is_capped() {
        let text = "{button(x):y}".repeat(26);
        let out = run(&text);
        assert_eq!(out.buttons.len(), 25);
        assert!(out.content.contains("at most 25 buttons"));
    }
}
