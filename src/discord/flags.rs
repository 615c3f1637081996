// `--flag value` parsing for commands that take free text followed by options,
// e.g. `remind drink water in 1h --repeat 1 day --dm`.

use std::collections::HashMap;
use thiserror::Error;

/// A flag a command accepts.
#[derive(Debug, Clone, Copy)]
pub struct FlagSpec {
    pub name: &'static str,
    pub short: Option<char>,
    /// Takes no value; its presence means `true`.
    pub switch: bool,
}

impl FlagSpec {
    pub const fn value(name: &'static str, short: char) -> Self {
        Self {
            name,
            short: Some(short),
            switch: false,
        }
    }

    pub const fn switch(name: &'static str, short: char) -> Self {
        Self {
            name,
            short: Some(short),
            switch: true,
        }
    }

    fn matches(&self, token: &str) -> bool {
        if let Some(long) = token.strip_prefix("--") {
            return long.eq_ignore_ascii_case(self.name);
        }
        match (token.strip_prefix('-'), self.short) {
            (Some(short), Some(expected)) => {
                let mut chars = short.chars();
                chars.next() == Some(expected) && chars.next().is_none()
            }
            _ => false,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlagError {
    #[error("The `--{0}` flag needs a value.")]
    MissingValue(&'static str),

    #[error("The `--{0}` flag was given more than once.")]
    Duplicate(&'static str),
}

/// Text before the first flag, plus every flag that was given.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParsedFlags {
    pub positional: String,
    values: HashMap<&'static str, String>,
    switches: Vec<&'static str>,
}

impl ParsedFlags {
    pub fn value(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.switches.contains(&name)
    }
}

/// Byte spans of the whitespace-separated tokens in `text`.
fn token_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

/// Split `text` on the flags in `specs`. Values keep their original
/// whitespace, so multi-line values survive.
pub fn parse_flags(text: &str, specs: &[FlagSpec]) -> Result<ParsedFlags, FlagError> {
    let flags: Vec<(usize, usize, &FlagSpec)> = token_spans(text)
        .into_iter()
        .filter_map(|(start, end)| {
            let token = &text[start..end];
            specs
                .iter()
                .find(|spec| spec.matches(token))
                .map(|spec| (start, end, spec))
        })
        .collect();

    let first_flag = flags.first().map_or(text.len(), |(start, _, _)| *start);
    let mut parsed = ParsedFlags {
        positional: text[..first_flag].trim().to_string(),
        ..Default::default()
    };

    for (i, (_, end, spec)) in flags.iter().enumerate() {
        let value_end = flags.get(i + 1).map_or(text.len(), |(start, _, _)| *start);
        let value = text[*end..value_end].trim();

        if parsed.values.contains_key(spec.name) || parsed.is_set(spec.name) {
            return Err(FlagError::Duplicate(spec.name));
        }

        if spec.switch {
            parsed.switches.push(spec.name);
            // Anything after a switch goes back to the positional text.
            if !value.is_empty() {
                if !parsed.positional.is_empty() {
                    parsed.positional.push(' ');
                }
                parsed.positional.push_str(value);
            }
        } else if value.is_empty() {
            return Err(FlagError::MissingValue(spec.name));
        } else {
            parsed.values.insert(spec.name, value.to_string());
        }
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPECS: &[FlagSpec] = &[
        FlagSpec::value("repeat", 'r'),
        FlagSpec::switch("dm", 'd'),
    ];

    #[test]
    fn text_without_flags_is_all_positional() {
        let parsed = parse_flags("  take out the trash in 5m ", SPECS).unwrap();
        assert_eq!(parsed.positional, "take out the trash in 5m");
        assert_eq!(parsed.value("repeat"), None);
        assert!(!parsed.is_set("dm"));
    }

    #[test]
    fn long_and_short_flags_are_recognized() {
        let parsed = parse_flags("stretch in 1h --repeat 2 hours -d", SPECS).unwrap();
        assert_eq!(parsed.positional, "stretch in 1h");
        assert_eq!(parsed.value("repeat"), Some("2 hours"));
        assert!(parsed.is_set("dm"));

        let parsed = parse_flags("stretch -r 1 day", SPECS).unwrap();
        assert_eq!(parsed.value("repeat"), Some("1 day"));
    }

    #[test]
    fn values_keep_their_newlines() {
        let specs = [FlagSpec::value("message", 'm')];
        let parsed = parse_flags("prize --message line one\nline two", &specs).unwrap();
        assert_eq!(parsed.value("message"), Some("line one\nline two"));
    }

    #[test]
    fn unknown_dashes_stay_in_the_text() {
        let parsed = parse_flags("call -x at 5 -- seriously", SPECS).unwrap();
        assert_eq!(parsed.positional, "call -x at 5 -- seriously");
    }

    #[test]
    fn missing_values_and_duplicates_are_errors() {
        assert_eq!(
            parse_flags("hi --repeat", SPECS),
            Err(FlagError::MissingValue("repeat"))
        );
        assert_eq!(
            parse_flags("hi -d --dm", SPECS),
            Err(FlagError::Duplicate("dm"))
        );
    }

    #[test]
    fn text_after_a_switch_is_positional() {
        let parsed = parse_flags("--dm water plants in 3h", SPECS).unwrap();
        assert!(parsed.is_set("dm"));
        assert_eq!(parsed.positional, "water plants in 3h");
    }
}
