use regex::{Captures, Regex};
use std::sync::OnceLock;

/// `1` -> `1st`, `12` -> `12th`, `-3` -> `-3rd`.
pub fn ordinal(number: i64) -> String {
    let last_two = number.abs() % 100;
    let suffix = if (11..=13).contains(&last_two) {
        "th"
    } else {
        match last_two % 10 {
            1 => "st",
            2 => "nd",
            3 => "rd",
            _ => "th",
        }
    };

    format!("{number}{suffix}")
}

/// Cut a string down to `max_length` characters, appending `...` when it was cut.
///
/// With `exact` the ellipsis counts towards `max_length`.
pub fn cutoff(text: &str, max_length: usize, exact: bool) -> String {
    if text.chars().count() <= max_length {
        return text.to_string();
    }

    let keep = if exact {
        max_length.saturating_sub(3)
    } else {
        max_length
    };
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

fn pluralize_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"(?P<quantity>-?[\d.,]+) (?P<thing>[a-zA-Z ]+?)\((?P<plural>i?e?s)\)")
            .expect("pluralize pattern is valid")
    })
}

/// Resolve every `N thing(s)` marker in `text` against its quantity.
///
/// `"1 prefix(es)"` -> `"1 prefix"`, `"3 prefix(es)"` -> `"3 prefixes"`.
pub fn pluralize(text: &str) -> String {
    pluralize_regex()
        .replace_all(text, |caps: &Captures| {
            let quantity = &caps["quantity"];
            let value: f64 = quantity.replace(',', "").parse().unwrap_or(0.0);
            let suffix = if value.abs() == 1.0 { "" } else { &caps["plural"] };
            format!("{} {}{}", quantity, &caps["thing"], suffix)
        })
        .into_owned()
}

/// `["a"]` -> `a`, `["a", "b"]` -> `a and b`, `["a", "b", "c"]` -> `a, b, and c`.
pub fn humanize_list<S: AsRef<str>>(items: &[S]) -> String {
    match items {
        [] => String::new(),
        [only] => only.as_ref().to_string(),
        [first, second] => format!("{} and {}", first.as_ref(), second.as_ref()),
        [rest @ .., last] => {
            let head = rest.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(", ");
            format!("{head}, and {}", last.as_ref())
        }
    }
}

/// Human readable duration using at most `depth` units.
///
/// Months are 30 days and years are 12 of those months.
pub fn humanize_duration(seconds: f64, depth: usize) -> String {
    if seconds < 1.0 {
        return "<1 second".to_string();
    }

    let total = seconds as u64;
    let (minutes, secs) = (total / 60, total % 60);
    let (hours, minutes) = (minutes / 60, minutes % 60);
    let (days, hours) = (hours / 24, hours % 24);
    let (months, days) = (days / 30, days % 30);
    let (years, months) = (months / 12, months % 12);

    if years > 100 {
        return ">100 years".to_string();
    }

    let units = [
        (years, "year"),
        (months, "month"),
        (days, "day"),
        (hours, "hour"),
        (minutes, "minute"),
        (secs, "second"),
    ];

    let parts: Vec<String> = units
        .iter()
        .filter(|(quantity, _)| *quantity > 0)
        .take(depth)
        .map(|(quantity, unit)| {
            let plural = if *quantity == 1 { "" } else { "s" };
            format!("{quantity} {unit}{plural}")
        })
        .collect();

    humanize_list(&parts)
}

/// Bar of `length` cells plus the percentage, e.g. `▰▰▰▱▱▱ (50%)`.
pub fn progress_bar(ratio: f64, length: usize) -> String {
    let clamped = if ratio.is_nan() { 0.0 } else { ratio.clamp(0.0, 1.0) };
    let mut filled = (clamped * length as f64).round() as usize;
    if clamped > 0.0 && filled == 0 {
        filled = 1;
    }
    filled = filled.min(length);

    let bar = "▰".repeat(filled) + &"▱".repeat(length - filled);
    format!("{} ({}%)", bar, (clamped * 100.0).round() as u32)
}

/// Group digits with commas. Integral values lose their fractional part.
pub fn format_thousands(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e18 {
        return group_digits(&format!("{}", value.abs() as u64), value < 0.0, "");
    }

    let repr = format!("{}", value.abs());
    let (int_part, frac_part) = repr.split_once('.').unwrap_or((repr.as_str(), ""));
    let fraction = if frac_part.is_empty() {
        String::new()
    } else {
        format!(".{frac_part}")
    };
    group_digits(int_part, value < 0.0, &fraction)
}

fn group_digits(digits: &str, negative: bool, suffix: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 2);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if negative { "-" } else { "" };
    format!("{sign}{grouped}{suffix}")
}

/// The body of a fenced code block, language tag removed. Text that is not a
/// code block comes back trimmed.
pub fn strip_codeblock(text: &str) -> String {
    let trimmed = text.trim();
    let Some(inner) = trimmed
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    else {
        return trimmed.trim_matches('`').to_string();
    };

    match inner.split_once('\n') {
        Some((language, body)) if !language.contains(char::is_whitespace) => {
            body.trim_end().to_string()
        }
        _ => inner.trim().to_string(),
    }
}

/// Backslash-escape Discord markdown characters.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '_' | '`' | '~' | '|' | '>' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codeblocks_lose_their_fences_and_language() {
        assert_eq!(strip_codeblock("```py\nprint(1)\n```"), "print(1)");
        assert_eq!(strip_codeblock("```print(1)```"), "print(1)");
        assert_eq!(strip_codeblock("`x = 2`"), "x = 2");
        assert_eq!(strip_codeblock("  respond('hi')  "), "respond('hi')");
    }

    #[test]
    fn markdown_is_escaped() {
        assert_eq!(escape_markdown("**hi** _there_"), "\\*\\*hi\\*\\* \\_there\\_");
        assert_eq!(escape_markdown("{user}"), "{user}");
    }

    #[test]
    fn ordinals_handle_teens() {
        assert_eq!(ordinal(1), "1st");
        assert_eq!(ordinal(2), "2nd");
        assert_eq!(ordinal(3), "3rd");
        assert_eq!(ordinal(11), "11th");
        assert_eq!(ordinal(112), "112th");
        assert_eq!(ordinal(23), "23rd");
    }

    #[test]
    fn cutoff_respects_exact_mode() {
        assert_eq!(cutoff("hello", 10, false), "hello");
        assert_eq!(cutoff("hello world", 5, false), "hello...");
        assert_eq!(cutoff("hello world", 8, true), "hello...");
    }

    #[test]
    fn pluralize_picks_suffix_by_quantity() {
        assert_eq!(pluralize("Removed 1 prefix(es)."), "Removed 1 prefix.");
        assert_eq!(pluralize("Removed 3 prefix(es)."), "Removed 3 prefixes.");
        assert_eq!(pluralize("1,000 command(s)"), "1,000 commands");
    }

    #[test]
    fn humanize_list_uses_oxford_comma() {
        assert_eq!(humanize_list(&["a"]), "a");
        assert_eq!(humanize_list(&["a", "b"]), "a and b");
        assert_eq!(humanize_list(&["a", "b", "c"]), "a, b, and c");
    }

    #[test]
    fn humanize_duration_limits_depth() {
        assert_eq!(humanize_duration(0.5, 3), "<1 second");
        assert_eq!(humanize_duration(61.0, 3), "1 minute and 1 second");
        assert_eq!(humanize_duration(90061.0, 3), "1 day, 1 hour, and 1 minute");
        assert_eq!(humanize_duration(90061.0, 1), "1 day");
    }

    #[test]
    fn progress_bar_clamps() {
        assert_eq!(progress_bar(0.5, 4), "▰▰▱▱ (50%)");
        assert_eq!(progress_bar(2.0, 2), "▰▰ (100%)");
        assert_eq!(progress_bar(0.01, 4), "▰▱▱▱ (1%)");
    }

    #[test]
    fn thousands_grouping() {
        assert_eq!(format_thousands(1234567.0), "1,234,567");
        assert_eq!(format_thousands(-1000.0), "-1,000");
        assert_eq!(format_thousands(1234.5), "1,234.5");
        assert_eq!(format_thousands(12.0), "12");
    }
}
