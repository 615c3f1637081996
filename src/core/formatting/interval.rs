// Relative time parsing, e.g. "2 days 5h" or "1y, 3mo".

use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

const UNITS: [(&str, u64); 7] = [
    ("years", 86_400 * 365),
    ("months", 86_400 * 30),
    ("weeks", 604_800),
    ("days", 86_400),
    ("hours", 3_600),
    ("minutes", 60),
    ("seconds", 1),
];

fn relative_time_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(concat!(
            r"(?i)(?:(?P<years>[0-9]{1,2})\s*(?:years?|yrs?|y)[, ]*)?",
            r"(?:(?P<months>[0-9]{1,2})\s*(?:months?|mo)[, ]*)?",
            r"(?:(?P<weeks>[0-9]{1,4})\s*(?:weeks?|wks?|w)[, ]*)?",
            r"(?:(?P<days>[0-9]{1,5})\s*(?:days?|d)[, ]*)?",
            r"(?:(?P<hours>[0-9]{1,5})\s*(?:hours?|hrs?|h)[, ]*)?",
            r"(?:(?P<minutes>[0-9]{1,5})\s*(?:minutes?|mins?|m)[, ]*)?",
            r"(?:(?P<seconds>[0-9]{1,5})\s*(?:seconds?|secs?|s))?",
        ))
        .expect("relative time pattern is valid")
    })
}

/// A relative interval found inside a larger piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalMatch {
    pub duration: Duration,
    /// Byte range of the matched interval within the searched text.
    pub start: usize,
    pub end: usize,
}

/// Find the first non-empty relative interval in `text`.
///
/// Returns `None` when nothing matches or the total is zero.
pub fn parse_interval(text: &str) -> Option<IntervalMatch> {
    let regex = relative_time_regex();

    for caps in regex.captures_iter(text) {
        let whole = caps.get(0)?;
        if whole.as_str().trim().is_empty() {
            continue;
        }

        // "2 dogs" would otherwise read as two days.
        let unit_end = whole.start() + whole.as_str().trim_end_matches([',', ' ']).len();
        let glued_to_word = text[unit_end..]
            .chars()
            .next()
            .is_some_and(|c| c.is_alphabetic());
        if glued_to_word {
            continue;
        }

        let seconds: u64 = UNITS
            .iter()
            .filter_map(|(name, factor)| {
                caps.name(name)
                    .and_then(|m| m.as_str().parse::<u64>().ok())
                    .map(|value| value * factor)
            })
            .sum();

        if seconds == 0 {
            continue;
        }

        return Some(IntervalMatch {
            duration: Duration::from_secs(seconds),
            start: whole.start(),
            end: whole.end(),
        });
    }

    None
}
