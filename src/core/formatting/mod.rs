// Text helpers shared by every feature.
// Nothing in here knows about Discord beyond its markdown conventions.

pub mod ansi;
pub mod interval;
pub mod text;

pub use ansi::{AnsiColor, AnsiStringBuilder, AnsiStyle};
pub use interval::parse_interval;
pub use text::{
    cutoff, escape_markdown, format_thousands, humanize_duration, humanize_list, ordinal,
    pluralize, progress_bar, strip_codeblock,
};
