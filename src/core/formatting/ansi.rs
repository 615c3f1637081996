// ANSI escape building for Discord's ```ansi code blocks.

use std::fmt;

pub const CLEAR: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnsiColor {
    Default = 0,
    Black = 30,
    Red = 31,
    Green = 32,
    Yellow = 33,
    Blue = 34,
    Magenta = 35,
    Cyan = 36,
    White = 37,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnsiBackground {
    Default = 0,
    Black = 40,
    Red = 41,
    Green = 42,
    Yellow = 43,
    Blue = 44,
    Magenta = 45,
    Cyan = 46,
    White = 47,
}

/// One set of SGR attributes. Unset fields are left out of the escape code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnsiStyle {
    pub bold: Option<bool>,
    pub underline: Option<bool>,
    pub color: Option<AnsiColor>,
    pub background: Option<AnsiBackground>,
}

impl AnsiStyle {
    pub fn bold() -> Self {
        Self {
            bold: Some(true),
            ..Self::default()
        }
    }

    pub fn color(color: AnsiColor) -> Self {
        Self {
            color: Some(color),
            ..Self::default()
        }
    }

    pub fn with_color(mut self, color: AnsiColor) -> Self {
        self.color = Some(color);
        self
    }

    pub fn with_background(mut self, background: AnsiBackground) -> Self {
        self.background = Some(background);
        self
    }

    /// Fields set on `other` win.
    fn merged(self, other: AnsiStyle) -> Self {
        Self {
            bold: other.bold.or(self.bold),
            underline: other.underline.or(self.underline),
            color: other.color.or(self.color),
            background: other.background.or(self.background),
        }
    }

    fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn escape(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if self.bold == Some(true) {
            parts.push("1".into());
        }
        if self.underline == Some(true) {
            parts.push("4".into());
        }
        if let Some(color) = self.color.filter(|c| *c != AnsiColor::Default) {
            parts.push((color as u8).to_string());
        }
        if let Some(bg) = self.background.filter(|b| *b != AnsiBackground::Default) {
            parts.push((bg as u8).to_string());
        }

        if parts.is_empty() {
            String::new()
        } else {
            format!("\x1b[{}m", parts.join(";"))
        }
    }
}

/// Incrementally builds an ANSI-formatted string while tracking the plain text.
///
/// Styles set through [`bold`](Self::bold), [`color`](Self::color) and friends
/// persist for later appends until cleared.
#[derive(Debug, Clone, Default)]
pub struct AnsiStringBuilder {
    buffer: String,
    raw: String,
    persisted: AnsiStyle,
}

impl AnsiStringBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append text with a one-off style, resetting formatting afterwards.
    pub fn append(&mut self, text: &str, style: AnsiStyle) -> &mut Self {
        self.push(text, style, true)
    }

    /// Append text without resetting formatting afterwards.
    pub fn append_raw(&mut self, text: &str) -> &mut Self {
        self.push(text, AnsiStyle::default(), false)
    }

    fn push(&mut self, text: &str, style: AnsiStyle, clear: bool) -> &mut Self {
        let style = self.persisted.merged(style);
        if !style.is_empty() {
            self.buffer.push_str(&style.escape());
        }

        self.buffer.push_str(text);
        if clear {
            self.buffer.push_str(CLEAR);
        }
        self.raw.push_str(text);
        self
    }

    pub fn bold(&mut self, text: &str) -> &mut Self {
        self.persisted.bold = Some(true);
        self.push(text, AnsiStyle::default(), false)
    }

    pub fn no_bold(&mut self, text: &str) -> &mut Self {
        self.persisted.bold = None;
        self.reset_then(text)
    }

    pub fn underline(&mut self, text: &str) -> &mut Self {
        self.persisted.underline = Some(true);
        self.push(text, AnsiStyle::default(), false)
    }

    pub fn no_underline(&mut self, text: &str) -> &mut Self {
        self.persisted.underline = None;
        self.reset_then(text)
    }

    pub fn color(&mut self, color: AnsiColor, text: &str) -> &mut Self {
        self.persisted.color = Some(color);
        self.push(text, AnsiStyle::default(), false)
    }

    pub fn no_color(&mut self, text: &str) -> &mut Self {
        self.persisted.color = None;
        self.reset_then(text)
    }

    pub fn background(&mut self, background: AnsiBackground, text: &str) -> &mut Self {
        self.persisted.background = Some(background);
        self.push(text, AnsiStyle::default(), false)
    }

    pub fn no_background(&mut self, text: &str) -> &mut Self {
        self.persisted.background = None;
        self.reset_then(text)
    }

    // Terminals cannot unset a single attribute portably, so reset and
    // re-apply whatever is still persisted.
    fn reset_then(&mut self, text: &str) -> &mut Self {
        self.buffer.push_str(CLEAR);
        self.push(text, AnsiStyle::default(), false)
    }

    pub fn clear_formatting(&mut self) -> &mut Self {
        self.buffer.push_str(CLEAR);
        self.persisted = AnsiStyle::default();
        self
    }

    pub fn build(&self) -> String {
        self.buffer.clone()
    }

    /// The text without any escape codes.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn raw_len(&self) -> usize {
        self.raw.chars().count()
    }
}

impl fmt::Display for AnsiStringBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.buffer)
    }
}
