// Reminders are timers with the "reminder" event. Their metadata carries
// everything needed to deliver them.

use crate::core::formatting::{humanize_duration, parse_interval};
use crate::core::timers::{Timer, TimerError, TimerManager, TimerStore};
use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub const REMINDER_EVENT: &str = "reminder";

pub const MAX_MESSAGE_LENGTH: usize = 1400;
pub const MIN_DELAY_SECONDS: i64 = 15;
pub const MAX_DELAY_SECONDS: i64 = 86_400 * 7_300;
pub const MIN_REPEAT_SECONDS: u64 = 1_800;
pub const MAX_REPEAT_SECONDS: u64 = 86_400 * 7_300;

const SUCCESS_MESSAGES: [&str; 7] = [
    "Okay",
    "Got it",
    "Alright",
    "Sure thing",
    "Ok",
    "Alright then",
    "Sure",
];

// ============================================================================
// DOMAIN MODELS
// ============================================================================

/// What a reminder timer stores alongside its expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderMetadata {
    pub message: String,
    pub author_id: u64,
    /// Channel (or DM channel) the reminder is sent to.
    pub destination_id: u64,
    pub jump_url: String,
    /// Repeat interval in seconds.
    #[serde(default)]
    pub repeat: Option<u64>,
    /// Unix timestamp of the message that created the reminder.
    pub original_creation: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reminder {
    pub id: i64,
    pub expires_at: DateTime<Utc>,
    pub metadata: ReminderMetadata,
}

impl Reminder {
    fn from_timer(timer: &Timer) -> Result<Self, ReminderError> {
        let metadata = serde_json::from_value(timer.metadata.clone())
            .map_err(|e| ReminderError::InvalidMetadata(e.to_string()))?;
        Ok(Self {
            id: timer.id,
            expires_at: timer.expires_at,
            metadata,
        })
    }
}

/// A reminder message with the time extracted from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReminder {
    pub when: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct NewReminder {
    pub when: DateTime<Utc>,
    pub message: String,
    pub author_id: u64,
    pub destination_id: u64,
    pub jump_url: String,
    pub repeat: Option<std::time::Duration>,
    pub created_at: DateTime<Utc>,
}

/// A due reminder, ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderDelivery {
    pub destination_id: u64,
    pub content: String,
    pub jump_url: String,
}

#[derive(Debug, Error)]
pub enum ReminderError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Invalid reminder data: {0}")]
    InvalidMetadata(String),

    #[error("Could not find a date from that message. Try something such as \"do the laundry in 1 hour\"")]
    NoTimeFound,

    #[error("Reminder message is too long.")]
    MessageTooLong,

    #[error("That time is in the past.")]
    InPast,

    #[error("That time is too close to now. Try something at least 15 seconds in the future.")]
    TooSoon,

    #[error("Reminder time must be under 20 years in the future.")]
    TooFar,

    #[error("Repeating interval must be between 30 minutes and 20 years.")]
    InvalidRepeat,

    #[error("Reminder with the given ID does not exist.")]
    NotFound,

    #[error("This is not your reminder.")]
    NotOwner,
}

impl From<TimerError> for ReminderError {
    fn from(error: TimerError) -> Self {
        match error {
            TimerError::StorageError(e) => Self::StorageError(e),
        }
    }
}

// ============================================================================
// PARSING AND VALIDATION
// ============================================================================

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &text[prefix.len()..])
}

/// Remove filler such as "me to" or a trailing "in" from a reminder message.
pub fn sanitize_message(message: &str) -> String {
    let mut message = message;

    for word in ["in", "to", "at"] {
        if let Some(rest) = strip_prefix_ignore_case(message, &format!("me {word} ")) {
            message = rest;
        } else if let Some(rest) = strip_prefix_ignore_case(message, &format!("{word} ")) {
            message = rest;
        }
    }

    if let Some(rest) = strip_prefix_ignore_case(message, "me ") {
        message = rest;
    }

    let lower = message.to_ascii_lowercase();
    if lower.ends_with(" in") {
        message = &message[..message.len() - 3];
    }

    message.to_string()
}

/// Pull a relative time out of `text` and keep the rest as the message.
pub fn parse_reminder(text: &str, now: DateTime<Utc>) -> Result<ParsedReminder, ReminderError> {
    let found = parse_interval(text).ok_or(ReminderError::NoTimeFound)?;
    let delta = Duration::from_std(found.duration).map_err(|_| ReminderError::TooFar)?;

    let remainder = format!(
        "{} {}",
        text[..found.start].trim_end(),
        text[found.end..].trim_start()
    );
    let message = sanitize_message(remainder.trim()).trim().to_string();
    let message = if message.is_empty() {
        "something".to_string()
    } else {
        message
    };

    Ok(ParsedReminder {
        when: now + delta,
        message,
    })
}

pub fn validate_repeat(seconds: u64) -> Result<(), ReminderError> {
    if (MIN_REPEAT_SECONDS..=MAX_REPEAT_SECONDS).contains(&seconds) {
        Ok(())
    } else {
        Err(ReminderError::InvalidRepeat)
    }
}

pub fn validate_reminder(
    when: DateTime<Utc>,
    message: &str,
    repeat: Option<u64>,
    now: DateTime<Utc>,
) -> Result<(), ReminderError> {
    if message.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(ReminderError::MessageTooLong);
    }
    if when <= now {
        return Err(ReminderError::InPast);
    }

    let delay = when - now;
    if delay < Duration::seconds(MIN_DELAY_SECONDS) {
        return Err(ReminderError::TooSoon);
    }
    if delay > Duration::seconds(MAX_DELAY_SECONDS) {
        return Err(ReminderError::TooFar);
    }

    repeat.map_or(Ok(()), validate_repeat)
}

/// The confirmation shown after a reminder is created.
pub fn success_message(reminder: &Reminder, direct_message: bool) -> String {
    let opener = SUCCESS_MESSAGES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("Okay");

    let mut content = format!(
        "{opener}, <t:{}:R>: {} (ID: {})",
        reminder.expires_at.timestamp(),
        reminder.metadata.message,
        reminder.id
    );
    if let Some(repeat) = reminder.metadata.repeat {
        content.push_str(&format!(
            "\n*Repeating every {}*",
            humanize_duration(repeat as f64, 3)
        ));
    }
    if direct_message {
        content.push_str("\n*I will DM you your reminder.*");
    }
    content
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct ReminderService<S: TimerStore> {
    timers: Arc<TimerManager<S>>,
}

impl<S: TimerStore> ReminderService<S> {
    pub fn new(timers: Arc<TimerManager<S>>) -> Self {
        Self { timers }
    }

    pub async fn create(&self, new: NewReminder, now: DateTime<Utc>) -> Result<Reminder, ReminderError> {
        let repeat = new.repeat.map(|r| r.as_secs());
        validate_reminder(new.when, &new.message, repeat, now)?;

        let metadata = ReminderMetadata {
            message: new.message,
            author_id: new.author_id,
            destination_id: new.destination_id,
            jump_url: new.jump_url,
            repeat,
            original_creation: new.created_at.timestamp(),
        };
        let value = serde_json::to_value(&metadata)
            .map_err(|e| ReminderError::InvalidMetadata(e.to_string()))?;

        let timer = self.timers.create(new.when, REMINDER_EVENT, value).await?;
        tracing::info!(id = timer.id, author_id = metadata.author_id, "Created reminder");

        Ok(Reminder {
            id: timer.id,
            expires_at: timer.expires_at,
            metadata,
        })
    }

    async fn owned_timer(&self, id: i64, author_id: u64) -> Result<(Timer, Reminder), ReminderError> {
        let timer = self
            .timers
            .get(id)
            .await?
            .filter(|t| t.event == REMINDER_EVENT)
            .ok_or(ReminderError::NotFound)?;
        let reminder = Reminder::from_timer(&timer)?;

        if reminder.metadata.author_id != author_id {
            return Err(ReminderError::NotOwner);
        }
        Ok((timer, reminder))
    }

    /// Look up a reminder that belongs to `author_id`.
    pub async fn get_owned(&self, id: i64, author_id: u64) -> Result<Reminder, ReminderError> {
        Ok(self.owned_timer(id, author_id).await?.1)
    }

    pub async fn list(&self, author_id: u64) -> Result<Vec<Reminder>, ReminderError> {
        let timers = self.timers.list_for_event(REMINDER_EVENT).await?;
        let mut reminders = Vec::new();

        for timer in &timers {
            match Reminder::from_timer(timer) {
                Ok(r) if r.metadata.author_id == author_id => reminders.push(r),
                Ok(_) => {}
                Err(e) => tracing::warn!(id = timer.id, "Skipping malformed reminder: {}", e),
            }
        }
        Ok(reminders)
    }

    pub async fn set_repeat(&self, id: i64, author_id: u64, seconds: u64) -> Result<Reminder, ReminderError> {
        validate_repeat(seconds)?;
        let (timer, mut reminder) = self.owned_timer(id, author_id).await?;

        reminder.metadata.repeat = Some(seconds);
        let value = serde_json::to_value(&reminder.metadata)
            .map_err(|e| ReminderError::InvalidMetadata(e.to_string()))?;

        if !self.timers.update_metadata(&timer, value).await? {
            return Err(ReminderError::NotFound);
        }
        Ok(reminder)
    }

    pub async fn delete(&self, id: i64, author_id: u64) -> Result<Reminder, ReminderError> {
        let (timer, reminder) = self.owned_timer(id, author_id).await?;
        if !self.timers.end_timer(&timer, false, true).await? {
            return Err(ReminderError::NotFound);
        }
        Ok(reminder)
    }

    /// Delete every pending reminder of `author_id`. Returns how many went.
    pub async fn clear(&self, author_id: u64) -> Result<usize, ReminderError> {
        let timers = self.timers.list_for_event(REMINDER_EVENT).await?;
        let mut deleted = 0;

        for timer in &timers {
            let owned = Reminder::from_timer(timer)
                .map(|r| r.metadata.author_id == author_id)
                .unwrap_or(false);
            if owned && self.timers.end_timer(timer, false, false).await? {
                deleted += 1;
            }
        }

        if deleted > 0 {
            self.timers.reschedule();
        }
        Ok(deleted)
    }

    /// Turn an expired reminder timer into a message, re-arming it when it repeats.
    pub async fn on_complete(&self, timer: &Timer) -> Result<ReminderDelivery, ReminderError> {
        let reminder = Reminder::from_timer(timer)?;
        let metadata = &reminder.metadata;

        let delivery = ReminderDelivery {
            destination_id: metadata.destination_id,
            content: format!(
                "<@{}>, here is your reminder from <t:{}:R>: {}",
                metadata.author_id, metadata.original_creation, metadata.message
            ),
            jump_url: metadata.jump_url.clone(),
        };

        if let Some(repeat) = metadata.repeat {
            let next = Utc::now() + Duration::seconds(repeat as i64);
            let value = serde_json::to_value(metadata)
                .map_err(|e| ReminderError::InvalidMetadata(e.to_string()))?;
            let rearmed = self.timers.create(next, REMINDER_EVENT, value).await?;
            tracing::debug!(old = timer.id, new = rearmed.id, "Re-armed repeating reminder");
        }

        Ok(delivery)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        timers: Mutex<Vec<Timer>>,
    }

    #[async_trait]
    impl TimerStore for MemoryStore {
        async fn insert(
            &self,
            event: &str,
            created_at: DateTime<Utc>,
            expires_at: DateTime<Utc>,
            metadata: &Value,
        ) -> Result<i64, TimerError> {
            let mut timers = self.timers.lock().unwrap();
            let id = timers.len() as i64 + 1;
            timers.push(Timer {
                id,
                event: event.to_string(),
                created_at,
                expires_at,
                metadata: metadata.clone(),
            });
            Ok(id)
        }

        async fn get(&self, id: i64) -> Result<Option<Timer>, TimerError> {
            Ok(self.timers.lock().unwrap().iter().find(|t| t.id == id).cloned())
        }

        async fn earliest(&self) -> Result<Option<Timer>, TimerError> {
            Ok(None)
        }

        async fn delete(&self, id: i64) -> Result<bool, TimerError> {
            let mut timers = self.timers.lock().unwrap();
            let before = timers.len();
            timers.retain(|t| t.id != id);
            Ok(before != timers.len())
        }

        async fn update_metadata(&self, id: i64, metadata: &Value) -> Result<bool, TimerError> {
            let mut timers = self.timers.lock().unwrap();
            Ok(timers
                .iter_mut()
                .find(|t| t.id == id)
                .map(|t| t.metadata = metadata.clone())
                .is_some())
        }

        async fn list_for_event(&self, event: &str) -> Result<Vec<Timer>, TimerError> {
            Ok(self
                .timers
                .lock()
                .unwrap()
                .iter()
                .filter(|t| t.event == event)
                .cloned()
                .collect())
        }
    }

    fn service() -> ReminderService<MemoryStore> {
        let (manager, _rx) = TimerManager::new(MemoryStore::default());
        ReminderService::new(Arc::new(manager))
    }

    fn new_reminder(author_id: u64, in_seconds: i64) -> NewReminder {
        let now = Utc::now();
        NewReminder {
            when: now + Duration::seconds(in_seconds),
            message: "walk the dog".into(),
            author_id,
            destination_id: 10,
            jump_url: "https://discord.com/channels/1/10/100".into(),
            repeat: None,
            created_at: now,
        }
    }

    #[test]
    fn filler_words_are_removed() {
        assert_eq!(sanitize_message("me to go for a walk"), "go for a walk");
        assert_eq!(sanitize_message("To feed the cat"), "feed the cat");
        assert_eq!(sanitize_message("me call mom"), "call mom");
        assert_eq!(sanitize_message("stretch in"), "stretch");
        assert_eq!(sanitize_message("tomato soup"), "tomato soup");
    }

    #[test]
    fn reminders_are_parsed_from_text() {
        let now = Utc::now();
        let parsed = parse_reminder("me to go for a walk in 15 minutes", now).unwrap();
        assert_eq!(parsed.when, now + Duration::minutes(15));
        assert_eq!(parsed.message, "go for a walk");

        let parsed = parse_reminder("2d", now).unwrap();
        assert_eq!(parsed.message, "something");

        assert!(matches!(
            parse_reminder("no time here", now),
            Err(ReminderError::NoTimeFound)
        ));
    }

    #[test]
    fn validation_rules() {
        let now = Utc::now();
        let ok = now + Duration::minutes(5);

        assert!(validate_reminder(ok, "x", None, now).is_ok());
        assert!(matches!(
            validate_reminder(ok, &"a".repeat(1401), None, now),
            Err(ReminderError::MessageTooLong)
        ));
        assert!(matches!(
            validate_reminder(now - Duration::seconds(1), "x", None, now),
            Err(ReminderError::InPast)
        ));
        assert!(matches!(
            validate_reminder(now + Duration::seconds(10), "x", None, now),
            Err(ReminderError::TooSoon)
        ));
        assert!(matches!(
            validate_reminder(now + Duration::days(7_301), "x", None, now),
            Err(ReminderError::TooFar)
        ));
        assert!(matches!(
            validate_reminder(ok, "x", Some(60), now),
            Err(ReminderError::InvalidRepeat)
        ));
        assert!(validate_reminder(ok, "x", Some(3_600), now).is_ok());
    }

    #[tokio::test]
    async fn ownership_is_checked() {
        let service = service();
        let reminder = service
            .create(new_reminder(1, 3_600), Utc::now())
            .await
            .unwrap();

        assert!(matches!(
            service.get_owned(reminder.id, 2).await,
            Err(ReminderError::NotOwner)
        ));
        assert!(matches!(
            service.get_owned(999, 1).await,
            Err(ReminderError::NotFound)
        ));

        let repeated = service.set_repeat(reminder.id, 1, 7_200).await.unwrap();
        assert_eq!(repeated.metadata.repeat, Some(7_200));
        assert_eq!(
            service.get_owned(reminder.id, 1).await.unwrap().metadata.repeat,
            Some(7_200)
        );

        service.delete(reminder.id, 1).await.unwrap();
        assert!(service.list(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_and_clear_cover_short_and_stored_reminders() {
        let service = service();
        service.create(new_reminder(1, 30), Utc::now()).await.unwrap();
        service.create(new_reminder(1, 7_200), Utc::now()).await.unwrap();
        service.create(new_reminder(2, 7_200), Utc::now()).await.unwrap();

        let listed = service.list(1).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].id < 0);

        assert_eq!(service.clear(1).await.unwrap(), 2);
        assert!(service.list(1).await.unwrap().is_empty());
        assert_eq!(service.list(2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn completion_formats_and_rearms() {
        let service = service();
        let mut new = new_reminder(7, 3_600);
        new.repeat = Some(std::time::Duration::from_secs(3_600));
        let created = new.created_at.timestamp();
        let reminder = service.create(new, Utc::now()).await.unwrap();

        let timer = service.timers.get(reminder.id).await.unwrap().unwrap();
        service.timers.end_timer(&timer, false, false).await.unwrap();

        let delivery = service.on_complete(&timer).await.unwrap();
        assert_eq!(delivery.destination_id, 10);
        assert_eq!(
            delivery.content,
            format!("<@7>, here is your reminder from <t:{created}:R>: walk the dog")
        );
        assert_eq!(service.list(7).await.unwrap().len(), 1);
    }

    #[test]
    fn success_message_mentions_repeat_and_dm() {
        let reminder = Reminder {
            id: 3,
            expires_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            metadata: ReminderMetadata {
                message: "stretch".into(),
                author_id: 1,
                destination_id: 2,
                jump_url: String::new(),
                repeat: Some(3_600),
                original_creation: 0,
            },
        };

        let message = success_message(&reminder, true);
        assert!(message.ends_with(
            ", <t:1700000000:R>: stretch (ID: 3)\n*Repeating every 1 hour*\n*I will DM you your reminder.*"
        ));
    }
}
