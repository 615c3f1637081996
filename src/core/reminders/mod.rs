pub mod reminder_service;

pub use reminder_service::{
    parse_reminder, success_message, NewReminder, Reminder, ReminderDelivery, ReminderMetadata,
    ReminderService, REMINDER_EVENT,
};
