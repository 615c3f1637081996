pub mod timer_manager;

pub use timer_manager::{Timer, TimerError, TimerManager, TimerStore};
