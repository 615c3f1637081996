pub mod giveaway_service;

pub use giveaway_service::{
    check_host_permission, ends_at, validate_options, Giveaway, GiveawayError, GiveawayOptions,
    GiveawayResult, GiveawayService, GiveawayStore, GIVEAWAY_END_EVENT,
};
