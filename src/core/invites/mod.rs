pub mod invite_service;

pub use invite_service::{join_message, InviteError, InviteService, InviteStore, TrackedInvite};
