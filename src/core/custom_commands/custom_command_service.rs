// Custom commands: per-guild commands whose response is a tag template or
// Python code. This module owns validation, storage access and the access
// checks. Running the response is up to the caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

pub const MAX_NAME_LENGTH: usize = 50;

// ============================================================================
// DOMAIN MODELS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleMode {
    Whitelist,
    Blacklist,
}

/// A stored custom command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomCommand {
    pub name: String,
    pub guild_id: u64,
    pub response: String,
    pub is_python: bool,
    /// Discord permission bits the invoker must all have.
    pub required_permissions: u64,
    pub toggled_users: Vec<u64>,
    pub toggled_roles: Vec<u64>,
    pub toggled_channels: Vec<u64>,
    pub is_whitelist_toggle: bool,
    pub created_at: DateTime<Utc>,
}

/// Who is trying to run a command, and where.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invoker {
    pub user_id: u64,
    pub channel_id: u64,
    pub role_ids: Vec<u64>,
    /// The invoker's effective permission bits in the channel.
    pub permissions: u64,
    pub is_administrator: bool,
}

impl CustomCommand {
    pub fn toggle_mode(&self) -> ToggleMode {
        if self.is_whitelist_toggle {
            ToggleMode::Whitelist
        } else {
            ToggleMode::Blacklist
        }
    }

    fn has_toggles(&self) -> bool {
        !self.toggled_users.is_empty()
            || !self.toggled_roles.is_empty()
            || !self.toggled_channels.is_empty()
    }

    fn matches_toggles(&self, invoker: &Invoker) -> bool {
        self.toggled_users.contains(&invoker.user_id)
            || self.toggled_channels.contains(&invoker.channel_id)
            || invoker
                .role_ids
                .iter()
                .any(|r| self.toggled_roles.contains(r))
    }

    /// Permission bits first, then the whitelist or blacklist.
    pub fn can_run(&self, invoker: &Invoker) -> bool {
        let has_permissions = invoker.is_administrator
            || invoker.permissions & self.required_permissions == self.required_permissions;
        if !has_permissions {
            return false;
        }

        if !self.has_toggles() {
            return true;
        }

        match self.toggle_mode() {
            ToggleMode::Whitelist => self.matches_toggles(invoker),
            ToggleMode::Blacklist => !self.matches_toggles(invoker),
        }
    }
}

/// Users, roles and channels a new command is restricted to (or from).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toggles {
    pub mode: ToggleMode,
    pub users: Vec<u64>,
    pub roles: Vec<u64>,
    pub channels: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCustomCommand {
    pub name: String,
    pub response: String,
    pub is_python: bool,
    pub required_permissions: u64,
    pub toggles: Option<Toggles>,
}

/// Arguments of a custom command invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    pub args: Vec<String>,
    /// The first argument that names a guild member.
    pub target: Option<u64>,
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum CustomCommandError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Custom command names must be between 1 and 50 characters long.")]
    InvalidNameLength,

    #[error("Custom command names cannot contain whitespace.")]
    NameContainsWhitespace,

    #[error("Cannot use the name `{0}` since a built-in command already uses it.")]
    ReservedName(String),

    #[error("A custom command named `{0}` already exists in this server.")]
    AlreadyExists(String),

    #[error("custom command '{0}' not found.")]
    NotFound(String),
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

#[async_trait]
pub trait CustomCommandStore: Send + Sync {
    /// Insert a command. Returns `false` when the name is already taken.
    async fn insert(&self, command: &CustomCommand) -> Result<bool, CustomCommandError>;

    async fn list(&self, guild_id: u64) -> Result<Vec<CustomCommand>, CustomCommandError>;

    async fn update_response(
        &self,
        guild_id: u64,
        name: &str,
        response: &str,
    ) -> Result<bool, CustomCommandError>;

    /// Delete every named command in the guild, returning how many existed.
    async fn delete_many(&self, guild_id: u64, names: &[String]) -> Result<u64, CustomCommandError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

type GuildCommands = Arc<BTreeMap<String, CustomCommand>>;

pub struct CustomCommandService<S: CustomCommandStore> {
    store: S,
    cache: DashMap<u64, GuildCommands>,
    reserved: HashSet<String>,
}

/// Trim and case-fold a command name.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

impl<S: CustomCommandStore> CustomCommandService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            cache: DashMap::new(),
            reserved: HashSet::new(),
        }
    }

    /// Names (and aliases) of built-in commands, which custom commands may not shadow.
    pub fn with_reserved_names<I, N>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: AsRef<str>,
    {
        self.reserved = names
            .into_iter()
            .map(|n| normalize_name(n.as_ref()))
            .collect();
        self
    }

    pub fn validate_name(&self, name: &str) -> Result<String, CustomCommandError> {
        let name = normalize_name(name);
        let length = name.chars().count();

        if length == 0 || length > MAX_NAME_LENGTH {
            return Err(CustomCommandError::InvalidNameLength);
        }
        if name.chars().any(char::is_whitespace) {
            return Err(CustomCommandError::NameContainsWhitespace);
        }
        if self.reserved.contains(&name) {
            return Err(CustomCommandError::ReservedName(name));
        }
        Ok(name)
    }

    async fn guild_commands(&self, guild_id: u64) -> Result<GuildCommands, CustomCommandError> {
        if let Some(commands) = self.cache.get(&guild_id) {
            return Ok(Arc::clone(&commands));
        }

        let commands: BTreeMap<String, CustomCommand> = self
            .store
            .list(guild_id)
            .await?
            .into_iter()
            .map(|c| (c.name.clone(), c))
            .collect();
        let commands = Arc::new(commands);
        self.cache.insert(guild_id, Arc::clone(&commands));
        Ok(commands)
    }

    fn invalidate(&self, guild_id: u64) {
        self.cache.remove(&guild_id);
    }

    pub async fn add(&self, guild_id: u64, new: NewCustomCommand) -> Result<CustomCommand, CustomCommandError> {
        let name = self.validate_name(&new.name)?;
        let toggles = new.toggles.unwrap_or(Toggles {
            mode: ToggleMode::Blacklist,
            users: Vec::new(),
            roles: Vec::new(),
            channels: Vec::new(),
        });

        let command = CustomCommand {
            name: name.clone(),
            guild_id,
            response: new.response,
            is_python: new.is_python,
            required_permissions: new.required_permissions,
            toggled_users: toggles.users,
            toggled_roles: toggles.roles,
            toggled_channels: toggles.channels,
            is_whitelist_toggle: toggles.mode == ToggleMode::Whitelist,
            created_at: Utc::now(),
        };

        if !self.store.insert(&command).await? {
            return Err(CustomCommandError::AlreadyExists(name));
        }
        self.invalidate(guild_id);

        tracing::info!(guild_id, name = %command.name, python = command.is_python, "Created custom command");
        Ok(command)
    }

    pub async fn get(&self, guild_id: u64, name: &str) -> Result<Option<CustomCommand>, CustomCommandError> {
        let name = normalize_name(name);
        Ok(self.guild_commands(guild_id).await?.get(&name).cloned())
    }

    /// Like [`get`](Self::get) but a missing command is an error.
    pub async fn fetch(&self, guild_id: u64, name: &str) -> Result<CustomCommand, CustomCommandError> {
        self.get(guild_id, name)
            .await?
            .ok_or_else(|| CustomCommandError::NotFound(normalize_name(name)))
    }

    /// Every command in the guild, ordered by name.
    pub async fn list(&self, guild_id: u64) -> Result<Vec<CustomCommand>, CustomCommandError> {
        Ok(self.guild_commands(guild_id).await?.values().cloned().collect())
    }

    pub async fn edit_response(
        &self,
        guild_id: u64,
        name: &str,
        response: &str,
    ) -> Result<(), CustomCommandError> {
        let name = normalize_name(name);
        if !self.store.update_response(guild_id, &name, response).await? {
            return Err(CustomCommandError::NotFound(name));
        }
        self.invalidate(guild_id);
        Ok(())
    }

    /// Delete commands by name. Returns how many were actually deleted.
    pub async fn delete_many(&self, guild_id: u64, names: &[String]) -> Result<u64, CustomCommandError> {
        let names: Vec<String> = names.iter().map(|n| normalize_name(n)).collect();
        let count = self.store.delete_many(guild_id, &names).await?;
        self.invalidate(guild_id);

        tracing::info!(guild_id, requested = names.len(), deleted = count, "Deleted custom commands");
        Ok(count)
    }
}

/// Split invocation text on whitespace, keeping double-quoted runs together.
pub fn split_arguments(text: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' if matches!(chars.peek(), Some('"')) => {
                current.push('"');
                chars.next();
                has_token = true;
            }
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    args.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }

    if has_token {
        args.push(current);
    }
    args
}

/// Build the invocation from raw argument text. `resolve_member` maps an
/// argument to a member ID when it names one.
pub fn prepare_invocation<F>(text: &str, resolve_member: F) -> Invocation
where
    F: Fn(&str) -> Option<u64>,
{
    let args = split_arguments(text);
    let target = args.iter().find_map(|a| resolve_member(a));
    Invocation { args, target }
}
