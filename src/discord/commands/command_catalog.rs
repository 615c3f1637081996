// Discord commands module.
// Each feature gets its own command file.

pub mod custom_commands;
pub mod giveaways;
pub mod invites;
pub mod leveling;
pub mod prefixes;
pub mod reminders;
pub mod tag_testing;

use crate::discord::{Data, Error};

/// Every built-in command, in the order they show up in help.
pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![
        custom_commands::custom_commands(),
        leveling::rank(),
        leveling::leaderboard(),
        leveling::level_config(),
        reminders::remind(),
        reminders::reminders(),
        giveaways::giveaway(),
        prefixes::prefix(),
        invites::invite_tracking(),
        tag_testing::test(),
    ]
}

/// Names and aliases of the built-in top-level commands, lowercased.
pub fn reserved_names(commands: &[poise::Command<Data, Error>]) -> Vec<String> {
    commands
        .iter()
        .flat_map(|c| std::iter::once(&c.name).chain(c.aliases.iter()))
        .map(|name| name.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flatten(commands: &[poise::Command<Data, Error>]) -> Vec<&poise::Command<Data, Error>> {
        commands
            .iter()
            .flat_map(|c| std::iter::once(c).chain(flatten(&c.subcommands)))
            .collect()
    }

    #[test]
    fn descriptions_fit_discord_limits() {
        let commands = all();
        for command in flatten(&commands) {
            let description = command.description.as_deref().unwrap_or_default();
            assert!(
                description.chars().count() <= 100,
                "description of `{}` is too long",
                command.qualified_name
            );
            assert!(command.name.chars().count() <= 32);
            for parameter in &command.parameters {
                let description = parameter.description.as_deref().unwrap_or_default();
                assert!(description.chars().count() <= 100, "{}", parameter.name);
            }
        }
    }

    #[test]
    fn reserved_names_include_aliases() {
        let names = reserved_names(&all());
        for name in ["prefix", "pf", "invite-tracking", "itr", "test", "test-tag", "level-config"] {
            assert!(names.contains(&name.to_string()), "{name}");
        }
    }
}
