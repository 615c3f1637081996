// {user}, {member}, {author} and {target}, plus their attributes.
//
// `user` and friends accept a member ID (or mention) as modifier to look at
// someone else. `target` always reads the invocation target.

use crate::core::tags::environment::{format_datetime, CdnAsset, TagUser};
use crate::core::tags::registry::{TagCall, TagDefinition, TagError, TagResult};

pub fn definitions() -> Vec<TagDefinition> {
    vec![
        family::<false>(&["user", "member", "author"]),
        family::<true>(&["target"]),
    ]
}

fn family<const TARGET: bool>(names: &'static [&'static str]) -> TagDefinition {
    TagDefinition::new(names, tag::<TARGET>)
        .child(TagDefinition::new(&["name", "username"], name::<TARGET>))
        .child(TagDefinition::new(&["discriminator", "discrim"], discriminator::<TARGET>))
        .child(TagDefinition::new(
            &["nick", "nickname", "display-name", "display"],
            nick::<TARGET>,
        ))
        .child(TagDefinition::new(&["mention", "ping"], mention::<TARGET>))
        .child(TagDefinition::new(&["tag"], tag::<TARGET>))
        .child(TagDefinition::new(
            &["avatar", "avatar-url", "pfp", "icon"],
            avatar::<TARGET>,
        ))
        .child(TagDefinition::new(
            &[
                "display-avatar",
                "display-avatar-url",
                "display-pfp",
                "display-icon",
            ],
            display_avatar::<TARGET>,
        ))
        .child(TagDefinition::new(&["id"], id::<TARGET>))
        .child(TagDefinition::new(
            &["created", "created-at", "creation-date"],
            created::<TARGET>,
        ))
        .child(TagDefinition::new(
            &["joined", "joined-at", "join-date"],
            joined::<TARGET>,
        ))
}

fn parse_member_id(text: &str) -> Option<u64> {
    let text = text.trim();
    let text = text
        .strip_prefix("<@")
        .and_then(|t| t.strip_suffix('>'))
        .map(|t| t.trim_start_matches('!'))
        .unwrap_or(text);
    text.parse().ok()
}

fn subject<const TARGET: bool>(call: &TagCall<'_>) -> Result<TagUser, TagError> {
    if TARGET {
        return Ok(call.env.target.clone());
    }
    if call.modifier.trim().is_empty() {
        return Ok(call.env.author.clone());
    }

    parse_member_id(&call.modifier)
        .and_then(|id| call.env.members.as_ref()?.member(id))
        .ok_or_else(|| TagError::invalid("could not resolve modifier, try removing it instead."))
}

fn tag<const TARGET: bool>(call: &mut TagCall<'_>) -> TagResult {
    Ok(Some(subject::<TARGET>(call)?.tag()))
}

fn name<const TARGET: bool>(call: &mut TagCall<'_>) -> TagResult {
    Ok(Some(subject::<TARGET>(call)?.name))
}

fn discriminator<const TARGET: bool>(call: &mut TagCall<'_>) -> TagResult {
    Ok(Some(subject::<TARGET>(call)?.discriminator))
}

fn nick<const TARGET: bool>(call: &mut TagCall<'_>) -> TagResult {
    Ok(subject::<TARGET>(call)?.nick)
}

fn mention<const TARGET: bool>(call: &mut TagCall<'_>) -> TagResult {
    Ok(Some(subject::<TARGET>(call)?.mention()))
}

fn id<const TARGET: bool>(call: &mut TagCall<'_>) -> TagResult {
    Ok(Some(subject::<TARGET>(call)?.id.to_string()))
}

fn created<const TARGET: bool>(call: &mut TagCall<'_>) -> TagResult {
    Ok(Some(format_datetime(&subject::<TARGET>(call)?.created_at())))
}

fn joined<const TARGET: bool>(call: &mut TagCall<'_>) -> TagResult {
    Ok(subject::<TARGET>(call)?
        .joined_at
        .map(|at| format_datetime(&at)))
}

fn avatar<const TARGET: bool>(call: &mut TagCall<'_>) -> TagResult {
    let user = subject::<TARGET>(call)?;
    asset_url(&user.avatar_asset(), &call.args)
}

fn display_avatar<const TARGET: bool>(call: &mut TagCall<'_>) -> TagResult {
    let user = subject::<TARGET>(call)?;
    asset_url(&user.display_avatar_asset(), &call.args)
}

fn valid_asset_size(size: u32) -> bool {
    size.is_power_of_two() && (16..=4096).contains(&size)
}

/// `[]`, `[size]`, `[format]` or `[format, size]`.
fn asset_details(args: &[String]) -> Result<(Option<String>, Option<u32>), TagError> {
    let (format, size) = match args {
        [] => return Ok((None, None)),
        [only] if !only.is_empty() && only.chars().all(|c| c.is_ascii_digit()) => {
            (None, Some(only.as_str()))
        }
        [only] => (Some(only.as_str()), None),
        [format, size] => (Some(format.as_str()), Some(size.as_str())),
        _ => {
            return Err(TagError::invalid(
                "asset details must be in the form of <format> <size>",
            ))
        }
    };

    let size = match size {
        Some(raw) => match raw.trim().parse::<u32>() {
            Ok(size) if valid_asset_size(size) => Some(size),
            _ => {
                return Err(TagError::invalid(
                    "avatar size must be a power of 2 between 16 and 4096",
                ))
            }
        },
        None => None,
    };

    Ok((format.map(|f| f.trim().to_lowercase()), size))
}

fn asset_url(asset: &CdnAsset, args: &[String]) -> TagResult {
    let (format, size) = asset_details(args)?;
    Ok(Some(asset.url(format.as_deref(), size)))
}

#[cfg(test)]
mod tests {
    use crate::core::tags::environment::{Environment, MemberDirectory, TagUser};
    use crate::core::tags::parser::parse;
    use crate::core::tags::registry::TagRegistry;
    use std::sync::Arc;

    struct Members(Vec<TagUser>);

    impl MemberDirectory for Members {
        fn member(&self, user_id: u64) -> Option<TagUser> {
            self.0.iter().find(|m| m.id == user_id).cloned()
        }
    }

    fn author() -> TagUser {
        TagUser {
            id: 175928847299117063,
            name: "wumpus".into(),
            discriminator: "0".into(),
            nick: Some("Wump".into()),
            ..TagUser::default()
        }
    }

    fn other() -> TagUser {
        TagUser {
            id: 2,
            name: "nelly".into(),
            discriminator: "1234".into(),
            ..TagUser::default()
        }
    }

    fn run(text: &str) -> String {
        let mut env = Environment::new(author())
            .with_target(Some(other()))
            .with_members(Arc::new(Members(vec![author(), other()])));
        parse(text, &mut env, &TagRegistry::with_defaults(), false)
    }

    #[test]
    fn author_attributes_render() {
        assert_eq!(run("{user}"), "wumpus");
        assert_eq!(run("{author.mention}"), "<@175928847299117063>");
        assert_eq!(run("{member.nick}"), "Wump");
        assert_eq!(run("{user.id}"), "175928847299117063");
        assert_eq!(run("{user.created}"), "2016-04-30 11:18:25+00:00");
    }

    #[test]
    fn target_reads_the_invocation_target() {
        assert_eq!(run("{target}"), "nelly#1234");
        assert_eq!(run("{target.nick}"), "");
        assert_eq!(run("{target.discrim}"), "1234");
    }

    #[test]
    fn modifier_looks_up_other_members() {
        assert_eq!(run("{user.name(2)}"), "nelly");
        assert_eq!(run("{user.ping(<@!2>)}"), "<@2>");
        assert_eq!(
            run("{user.name(99)}"),
            "{error: could not resolve modifier, try removing it instead.}"
        );
    }

    #[test]
    fn avatar_arguments_are_validated() {
        assert!(run("{user.avatar:64}").ends_with(".png?size=64"));
        assert!(run("{user.pfp:webp;128}").ends_with(".webp?size=128"));
        assert_eq!(
            run("{user.avatar:100}"),
            "{error: avatar size must be a power of 2 between 16 and 4096}"
        );
        assert_eq!(
            run("{user.avatar:a;b;c}"),
            "{error: asset details must be in the form of <format> <size>}"
        );
    }
}
