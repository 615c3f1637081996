use crate::core::custom_commands::split_arguments;
use crate::core::formatting::strip_codeblock;
use crate::core::tags::TagUser;
use crate::discord::custom_command_dispatch::{
    cached_tag_member, execute_python_tag, execute_tags, TagInvocation,
};
use crate::discord::flags::{parse_flags, FlagSpec};
use crate::discord::tags::{resolve_member_id, tag_user_from_member, tag_user_from_user};
use crate::discord::{Context, Error};

const TEST_FLAGS: &[FlagSpec] = &[FlagSpec::value("target", 't'), FlagSpec::value("args", 'a')];

/// What to run, split from the `--target` and `--args` flags.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TestOptions {
    body: String,
    target: Option<String>,
    args: Vec<String>,
}

fn parse_test_args(text: &str) -> Result<TestOptions, Error> {
    let flags = parse_flags(text, TEST_FLAGS)?;
    if flags.positional.is_empty() {
        return Err("Give me something to run.".into());
    }

    Ok(TestOptions {
        body: flags.positional.clone(),
        target: flags.value("target").map(str::to_string),
        args: flags.value("args").map(split_arguments).unwrap_or_default(),
    })
}

/// Build the invocation for a test run from the invoking message.
async fn invocation<'a>(
    ctx: Context<'a>,
    options: &TestOptions,
) -> Result<TagInvocation<'a>, Error> {
    let poise::Context::Prefix(prefix) = ctx else {
        return Err("This command can only be used with a prefix.".into());
    };
    let serenity_ctx = ctx.serenity_context();
    let guild_id = ctx.guild_id();

    let author = match guild_id {
        Some(_) => match prefix.msg.member(serenity_ctx).await {
            Ok(member) => tag_user_from_member(&member),
            Err(_) => tag_user_from_user(ctx.author()),
        },
        None => tag_user_from_user(ctx.author()),
    };

    let target = match (&options.target, guild_id) {
        (None, _) => None,
        (Some(_), None) => return Err("You can only pick a target inside a server.".into()),
        (Some(argument), Some(guild_id)) => {
            let member: Option<TagUser> = resolve_member_id(&serenity_ctx.cache, guild_id, argument)
                .and_then(|id| cached_tag_member(serenity_ctx, guild_id, id));
            Some(member.ok_or_else(|| format!("I couldn't find a member named `{argument}`."))?)
        }
    };

    Ok(TagInvocation {
        message: prefix.msg,
        guild_id,
        author,
        target,
        args: options.args.clone(),
    })
}

/// Format text with tag formatting, as a custom command would.
///
/// `--target <member>` sets `{target}`, which defaults to yourself.
/// `--args <arguments>` passes arguments separated by spaces. Quote ones with spaces.
#[poise::command(prefix_command, aliases("test-tag"), subcommands("python"))]
pub async fn test(
    ctx: Context<'_>,
    #[description = "Text to format"]
    #[rest]
    content: String,
) -> Result<(), Error> {
    let options = parse_test_args(&content)?;
    let invocation = invocation(ctx, &options).await?;
    execute_tags(ctx.serenity_context(), ctx.data(), invocation, &options.body).await
}

/// Run Python tag code. The code may be wrapped in a codeblock.
///
/// Takes the same `--target` and `--args` flags as `test`.
#[poise::command(prefix_command, aliases("py"))]
pub async fn python(
    ctx: Context<'_>,
    #[description = "Python code to run"]
    #[rest]
    code: String,
) -> Result<(), Error> {
    let options = parse_test_args(&code)?;
    let invocation = invocation(ctx, &options).await?;
    let code = strip_codeblock(&options.body);
    execute_python_tag(ctx.serenity_context(), ctx.data(), invocation, &code).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_and_flags_are_split() {
        let options =
            parse_test_args(r#"Second is {arg(2)} --args first "second one" --target @wumpus"#)
                .unwrap();
        assert_eq!(options.body, "Second is {arg(2)}");
        assert_eq!(options.args, vec!["first", "second one"]);
        assert_eq!(options.target.as_deref(), Some("@wumpus"));
    }

    #[test]
    fn flags_are_optional() {
        let options = parse_test_args("Hello there, {user.mention}!").unwrap();
        assert_eq!(options.body, "Hello there, {user.mention}!");
        assert!(options.args.is_empty());
        assert_eq!(options.target, None);
    }

    #[test]
    fn python_code_keeps_its_lines() {
        let options = parse_test_args("```py\nfor i in range(2):\n    respond(i)\n``` -a x").unwrap();
        assert_eq!(strip_codeblock(&options.body), "for i in range(2):\n    respond(i)");
        assert_eq!(options.args, vec!["x"]);
    }

    #[test]
    fn empty_bodies_are_rejected() {
        assert!(parse_test_args("   ").is_err());
        assert!(parse_test_args("--target @wumpus").is_err());
        assert!(parse_test_args("hi --args").is_err());
    }
}
