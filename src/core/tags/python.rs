// Python-based tags.
//
// The user's code is appended to a prelude that rebuilds the invocation
// context from JSON, then the whole source is shipped to an evaluation
// service. Replies come back as framed JSON lines on stdout.

use super::environment::{CdnAsset, EmbedSpec, TagButton, TagUser, MAX_BUTTONS};
use crate::core::formatting::cutoff;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

const PRELUDE: &str = include_str!("../../../assets/pytag_prelude.py");
const CONTEXT_PLACEHOLDER: &str = "__LAMBDA_CONTEXT__";

pub const MAX_RESPONSES: usize = 5;
pub const MAX_CONTENT_LENGTH: usize = 2000;
pub const MAX_ERROR_OUTPUT: usize = 1900;
/// Exit code the prelude uses for `exit("message")`.
pub const USER_EXIT_CODE: i32 = 2468;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Code evaluation request failed: {0}")]
    Request(String),
    #[error("Code evaluation service returned an invalid response: {0}")]
    InvalidResponse(String),
    #[error("Failed to encode the tag context: {0}")]
    Context(String),
}

/// Raw result from the evaluation service.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct EvalOutput {
    pub returncode: i32,
    #[serde(default)]
    pub stdout: String,
}

/// Anything that can run a Python source file and report its output.
#[async_trait]
pub trait CodeEvaluator: Send + Sync {
    async fn evaluate(&self, source: &str) -> Result<EvalOutput, EvalError>;
}

// ============================================================================
// CONTEXT
// ============================================================================

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PythonAsset {
    pub path: String,
    pub animated: bool,
}

impl From<CdnAsset> for PythonAsset {
    fn from(asset: CdnAsset) -> Self {
        Self {
            path: asset.path,
            animated: asset.animated,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PythonUser {
    pub id: u64,
    pub name: String,
    pub discriminator: String,
    pub global_name: Option<String>,
    pub nick: Option<String>,
    pub bot: bool,
    pub joined_at: Option<String>,
    pub avatar: PythonAsset,
    pub display_avatar: PythonAsset,
}

impl From<&TagUser> for PythonUser {
    fn from(user: &TagUser) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            discriminator: user.discriminator.clone(),
            global_name: user.global_name.clone(),
            nick: user.nick.clone(),
            bot: user.bot,
            joined_at: user.joined_at.map(|at| at.to_rfc3339()),
            avatar: user.avatar_asset().into(),
            display_avatar: user.display_avatar_asset().into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PythonGuild {
    pub id: u64,
    pub name: String,
    pub owner_id: u64,
    pub member_count: u64,
    pub icon: Option<PythonAsset>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PythonChannel {
    pub id: u64,
    pub name: Option<String>,
    pub topic: Option<String>,
    pub nsfw: bool,
    pub slowmode: u16,
    pub position: u16,
}

/// Everything the prelude exposes to user code.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PythonTagContext {
    pub user: PythonUser,
    pub target: PythonUser,
    pub guild: Option<PythonGuild>,
    pub channel: PythonChannel,
    pub args: Vec<String>,
}

impl PythonTagContext {
    pub fn new(author: &TagUser, target: &TagUser, channel: PythonChannel, args: Vec<String>) -> Self {
        Self {
            user: author.into(),
            target: target.into(),
            guild: None,
            channel,
            args,
        }
    }

    pub fn with_guild(mut self, guild: Option<PythonGuild>) -> Self {
        self.guild = guild;
        self
    }
}

/// Prelude plus user code.
///
/// The context goes in as a JSON document inside a string literal. JSON
/// string escapes are valid Python, so nothing the user controls is ever
/// spliced in as code.
pub fn build_source(context: &PythonTagContext, code: &str) -> Result<String, EvalError> {
    let json = serde_json::to_string(context).map_err(|e| EvalError::Context(e.to_string()))?;
    let literal = serde_json::to_string(&json).map_err(|e| EvalError::Context(e.to_string()))?;

    let mut source = PRELUDE.replacen(CONTEXT_PLACEHOLDER, &literal, 1);
    source.push('\n');
    source.push_str(code);
    Ok(source)
}

// ============================================================================
// OUTPUT
// ============================================================================

fn frame_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"\x0e\x00:\x01(.+)\x01\x02\r?\n").expect("frame pattern is valid")
    })
}

#[derive(Debug, Deserialize)]
struct Frame {
    op: String,
    #[serde(default)]
    d: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RespondPayload {
    content: Option<String>,
    embeds: Option<Vec<EmbedSpec>>,
    buttons: Option<Vec<TagButton>>,
    reply: Option<bool>,
}

/// One `respond(...)` call made by user code.
#[derive(Debug, Clone, PartialEq)]
pub struct PythonResponse {
    pub content: Option<String>,
    pub embeds: Vec<EmbedSpec>,
    pub buttons: Vec<TagButton>,
    pub reply: bool,
}

impl From<RespondPayload> for PythonResponse {
    fn from(payload: RespondPayload) -> Self {
        let content = payload
            .content
            .map(|c| cutoff(&c, MAX_CONTENT_LENGTH, true))
            .filter(|c| !c.is_empty());
        let mut buttons = payload.buttons.unwrap_or_default();
        buttons.truncate(MAX_BUTTONS);

        Self {
            content,
            embeds: payload.embeds.unwrap_or_default(),
            buttons,
            reply: payload.reply.unwrap_or(true),
        }
    }
}

/// What running a Python tag amounts to.
#[derive(Debug, Clone, PartialEq)]
pub enum PythonTagOutcome {
    /// Messages to send, in order. May be empty.
    Responses(Vec<PythonResponse>),
    /// A single plain message explaining why the code failed.
    Failure(String),
}

/// Remove every frame, leaving what the code printed on its own.
pub fn strip_frames(output: &str) -> String {
    frame_regex().replace_all(output, "").into_owned()
}

fn failure_message(returncode: i32, output: &str) -> String {
    let plain = strip_frames(output);

    match returncode {
        137 | 143 => "Execution timed out".to_string(),
        USER_EXIT_CODE => plain,
        _ if plain.is_empty() => format!(
            "A runtime error occured during execution: Exited with non-zero return code: {returncode}"
        ),
        _ => format!(
            "A runtime error occured during execution: ```py\n{}\n```",
            cutoff(&plain, MAX_ERROR_OUTPUT, true)
        ),
    }
}

/// Turn the evaluation result into responses or a failure message.
///
/// Frames that are not valid JSON or use an unknown op are skipped.
pub fn interpret(result: &EvalOutput) -> PythonTagOutcome {
    if result.returncode != 0 {
        return PythonTagOutcome::Failure(failure_message(result.returncode, &result.stdout));
    }

    let responses = frame_regex()
        .captures_iter(&result.stdout)
        .filter_map(|caps| serde_json::from_str::<Frame>(&caps[1]).ok())
        .filter(|frame| frame.op == "respond")
        .filter_map(|frame| serde_json::from_value::<RespondPayload>(frame.d).ok())
        .take(MAX_RESPONSES)
        .map(PythonResponse::from)
        .collect();

    PythonTagOutcome::Responses(responses)
}

/// Runs Python tags through a [`CodeEvaluator`].
pub struct PythonTagRunner<E: CodeEvaluator> {
    evaluator: E,
}

impl<E: CodeEvaluator> PythonTagRunner<E> {
    pub fn new(evaluator: E) -> Self {
        Self { evaluator }
    }

    pub async fn run(
        &self,
        context: &PythonTagContext,
        code: &str,
    ) -> Result<PythonTagOutcome, EvalError> {
        let source = build_source(context, code)?;
        let result = self.evaluator.evaluate(&source).await?;

        tracing::debug!(
            returncode = result.returncode,
            output_len = result.stdout.len(),
            "Python tag finished"
        );
        Ok(interpret(&result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn frame(json: &str) -> String {
        format!("\x0e\x00:\x01{json}\x01\x02\n")
    }

    struct RecordingEvaluator {
        sources: Mutex<Vec<String>>,
        output: EvalOutput,
    }

    #[async_trait]
    impl CodeEvaluator for RecordingEvaluator {
        async fn evaluate(&self, source: &str) -> Result<EvalOutput, EvalError> {
            self.sources.lock().unwrap().push(source.to_string());
            Ok(self.output.clone())
        }
    }

    fn context() -> PythonTagContext {
        let user = TagUser {
            id: 5,
            name: "a\"b'\nc".into(),
            discriminator: "0".into(),
            ..TagUser::default()
        };
        let channel = PythonChannel {
            id: 9,
            name: Some("general".into()),
            topic: None,
            nsfw: false,
            slowmode: 0,
            position: 0,
        };
        PythonTagContext::new(&user, &user, channel, vec!["x".into()])
    }

    #[test]
    fn source_embeds_context_as_a_string_literal() {
        let source = build_source(&context(), "respond('hi')").unwrap();
        assert!(!source.contains(CONTEXT_PLACEHOLDER));
        assert!(source.ends_with("\nrespond('hi')"));

        let line = source
            .lines()
            .find(|l| l.starts_with("_LAMBDA_CONTEXT = "))
            .expect("context line");
        let literal = line
            .trim_start_matches("_LAMBDA_CONTEXT = _lambda_json.loads(")
            .trim_end_matches(')');
        let json: String = serde_json::from_str(literal).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["user"]["name"], "a\"b'\nc");
        assert_eq!(value["args"][0], "x");
    }

    #[test]
    fn responses_are_capped_and_cut() {
        let long = "x".repeat(2500);
        let mut stdout = String::from("plain output\n");
        for _ in 0..7 {
            stdout.push_str(&frame(&format!(
                r#"{{"op":"respond","d":{{"content":"{long}","embeds":null,"buttons":[],"reply":false}}}}"#
            )));
        }

        let PythonTagOutcome::Responses(responses) = interpret(&EvalOutput { returncode: 0, stdout }) else {
            panic!("expected responses");
        };
        assert_eq!(responses.len(), MAX_RESPONSES);
        assert_eq!(responses[0].content.as_ref().unwrap().chars().count(), 2000);
        assert!(!responses[0].reply);
    }

    #[test]
    fn embeds_and_buttons_decode() {
        let stdout = frame(
            r#"{"op":"respond","d":{"content":null,"embeds":[{"title":"T","color":255,"type":"rich"}],"buttons":[{"label":"Go","style":5,"response":null,"url":"https://x"}],"reply":true}}"#,
        );
        let PythonTagOutcome::Responses(responses) = interpret(&EvalOutput { returncode: 0, stdout }) else {
            panic!("expected responses");
        };
        assert_eq!(responses[0].content, None);
        assert_eq!(responses[0].embeds[0].title.as_deref(), Some("T"));
        assert_eq!(responses[0].buttons[0].url.as_deref(), Some("https://x"));
    }

    #[test]
    fn failures_map_return_codes() {
        let timed_out = interpret(&EvalOutput { returncode: 137, stdout: "x".into() });
        assert_eq!(timed_out, PythonTagOutcome::Failure("Execution timed out".into()));

        let exited = interpret(&EvalOutput { returncode: USER_EXIT_CODE, stdout: "bad input\n".into() });
        assert_eq!(exited, PythonTagOutcome::Failure("bad input\n".into()));

        let silent = interpret(&EvalOutput { returncode: 1, stdout: String::new() });
        assert_eq!(
            silent,
            PythonTagOutcome::Failure(
                "A runtime error occured during execution: Exited with non-zero return code: 1".into()
            )
        );

        let traceback = interpret(&EvalOutput { returncode: 1, stdout: "Traceback".into() });
        assert_eq!(
            traceback,
            PythonTagOutcome::Failure(
                "A runtime error occured during execution: ```py\nTraceback\n```".into()
            )
        );
    }

    #[tokio::test]
    async fn runner_sends_the_built_source() {
        let evaluator = RecordingEvaluator {
            sources: Mutex::new(Vec::new()),
            output: EvalOutput { returncode: 0, stdout: String::new() },
        };
        let runner = PythonTagRunner::new(evaluator);

        let outcome = runner.run(&context(), "pass").await.unwrap();
        assert_eq!(outcome, PythonTagOutcome::Responses(Vec::new()));
        let sources = runner.evaluator.sources.lock().unwrap();
        assert!(sources[0].ends_with("\npass"));
    }
}
