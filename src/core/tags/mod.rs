// The tag language used by custom command responses.

pub mod builtins;
pub mod environment;
pub mod parser;
pub mod python;
pub mod registry;

pub use environment::{
    ButtonStyleSpec, EmbedSpec, Environment, LevelSnapshot, MemberDirectory, RenderedTag,
    TagButton, TagUser,
};
pub use parser::{parse, render};
pub use python::{
    CodeEvaluator, EvalError, EvalOutput, PythonChannel, PythonGuild, PythonResponse,
    PythonTagContext, PythonTagOutcome, PythonTagRunner,
};
pub use registry::{TagError, TagRegistry};
