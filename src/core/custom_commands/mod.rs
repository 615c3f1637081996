pub mod custom_command_service;

pub use custom_command_service::{
    normalize_name, prepare_invocation, split_arguments, CustomCommand, CustomCommandError,
    CustomCommandService, CustomCommandStore, Invocation, Invoker, NewCustomCommand, ToggleMode,
    Toggles, MAX_NAME_LENGTH,
};
