pub mod api;
pub mod attachments;
pub mod commands;

pub use api::{DirectoryError, MattermostDirectory, UserDirectory};
pub use attachments::{PollResponse, PollView};
pub use commands::{is_help_request, parse_poll_command, PollArguments};
