pub mod args;
pub mod record;

pub use args::{Cli, CliCommand, RecordCliArgs};
pub use record::handle_record_command;
