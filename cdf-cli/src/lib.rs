pub mod cli;
pub mod client;
pub mod context;
pub mod prompt;

pub use cli::{run, Cli, Commands, FilesCommand};
