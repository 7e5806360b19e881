//! Command-line front end and shared path/template helpers

pub mod arg_parser;
pub mod cli;
pub mod tools;

pub use arg_parser::Cli;
pub use cli::{apply_cli_to_opts, handle_run, read_prompt, resolve_opts};
pub use tools::{ArtifactLayout, path_relative_to, render_template};
