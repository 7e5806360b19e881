pub mod config;
pub mod env;
pub mod file_config;
pub mod logger;

pub use config::*;
pub use env::{apply_env_to_opts, apply_process_env, load_dotenv};
pub use file_config::{FileConfig, apply_file_to_opts, load_file_config, parse_file_config};
pub use logger::{set_verbose, setup_logging};
