pub mod cli;
pub mod load_config;
pub mod notion;
pub mod render;

pub use cli::{run, Cli, Commands};
