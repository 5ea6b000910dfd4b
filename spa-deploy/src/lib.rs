pub mod aws;
pub mod cli;
pub mod generate;
pub mod git;
pub mod globals;
pub mod load_config;

pub use cli::{run, Cli, Commands};
