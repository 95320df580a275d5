pub mod attend;
pub mod common;
pub mod completions;
pub mod config;
pub mod score;
pub mod show;
pub mod watch;
