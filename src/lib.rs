pub mod actions;
pub mod browser;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod repl;
pub mod session;
