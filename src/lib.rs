pub mod background;
pub mod cli;
pub mod common;
pub mod config;
pub mod utils;
