//! Processors module - domain-specific processing logic
//!
//! This module contains the following submodules:
//! - `classifier`: Decides which observed paths are convertible media
//! - `video`: ffmpeg invocation, argument template and output naming
//! - `setup`: Initialization setup (logger, ffmpeg check, output folder)

pub mod classifier;
pub mod setup;
pub mod video;
