//! ACB - AzerothCore Builder
//!
//! Library crate for the builder: dependency management, source and module
//! cloning, the CMake/MSBuild pipeline, Repack assembly and the bundled
//! MySQL lifecycle. Front ends drive it through `commands`.

#[macro_use]
pub mod paths;

pub mod build;
pub mod commands;
pub mod config;
pub mod deps;
pub mod github;
pub mod logging;
pub mod mysql;
pub mod process;
pub mod repack;
pub mod source;
pub mod task;
pub mod utils;
