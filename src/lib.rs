#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod assets;
pub mod card;
pub mod config;
pub mod discussions;
pub mod github;
pub mod page;
pub mod profiles;
pub mod resolver;
pub mod scan;
pub mod storage;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
