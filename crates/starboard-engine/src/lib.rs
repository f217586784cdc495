//! Reaction-driven curation engine: turns gateway events into a consistent
//! set of mirror cards in each guild's curated channel.

pub mod cache;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod locale;
pub mod locks;
pub mod platform;
pub mod render;
pub mod resolver;
pub mod settings;

#[cfg(test)]
pub(crate) mod testutil;

pub use engine::{Engine, MessageRef};
pub use error::EngineError;
pub use platform::{ChatPlatform, PlatformError};
