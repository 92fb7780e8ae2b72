//! Elimination voting and countdown engine for chat-platform deduction games,
//! exposed as a library so the platform command surface and integration tests
//! can drive the public operations.

pub mod config;
pub mod error;
pub mod game;
pub mod platform;
pub mod registry;
pub mod scheduler;
pub mod store;
