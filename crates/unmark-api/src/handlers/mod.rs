//! HTTP request handlers.

pub mod capabilities;
pub mod download;
pub mod health;
pub mod jobs;

pub use health::{health, ready};
