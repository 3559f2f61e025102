//! Live detection and stream session tracking for creators on Twitch,
//! YouTube and TikTok.
//!
//! The [`scheduler`] polls every configured binding on a tiered cadence, the
//! [`monitor`] turns poll outcomes into debounced sessions, and consumers
//! ([`notification`], [`streak`]) receive exactly one open event per session.

pub mod config;
pub mod credentials;
pub mod database;
pub mod domain;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod notification;
pub mod scheduler;
pub mod services;
pub mod streak;

pub use error::{Error, Result};
