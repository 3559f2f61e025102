mod auth;
mod builder;
mod models;

pub use auth::TokenManager;
pub use builder::Twitch;
pub use builder::URL_REGEX;
