mod builder;
mod models;

pub use builder::{TikTok, URL_REGEX, room_classifier};
pub use models::RoomSnapshot;
