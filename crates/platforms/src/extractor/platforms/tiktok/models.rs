use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::extractor::utils::{json_id, json_path, json_str, json_u64};

/// Live-room fields pulled out of a TikTok page, whatever its state blob shape.
///
/// Every field is optional; the classifier decides from how many are present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub room_id: Option<String>,
    pub user_count: Option<u64>,
    pub start_time: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub live_status: Option<i64>,
}

const LIVE_ROOM_PATHS: &[&[&str]] = &[
    &["LiveRoom", "liveRoomInfo"],
    &["LiveRoom", "liveRoomUserInfo", "liveRoom"],
    &["__DEFAULT_SCOPE__", "webapp.live-detail", "liveRoom"],
];

const USER_PATHS: &[&[&str]] = &[
    &["LiveRoom", "liveRoomUserInfo", "user"],
    &["__DEFAULT_SCOPE__", "webapp.user-detail", "userInfo", "user"],
];

impl RoomSnapshot {
    pub fn from_state(state: &Value, account: &str) -> Self {
        let rooms: Vec<&Value> = LIVE_ROOM_PATHS
            .iter()
            .filter_map(|p| json_path(state, p))
            .collect();
        let users: Vec<&Value> = USER_PATHS
            .iter()
            .filter_map(|p| json_path(state, p))
            .chain(module_user(state, account))
            .collect();

        let room_id = rooms
            .iter()
            .find_map(|r| json_id(r, &["roomId"]).or_else(|| json_id(r, &["id_str"])))
            .or_else(|| users.iter().find_map(|u| json_id(u, &["roomId"])));

        let user_count = rooms.iter().find_map(|r| {
            json_u64(r, &["userCount"])
                .or_else(|| json_u64(r, &["liveRoomStats", "userCount"]))
                .or_else(|| json_u64(r, &["liveRoomUserInfo", "userCount"]))
        });

        let start_time = rooms
            .iter()
            .find_map(|r| json_u64(r, &["startTime"]).or_else(|| json_u64(r, &["create_time"])))
            .filter(|ts| *ts > 0)
            .and_then(unix_to_utc);

        let title = rooms
            .iter()
            .find_map(|r| {
                json_str(r, &["titleStruct", "default"]).or_else(|| json_str(r, &["title"]))
            })
            .map(str::to_string);

        let live_status = json_path(state, &["Live", "liveStatus"])
            .or_else(|| json_path(state, &["LiveModule", "data", "liveStatus"]))
            .and_then(Value::as_i64)
            .or_else(|| {
                users.iter().find_map(|u| {
                    u.get("liveStatus")
                        .and_then(Value::as_i64)
                        // The web app encodes "live" as status 2 on the user object.
                        .or_else(|| u.get("status").and_then(Value::as_i64).map(|s| i64::from(s == 2)))
                })
            })
            .or_else(|| {
                rooms
                    .iter()
                    .find_map(|r| r.get("status").and_then(Value::as_i64).map(|s| i64::from(s == 2)))
            });

        Self {
            room_id,
            user_count,
            start_time,
            title,
            live_status,
        }
    }
}

/// The `UserModule.users` entry whose `uniqueId` matches `account`.
fn module_user<'a>(state: &'a Value, account: &str) -> Option<&'a Value> {
    json_path(state, &["UserModule", "users"])?
        .as_object()?
        .values()
        .find(|u| u.get("uniqueId").and_then(Value::as_str) == Some(account))
}

/// TikTok mixes second and millisecond timestamps.
fn unix_to_utc(ts: u64) -> Option<DateTime<Utc>> {
    let secs = if ts > 10_000_000_000 { ts / 1000 } else { ts };
    Utc.timestamp_opt(i64::try_from(secs).ok()?, 0).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sigi_state_snapshot() {
        let state = json!({
            "LiveRoom": {
                "liveRoomInfo": {
                    "roomId": "7300000000000000001",
                    "userCount": 0,
                    "startTime": 1714586400,
                    "titleStruct": {"default": "evening stream"}
                }
            },
            "Live": {"liveStatus": 1}
        });
        let snapshot = RoomSnapshot::from_state(&state, "someone");
        assert_eq!(snapshot.room_id.as_deref(), Some("7300000000000000001"));
        assert_eq!(snapshot.user_count, Some(0));
        assert_eq!(snapshot.title.as_deref(), Some("evening stream"));
        assert_eq!(snapshot.live_status, Some(1));
        assert_eq!(snapshot.start_time.unwrap().timestamp(), 1714586400);
    }

    #[test]
    fn test_user_module_room() {
        let state = json!({
            "UserModule": {"users": {"x": {"uniqueId": "someone", "roomId": "55", "liveStatus": 1}}}
        });
        let snapshot = RoomSnapshot::from_state(&state, "someone");
        assert_eq!(snapshot.room_id.as_deref(), Some("55"));
        assert_eq!(snapshot.live_status, Some(1));
        assert!(snapshot.user_count.is_none());
    }

    #[test]
    fn test_millisecond_timestamps() {
        assert_eq!(unix_to_utc(1714586400000).unwrap().timestamp(), 1714586400);
    }

    #[test]
    fn test_rehydration_default_scope_snapshot() {
        let state = json!({
            "__DEFAULT_SCOPE__": {
                "webapp.live-detail": {
                    "liveRoom": {
                        "id_str": "7400000000000000002",
                        "liveRoomStats": {"userCount": 321},
                        "create_time": 1714586400000u64,
                        "title": "late night",
                        "status": 2
                    }
                },
                "webapp.user-detail": {
                    "userInfo": {"user": {"uniqueId": "someone"}}
                }
            }
        });
        let snapshot = RoomSnapshot::from_state(&state, "someone");
        assert_eq!(snapshot.room_id.as_deref(), Some("7400000000000000002"));
        assert_eq!(snapshot.user_count, Some(321));
        assert_eq!(snapshot.title.as_deref(), Some("late night"));
        assert_eq!(snapshot.start_time.unwrap().timestamp(), 1714586400);
        // Room status 2 is the web app's "live".
        assert_eq!(snapshot.live_status, Some(1));
    }

    #[test]
    fn test_user_status_mapping() {
        let live = json!({
            "__DEFAULT_SCOPE__": {"webapp.user-detail": {"userInfo": {"user": {"status": 2}}}}
        });
        assert_eq!(RoomSnapshot::from_state(&live, "someone").live_status, Some(1));

        let ended = json!({
            "__DEFAULT_SCOPE__": {"webapp.user-detail": {"userInfo": {"user": {"status": 4}}}}
        });
        assert_eq!(RoomSnapshot::from_state(&ended, "someone").live_status, Some(0));
    }
}
