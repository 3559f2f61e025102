use regex::Regex;
use serde_json::Value;

#[inline]
pub fn capture_group_1<'a>(re: &Regex, input: &'a str) -> Option<&'a str> {
    re.captures(input)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Walk a JSON value along `path`, returning `None` on the first missing key.
pub fn json_path<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(key))
}

/// Non-empty string at `path`.
pub fn json_str<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    json_path(value, path)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// Unsigned integer at `path`, accepting numeric strings.
pub fn json_u64(value: &Value, path: &[&str]) -> Option<u64> {
    json_path(value, path).and_then(|v| {
        if let Some(n) = v.as_u64() {
            Some(n)
        } else if let Some(s) = v.as_str() {
            s.trim().parse::<u64>().ok()
        } else {
            None
        }
    })
}

/// Identifier at `path` that may be encoded as a string or a number.
///
/// `"0"` and `0` are treated as absent.
pub fn json_id(value: &Value, path: &[&str]) -> Option<String> {
    match json_path(value, path)? {
        Value::String(s) if !s.is_empty() && s != "0" => Some(s.clone()),
        Value::Number(n) if n.as_u64().is_some_and(|n| n != 0) => Some(n.to_string()),
        _ => None,
    }
}
