use axum::http::header::COOKIE;
use axum::http::HeaderMap;

use crate::constants::DEFAULT_ROOM_ID;

const MAX_ROOM_ID_LEN: usize = 64;

/// Room ids are lowercase slugs; anything else is rejected.
pub fn sanitize_room_id(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim().to_ascii_lowercase();
    if trimmed.is_empty() || trimmed.len() > MAX_ROOM_ID_LEN {
        return None;
    }
    if !trimmed
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return None;
    }
    Some(trimmed)
}

pub fn room_id_or_default(raw: Option<&str>) -> Option<String> {
    match raw {
        None => Some(DEFAULT_ROOM_ID.to_string()),
        Some(_) => sanitize_room_id(raw),
    }
}

/// Value of the named cookie, if present and non-empty.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

pub fn session_user_id(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    cookie_value(headers, cookie_name)
}
