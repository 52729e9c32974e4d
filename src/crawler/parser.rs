//! Artist record parsing
//!
//! Items come from the listing API as loosely-typed JSON objects. Only the
//! id and the name are mandatory; every other field falls back to a default
//! instead of rejecting the record.

use crate::storage::ArtistRecord;
use serde_json::{Map, Value};
use thiserror::Error;

/// Why a single listing item could not become an `ArtistRecord`
#[derive(Debug, Error, PartialEq)]
pub enum ArtistParseError {
    #[error("item is not a JSON object")]
    NotAnObject,

    #[error("missing or non-integer id")]
    MissingId,

    #[error("artist {0} has no name")]
    MissingName(i64),
}

/// Parses one listing item
pub fn parse_artist(item: &Value) -> Result<ArtistRecord, ArtistParseError> {
    let object = item.as_object().ok_or(ArtistParseError::NotAnObject)?;

    let id = object
        .get("id")
        .and_then(Value::as_i64)
        .ok_or(ArtistParseError::MissingId)?;

    let name = trimmed_string(object, "name");
    if name.is_empty() {
        return Err(ArtistParseError::MissingName(id));
    }

    let post_count = object
        .get("post_count")
        .and_then(Value::as_i64)
        .unwrap_or(0)
        .max(0);

    let other_names = object
        .get("other_names")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|alias| !alias.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    Ok(ArtistRecord {
        id,
        name,
        post_count,
        other_names,
        group_name: trimmed_string(object, "group_name"),
        url_string: trimmed_string(object, "url_string"),
        is_active: flag(object, "is_active", true),
        is_banned: flag(object, "is_banned", false),
        is_deleted: flag(object, "is_deleted", false),
        created_at: optional_string(object, "created_at"),
        updated_at: optional_string(object, "updated_at"),
    })
}

/// Parses every item of one page, skipping (and logging) the bad ones
pub fn parse_artists(items: &[Value], page: &str) -> Vec<ArtistRecord> {
    let mut artists = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match parse_artist(item) {
            Ok(artist) => artists.push(artist),
            Err(e) => {
                tracing::error!("Skipping item {} on page {}: {}", index, page, e);
            }
        }
    }
    artists
}

fn trimmed_string(object: &Map<String, Value>, key: &str) -> String {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn optional_string(object: &Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn flag(object: &Map<String, Value>, key: &str, default: bool) -> bool {
    object.get(key).and_then(Value::as_bool).unwrap_or(default)
}
