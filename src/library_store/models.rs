//! Library data models

use crate::separation::StemKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A registered account. The password hash never leaves the store layer
/// through serialization.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub name: Option<String>,
    pub profile_picture_url: Option<String>,
    pub is_active: bool,
    #[serde(skip)]
    pub hashed_password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: Option<String>,
    pub username: String,
    pub email: String,
    /// `None` for accounts created through Google sign-in.
    pub hashed_password: Option<String>,
    pub profile_picture_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SongStatus {
    Processing,
    Complete,
    Failed,
}

impl SongStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SongStatus::Processing => "processing",
            SongStatus::Complete => "complete",
            SongStatus::Failed => "failed",
        }
    }

    pub fn from_db_str(value: &str) -> Self {
        match value {
            "complete" => SongStatus::Complete,
            "failed" => SongStatus::Failed,
            _ => SongStatus::Processing,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Song {
    pub id: i64,
    pub title: String,
    pub owner_id: i64,
    pub song_url: String,
    pub lyrics: Value,
    pub description: Option<Value>,
    pub status: SongStatus,
}

#[derive(Debug, Clone)]
pub struct NewSong {
    pub title: String,
    pub owner_id: i64,
    pub song_url: String,
    pub lyrics: Value,
    pub description: Option<Value>,
}

/// Stem results to persist for one song.
#[derive(Debug, Clone, Default)]
pub struct NewSplit {
    pub song_id: i64,
    pub audio_urls: BTreeMap<StemKind, String>,
    pub descriptions: BTreeMap<StemKind, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub id: i64,
    pub song_id: i64,
    pub audio_urls: BTreeMap<StemKind, String>,
    pub descriptions: BTreeMap<StemKind, Value>,
}

impl Split {
    /// Flat JSON shape with one `<prefix>_audio_url` / `<prefix>_description`
    /// pair per category. Categories without audio omit the URL key.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("id".to_string(), Value::from(self.id));
        map.insert("song_id".to_string(), Value::from(self.song_id));
        for kind in StemKind::ALL {
            if kind.has_audio() {
                map.insert(
                    format!("{}_audio_url", kind.column_prefix()),
                    self.audio_urls
                        .get(&kind)
                        .map(|url| Value::String(url.clone()))
                        .unwrap_or(Value::Null),
                );
            }
            map.insert(
                format!("{}_description", kind.column_prefix()),
                self.descriptions.get(&kind).cloned().unwrap_or(Value::Null),
            );
        }
        Value::Object(map)
    }
}

/// The URL and description of a single instrument within a split.
#[derive(Debug, Clone, PartialEq)]
pub struct StemInfo {
    pub kind: StemKind,
    pub audio_url: Option<String>,
    pub description: Option<Value>,
}

impl StemInfo {
    pub fn to_json(&self) -> Value {
        let prefix = self.kind.column_prefix();
        let mut map = Map::new();
        map.insert(
            format!("{}_audio_url", prefix),
            self.audio_url.clone().map(Value::String).unwrap_or(Value::Null),
        );
        map.insert(
            format!("{}_description", prefix),
            self.description.clone().unwrap_or(Value::Null),
        );
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_serialization_hides_password_hash() {
        let user = User {
            id: 3,
            email: "ada@example.com".to_string(),
            username: "ada".to_string(),
            name: None,
            profile_picture_url: None,
            is_active: true,
            hashed_password: Some("$argon2id$...".to_string()),
        };
        let value = serde_json::to_value(&user).unwrap();
        assert!(value.get("hashed_password").is_none());
        assert_eq!(value["username"], "ada");
    }

    #[test]
    fn stem_info_uses_column_prefix() {
        let info = StemInfo {
            kind: StemKind::Drums,
            audio_url: None,
            description: Some(json!({"groove_consistency": 0.9})),
        };
        assert_eq!(
            info.to_json(),
            json!({
                "drum_audio_url": null,
                "drum_description": {"groove_consistency": 0.9}
            })
        );
    }

    #[test]
    fn split_json_has_no_url_for_derived_stems() {
        let split = Split {
            id: 1,
            song_id: 2,
            audio_urls: BTreeMap::from([(StemKind::Vocals, "http://x/v.mp3".to_string())]),
            descriptions: BTreeMap::new(),
        };
        let value = split.to_json();
        assert_eq!(value["vocals_audio_url"], "http://x/v.mp3");
        assert!(value["bass_audio_url"].is_null());
        assert!(value.get("guitar_audio_url").is_none());
        assert!(value["guitar_description"].is_null());
    }
}
