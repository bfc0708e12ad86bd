use super::models::{NewSong, NewSplit, NewUser, Song, SongStatus, Split, StemInfo, User};
use super::schema::LIBRARY_VERSIONED_SCHEMAS;
use super::{SongStore, UserStore};
use crate::separation::StemKind;
use crate::sqlite_persistence::open_versioned;
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, params_from_iter, types::Value as SqlValue, Connection, OptionalExtension};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

const USER_COLUMNS: &str =
    "id, email, username, name, profile_picture_url, is_active, hashed_password";

const SONG_COLUMNS: &str = "id, title, owner_id, song_url, lyrics, description, status";

#[derive(Clone)]
pub struct SqliteLibraryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLibraryStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned(db_path, LIBRARY_VERSIONED_SCHEMAS, "library")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Library database connection lock poisoned"))
    }
}

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        name: row.get(3)?,
        profile_picture_url: row.get(4)?,
        is_active: row.get::<_, i64>(5)? != 0,
        hashed_password: row.get(6)?,
    })
}

fn parse_json_column(raw: Option<String>) -> Option<Value> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
}

fn row_to_song(row: &rusqlite::Row) -> rusqlite::Result<Song> {
    let lyrics: String = row.get(4)?;
    let status: String = row.get(6)?;
    Ok(Song {
        id: row.get(0)?,
        title: row.get(1)?,
        owner_id: row.get(2)?,
        song_url: row.get(3)?,
        lyrics: serde_json::from_str(&lyrics).unwrap_or(Value::Object(Default::default())),
        description: parse_json_column(row.get(5)?),
        status: SongStatus::from_db_str(&status),
    })
}

impl UserStore for SqliteLibraryStore {
    fn create_user(&self, user: &NewUser) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (name, username, email, hashed_password, profile_picture_url)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.name,
                user.username,
                user.email,
                user.hashed_password,
                user.profile_picture_url
            ],
        )
        .with_context(|| format!("Failed to create user {}", user.username))?;
        Ok(conn.last_insert_rowid())
    }

    fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                params![user_id],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS),
                params![username],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
                params![email],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    fn delete_user(&self, user_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM users WHERE id = ?1", params![user_id])?;
        Ok(deleted > 0)
    }
}

impl SongStore for SqliteLibraryStore {
    fn create_song(&self, song: &NewSong) -> Result<i64> {
        let conn = self.conn()?;
        let description = song
            .description
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        conn.execute(
            "INSERT INTO songs (title, owner_id, song_url, lyrics, description, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                song.title,
                song.owner_id,
                song.song_url,
                serde_json::to_string(&song.lyrics)?,
                description,
                SongStatus::Processing.as_str()
            ],
        )
        .context("Failed to insert song")?;
        let id = conn.last_insert_rowid();
        debug!("Created song {} for user {}", id, song.owner_id);
        Ok(id)
    }

    fn get_song(&self, song_id: i64) -> Result<Option<Song>> {
        let conn = self.conn()?;
        let song = conn
            .query_row(
                &format!("SELECT {} FROM songs WHERE id = ?1", SONG_COLUMNS),
                params![song_id],
                row_to_song,
            )
            .optional()?;
        Ok(song)
    }

    fn update_song_lyrics(&self, song_id: i64, lyrics: &Value) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE songs SET lyrics = ?1 WHERE id = ?2",
            params![serde_json::to_string(lyrics)?, song_id],
        )?;
        Ok(updated > 0)
    }

    fn set_song_status(&self, song_id: i64, status: SongStatus) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE songs SET status = ?1 WHERE id = ?2",
            params![status.as_str(), song_id],
        )?;
        Ok(())
    }

    fn delete_song(&self, song_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM songs WHERE id = ?1", params![song_id])?;
        Ok(deleted > 0)
    }

    fn create_split(&self, split: &NewSplit) -> Result<i64> {
        let mut columns = vec!["song_id".to_string()];
        let mut values = vec![SqlValue::Integer(split.song_id)];
        for kind in StemKind::ALL {
            if kind.has_audio() {
                columns.push(format!("{}_audio_url", kind.column_prefix()));
                values.push(
                    split
                        .audio_urls
                        .get(&kind)
                        .map(|url| SqlValue::Text(url.clone()))
                        .unwrap_or(SqlValue::Null),
                );
            }
            columns.push(format!("{}_description", kind.column_prefix()));
            values.push(match split.descriptions.get(&kind) {
                Some(doc) => SqlValue::Text(serde_json::to_string(doc)?),
                None => SqlValue::Null,
            });
        }
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");

        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO splits ({}) VALUES ({})",
                columns.join(", "),
                placeholders
            ),
            params_from_iter(values),
        )
        .with_context(|| format!("Failed to insert split for song {}", split.song_id))?;
        Ok(conn.last_insert_rowid())
    }

    fn get_split_by_song_id(&self, song_id: i64) -> Result<Option<Split>> {
        let conn = self.conn()?;
        let split = conn
            .query_row(
                "SELECT * FROM splits WHERE song_id = ?1 ORDER BY id LIMIT 1",
                params![song_id],
                |row| {
                    let mut audio_urls = BTreeMap::new();
                    let mut descriptions = BTreeMap::new();
                    for kind in StemKind::ALL {
                        let prefix = kind.column_prefix();
                        if kind.has_audio() {
                            let url: Option<String> =
                                row.get(format!("{}_audio_url", prefix).as_str())?;
                            if let Some(url) = url {
                                audio_urls.insert(kind, url);
                            }
                        }
                        let raw: Option<String> =
                            row.get(format!("{}_description", prefix).as_str())?;
                        if let Some(doc) = parse_json_column(raw) {
                            descriptions.insert(kind, doc);
                        }
                    }
                    Ok(Split {
                        id: row.get("id")?,
                        song_id: row.get("song_id")?,
                        audio_urls,
                        descriptions,
                    })
                },
            )
            .optional()?;
        Ok(split)
    }

    fn get_stem_info(&self, song_id: i64, kind: StemKind) -> Result<Option<StemInfo>> {
        let prefix = kind.column_prefix();
        let url_column = if kind.has_audio() {
            format!("{}_audio_url", prefix)
        } else {
            "NULL".to_string()
        };
        let conn = self.conn()?;
        let info = conn
            .query_row(
                &format!(
                    "SELECT {}, {}_description FROM splits WHERE song_id = ?1 ORDER BY id LIMIT 1",
                    url_column, prefix
                ),
                params![song_id],
                |row| {
                    Ok(StemInfo {
                        kind,
                        audio_url: row.get(0)?,
                        description: parse_json_column(row.get(1)?),
                    })
                },
            )
            .optional()?;
        Ok(info)
    }
}
