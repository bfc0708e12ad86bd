mod models;
mod schema;
mod sqlite_library_store;

pub use models::*;
pub use schema::LIBRARY_VERSIONED_SCHEMAS;
pub use sqlite_library_store::SqliteLibraryStore;

use crate::separation::StemKind;
use anyhow::Result;
use serde_json::Value;

pub trait UserStore: Send + Sync {
    /// Creates a new user and returns its id.
    /// Fails if the username or email is already taken.
    fn create_user(&self, user: &NewUser) -> Result<i64>;

    /// Returns Ok(None) if the user does not exist.
    fn get_user(&self, user_id: i64) -> Result<Option<User>>;
    fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;
    fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Deletes the user and, through the cascade, everything it owns.
    /// Returns false if the user did not exist.
    fn delete_user(&self, user_id: i64) -> Result<bool>;
}

pub trait SongStore: Send + Sync {
    /// Inserts a song in `processing` status and returns its id.
    fn create_song(&self, song: &NewSong) -> Result<i64>;
    fn get_song(&self, song_id: i64) -> Result<Option<Song>>;

    /// Replaces the lyrics document. Returns false if the song does not exist.
    fn update_song_lyrics(&self, song_id: i64, lyrics: &Value) -> Result<bool>;
    fn set_song_status(&self, song_id: i64, status: SongStatus) -> Result<()>;
    fn delete_song(&self, song_id: i64) -> Result<bool>;

    /// Persists stem results. The referenced song must exist.
    fn create_split(&self, split: &NewSplit) -> Result<i64>;

    /// Returns the first split recorded for a song.
    fn get_split_by_song_id(&self, song_id: i64) -> Result<Option<Split>>;
    fn get_stem_info(&self, song_id: i64, kind: StemKind) -> Result<Option<StemInfo>>;
}

pub trait LibraryStore: UserStore + SongStore {}

impl<T: UserStore + SongStore> LibraryStore for T {}
