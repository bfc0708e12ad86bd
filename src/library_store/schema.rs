//! SQLite schema definitions for the library database.
//!
//! Users own songs; each processed song has one row of stem results in
//! `splits`. Description columns hold JSON text.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP,
};

// =============================================================================
// Version 1 - Users, songs and splits
// =============================================================================

const USERS_TABLE_V1: Table = Table {
    name: "users",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text),
        sqlite_column!("username", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("email", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("hashed_password", &SqlType::Text),
        sqlite_column!(
            "is_active",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("1")
        ),
        sqlite_column!("profile_picture_url", &SqlType::Text),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
};

const SONGS_TABLE_V1: Table = Table {
    name: "songs",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "title",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'Untitled'")
        ),
        sqlite_column!("song_url", &SqlType::Text, non_null = true),
        sqlite_column!("lyrics", &SqlType::Text, non_null = true),
        sqlite_column!("description", &SqlType::Text),
        sqlite_column!(
            "owner_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "users",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_songs_owner_id", "owner_id")],
};

const SPLITS_TABLE_V1: Table = Table {
    name: "splits",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "song_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "songs",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("bass_audio_url", &SqlType::Text),
        sqlite_column!("vocals_audio_url", &SqlType::Text),
        sqlite_column!("piano_audio_url", &SqlType::Text),
        sqlite_column!("other_audio_url", &SqlType::Text),
        sqlite_column!("drum_audio_url", &SqlType::Text),
        sqlite_column!("bass_description", &SqlType::Text),
        sqlite_column!("vocals_description", &SqlType::Text),
        sqlite_column!("piano_description", &SqlType::Text),
        sqlite_column!("other_description", &SqlType::Text),
        sqlite_column!("drum_description", &SqlType::Text),
        sqlite_column!("guitar_description", &SqlType::Text),
        sqlite_column!("flute_description", &SqlType::Text),
        sqlite_column!("violin_description", &SqlType::Text),
    ],
    indices: &[("idx_splits_song_id", "song_id")],
};

// =============================================================================
// Version 2 - Song processing status
// =============================================================================

const SONGS_TABLE_V2: Table = Table {
    name: "songs",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "title",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'Untitled'")
        ),
        sqlite_column!("song_url", &SqlType::Text, non_null = true),
        sqlite_column!("lyrics", &SqlType::Text, non_null = true),
        sqlite_column!("description", &SqlType::Text),
        sqlite_column!(
            "owner_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "users",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!(
            "status",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'processing'")
        ),
    ],
    indices: &[("idx_songs_owner_id", "owner_id")],
};

/// Rows that predate the status column were only ever written after a
/// successful run.
fn migrate_v1_to_v2(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    conn.execute(
        "ALTER TABLE songs ADD COLUMN status TEXT NOT NULL DEFAULT 'processing'",
        [],
    )?;
    conn.execute("UPDATE songs SET status = 'complete'", [])?;
    Ok(())
}

pub const LIBRARY_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[USERS_TABLE_V1, SONGS_TABLE_V1, SPLITS_TABLE_V1],
        migration: None,
    },
    VersionedSchema {
        version: 2,
        tables: &[USERS_TABLE_V1, SONGS_TABLE_V2, SPLITS_TABLE_V1],
        migration: Some(migrate_v1_to_v2),
    },
];
