//! Shared constants for end-to-end tests
//!
//! When test data changes (user credentials, canned transcripts, etc.),
//! update only this file.

// ============================================================================
// Test User Credentials
// ============================================================================

/// Regular test user handle
pub const TEST_USER: &str = "testuser";

/// Regular test user email
pub const TEST_EMAIL: &str = "testuser@example.com";

/// Regular test user password
pub const TEST_PASS: &str = "testpass123";

/// A second user, used for ownership checks
pub const OTHER_USER: &str = "otheruser";

pub const OTHER_EMAIL: &str = "otheruser@example.com";

pub const OTHER_PASS: &str = "otherpass123";

// ============================================================================
// Canned Collaborator Output
// ============================================================================

/// A link the synthetic fetcher turns into a short WAV file.
pub const TEST_VIDEO_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

/// Sample rate of every generated WAV file.
pub const SAMPLE_RATE: u32 = 22050;

/// Seconds of audio in every generated WAV file.
pub const CLIP_SECONDS: f32 = 2.0;

/// Language reported by the canned transcriber.
pub const TRANSCRIPT_LANGUAGE: &str = "english";

/// LRC produced by the canned transcriber.
pub const TRANSCRIPT_LRC: &str = "[00:00.50]hello world\n[00:01.20]second line";

/// Default reply of the mock LLM server.
pub const LLM_REPLY: &str = "Bonjour le monde\nDeuxieme ligne";

/// Base URL the recording storage hands out.
pub const STORAGE_BASE_URL: &str = "https://blobs.test";

// ============================================================================
// Timeouts
// ============================================================================

/// How long to wait for the server to become ready
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// How often to poll while waiting for the server
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;

/// Timeout for each request made by the test client
pub const REQUEST_TIMEOUT_SECS: u64 = 60;
