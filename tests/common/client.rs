//! HTTP client for end-to-end tests
//!
//! This module provides a high-level HTTP client that wraps reqwest
//! and provides methods for all stemsplit-server endpoints.
//!
//! When API routes or request formats change, update only this file.

use super::constants::*;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response};
use serde_json::json;
use std::time::Duration;

/// HTTP test client holding an optional bearer token
pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
    /// Access token sent as `Authorization: Bearer`
    pub token: Option<String>,
}

impl TestClient {
    /// Creates a new unauthenticated client
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self {
            client,
            base_url,
            token: None,
        }
    }

    /// Creates a client signed up and signed in as the regular test user
    ///
    /// # Panics
    ///
    /// Panics if sign-up or sign-in fails (indicates test infrastructure problem).
    pub async fn authenticated(base_url: String) -> Self {
        Self::authenticated_as(base_url, TEST_USER, TEST_EMAIL, TEST_PASS).await
    }

    /// Creates a client signed in as a freshly registered user
    pub async fn authenticated_as(
        base_url: String,
        username: &str,
        email: &str,
        password: &str,
    ) -> Self {
        let mut client = Self::new(base_url);

        let response = client.signup(username, email, password).await;
        assert_eq!(
            response.status(),
            reqwest::StatusCode::OK,
            "Test user sign-up failed: {:?}",
            response.text().await
        );

        let response = client.signin(username, password).await;
        assert_eq!(
            response.status(),
            reqwest::StatusCode::OK,
            "Test user sign-in failed: {:?}",
            response.text().await
        );
        let body: serde_json::Value = response.json().await.expect("Token response");
        client.token = body["access_token"].as_str().map(String::from);
        assert!(client.token.is_some(), "Sign-in returned no token");

        client
    }

    fn with_token(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.with_token(self.client.get(format!("{}{}", self.base_url, path)))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.with_token(self.client.post(format!("{}{}", self.base_url, path)))
    }

    // ========================================================================
    // Server
    // ========================================================================

    /// GET /
    pub async fn home(&self) -> Response {
        self.get("/").send().await.expect("Home request failed")
    }

    // ========================================================================
    // Authentication Endpoints
    // ========================================================================

    /// POST /auth/signup
    pub async fn signup(&self, username: &str, email: &str, password: &str) -> Response {
        self.post("/auth/signup")
            .json(&json!({
                "username": username,
                "email": email,
                "password": password,
            }))
            .send()
            .await
            .expect("Signup request failed")
    }

    /// POST /auth/signin
    pub async fn signin(&self, username: &str, password: &str) -> Response {
        self.post("/auth/signin")
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .expect("Signin request failed")
    }

    /// POST /auth/google
    pub async fn google_signin(&self, credential: &str) -> Response {
        self.post("/auth/google")
            .json(&json!({ "credential": credential }))
            .send()
            .await
            .expect("Google signin request failed")
    }

    /// GET /auth/users/me
    pub async fn me(&self) -> Response {
        self.get("/auth/users/me")
            .send()
            .await
            .expect("Current user request failed")
    }

    /// GET /auth/users/me authenticated through the session cookie
    pub async fn me_with_cookie(&self) -> Response {
        let token = self.token.clone().unwrap_or_default();
        self.client
            .get(format!("{}/auth/users/me", self.base_url))
            .header("cookie", format!("session_token={}", token))
            .send()
            .await
            .expect("Current user request failed")
    }

    /// Id of the signed-in user
    pub async fn my_id(&self) -> i64 {
        let body: serde_json::Value = self.me().await.json().await.expect("User body");
        body["id"].as_i64().expect("User id")
    }

    // ========================================================================
    // Processing Endpoints
    // ========================================================================

    /// POST /process/process_url
    pub async fn process_url(&self, url: &str, user_id: Option<i64>) -> Response {
        let mut body = json!({ "url": url });
        if let Some(id) = user_id {
            body["id"] = json!(id);
        }
        self.post("/process/process_url")
            .json(&body)
            .send()
            .await
            .expect("Process URL request failed")
    }

    /// POST /process/process_audio_file
    pub async fn process_audio_file(
        &self,
        user_id: i64,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Response {
        let form = Form::new()
            .text("user_id", user_id.to_string())
            .part("audio_file", Part::bytes(bytes).file_name(file_name.to_string()));
        self.post("/process/process_audio_file")
            .multipart(form)
            .send()
            .await
            .expect("Process audio file request failed")
    }

    /// Processes the test link and returns the new song id
    pub async fn processed_song(&self) -> i64 {
        let response = self.process_url(TEST_VIDEO_URL, None).await;
        assert_eq!(
            response.status(),
            reqwest::StatusCode::OK,
            "Processing failed: {:?}",
            response.text().await
        );
        let body: serde_json::Value = response.json().await.expect("Process body");
        body["songs_id"].as_i64().expect("Song id")
    }

    /// GET /process/get-lyrics/{song_id}
    pub async fn get_lyrics(&self, song_id: i64) -> Response {
        self.get(&format!("/process/get-lyrics/{}", song_id))
            .send()
            .await
            .expect("Get lyrics request failed")
    }

    /// POST /process/rewrite-lyrics/{song_id}
    pub async fn rewrite_lyrics(&self, song_id: i64, prompt: &str) -> Response {
        self.post(&format!("/process/rewrite-lyrics/{}", song_id))
            .json(&json!({ "prompt": prompt }))
            .send()
            .await
            .expect("Rewrite lyrics request failed")
    }

    /// POST /process/music-prompt/{song_id}
    pub async fn music_prompt(&self, song_id: i64) -> Response {
        self.post(&format!("/process/music-prompt/{}", song_id))
            .send()
            .await
            .expect("Music prompt request failed")
    }

    // ========================================================================
    // Analytics Endpoints
    // ========================================================================

    /// GET /analytics/songs/{song_id}
    pub async fn get_song(&self, song_id: i64) -> Response {
        self.get(&format!("/analytics/songs/{}", song_id))
            .send()
            .await
            .expect("Get song request failed")
    }

    /// GET /analytics/splits/{song_id}
    pub async fn get_split(&self, song_id: i64) -> Response {
        self.get(&format!("/analytics/splits/{}", song_id))
            .send()
            .await
            .expect("Get split request failed")
    }

    /// GET /analytics/splits/{instrument}/{song_id}
    pub async fn get_stem(&self, instrument: &str, song_id: i64) -> Response {
        self.get(&format!("/analytics/splits/{}/{}", instrument, song_id))
            .send()
            .await
            .expect("Get stem request failed")
    }

    // ========================================================================
    // Chat Endpoints
    // ========================================================================

    /// POST /chat/ask
    pub async fn ask(&self, question: &str) -> Response {
        self.post("/chat/ask")
            .json(&json!({ "question": question }))
            .send()
            .await
            .expect("Ask request failed")
    }
}
