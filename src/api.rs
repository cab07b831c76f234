use std::time::Duration;

use chrono::NaiveDateTime;
use reqwest::{Client, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::auth::TokenStore;
use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::filters::{Coordinates, FilterState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Place {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub distance_meters: f64,
    pub duration_minutes: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuSuggestion {
    #[serde(rename = "menuName")]
    pub name: String,
    pub reason: String,
    pub places: Vec<Place>,
}

/// Immutable once received; each successful request replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationResult {
    pub menu_recommendations: Vec<MenuSuggestion>,
}

impl RecommendationResult {
    /// Every suggested place in server order; the map caps this itself.
    pub fn places(&self) -> Vec<Place> {
        self.menu_recommendations
            .iter()
            .flat_map(|menu| menu.places.iter().cloned())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: i64,
    #[serde(default)]
    pub weather: Option<String>,
    pub moods: String,
    pub budget: u32,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub likes: String,
    pub dislikes: String,
    pub allergies: String,
    pub diet_types: String,
    pub notes: String,
}

#[derive(Serialize)]
struct RecommendationRequest {
    // weather is omitted on purpose; the server applies its own default
    moods: Vec<String>,
    budget: u32,
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct HistoryPage {
    #[serde(default)]
    content: Vec<HistoryEntry>,
}

#[derive(Deserialize)]
struct ShareResponse {
    token: String,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(rename = "accessToken")]
    access_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignupRequest<'a> {
    username: &'a str,
    password: &'a str,
    birth_date: &'a str,
}

/// Single HTTP client for every backend endpoint. Authenticated operations
/// read the bearer token from the [`TokenStore`] at call time and fail with
/// [`AppError::Unauthenticated`] before any request is sent when it is absent.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    tokens: TokenStore,
}

impl ApiClient {
    pub fn new(config: &AppConfig, tokens: TokenStore) -> AppResult<Self> {
        let http = Client::builder()
            .user_agent(concat!("menu-scout/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        let base_url = Url::parse(&config.api_base_url)
            .map_err(|err| AppError::Config(format!("invalid API base URL: {err}")))?;
        Ok(Self {
            http,
            base_url,
            tokens,
        })
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    fn endpoint(&self, path: &str) -> AppResult<Url> {
        self.base_url
            .join(path)
            .map_err(|err| AppError::Config(format!("invalid endpoint path {path}: {err}")))
    }

    fn bearer(&self) -> AppResult<SecretString> {
        self.tokens.current().ok_or(AppError::Unauthenticated)
    }

    pub async fn recommend(
        &self,
        filters: &FilterState,
        coordinates: Coordinates,
    ) -> AppResult<RecommendationResult> {
        let token = self.bearer()?;
        let body = RecommendationRequest {
            moods: filters.selected_moods(),
            budget: filters.budget_ceiling(),
            latitude: coordinates.latitude,
            longitude: coordinates.longitude,
        };
        let response = self
            .http
            .post(self.endpoint("/api/private/recommendations")?)
            .bearer_auth(token.expose_secret())
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Server order is assumed newest-first; no client-side re-sorting.
    pub async fn fetch_history(&self) -> AppResult<Vec<HistoryEntry>> {
        let token = self.bearer()?;
        let response = self
            .http
            .get(self.endpoint("/api/private/history")?)
            .bearer_auth(token.expose_secret())
            .send()
            .await?
            .error_for_status()?;
        let page: HistoryPage = response.json().await?;
        Ok(page.content)
    }

    /// A fresh account has no stored record; an empty body parses to the
    /// all-empty default.
    pub async fn fetch_preferences(&self) -> AppResult<Preferences> {
        let token = self.bearer()?;
        let response = self
            .http
            .get(self.endpoint("/api/private/preferences")?)
            .bearer_auth(token.expose_secret())
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Preferences::default());
        }
        Ok(serde_json::from_str(&body)?)
    }

    pub async fn save_preferences(&self, preferences: &Preferences) -> AppResult<Preferences> {
        let token = self.bearer()?;
        let response = self
            .http
            .post(self.endpoint("/api/private/preferences")?)
            .bearer_auth(token.expose_secret())
            .json(preferences)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// No result identifier is sent; the server binds the token to whatever it
    /// considers the caller's latest result.
    pub async fn share_latest(&self) -> AppResult<String> {
        let token = self.bearer()?;
        let response = self
            .http
            .post(self.endpoint("/api/private/recommendations/share")?)
            .bearer_auth(token.expose_secret())
            .send()
            .await?
            .error_for_status()?;
        let share: ShareResponse = response.json().await?;
        Ok(share.token)
    }

    /// Public, unauthenticated, and idempotent for a given token.
    pub async fn resolve_shared(&self, token: &str) -> AppResult<RecommendationResult> {
        let response = self
            .http
            .get(self.endpoint(&format!("/api/public/recommendations/shared/{token}"))?)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// On success the access token lands in the token store, which notifies
    /// its subscribers.
    pub async fn login(&self, username: &str, password: &str) -> AppResult<()> {
        let response = self
            .http
            .post(self.endpoint("/api/public/auth/login")?)
            .json(&LoginRequest { username, password })
            .send()
            .await?
            .error_for_status()?;
        let login: LoginResponse = response.json().await?;
        self.tokens.set(SecretString::from(login.access_token))?;
        Ok(())
    }

    pub async fn signup(&self, username: &str, password: &str, birth_date: &str) -> AppResult<()> {
        self.http
            .post(self.endpoint("/api/public/auth/signup")?)
            .json(&SignupRequest {
                username,
                password,
                birth_date,
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
