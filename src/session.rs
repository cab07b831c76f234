use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::api::{ApiClient, HistoryEntry, Preferences, RecommendationResult};
use crate::errors::{AppError, AppResult};
use crate::filters::{Coordinates, FilterState};
use crate::location::PositionSource;
use crate::map_view::{
    MapAvailability, MapProvider, MapScriptGate, MapSynchronizer, MapViewStatus,
};

/// Mutually exclusive top-level views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// Input form plus the latest result.
    Recommend,
    History,
    Preferences,
}

struct SessionState {
    surface: Surface,
    filters: FilterState,
    map: MapSynchronizer,
    result: Option<RecommendationResult>,
    history: Vec<HistoryEntry>,
    history_epoch: u64,
    preferences: Preferences,
    preferences_epoch: u64,
    /// Deliberately not cleared when a new result arrives; a previously issued
    /// token keeps resolving to the result it was bound to.
    share_token: Option<String>,
}

/// Orchestrates the recommendation workflow: surface transitions, geolocation,
/// request sequencing, and the map view lifecycle. Clones share one state.
#[derive(Clone)]
pub struct RecommendationSession {
    api: ApiClient,
    position: Arc<dyn PositionSource>,
    map_gate: MapScriptGate,
    state: Arc<Mutex<SessionState>>,
}

impl RecommendationSession {
    pub fn new(
        api: ApiClient,
        position: Arc<dyn PositionSource>,
        map_provider: Arc<dyn MapProvider>,
    ) -> Self {
        Self {
            api,
            position,
            map_gate: MapScriptGate::new(map_provider.clone()),
            state: Arc::new(Mutex::new(SessionState {
                surface: Surface::Recommend,
                filters: FilterState::default(),
                map: MapSynchronizer::new(map_provider),
                result: None,
                history: Vec::new(),
                history_epoch: 0,
                preferences: Preferences::default(),
                preferences_epoch: 0,
                share_token: None,
            })),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn surface(&self) -> Surface {
        self.state.lock().surface
    }

    // ---- filter edits (input surface) ----

    pub fn toggle_mood(&self, mood: &str) {
        self.state.lock().filters.toggle_mood(mood);
    }

    pub fn selected_moods(&self) -> Vec<String> {
        self.state.lock().filters.selected_moods()
    }

    pub fn select_budget_tier(&self, ceiling: u32) {
        self.state.lock().filters.select_budget_tier(ceiling);
    }

    pub fn budget_ceiling(&self) -> u32 {
        self.state.lock().filters.budget_ceiling()
    }

    pub fn set_use_device_location(&self, enabled: bool) {
        self.state.lock().filters.set_use_device_location(enabled);
    }

    pub fn set_manual_coordinates(&self, latitude: &str, longitude: &str) {
        self.state
            .lock()
            .filters
            .set_manual_coordinates(latitude, longitude);
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        self.state.lock().filters.coordinates()
    }

    /// The submit control mirrors this exactly.
    pub fn can_submit(&self) -> bool {
        self.state.lock().filters.can_submit()
    }

    /// One-shot device position request. Failure leaves coordinates unset and
    /// is not retried; the user re-triggers. Overlapping invocations race and
    /// the last completed one wins.
    pub async fn detect_location(&self) -> Option<Coordinates> {
        match self.position.current_position().await {
            Ok(coordinates) => {
                self.state.lock().filters.set_coordinates(coordinates);
                Some(coordinates)
            }
            Err(err) => {
                warn!(?err, "geolocation unavailable; coordinates left unset");
                None
            }
        }
    }

    // ---- surface transitions ----

    /// Entering `History` fetches once per transition. Entering `Recommend`
    /// resyncs the map from the retained result; the other surfaces fetch
    /// nothing implicitly. Leaving `Recommend` unmounts the map view.
    pub async fn open(&self, surface: Surface) {
        let history_fetch = {
            let mut state = self.state.lock();
            if state.surface == Surface::Recommend && surface != Surface::Recommend {
                state.map.teardown();
            }
            state.surface = surface;
            if surface == Surface::History {
                state.history_epoch += 1;
                Some(state.history_epoch)
            } else {
                None
            }
        };

        if let Some(epoch) = history_fetch {
            self.load_history(epoch).await;
        }
        if surface == Surface::Recommend {
            if let Err(err) = self.resync_map().await {
                warn!(?err, "map resync failed on surface entry");
            }
        }
    }

    async fn load_history(&self, epoch: u64) {
        match self.api.fetch_history().await {
            Ok(entries) => {
                let mut state = self.state.lock();
                if state.surface == Surface::History && state.history_epoch == epoch {
                    state.history = entries;
                } else {
                    debug!("discarding history response for a surface that was left");
                }
            }
            Err(err) => warn!(?err, "history fetch failed; keeping previous entries"),
        }
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.state.lock().history.clone()
    }

    // ---- recommendation ----

    /// Submits the current filters. A missing token is a blocking condition
    /// for the caller to surface; a failed request keeps the previous result
    /// and reports nothing to the result panel.
    pub async fn recommend(&self) -> AppResult<Option<MapViewStatus>> {
        let (filters, coordinates) = {
            let state = self.state.lock();
            let Some(coordinates) = state.filters.coordinates() else {
                // Submission is disabled without coordinates; getting here is
                // a caller bug, not a user-facing state.
                return Err(AppError::Config(
                    "coordinates required before requesting recommendations".into(),
                ));
            };
            (state.filters.clone(), coordinates)
        };

        let result = match self.api.recommend(&filters, coordinates).await {
            Ok(result) => result,
            Err(AppError::Unauthenticated) => return Err(AppError::Unauthenticated),
            Err(err) => {
                warn!(?err, "recommendation request failed; keeping previous result");
                return Ok(None);
            }
        };

        let availability = self.map_gate.ready().await;
        let mut state = self.state.lock();
        state.result = Some(result);
        if state.surface != Surface::Recommend {
            // Late completion after navigating away: keep the result, leave
            // the torn-down map alone.
            return Ok(None);
        }
        Self::sync_map_locked(&mut state, availability).map(Some)
    }

    pub fn result(&self) -> Option<RecommendationResult> {
        self.state.lock().result.clone()
    }

    async fn resync_map(&self) -> AppResult<MapViewStatus> {
        let availability = self.map_gate.ready().await;
        let mut state = self.state.lock();
        Self::sync_map_locked(&mut state, availability)
    }

    fn sync_map_locked(
        state: &mut SessionState,
        availability: MapAvailability,
    ) -> AppResult<MapViewStatus> {
        let places = state
            .result
            .as_ref()
            .map(RecommendationResult::places)
            .unwrap_or_default();
        let user = state.filters.coordinates();
        state.map.apply(availability, &places, user)
    }

    // ---- share ----

    /// Binds a share token to the server's notion of the caller's latest
    /// result. Failures surface inline on the invoking surface.
    pub async fn share_latest(&self) -> AppResult<String> {
        let token = self.api.share_latest().await?;
        self.state.lock().share_token = Some(token.clone());
        Ok(token)
    }

    pub fn share_token(&self) -> Option<String> {
        self.state.lock().share_token.clone()
    }

    // ---- preferences ----

    /// Explicit user action; nothing loads these implicitly.
    pub async fn load_preferences(&self) -> AppResult<Preferences> {
        let epoch = {
            let mut state = self.state.lock();
            state.preferences_epoch += 1;
            state.preferences_epoch
        };
        let preferences = self.api.fetch_preferences().await?;
        let mut state = self.state.lock();
        if state.preferences_epoch == epoch {
            state.preferences = preferences.clone();
        }
        Ok(preferences)
    }

    /// Upsert, then an unconditional refetch: the stored form is
    /// authoritative, not the locally submitted one.
    pub async fn save_preferences(&self, preferences: Preferences) -> AppResult<Preferences> {
        self.api.save_preferences(&preferences).await?;
        self.load_preferences().await
    }

    pub fn preferences(&self) -> Preferences {
        self.state.lock().preferences.clone()
    }
}
