pub mod api;
pub mod auth;
pub mod config;
pub mod errors;
pub mod filters;
pub mod location;
pub mod map_view;
pub mod session;

use once_cell::sync::OnceCell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use api::{ApiClient, HistoryEntry, MenuSuggestion, Place, Preferences, RecommendationResult};
pub use auth::TokenStore;
pub use config::AppConfig;
pub use errors::{AppError, AppResult};
pub use filters::{Coordinates, FilterState, BUDGET_TIERS, MOOD_OPTIONS};
pub use location::{FixedPositionSource, PositionSource, UnavailablePositionSource};
pub use map_view::{
    HeadlessMapProvider, MapAvailability, MapProvider, MapScriptGate, MapSynchronizer,
    MapViewStatus, MARKER_LIMIT,
};
pub use session::{RecommendationSession, Surface};

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,menu_scout=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}
