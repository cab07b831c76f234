use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Fixed mood vocabulary presented by the input surface.
pub const MOOD_OPTIONS: &[&str] = &["든든", "가볍", "달달", "매콤"];

/// Budget ceilings presented as mutually exclusive tiers.
pub const BUDGET_TIERS: &[u32] = &[5_000, 10_000, 15_000, 20_000];

pub const DEFAULT_BUDGET: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone)]
pub struct FilterState {
    moods: BTreeSet<String>,
    budget_ceiling: u32,
    use_device_location: bool,
    coordinates: Option<Coordinates>,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            moods: BTreeSet::new(),
            budget_ceiling: DEFAULT_BUDGET,
            use_device_location: true,
            coordinates: None,
        }
    }
}

impl FilterState {
    /// Symmetric add/remove; toggling an odd number of times selects the mood.
    pub fn toggle_mood(&mut self, mood: &str) {
        if !self.moods.remove(mood) {
            self.moods.insert(mood.to_string());
        }
    }

    pub fn selected_moods(&self) -> Vec<String> {
        self.moods.iter().cloned().collect()
    }

    /// Radio semantics: the new ceiling replaces the active one. Passing a
    /// ceiling outside [`BUDGET_TIERS`] is a programming error.
    pub fn select_budget_tier(&mut self, ceiling: u32) {
        debug_assert!(
            BUDGET_TIERS.contains(&ceiling),
            "unknown budget tier: {ceiling}"
        );
        self.budget_ceiling = ceiling;
    }

    pub fn budget_ceiling(&self) -> u32 {
        self.budget_ceiling
    }

    pub fn set_use_device_location(&mut self, enabled: bool) {
        self.use_device_location = enabled;
    }

    pub fn use_device_location(&self) -> bool {
        self.use_device_location
    }

    pub fn set_coordinates(&mut self, coordinates: Coordinates) {
        self.coordinates = Some(coordinates);
    }

    /// Manual override path. Non-numeric entry is coerced to `0.0` rather than
    /// rejected; the coercion is logged so the quirk shows up in diagnostics.
    pub fn set_manual_coordinates(&mut self, latitude: &str, longitude: &str) {
        self.use_device_location = false;
        self.coordinates = Some(Coordinates {
            latitude: parse_lenient(latitude, "latitude"),
            longitude: parse_lenient(longitude, "longitude"),
        });
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        self.coordinates
    }

    /// Submission is permitted only when coordinates are present, however they
    /// were obtained.
    pub fn can_submit(&self) -> bool {
        self.coordinates.is_some()
    }
}

fn parse_lenient(text: &str, field: &str) -> f64 {
    text.trim().parse().unwrap_or_else(|_| {
        warn!(field, input = text, "non-numeric coordinate entry coerced to 0");
        0.0
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_parity_determines_selection() {
        let mut filters = FilterState::default();
        filters.toggle_mood("달달");
        filters.toggle_mood("매콤");
        filters.toggle_mood("달달");
        filters.toggle_mood("든든");
        filters.toggle_mood("매콤");
        filters.toggle_mood("매콤");

        // 달달 twice, 든든 once, 매콤 three times
        assert_eq!(filters.selected_moods(), vec!["든든", "매콤"]);
    }

    #[test]
    fn budget_tier_is_exclusive() {
        let mut filters = FilterState::default();
        assert_eq!(filters.budget_ceiling(), DEFAULT_BUDGET);

        filters.select_budget_tier(5_000);
        filters.select_budget_tier(20_000);
        assert_eq!(filters.budget_ceiling(), 20_000);
    }

    #[test]
    fn submission_requires_coordinates() {
        let mut filters = FilterState::default();
        assert!(!filters.can_submit());

        filters.set_coordinates(Coordinates {
            latitude: 37.5,
            longitude: 127.02,
        });
        assert!(filters.can_submit());
    }

    #[test]
    fn manual_entry_coerces_invalid_input_to_zero() {
        let mut filters = FilterState::default();
        filters.set_manual_coordinates("37.50", "not-a-number");

        let coordinates = filters.coordinates().unwrap();
        assert_eq!(coordinates.latitude, 37.50);
        assert_eq!(coordinates.longitude, 0.0);
        assert!(!filters.use_device_location());
        assert!(filters.can_submit());
    }
}
