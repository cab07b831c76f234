use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::api::Place;
use crate::errors::{AppError, AppResult};
use crate::filters::Coordinates;

/// Only the first slice of places gets markers, in server order.
pub const MARKER_LIMIT: usize = 5;

pub const MAP_ZOOM_LEVEL: u8 = 4;

/// Radius of the user-location indicator, in meters.
pub const USER_INDICATOR_RADIUS_M: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MapId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(pub u64);

/// Contract the synchronizer requires from a map provider. Element creation
/// hands back ids the synchronizer owns; it releases every one of them before
/// building the next set, so providers never see stale elements accumulate.
#[async_trait]
pub trait MapProvider: Send + Sync {
    /// Loads the provider's script/runtime. Invoked once through
    /// [`MapScriptGate`]; a failure leaves the map permanently degraded.
    async fn load(&self) -> AppResult<()>;

    fn create_map(&self, center: Coordinates, zoom: u8) -> AppResult<MapId>;

    fn set_center(&self, map: MapId, center: Coordinates);

    fn destroy_map(&self, map: MapId);

    fn add_marker(&self, map: MapId, place: &Place) -> AppResult<ElementId>;

    /// Info window bound to a marker: opens on marker click, dismisses per the
    /// provider's default behavior.
    fn add_info_window(&self, map: MapId, marker: ElementId, content: &str) -> AppResult<ElementId>;

    fn add_user_indicator(
        &self,
        map: MapId,
        center: Coordinates,
        radius_meters: f64,
    ) -> AppResult<ElementId>;

    fn remove_element(&self, map: MapId, element: ElementId);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapAvailability {
    Ready,
    /// Script load failed; the surface shows a placeholder indefinitely.
    Degraded,
}

/// Memoized async initializer for the provider script: the first caller
/// triggers the load and every caller, concurrent ones included, awaits the
/// same completion. The outcome is memoized either way; there is no retry.
#[derive(Clone)]
pub struct MapScriptGate {
    provider: Arc<dyn MapProvider>,
    loaded: Arc<OnceCell<MapAvailability>>,
}

impl MapScriptGate {
    pub fn new(provider: Arc<dyn MapProvider>) -> Self {
        Self {
            provider,
            loaded: Arc::new(OnceCell::new()),
        }
    }

    pub async fn ready(&self) -> MapAvailability {
        *self
            .loaded
            .get_or_init(|| async {
                match self.provider.load().await {
                    Ok(()) => MapAvailability::Ready,
                    Err(err) => {
                        warn!(?err, "map provider failed to load; rendering placeholder");
                        MapAvailability::Degraded
                    }
                }
            })
            .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapViewStatus {
    /// Nothing to show: no data yet, or the place list went empty.
    Placeholder,
    /// Provider unavailable; persistent loading indicator.
    Degraded,
    Rendered {
        markers: usize,
    },
}

struct ActiveMap {
    map: MapId,
    elements: Vec<ElementId>,
}

/// Reconciles the rendered marker set with the latest place list. Owns at most
/// one live map instance and every visual element it created; ownership ends
/// by full cleanup, never by handoff.
pub struct MapSynchronizer {
    provider: Arc<dyn MapProvider>,
    view: Option<ActiveMap>,
}

impl MapSynchronizer {
    pub fn new(provider: Arc<dyn MapProvider>) -> Self {
        Self {
            provider,
            view: None,
        }
    }

    /// Applies the latest data. Callers resolve availability through
    /// [`MapScriptGate::ready`] first so no lock is held across the load.
    pub fn apply(
        &mut self,
        availability: MapAvailability,
        places: &[Place],
        user: Option<Coordinates>,
    ) -> AppResult<MapViewStatus> {
        if availability == MapAvailability::Degraded {
            return Ok(MapViewStatus::Degraded);
        }
        if places.is_empty() {
            self.teardown();
            return Ok(MapViewStatus::Placeholder);
        }

        let center = Coordinates {
            latitude: places[0].latitude,
            longitude: places[0].longitude,
        };
        let map = match self.view.take() {
            Some(mut active) => {
                // Reuse the instance: release the previous elements, recenter.
                self.release_elements(&mut active);
                self.provider.set_center(active.map, center);
                active.map
            }
            None => self.provider.create_map(center, MAP_ZOOM_LEVEL)?,
        };

        let mut active = ActiveMap {
            map,
            elements: Vec::new(),
        };
        let populated = self.populate(&mut active, places, user);
        let markers = places.len().min(MARKER_LIMIT);
        // Track partially built sets too, so a failed populate still cleans up
        // on the next apply or teardown.
        self.view = Some(active);
        populated.map(|()| MapViewStatus::Rendered { markers })
    }

    fn populate(
        &self,
        active: &mut ActiveMap,
        places: &[Place],
        user: Option<Coordinates>,
    ) -> AppResult<()> {
        for place in places.iter().take(MARKER_LIMIT) {
            let marker = self.provider.add_marker(active.map, place)?;
            active.elements.push(marker);
            let info = self
                .provider
                .add_info_window(active.map, marker, &place.name)?;
            active.elements.push(info);
        }
        if let Some(center) = user {
            let indicator =
                self.provider
                    .add_user_indicator(active.map, center, USER_INDICATOR_RADIUS_M)?;
            active.elements.push(indicator);
        }
        debug!(
            map = active.map.0,
            elements = active.elements.len(),
            "map view synchronized"
        );
        Ok(())
    }

    /// Full cleanup: releases every owned element and destroys the instance.
    /// The next non-empty apply recreates the map lazily.
    pub fn teardown(&mut self) {
        if let Some(mut active) = self.view.take() {
            self.release_elements(&mut active);
            self.provider.destroy_map(active.map);
        }
    }

    fn release_elements(&self, active: &mut ActiveMap) {
        for element in active.elements.drain(..) {
            self.provider.remove_element(active.map, element);
        }
    }

    pub fn has_view(&self) -> bool {
        self.view.is_some()
    }

    pub fn live_elements(&self) -> usize {
        self.view.as_ref().map_or(0, |view| view.elements.len())
    }
}

/// In-process provider that only keeps book: the no-SDK fallback for headless
/// runs, and the double the test suite counts elements on.
#[derive(Default)]
pub struct HeadlessMapProvider {
    state: Mutex<HeadlessState>,
}

#[derive(Default)]
struct HeadlessState {
    next_id: u64,
    maps_created: u64,
    maps: HashMap<MapId, HashMap<ElementId, String>>,
}

impl HeadlessMapProvider {
    pub fn maps_created(&self) -> u64 {
        self.state.lock().maps_created
    }

    pub fn live_map_count(&self) -> usize {
        self.state.lock().maps.len()
    }

    pub fn live_element_count(&self) -> usize {
        self.state.lock().maps.values().map(HashMap::len).sum()
    }
}

impl HeadlessState {
    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn attach(&mut self, map: MapId, kind: &str) -> AppResult<ElementId> {
        let element = ElementId(self.next());
        self.maps
            .get_mut(&map)
            .ok_or(AppError::MapUnavailable)?
            .insert(element, kind.to_string());
        Ok(element)
    }
}

#[async_trait]
impl MapProvider for HeadlessMapProvider {
    async fn load(&self) -> AppResult<()> {
        Ok(())
    }

    fn create_map(&self, _center: Coordinates, _zoom: u8) -> AppResult<MapId> {
        let mut state = self.state.lock();
        let map = MapId(state.next());
        state.maps_created += 1;
        state.maps.insert(map, HashMap::new());
        Ok(map)
    }

    fn set_center(&self, _map: MapId, _center: Coordinates) {}

    fn destroy_map(&self, map: MapId) {
        self.state.lock().maps.remove(&map);
    }

    fn add_marker(&self, map: MapId, _place: &Place) -> AppResult<ElementId> {
        self.state.lock().attach(map, "marker")
    }

    fn add_info_window(
        &self,
        map: MapId,
        _marker: ElementId,
        _content: &str,
    ) -> AppResult<ElementId> {
        self.state.lock().attach(map, "info")
    }

    fn add_user_indicator(
        &self,
        map: MapId,
        _center: Coordinates,
        _radius_meters: f64,
    ) -> AppResult<ElementId> {
        self.state.lock().attach(map, "indicator")
    }

    fn remove_element(&self, map: MapId, element: ElementId) {
        if let Some(elements) = self.state.lock().maps.get_mut(&map) {
            elements.remove(&element);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenScriptProvider;

    #[async_trait]
    impl MapProvider for BrokenScriptProvider {
        async fn load(&self) -> AppResult<()> {
            Err(AppError::MapUnavailable)
        }

        fn create_map(&self, _center: Coordinates, _zoom: u8) -> AppResult<MapId> {
            unreachable!("degraded provider never creates maps")
        }

        fn set_center(&self, _map: MapId, _center: Coordinates) {}
        fn destroy_map(&self, _map: MapId) {}

        fn add_marker(&self, _map: MapId, _place: &Place) -> AppResult<ElementId> {
            unreachable!()
        }

        fn add_info_window(
            &self,
            _map: MapId,
            _marker: ElementId,
            _content: &str,
        ) -> AppResult<ElementId> {
            unreachable!()
        }

        fn add_user_indicator(
            &self,
            _map: MapId,
            _center: Coordinates,
            _radius_meters: f64,
        ) -> AppResult<ElementId> {
            unreachable!()
        }

        fn remove_element(&self, _map: MapId, _element: ElementId) {}
    }

    fn places(count: usize) -> Vec<Place> {
        (0..count)
            .map(|i| Place {
                name: format!("식당 {i}"),
                latitude: 37.5 + i as f64 * 0.001,
                longitude: 127.0 + i as f64 * 0.001,
                distance_meters: 100.0 * i as f64,
                duration_minutes: 2.0 * i as f64,
            })
            .collect()
    }

    fn user() -> Coordinates {
        Coordinates {
            latitude: 37.5,
            longitude: 127.0,
        }
    }

    #[tokio::test]
    async fn repeated_updates_never_accumulate_elements() {
        let provider = Arc::new(HeadlessMapProvider::default());
        let gate = MapScriptGate::new(provider.clone());
        let availability = gate.ready().await;
        let mut sync = MapSynchronizer::new(provider.clone());

        for round in 1..=4 {
            let status = sync
                .apply(availability, &places(7), Some(user()))
                .unwrap();
            assert_eq!(status, MapViewStatus::Rendered { markers: 5 });
            // 5 markers + 5 info windows + 1 indicator, regardless of round
            assert_eq!(provider.live_element_count(), 11, "round {round}");
        }
        assert_eq!(provider.maps_created(), 1, "map instance is reused");
    }

    #[tokio::test]
    async fn short_lists_render_one_marker_per_place() {
        let provider = Arc::new(HeadlessMapProvider::default());
        let mut sync = MapSynchronizer::new(provider.clone());

        let status = sync
            .apply(MapAvailability::Ready, &places(3), None)
            .unwrap();
        assert_eq!(status, MapViewStatus::Rendered { markers: 3 });
        assert_eq!(provider.live_element_count(), 6);
    }

    #[tokio::test]
    async fn empty_list_tears_down_to_placeholder() {
        let provider = Arc::new(HeadlessMapProvider::default());
        let mut sync = MapSynchronizer::new(provider.clone());

        sync.apply(MapAvailability::Ready, &places(2), Some(user()))
            .unwrap();
        assert_eq!(provider.live_map_count(), 1);

        let status = sync.apply(MapAvailability::Ready, &[], None).unwrap();
        assert_eq!(status, MapViewStatus::Placeholder);
        assert_eq!(provider.live_element_count(), 0);
        assert_eq!(provider.live_map_count(), 0);
        assert!(!sync.has_view());

        // Lazily recreated on the next non-empty update.
        sync.apply(MapAvailability::Ready, &places(1), None).unwrap();
        assert_eq!(provider.maps_created(), 2);
        assert_eq!(provider.live_element_count(), 2);
    }

    #[tokio::test]
    async fn teardown_releases_everything() {
        let provider = Arc::new(HeadlessMapProvider::default());
        let mut sync = MapSynchronizer::new(provider.clone());

        sync.apply(MapAvailability::Ready, &places(5), Some(user()))
            .unwrap();
        sync.teardown();

        assert_eq!(provider.live_element_count(), 0);
        assert_eq!(provider.live_map_count(), 0);
        assert_eq!(sync.live_elements(), 0);
    }

    #[tokio::test]
    async fn failed_script_load_is_memoized_as_degraded() {
        let provider = Arc::new(BrokenScriptProvider);
        let gate = MapScriptGate::new(provider.clone());

        assert_eq!(gate.ready().await, MapAvailability::Degraded);
        // Memoized: the second caller does not trigger another load.
        assert_eq!(gate.ready().await, MapAvailability::Degraded);

        let mut sync = MapSynchronizer::new(provider);
        let status = sync
            .apply(MapAvailability::Degraded, &places(3), None)
            .unwrap();
        assert_eq!(status, MapViewStatus::Degraded);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_load() {
        let provider = Arc::new(HeadlessMapProvider::default());
        let gate = MapScriptGate::new(provider);

        let (a, b) = tokio::join!(gate.ready(), gate.ready());
        assert_eq!(a, MapAvailability::Ready);
        assert_eq!(b, MapAvailability::Ready);
    }
}
