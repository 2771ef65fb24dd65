//! Page assembly.
//!
//! A [`PlayerPage`] builds the component tree for a configuration:
//!
//! ```text
//! root
//! └── body                    MediaSync
//!     ├── media-player        MediaController
//!     │   ├── media-provider  MediaProvider
//!     │   └── media-button    MediaRemoteControl + state consumer
//!     └── media-player ...
//! ```

use crate::config::PlayerConfig;
use common::PlayerResult;
use context::Consumer;
use css_parser::{MediaContext, MediaEnvironment, MediaMatcher};
use dom::{Document, DocumentRef, Event, EventType, NodeId};
use player_media::{
    MediaController, MediaProvider, MediaRemoteControl, MediaState, MediaSync, MEDIA_STATE,
};
use player_query::QueryList;
use std::sync::Arc;
use tracing::{debug, info};
use web_apis::{DisabledStorage, LocalStorage, OrientationType, ScreenOrientation, Storage};

/// One mounted player: controller, engine and a single control.
pub struct PlayerInstance {
    index: usize,
    host: NodeId,
    button: NodeId,
    // Drop the control side before the controller it consumes from.
    queries: Vec<(String, QueryList)>,
    state: Consumer<MediaState>,
    remote: MediaRemoteControl,
    controller: MediaController,
    provider: Arc<MediaProvider>,
}

impl PlayerInstance {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Controller host node.
    pub fn host(&self) -> NodeId {
        self.host
    }

    pub fn button(&self) -> NodeId {
        self.button
    }

    pub fn controller(&self) -> &MediaController {
        &self.controller
    }

    pub fn provider(&self) -> &Arc<MediaProvider> {
        &self.provider
    }

    pub fn remote(&self) -> &MediaRemoteControl {
        &self.remote
    }

    /// State as seen by the control.
    pub fn state(&self) -> MediaState {
        self.state.value()
    }

    /// Whether the control found its controller.
    pub fn is_paired(&self) -> bool {
        self.state.is_registered()
    }

    /// Current result of every configured query.
    pub fn query_results(&self) -> Vec<(String, bool)> {
        self.queries
            .iter()
            .map(|(source, list)| (source.clone(), list.matches()))
            .collect()
    }

    pub fn query(&self, source: &str) -> Option<&QueryList> {
        self.queries
            .iter()
            .find(|(query, _)| query == source)
            .map(|(_, list)| list)
    }

    /// Simulate a user click on the play button.
    pub fn click(&self) -> bool {
        let click = Arc::new(Event::trusted(EventType::Click));
        self.remote.toggle_paused(Some(click))
    }
}

/// A page of media players built from a [`PlayerConfig`].
pub struct PlayerPage {
    config: PlayerConfig,
    players: Vec<PlayerInstance>,
    sync: MediaSync,
    environment: Arc<MediaEnvironment>,
    screen: Arc<ScreenOrientation>,
    storage: Arc<dyn Storage>,
    body: NodeId,
    doc: DocumentRef,
}

impl PlayerPage {
    /// Build a page with its own local storage area.
    pub fn new(config: PlayerConfig) -> PlayerResult<Self> {
        let storage: Arc<dyn Storage> = if config.local_storage_enabled {
            Arc::new(LocalStorage::new(config.storage_origin.clone()))
        } else {
            Arc::new(DisabledStorage)
        };
        Self::with_storage(config, storage)
    }

    /// Build a page over an existing storage area, as a reload would.
    pub fn with_storage(config: PlayerConfig, storage: Arc<dyn Storage>) -> PlayerResult<Self> {
        config.validate()?;

        let doc = Document::new();
        let (width, height) = (config.viewport_width as f32, config.viewport_height as f32);
        let mut media = if config.orientation_supported {
            MediaContext::touch(width, height)
        } else {
            MediaContext::screen(width, height)
        };
        media.device_pixel_ratio = config.device_pixel_ratio as f32;
        media.prefers_dark = config.prefer_dark_mode;
        media.prefers_reduced_motion = config.prefer_reduced_motion;
        let environment = Arc::new(MediaEnvironment::new(media));

        let screen = Arc::new(if config.orientation_supported {
            ScreenOrientation::new(orientation_for(config.viewport_width, config.viewport_height))
        } else {
            ScreenOrientation::unsupported()
        });

        let body = doc.create_element("body");
        doc.append_child(doc.root(), body)?;
        let sync = MediaSync::attach(&doc, body, config.sync.clone(), storage.clone());

        let mut page = Self {
            config,
            players: Vec::new(),
            sync,
            environment,
            screen,
            storage,
            body,
            doc,
        };
        for index in 0..page.config.players {
            let player = page.mount_player(index)?;
            page.players.push(player);
        }
        page.publish_viewport();

        info!(
            players = page.players.len(),
            width = page.config.viewport_width,
            height = page.config.viewport_height,
            "player page ready"
        );
        Ok(page)
    }

    fn mount_player(&self, index: usize) -> PlayerResult<PlayerInstance> {
        let doc = &self.doc;

        let host = doc.create_element("media-player");
        doc.append_child(self.body, host)?;
        let controller = MediaController::attach(doc, host).with_orientation(self.screen.clone());

        let engine = doc.create_element("media-provider");
        doc.append_child(host, engine)?;
        let provider = MediaProvider::attach(doc, engine);

        let button = doc.create_element("media-button");
        doc.append_child(host, button)?;
        let state = MEDIA_STATE.consume(doc, button);
        let remote = MediaRemoteControl::new(doc, button);

        let matcher: Arc<dyn MediaMatcher> = self.environment.clone();
        let queries = self
            .config
            .queries
            .iter()
            .map(|source| {
                let list = controller.query_with_media(source, matcher.clone());
                let query = source.clone();
                list.on_change(move |matches| {
                    info!(player = index, %query, matches, "player query changed");
                });
                (source.clone(), list)
            })
            .collect();

        debug!(player = index, ?host, ?engine, "player mounted");
        Ok(PlayerInstance {
            index,
            host,
            button,
            queries,
            state,
            remote,
            controller,
            provider,
        })
    }

    pub fn document(&self) -> &DocumentRef {
        &self.doc
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn players(&self) -> &[PlayerInstance] {
        &self.players
    }

    pub fn player(&self, index: usize) -> Option<&PlayerInstance> {
        self.players.get(index)
    }

    pub fn sync(&self) -> &MediaSync {
        &self.sync
    }

    pub fn environment(&self) -> &Arc<MediaEnvironment> {
        &self.environment
    }

    pub fn screen(&self) -> &Arc<ScreenOrientation> {
        &self.screen
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Resize the viewport. Media clauses and viewport fields re-evaluate.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.config.viewport_width = width;
        self.config.viewport_height = height;
        self.screen.rotate(orientation_for(width, height));
        self.environment.set_viewport(width as f32, height as f32);
        self.publish_viewport();
    }

    fn publish_viewport(&self) {
        let (width, height) = (self.config.viewport_width, self.config.viewport_height);
        let orientation = if orientation_for(width, height).is_portrait() {
            "portrait"
        } else {
            "landscape"
        };
        for player in &self.players {
            player.controller.store().batch(|store| {
                store.set("width", width);
                store.set("height", height);
                store.set("orientation", orientation);
            });
        }
    }

    /// Finish loading every engine, releasing queued requests.
    pub fn load_all(&self, duration: f64) -> usize {
        for player in &self.players {
            player.provider.load(duration);
        }
        self.settle()
    }

    /// Advance playback clocks by `elapsed` seconds.
    pub fn tick(&self, elapsed: f64) -> usize {
        for player in &self.players {
            player.provider.advance(elapsed);
        }
        self.settle()
    }

    /// Run deferred work such as volume mirroring. Returns the number of
    /// microtasks run.
    pub fn settle(&self) -> usize {
        self.doc.run_microtasks()
    }

    /// Take a player's engine out of the tree.
    pub fn unmount_media(&self, index: usize) -> PlayerResult<()> {
        let player = self.require(index)?;
        self.doc.remove_child(player.provider.host());
        Ok(())
    }

    /// Put a player's engine back under its controller.
    pub fn remount_media(&self, index: usize) -> PlayerResult<()> {
        let player = self.require(index)?;
        self.doc.append_child(player.host, player.provider.host())
    }

    fn require(&self, index: usize) -> PlayerResult<&PlayerInstance> {
        self.players
            .get(index)
            .ok_or_else(|| common::PlayerError::not_found(format!("player {}", index)))
    }

    /// Published state of every player.
    pub fn snapshot(&self) -> Vec<MediaState> {
        self.players.iter().map(|player| player.controller.state()).collect()
    }
}

fn orientation_for(width: u32, height: u32) -> OrientationType {
    if height > width {
        OrientationType::PortraitPrimary
    } else {
        OrientationType::LandscapePrimary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use player_media::SyncConfig;

    fn page(config: PlayerConfig) -> PlayerPage {
        PlayerPage::new(config).unwrap()
    }

    #[test]
    fn test_page_assembly() {
        let page = page(PlayerConfig::new().with_players(3));
        assert_eq!(page.players().len(), 3);
        assert_eq!(page.sync().tracked().len(), 3);

        for player in page.players() {
            assert!(player.is_paired());
            assert_eq!(player.controller().consumer_count(), 1);
            let media = player.controller().media().unwrap();
            assert!(Arc::ptr_eq(&media, player.provider()));
        }
    }

    #[test]
    fn test_requests_wait_for_load() {
        let page = page(PlayerConfig::isolated());
        let player = page.player(0).unwrap();

        assert!(player.remote().seek(10.0, None));
        assert!(player.remote().seek(20.0, None));
        assert!(player.click());
        assert!(player.state().paused);

        page.load_all(60.0);
        let state = player.state();
        assert!(!state.paused);
        assert_eq!(state.current_time, 20.0);
        assert!(page.player(1).unwrap().state().paused);
    }

    #[test]
    fn test_single_playback_across_players() {
        let page = page(PlayerConfig::new());
        page.load_all(60.0);

        let (a, b) = (page.player(0).unwrap(), page.player(1).unwrap());
        a.remote().play(None);
        b.remote().play(None);

        assert!(a.provider().paused());
        assert!(!b.provider().paused());
        assert!(a.state().paused);
    }

    #[test]
    fn test_shared_volume_and_persistence() {
        let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new("https://player.local"));
        let first = PlayerPage::with_storage(PlayerConfig::new(), storage.clone()).unwrap();
        first.load_all(60.0);

        first.player(0).unwrap().remote().change_volume(0.3, None);
        assert_eq!(first.settle(), 1);
        assert_eq!(first.player(1).unwrap().provider().volume(), 0.3);
        assert_eq!(first.player(1).unwrap().state().volume, 0.3);

        let stored = storage.get_item("media-volume").unwrap().unwrap();
        assert!(stored.contains("0.3"));

        let second = PlayerPage::with_storage(PlayerConfig::new(), storage).unwrap();
        for player in second.players() {
            assert_eq!(player.provider().volume(), 0.3);
        }
    }

    #[test]
    fn test_isolated_players_share_nothing() {
        let page = page(PlayerConfig::isolated());
        page.load_all(60.0);

        page.player(0).unwrap().remote().change_volume(0.2, None);
        page.player(0).unwrap().remote().play(None);
        page.player(1).unwrap().remote().play(None);
        page.settle();

        assert_eq!(page.player(1).unwrap().provider().volume(), 1.0);
        assert!(!page.player(0).unwrap().provider().paused());
    }

    #[test]
    fn test_queries_follow_state_and_viewport() {
        let config = PlayerConfig::new()
            .with_players(1)
            .with_query("(width < 400)")
            .with_query("not (paused)")
            .with_query("@media (orientation: portrait)");
        let mut page = page(config);
        page.load_all(60.0);

        let player = page.player(0).unwrap();
        assert!(!player.query("(width < 400)").unwrap().matches());
        assert!(!player.query("not (paused)").unwrap().matches());

        player.remote().play(None);
        assert!(player.query("not (paused)").unwrap().matches());

        page.set_viewport(375, 812);
        let results = page.player(0).unwrap().query_results();
        assert!(results.iter().all(|(_, matches)| *matches));
    }

    #[test]
    fn test_orientation_lock_requires_support() {
        let page = page(PlayerConfig::new().with_players(1));
        page.load_all(60.0);
        page.player(0).unwrap().remote().lock_screen_orientation("landscape", None);
        assert_eq!(page.screen().locked(), None);

        let page = self::page(PlayerConfig::mobile().with_players(1));
        page.load_all(60.0);
        assert_eq!(page.screen().current(), Some(OrientationType::PortraitPrimary));
        page.player(0).unwrap().remote().lock_screen_orientation("landscape", None);
        assert_eq!(page.screen().current(), Some(OrientationType::LandscapePrimary));
    }

    #[test]
    fn test_unmount_and_remount_media() {
        let page = page(PlayerConfig::new().with_players(1));
        page.load_all(60.0);
        let player = page.player(0).unwrap();
        player.remote().play(None);

        page.unmount_media(0).unwrap();
        assert!(player.controller().media().is_none());
        assert!(page.sync().tracked().is_empty());
        assert!(player.state().paused);

        page.remount_media(0).unwrap();
        assert!(player.controller().media().is_some());
        assert_eq!(page.sync().tracked().len(), 1);
        assert!(page.unmount_media(5).is_err());
    }

    #[test]
    fn test_disabled_storage_still_builds() {
        let config = PlayerConfig::new()
            .with_local_storage(false)
            .with_sync(SyncConfig::all());
        let page = page(config);
        page.load_all(60.0);
        page.player(0).unwrap().remote().change_volume(0.5, None);
        page.settle();
        assert_eq!(page.player(1).unwrap().provider().volume(), 0.5);
    }
}
