//! Component events.
//!
//! Events are the only transport between components: discovery signals,
//! command requests and state notifications all travel as an [`Event`]
//! dispatched at a node and (optionally) bubbled through its ancestors.

use crate::node::NodeId;
use derive_more::Display;
use slotmap::{new_key_type, SlotMap};
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Process-unique identity of a context.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[display("context#{_0}")]
pub struct ContextId(u64);

impl ContextId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Event type enumeration.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventType {
    // Discovery
    ContextRequest,
    MediaProviderConnect,

    // Media requests
    MediaPlayRequest,
    MediaPauseRequest,
    MediaTogglePausedRequest,
    MediaMuteRequest,
    MediaUnmuteRequest,
    MediaToggleMutedRequest,
    MediaSeekRequest,
    MediaVolumeChangeRequest,
    MediaRateChangeRequest,
    MediaOrientationLockRequest,
    MediaOrientationUnlockRequest,

    // Media notifications
    Play,
    Pause,
    VolumeChange,
    Seeked,
    RateChange,
    CanPlay,
    Emptied,
    Ended,
    VolumeSynced,

    // User input
    Click,
    PointerUp,
    KeyDown,

    // Other
    Custom(String),
}

impl From<&str> for EventType {
    fn from(name: &str) -> Self {
        match name {
            "context-request" => EventType::ContextRequest,
            "media-provider-connect" => EventType::MediaProviderConnect,
            "media-play-request" => EventType::MediaPlayRequest,
            "media-pause-request" => EventType::MediaPauseRequest,
            "media-toggle-paused-request" => EventType::MediaTogglePausedRequest,
            "media-mute-request" => EventType::MediaMuteRequest,
            "media-unmute-request" => EventType::MediaUnmuteRequest,
            "media-toggle-muted-request" => EventType::MediaToggleMutedRequest,
            "media-seek-request" => EventType::MediaSeekRequest,
            "media-volume-change-request" => EventType::MediaVolumeChangeRequest,
            "media-rate-change-request" => EventType::MediaRateChangeRequest,
            "media-orientation-lock-request" => EventType::MediaOrientationLockRequest,
            "media-orientation-unlock-request" => EventType::MediaOrientationUnlockRequest,
            "play" => EventType::Play,
            "pause" => EventType::Pause,
            "volume-change" => EventType::VolumeChange,
            "seeked" => EventType::Seeked,
            "rate-change" => EventType::RateChange,
            "can-play" => EventType::CanPlay,
            "emptied" => EventType::Emptied,
            "ended" => EventType::Ended,
            "media-volume-sync" => EventType::VolumeSynced,
            "click" => EventType::Click,
            "pointerup" => EventType::PointerUp,
            "keydown" => EventType::KeyDown,
            other => EventType::Custom(other.to_string()),
        }
    }
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::ContextRequest => "context-request",
            EventType::MediaProviderConnect => "media-provider-connect",
            EventType::MediaPlayRequest => "media-play-request",
            EventType::MediaPauseRequest => "media-pause-request",
            EventType::MediaTogglePausedRequest => "media-toggle-paused-request",
            EventType::MediaMuteRequest => "media-mute-request",
            EventType::MediaUnmuteRequest => "media-unmute-request",
            EventType::MediaToggleMutedRequest => "media-toggle-muted-request",
            EventType::MediaSeekRequest => "media-seek-request",
            EventType::MediaVolumeChangeRequest => "media-volume-change-request",
            EventType::MediaRateChangeRequest => "media-rate-change-request",
            EventType::MediaOrientationLockRequest => "media-orientation-lock-request",
            EventType::MediaOrientationUnlockRequest => "media-orientation-unlock-request",
            EventType::Play => "play",
            EventType::Pause => "pause",
            EventType::VolumeChange => "volume-change",
            EventType::Seeked => "seeked",
            EventType::RateChange => "rate-change",
            EventType::CanPlay => "can-play",
            EventType::Emptied => "emptied",
            EventType::Ended => "ended",
            EventType::VolumeSynced => "media-volume-sync",
            EventType::Click => "click",
            EventType::PointerUp => "pointerup",
            EventType::KeyDown => "keydown",
            EventType::Custom(s) => s,
        }
    }

    /// Discovery and request events travel up the tree; media notifications
    /// stay on the node that fired them.
    pub fn bubbles(&self) -> bool {
        !matches!(
            self,
            EventType::Play
                | EventType::Pause
                | EventType::VolumeChange
                | EventType::Seeked
                | EventType::RateChange
                | EventType::CanPlay
                | EventType::Emptied
                | EventType::Ended
        )
    }

    /// Discovery and requests cross shadow boundaries.
    pub fn composed(&self) -> bool {
        self.is_discovery() || self.is_media_request()
    }

    /// Whether this is a discovery signal.
    pub fn is_discovery(&self) -> bool {
        matches!(self, EventType::ContextRequest | EventType::MediaProviderConnect)
    }

    /// Whether this is a media command request.
    pub fn is_media_request(&self) -> bool {
        matches!(
            self,
            EventType::MediaPlayRequest
                | EventType::MediaPauseRequest
                | EventType::MediaTogglePausedRequest
                | EventType::MediaMuteRequest
                | EventType::MediaUnmuteRequest
                | EventType::MediaToggleMutedRequest
                | EventType::MediaSeekRequest
                | EventType::MediaVolumeChangeRequest
                | EventType::MediaRateChangeRequest
                | EventType::MediaOrientationLockRequest
                | EventType::MediaOrientationUnlockRequest
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventPhase {
    None,
    Capturing,
    AtTarget,
    Bubbling,
}

/// Context pairing request carried by [`EventType::ContextRequest`].
#[derive(Clone, Debug)]
pub struct ContextRequest {
    /// Context being requested.
    pub context: ContextId,
    /// Host node of the requesting consumer.
    pub consumer: NodeId,
    /// Consumer-side value sink. Only a provider of the same context knows
    /// its concrete type.
    pub sink: Arc<dyn Any + Send + Sync>,
}

/// Managed-element announcement carried by [`EventType::MediaProviderConnect`].
#[derive(Clone, Debug)]
pub struct ElementRegistration {
    /// The announcing element.
    pub element: NodeId,
    /// Handle to the component living on `element`.
    pub handle: Arc<dyn Any + Send + Sync>,
    /// Nearest ancestor that took ownership, if any.
    pub owner: Option<NodeId>,
}

impl ElementRegistration {
    /// Downcast the handle to the announced component type.
    pub fn handle<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.handle.downcast_ref::<T>()
    }
}

/// Typed event payload.
#[derive(Clone, Debug, Default)]
pub enum EventDetail {
    #[default]
    None,
    Context(ContextRequest),
    Element(ElementRegistration),
    Number(f64),
    Flag(bool),
    Text(String),
    Volume { volume: f64, muted: bool },
}

impl EventDetail {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            EventDetail::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            EventDetail::Flag(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            EventDetail::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// An event travelling through the component tree.
#[derive(Clone, Debug)]
pub struct Event {
    pub event_type: EventType,
    pub detail: EventDetail,
    /// Node the event was dispatched at.
    pub target: Option<NodeId>,
    /// Node whose listeners are running.
    pub current_target: Option<NodeId>,
    pub phase: EventPhase,
    pub bubbles: bool,
    pub cancelable: bool,
    pub default_prevented: bool,
    pub propagation_stopped: bool,
    pub immediate_propagation_stopped: bool,
    /// Crosses shadow boundaries.
    pub composed: bool,
    /// Produced by the end user rather than by code.
    pub is_trusted: bool,
    /// Event that caused this one, for provenance.
    pub trigger: Option<Arc<Event>>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: f64,
}

impl Event {
    pub fn new(event_type: EventType) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64() * 1000.0;

        let bubbles = event_type.bubbles();
        let composed = event_type.composed();

        Self {
            event_type,
            detail: EventDetail::None,
            target: None,
            current_target: None,
            phase: EventPhase::None,
            bubbles,
            cancelable: false,
            default_prevented: false,
            propagation_stopped: false,
            immediate_propagation_stopped: false,
            composed,
            is_trusted: false,
            trigger: None,
            timestamp,
        }
    }

    pub fn with_detail(event_type: EventType, detail: EventDetail) -> Self {
        let mut event = Self::new(event_type);
        event.detail = detail;
        event
    }

    /// Create an event produced directly by the end user.
    pub fn trusted(event_type: EventType) -> Self {
        let mut event = Self::new(event_type);
        event.is_trusted = true;
        event
    }

    /// Attach the event that caused this one.
    pub fn with_trigger(mut self, trigger: Option<Arc<Event>>) -> Self {
        self.trigger = trigger;
        self
    }

    /// Ignored unless the event is cancelable.
    pub fn prevent_default(&mut self) {
        if self.cancelable {
            self.default_prevented = true;
        }
    }

    /// Claim the event: ancestors further up will not see it.
    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    /// Also skip the remaining listeners on the current node.
    pub fn stop_immediate_propagation(&mut self) {
        self.immediate_propagation_stopped = true;
        self.propagation_stopped = true;
    }

    /// Walk the trigger chain back to the event that started it all.
    pub fn origin(&self) -> &Event {
        let mut current = self;
        while let Some(trigger) = current.trigger.as_deref() {
            current = trigger;
        }
        current
    }

    /// Whether the chain of triggers began with a trusted end-user event.
    pub fn is_trusted_origin(&self) -> bool {
        self.origin().is_trusted
    }

    /// Number of events in the trigger chain, including this one.
    pub fn chain_len(&self) -> usize {
        let mut len = 1;
        let mut current = self;
        while let Some(trigger) = current.trigger.as_deref() {
            len += 1;
            current = trigger;
        }
        len
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new(EventType::Custom(String::new()))
    }
}

new_key_type! {
    /// Handle returned when adding a listener; used to remove it again.
    pub struct ListenerId;
}

pub type EventCallback = Arc<dyn Fn(&mut Event) + Send + Sync>;

#[derive(Clone, Debug, Default)]
pub struct EventListenerOptions {
    pub capture: bool,
    pub once: bool,
    pub passive: bool,
}

#[derive(Clone)]
pub struct EventListener {
    pub node: NodeId,
    pub event_type: EventType,
    pub callback: EventCallback,
    pub options: EventListenerOptions,
}

/// Listener registry keyed by node and event type.
pub struct EventManager {
    listeners: SlotMap<ListenerId, EventListener>,
    index: HashMap<NodeId, HashMap<EventType, Vec<ListenerId>>>,
}

impl EventManager {
    pub fn new() -> Self {
        Self {
            listeners: SlotMap::with_key(),
            index: HashMap::new(),
        }
    }

    pub fn add_listener(
        &mut self,
        node: NodeId,
        event_type: &EventType,
        callback: EventCallback,
        options: EventListenerOptions,
    ) -> ListenerId {
        let id = self.listeners.insert(EventListener {
            node,
            event_type: event_type.clone(),
            callback,
            options,
        });
        self.index
            .entry(node)
            .or_default()
            .entry(event_type.clone())
            .or_default()
            .push(id);
        id
    }

    /// Remove a single listener. Returns `false` if it was already gone.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let Some(listener) = self.listeners.remove(id) else {
            return false;
        };
        if let Some(node_listeners) = self.index.get_mut(&listener.node) {
            if let Some(type_listeners) = node_listeners.get_mut(&listener.event_type) {
                type_listeners.retain(|l| *l != id);
            }
        }
        true
    }

    /// Snapshot the listeners that should run for a node during a phase.
    ///
    /// Callbacks are cloned out so the caller can invoke them without holding
    /// any borrow of the manager.
    pub fn collect(
        &self,
        node: NodeId,
        event_type: &EventType,
        phase: EventPhase,
    ) -> Vec<(ListenerId, EventCallback, bool)> {
        self.index
            .get(&node)
            .and_then(|n| n.get(event_type))
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.listeners.get(*id).map(|l| (*id, l)))
                    .filter(|(_, l)| match phase {
                        EventPhase::AtTarget => true,
                        EventPhase::Capturing => l.options.capture,
                        _ => !l.options.capture,
                    })
                    .map(|(id, l)| (id, l.callback.clone(), l.options.once))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether the listener is still registered.
    pub fn contains(&self, id: ListenerId) -> bool {
        self.listeners.contains_key(id)
    }

    /// Number of listeners registered on a node.
    pub fn count(&self, node: NodeId) -> usize {
        self.index
            .get(&node)
            .map(|n| n.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Drop every listener on a node.
    pub fn remove_all(&mut self, node: NodeId) {
        if let Some(node_listeners) = self.index.remove(&node) {
            for id in node_listeners.into_values().flatten() {
                self.listeners.remove(id);
            }
        }
    }
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn node_ids(count: usize) -> Vec<NodeId> {
        let mut map: SlotMap<NodeId, ()> = SlotMap::with_key();
        (0..count).map(|_| map.insert(())).collect()
    }

    #[test]
    fn test_event_defaults() {
        let request = Event::new(EventType::MediaPlayRequest);
        assert!(request.bubbles);
        assert!(request.composed);

        let play = Event::new(EventType::Play);
        assert!(!play.bubbles);
        assert!(!play.composed);
    }

    #[test]
    fn test_event_type_round_trips_names() {
        assert_eq!(EventType::from("context-request"), EventType::ContextRequest);
        assert_eq!(EventType::from("media-volume-sync"), EventType::VolumeSynced);
        assert_eq!(
            EventType::from("custom-event"),
            EventType::Custom("custom-event".to_string())
        );
        assert_eq!(EventType::MediaSeekRequest.as_str(), "media-seek-request");
    }

    #[test]
    fn test_trigger_chain_provenance() {
        let click = Arc::new(Event::trusted(EventType::Click));
        let request = Arc::new(Event::new(EventType::MediaPlayRequest).with_trigger(Some(click)));
        let play = Event::new(EventType::Play).with_trigger(Some(request));

        assert!(!play.is_trusted);
        assert!(play.is_trusted_origin());
        assert_eq!(play.origin().event_type, EventType::Click);
        assert_eq!(play.chain_len(), 3);

        let scripted = Event::new(EventType::Play)
            .with_trigger(Some(Arc::new(Event::new(EventType::MediaPlayRequest))));
        assert!(!scripted.is_trusted_origin());
    }

    #[test]
    fn test_context_ids_are_unique() {
        let a = ContextId::next();
        let b = ContextId::next();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("context#"));
    }

    #[test]
    fn test_listener_add_and_remove() {
        let nodes = node_ids(2);
        let mut manager = EventManager::new();
        let callback: EventCallback = Arc::new(|_| {});

        let a = manager.add_listener(nodes[0], &EventType::Play, callback.clone(), Default::default());
        let b = manager.add_listener(nodes[0], &EventType::Play, callback.clone(), Default::default());
        manager.add_listener(nodes[1], &EventType::Play, callback, Default::default());

        assert_eq!(manager.collect(nodes[0], &EventType::Play, EventPhase::AtTarget).len(), 2);
        assert!(manager.remove_listener(a));
        assert!(!manager.remove_listener(a));

        let remaining = manager.collect(nodes[0], &EventType::Play, EventPhase::AtTarget);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].0, b);

        manager.remove_all(nodes[0]);
        assert_eq!(manager.count(nodes[0]), 0);
        assert_eq!(manager.count(nodes[1]), 1);
    }

    #[test]
    fn test_capture_listeners_only_run_in_capture_phase() {
        let nodes = node_ids(1);
        let mut manager = EventManager::new();
        let callback: EventCallback = Arc::new(|_| {});
        let options = EventListenerOptions {
            capture: true,
            ..Default::default()
        };
        manager.add_listener(nodes[0], &EventType::Click, callback, options);

        assert_eq!(manager.collect(nodes[0], &EventType::Click, EventPhase::Capturing).len(), 1);
        assert_eq!(manager.collect(nodes[0], &EventType::Click, EventPhase::Bubbling).len(), 0);
        assert_eq!(manager.collect(nodes[0], &EventType::Click, EventPhase::AtTarget).len(), 1);
    }
}
