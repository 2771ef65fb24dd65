//! Component tree and event model.
//!
//! This crate provides the explicit tree that player components live in,
//! standing in for a browser DOM: nodes with a connect/disconnect lifecycle,
//! bubbling events with typed payloads, and a microtask queue.

pub mod document;
pub mod events;
pub mod node;
pub mod tasks;
pub mod tree;

pub use document::{Document, DocumentRef, LifecycleBinding, LifecycleId};
pub use events::{
    ContextId, ContextRequest, ElementRegistration, Event, EventCallback, EventDetail,
    EventListenerOptions, EventPhase, EventType, ListenerId,
};
pub use node::{Node, NodeId, NodeType};
pub use tasks::MicrotaskQueue;
pub use tree::{DomTree, TreeMutation};
