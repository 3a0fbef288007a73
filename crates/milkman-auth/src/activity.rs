//! User activity and page lifecycle events.
//!
//! The session layer never talks to an input system directly. Whatever hosts
//! it (a webview bridge, a terminal UI, a test) forwards events into an
//! [`ActivitySource`], and the session manager subscribes to it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Input that counts as the user being present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    /// Mouse button pressed
    #[serde(rename = "mousedown")]
    PointerDown,
    /// Mouse moved
    #[serde(rename = "mousemove")]
    PointerMove,
    /// Key pressed
    #[serde(rename = "keypress")]
    KeyPress,
    /// Page scrolled
    Scroll,
    /// Touch started
    #[serde(rename = "touchstart")]
    TouchStart,
    /// Click
    Click,
    /// Mouse wheel
    Wheel,
}

impl ActivityKind {
    /// Every activity kind, in the order hosts usually register them.
    pub const ALL: [Self; 7] = [
        Self::PointerDown,
        Self::PointerMove,
        Self::KeyPress,
        Self::Scroll,
        Self::TouchStart,
        Self::Click,
        Self::Wheel,
    ];
}

/// Page visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Page moved to the background
    Hidden,
    /// Page is in the foreground again
    Visible,
}

/// Event delivered by an [`ActivitySource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEvent {
    /// The user did something
    Activity(ActivityKind),
    /// Visibility changed
    Visibility(Visibility),
    /// The page (or process) is going away
    Unload,
}

/// Subscriber callback.
pub type Listener = Arc<dyn Fn(&PageEvent) + Send + Sync + 'static>;

/// Identifies a subscription so it can be removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Something that emits [`PageEvent`]s.
pub trait ActivitySource: Send + Sync {
    /// Register a listener.
    fn subscribe(&self, listener: Listener) -> SubscriptionId;

    /// Remove a listener. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}

/// Synchronous in-process fan-out of page events.
#[derive(Default)]
pub struct ActivityHub {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
}

impl ActivityHub {
    /// Create a hub with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to every listener.
    ///
    /// Listeners run on the caller's thread, outside the hub's lock, so they
    /// may subscribe or unsubscribe while handling an event.
    pub fn emit(&self, event: PageEvent) {
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        for listener in listeners {
            listener(&event);
        }
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl ActivitySource for ActivityHub {
    fn subscribe(&self, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(existing, _)| *existing != id);
    }
}

impl fmt::Debug for ActivityHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityHub")
            .field("listeners", &self.listener_count())
            .finish_non_exhaustive()
    }
}
