//! Browser event types
//!
//! Host notifications are decoded into [`BrowserEvent`] at the adapter
//! boundary so the session tracker's transition table is an exhaustive
//! `match` rather than a set of loosely-typed callbacks.
//!
//! Every key on the wire is snake_case, including the nested surface.

use serde::{Deserialize, Deserializer, Serialize};

/// A viewing target: a browser tab and the page it currently shows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Surface {
    /// Opaque tab handle
    pub id: i64,
    /// Current URL of the tab
    pub url: String,
    /// Window the tab belongs to, when the host reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_id: Option<i64>,
}

impl Surface {
    /// Create a surface without window information
    pub fn new(id: i64, url: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
            window_id: None,
        }
    }
}

/// System idle state as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdleState {
    /// User is interacting with the machine
    Active,
    /// No input for the host's idle interval
    Idle,
    /// Screen is locked
    Locked,
}

/// Load status carried by a tab update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    /// Navigation in progress
    Loading,
    /// Navigation finished
    Complete,
}

/// Event delivered by the host environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrowserEvent {
    /// A tab became the active tab of its window
    SurfaceActivated {
        /// The activated tab
        surface: Surface,
    },

    /// A tab was updated (navigation started or completed)
    SurfaceUpdated {
        /// The tab after the update
        surface: Surface,
        /// Load status, if the update carried one
        #[serde(default)]
        status: Option<LoadStatus>,
        /// Whether the tab is the active tab of the focused window
        #[serde(default)]
        active: bool,
    },

    /// A tab was closed
    SurfaceRemoved {
        /// Handle of the closed tab
        surface_id: i64,
    },

    /// Window focus moved; `None` means no browser window has focus
    WindowFocusChanged {
        /// Newly focused window
        #[serde(default, deserialize_with = "window_id_or_none")]
        window_id: Option<i64>,
    },

    /// System idle state changed
    IdleStateChanged {
        /// New idle state
        state: IdleState,
    },
}

impl BrowserEvent {
    /// Short name used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            BrowserEvent::SurfaceActivated { .. } => "surface_activated",
            BrowserEvent::SurfaceUpdated { .. } => "surface_updated",
            BrowserEvent::SurfaceRemoved { .. } => "surface_removed",
            BrowserEvent::WindowFocusChanged { .. } => "window_focus_changed",
            BrowserEvent::IdleStateChanged { .. } => "idle_state_changed",
        }
    }
}

// Chrome reports "no focused window" as WINDOW_ID_NONE (-1).
fn window_id_or_none<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let id = Option::<i64>::deserialize(deserializer)?;
    Ok(id.filter(|id| *id >= 0))
}
