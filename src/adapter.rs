//! Browser event source adapter
//!
//! The browser extension forwards tab, window and idle notifications to the
//! tracker over a native messaging channel. Two wire formats are accepted:
//!
//! - `native`: Chrome native messaging, each message a UTF-8 JSON document
//!   preceded by its length as a 32-bit integer in native byte order
//! - `lines`: newline-delimited JSON, handy for replaying recorded feeds
//!
//! Messages decode into [`BrowserEvent`]. A message that fails to decode
//! is yielded as an error item; the stream keeps going.
//!
//! The adapter also answers "which surface has focus right now" for the
//! idle-to-active and window-focus transitions, from what it has observed.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use clap::ValueEnum;
use futures::{future, Stream, StreamExt};
use tokio::io::AsyncRead;
use tokio_util::codec::{FramedRead, LengthDelimitedCodec, LinesCodec, LinesCodecError};

use crate::error::TrackerError;
use crate::tracker::{BrowserEvent, Surface};

/// Largest accepted message
pub const MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// Wire format of the event feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Framing {
    /// Length-prefixed native messaging frames
    Native,
    /// Newline-delimited JSON
    Lines,
}

/// Decoded event feed
pub type EventStream = Pin<Box<dyn Stream<Item = Result<BrowserEvent, TrackerError>> + Send>>;

/// Decode `reader` into a stream of browser events
pub fn event_stream<R>(reader: R, framing: Framing) -> EventStream
where
    R: AsyncRead + Send + Unpin + 'static,
{
    match framing {
        Framing::Native => {
            let codec = LengthDelimitedCodec::builder()
                .length_field_length(4)
                .native_endian()
                .max_frame_length(MAX_MESSAGE_BYTES)
                .new_codec();
            FramedRead::new(reader, codec)
                .map(|frame| {
                    let frame = frame?;
                    decode(&frame)
                })
                .boxed()
        }
        Framing::Lines => {
            let codec = LinesCodec::new_with_max_length(MAX_MESSAGE_BYTES);
            FramedRead::new(reader, codec)
                .filter(|line| {
                    future::ready(!matches!(line, Ok(text) if text.trim().is_empty()))
                })
                .map(|line| match line {
                    Ok(text) => decode(text.as_bytes()),
                    Err(LinesCodecError::Io(e)) => Err(TrackerError::Io(e)),
                    Err(LinesCodecError::MaxLineLengthExceeded) => Err(TrackerError::Adapter(
                        format!("message exceeds {} bytes", MAX_MESSAGE_BYTES),
                    )),
                })
                .boxed()
        }
    }
}

fn decode(bytes: &[u8]) -> Result<BrowserEvent, TrackerError> {
    serde_json::from_slice(bytes).map_err(|e| {
        let preview: String = String::from_utf8_lossy(bytes).chars().take(120).collect();
        TrackerError::Adapter(format!("malformed event ({}): {}", e, preview))
    })
}

/// Answers which surface currently has focus
#[async_trait]
pub trait FocusQuery: Send + Sync {
    /// Feed an incoming event so the answer stays current
    fn observe(&self, _event: &BrowserEvent) {}

    /// The focused surface, if known
    async fn focused_surface(&self) -> Option<Surface>;
}

#[derive(Debug, Default)]
struct FocusState {
    focused_window: Option<i64>,
    // Set by a focus change to no browser window, cleared by the next
    // window focus or activation.
    no_window_focused: bool,
    active_by_window: HashMap<i64, Surface>,
    latest: Option<Surface>,
}

/// [`FocusQuery`] that remembers the active tab of each window
#[derive(Debug, Clone, Default)]
pub struct FocusCache {
    state: Arc<Mutex<FocusState>>,
}

impl FocusCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    fn record_active(state: &mut FocusState, surface: &Surface) {
        if let Some(window_id) = surface.window_id {
            state.active_by_window.insert(window_id, surface.clone());
        }
        state.latest = Some(surface.clone());
    }
}

#[async_trait]
impl FocusQuery for FocusCache {
    fn observe(&self, event: &BrowserEvent) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match event {
            BrowserEvent::SurfaceActivated { surface } => {
                state.no_window_focused = false;
                Self::record_active(&mut state, surface);
            }
            BrowserEvent::SurfaceUpdated {
                surface, active, ..
            } => {
                let is_latest = state.latest.as_ref().map(|s| s.id) == Some(surface.id);
                if *active || is_latest {
                    Self::record_active(&mut state, surface);
                }
            }
            BrowserEvent::SurfaceRemoved { surface_id } => {
                state.active_by_window.retain(|_, s| s.id != *surface_id);
                if state.latest.as_ref().map(|s| s.id) == Some(*surface_id) {
                    state.latest = None;
                }
            }
            BrowserEvent::WindowFocusChanged { window_id: None } => {
                state.no_window_focused = true;
            }
            BrowserEvent::WindowFocusChanged {
                window_id: Some(window_id),
            } => {
                state.no_window_focused = false;
                state.focused_window = Some(*window_id);
            }
            BrowserEvent::IdleStateChanged { .. } => {}
        }
    }

    async fn focused_surface(&self) -> Option<Surface> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.no_window_focused {
            return None;
        }
        match state.focused_window {
            Some(window_id) => state.active_by_window.get(&window_id).cloned().or_else(|| {
                state
                    .latest
                    .clone()
                    .filter(|surface| surface.window_id.is_none())
            }),
            None => state.latest.clone(),
        }
    }
}
