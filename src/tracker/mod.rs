//! Activity session tracking
//!
//! This module turns a stream of browser events into finished activity
//! records:
//!
//! - [`event`]: typed host events
//! - [`filter`]: URL trackability and significance threshold
//! - [`session`]: the single-session state machine
//! - [`clock`]: injectable time source

pub mod clock;
pub mod event;
pub mod filter;
pub mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use event::{BrowserEvent, IdleState, LoadStatus, Surface};
pub use filter::SessionFilter;
pub use session::{
    rounded_seconds, ActiveSession, ActivityRecord, SessionEnd, SessionState, SessionTracker,
    Transition,
};
