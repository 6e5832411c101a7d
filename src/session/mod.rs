// Session timeout controller
// Activity-based renewal, expiry warning with countdown, and hard-deadline enforcement

pub mod controller;
pub mod driver;
pub mod observer;
pub mod timers;
pub mod types;

pub use controller::SessionController;
pub use driver::{SessionCommand, SessionDriver, SessionHandle};
pub use observer::{ChannelObserver, NoopObserver, SessionEvent, SessionObserver};
pub use timers::{TimerKind, TimerSet};
pub use types::{
    ActivityKind, ExpiryReason, SessionConfig, SessionPhase, SessionSnapshot, UserSessionState,
    session_key,
};
