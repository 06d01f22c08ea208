pub mod heartbeat;
pub mod state;

pub use heartbeat::{HeartbeatSession, MIN_RENEWAL_INTERVAL, SessionPhase, renewal_interval};
pub use state::{ContentAuthInfo, SessionState, StateContentAuth, StateHeartbeat, StateKeepMethod};
