//! Gateway connection management.
//!
//! A [`ReconnectSupervisor`] keeps one [`GatewaySession`] alive at a time,
//! resuming where the previous one left off when the gateway allows it. Each
//! session runs its receive loop alongside a heartbeat monitor task.

mod consumer;
mod events;
mod heartbeat;
mod reconnect;
mod recycler;
mod session;
mod state;
mod supervisor;

// Re-export public types
pub use consumer::{ChatFilter, EventConsumer, InboundEvent, LogConsumer};
pub use events::{StatusReporter, SupervisorEvent};
pub use heartbeat::{start_heartbeat_task, HeartbeatConfig, HeartbeatHandle};
pub use reconnect::{Backoff, ReconnectConfig};
pub use recycler::SessionRecycler;
pub use session::{AttemptClass, GatewaySession, SessionConfig, SessionEnd, SessionOutcome};
pub use state::{AtomicConnectionState, ConnectionState, ResumeState, SessionState};
pub use supervisor::{ReconnectSupervisor, SupervisorHandle, DEFAULT_RECYCLE_INTERVAL};
