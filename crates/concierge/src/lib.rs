//! Digital concierge core: session lifecycle, tool execution, and
//! approval correlation.
//!
//! A session is one visitor interaction at the gate. The kiosk starts
//! it, the realtime assistant drives tool calls against the backend
//! (resident lookup, visit creation, resident notification), a resident
//! approves or denies from their device, and the session is torn down
//! with its side effects settled: at most one visit record, at most one
//! approval resolution, and hub events delivered for whatever happened.

pub mod approval;
pub mod context;
pub mod hub;
pub mod locks;
pub mod service;
pub mod session;
pub mod tools;

pub use approval::{ApprovalStore, Decision, PendingApproval, Resolution};
pub use hub::HubChannel;
pub use service::{
    ConciergeService, EndSessionResponse, RespondOutcome, SessionStatus, StartSessionRequest,
    StartSessionResponse,
};
pub use session::{FinalStatus, Session, SessionSource, SessionState, SessionStore, VisitorData};
pub use tools::{ToolExecutor, ToolOutcome};
