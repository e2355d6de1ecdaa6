//! Client identity: roles, bearer tokens, the session lifecycle and the route gate.
//! Keep the public surface thin and split implementation across sub-modules.

mod guard;
mod principal;
mod provider;
mod session;
pub mod token;

pub use guard::{decide, GuardDecision, RouteGuard, RouteTable, RouteTarget, LOGIN_PATH};
pub use principal::{Role, User};
pub(crate) use principal::id_from_string_or_number;
pub use provider::{AuthProvider, GatewayAuthProvider, LoginRequest, LoginResponse, TokenPair};
pub use session::{LogoutReason, RefreshState, Session, SessionEvent, SessionManager, SessionPhase, TimerStats};
pub use token::{TokenError, REFRESH_GRACE};
