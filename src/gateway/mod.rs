//! Gateway HTTP surface: operator API, notification intake and WebSocket endpoint

pub mod intake;
pub mod links;
pub mod pfd;
pub mod policy_auth;
pub mod response;
pub mod router;
pub mod server;
pub mod traffic;
pub mod websocket;

pub use links::{LinkKind, LinkRewriter, SelfLinked};
pub use response::ApiError;
pub use router::{AppState, create_api_router, create_intake_router};
pub use server::Gateway;
