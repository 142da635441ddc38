//! Wire payloads exchanged with consumers and downstream functions
//!
//! Payloads are modelled only as deep as the gateway needs to read or
//! rewrite them. Every other field is kept in a flattened `extra` map so
//! the gateway relays it verbatim.

mod notification;
mod pfd;
mod policy_auth;
mod problem;
mod traffic;

pub use notification::{AfNotification, NotificationKind};
pub use pfd::{PfdData, PfdManagement};
pub use policy_auth::{
    AppSessionContext, AppSessionContextReqData, AppSessionContextUpdateData,
    AppSessionContextUpdateDataPatch, EventsNotification, EventsSubscReqData, MediaComponent,
    NsmfEventExposureNotification, RoutingRequirement, TerminationInfo, UpPathChgEvent,
};
pub use problem::{DownstreamProblem, InvalidParam, ProblemDetails};
pub use traffic::{EventNotification, TrafficInfluSub};
