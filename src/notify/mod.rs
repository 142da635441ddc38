//! Notification delivery: routing decisions and consumer connections

pub mod connections;
pub mod router;

pub use connections::{ConnectionManager, InboundFrame, NotificationSink, SinkError};
pub use router::{CallbackUrls, DeliveryChannel, NotificationRouter, RoutingPlan, SessionRequest};
