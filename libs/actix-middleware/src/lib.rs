//! Shared HTTP middleware for Beacon services
//!
//! Provides the three pieces every service in the platform mounts:
//! - [`RequestId`]: X-Request-ID propagation for cross-service tracing
//! - [`Logging`]: structured access logging via `tracing`
//! - [`IdentityGateway`]: extracts the authenticated caller forwarded by the
//!   platform gateway and exposes it to handlers as [`UserId`]
//!
//! Authentication itself happens at the gateway; services behind it trust
//! the forwarded identity header and never see credentials.

pub mod identity;
pub mod logging;
pub mod request_id;

pub use identity::{IdentityGateway, UserId, USER_ID_HEADER};
pub use logging::Logging;
pub use request_id::{RequestId, REQUEST_ID_HEADER};
