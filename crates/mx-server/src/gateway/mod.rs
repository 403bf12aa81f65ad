//! Authenticated admin gateway: credential checks, live connections, and
//! revocation.

pub mod registry;
pub mod sweeper;
pub mod verifier;
pub mod ws_admin;

pub use registry::{Connection, ConnectionRegistry, ConnectionSnapshot, Outbound};
pub use sweeper::RevocationSweeper;
pub use verifier::{AuthVerifier, Principal, RejectReason, Verdict};
