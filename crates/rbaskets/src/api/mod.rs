//! HTTP API of the basket service.
//!
//! This module provides:
//! - The management REST API under `/api` (basket lifecycle, captured
//!   requests, configured responses, stats and version)
//! - Capture of every other request at `/{basket}[/sub/path]`
//! - A graceful-shutdown server loop

mod handlers;
mod router;
mod server;
mod types;

pub use router::route_request;
pub use server::BasketServer;
pub use types::{PageParams, ServiceContext};
