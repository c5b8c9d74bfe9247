//! Request baskets: named, bounded collections of captured HTTP requests.
//!
//! Any request sent to `/{basket}` is recorded and answered with the reply
//! configured for its method. Baskets can forward what they capture to
//! another URL, either in the background or acting as a proxy. A REST API
//! under `/api` manages baskets and inspects what they captured.
//!
//! Baskets live in one of several storage backends (in-memory, JSON files,
//! SQLite, Redis) behind the [`basket::BasketsDatabase`] trait.

pub mod api;
pub mod backends;
pub mod basket;
pub mod cli;
pub mod config;
pub mod error;
pub mod forward;
pub mod response;

pub use api::{BasketServer, ServiceContext};
pub use config::ServerConfig;
pub use error::{BasketError, Result};
