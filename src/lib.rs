//! IPv6 Router Advertisement daemon.
//!
//! [`engine::Advertiser`] owns the configured interfaces and decides when
//! to advertise. [`builder`] and [`wire`] produce and parse the packets,
//! [`conflict`] checks what other routers on the link announce.
//! [`netlink`] tells the engine when a link changes state.

pub mod builder;
pub mod config;
pub mod conflict;
pub mod defaults;
pub mod device;
pub mod dispatch;
pub mod engine;
pub mod interface;
pub mod netlink;
pub mod scheduler;
pub mod socket;
pub mod wire;

mod error;

pub use error::{Error, Result};
