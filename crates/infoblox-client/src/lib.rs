//! Infoblox WAPI Client
//!
//! Allocates and releases IPv4 addresses as Infoblox fixed addresses, keyed by
//! an identifier (the machine name) inside a network view.
//!
//! # Example
//!
//! ```no_run
//! use infoblox_client::{InfobloxClient, InfobloxConfig, IpamManager};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = InfobloxClient::new(InfobloxConfig::new(
//!     "https://infoblox.example.com",
//!     "admin",
//!     "secret",
//! ))?;
//!
//! let subnet = "10.0.0.0/24".parse()?;
//! let ip = client.get_or_allocate_ip("worker-0", "default", subnet).await?;
//! client.release_ip("worker-0", "default", subnet).await?;
//! # let _ = ip;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod common;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod ipam_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::{InfobloxClient, InfobloxConfig};
pub use common::HttpClient;
pub use error::IpamError;
pub use models::*;
pub use ipam_trait::IpamManager;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{IpamCall, IpamOperation, MockIpamManager};
