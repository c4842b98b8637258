//! Infoblox WAPI models
//!
//! Only the `fixedaddress` object and the WAPI error envelope are needed.
//! See: WAPI reference, object `fixedaddress`.

use serde::{Deserialize, Serialize};

/// Fields requested on every fixed address read
pub const FIXED_ADDRESS_RETURN_FIELDS: &str = "ipv4addr,name,network,network_view,comment";

/// MAC address used for reservations that are not bound to a NIC yet
pub const UNBOUND_MAC: &str = "00:00:00:00:00:00";

/// Fixed address object as returned by WAPI
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FixedAddress {
    /// Object reference, e.g. `fixedaddress/ZG5z...:10.0.0.5/default`
    #[serde(rename = "_ref")]
    pub reference: String,
    pub ipv4addr: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub network_view: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Request body for creating a fixed address
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateFixedAddress {
    /// Either a literal address or a `func:nextavailableip:` expression
    pub ipv4addr: String,
    pub network_view: String,
    pub name: String,
    pub mac: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl CreateFixedAddress {
    /// Reserve the next free address of `network` in `network_view` for `name`.
    pub fn next_available(name: &str, network_view: &str, network: &str) -> Self {
        Self {
            ipv4addr: format!("func:nextavailableip:{},{}", network, network_view),
            network_view: network_view.to_string(),
            name: name.to_string(),
            mac: UNBOUND_MAC.to_string(),
            comment: None,
        }
    }
}

/// Error envelope returned by WAPI on non-2xx responses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WapiError {
    #[serde(rename = "Error", default)]
    pub error: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub text: String,
}

impl WapiError {
    /// Human-readable message, preferring `text` over the raw `Error` string.
    pub fn message(&self) -> &str {
        if self.text.is_empty() { &self.error } else { &self.text }
    }
}
