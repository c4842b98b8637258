//! Target device selection

use crds::NetworkDeviceSpec;
use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;

/// Index of the first device attached to `network_name` with DHCP disabled.
pub fn select_target(devices: &[NetworkDeviceSpec], network_name: &str) -> Option<usize> {
    devices
        .iter()
        .position(|device| device.network_name == network_name && !device.uses_dhcp())
}

/// Whether the machine has devices and every one of them uses DHCP.
pub fn all_dhcp(devices: &[NetworkDeviceSpec]) -> bool {
    !devices.is_empty() && devices.iter().all(NetworkDeviceSpec::uses_dhcp)
}

/// Whether a device attached to `network_name` exists but obtains its address through DHCP.
pub fn dhcp_only(devices: &[NetworkDeviceSpec], network_name: &str) -> bool {
    select_target(devices, network_name).is_none()
        && devices
            .iter()
            .any(|device| device.network_name == network_name && device.uses_dhcp())
}

/// Render an address with the prefix length of its subnet, e.g. `10.0.0.5/24`.
pub fn format_address(ip: Ipv4Addr, subnet: Ipv4Network) -> String {
    format!("{}/{}", ip, subnet.prefix())
}
