//! Wireless side of the OTA transport: stored profiles, `netsh` radio
//! control and the connection session that finds and joins a device AP.

mod netsh;
mod profile;
mod session;

pub use netsh::{parse_associated_network, parse_visible_networks, NetshNetworkControl};
pub use profile::{escape_xml, ProfileDescriptor, Security};
pub use session::{
    ensure_profile, wait_for_association, ConnectionSession, ConnectionState, ConnectionTimeouts,
};
