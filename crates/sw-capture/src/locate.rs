//! Camera discovery.
//!
//! Cameras on DHCP move around, so the stream address is resolved afresh for
//! every capture attempt rather than cached at startup.

use std::fs;
use std::path::PathBuf;

use sw_core::StreamAddress;

use crate::error::CameraNotFound;

/// Default location of the kernel's IPv4 neighbour table.
pub const DEFAULT_ARP_TABLE: &str = "/proc/net/arp";

/// Placeholder replaced with the camera's IP address in URL templates.
const IP_PLACEHOLDER: &str = "{ip}";

/// Resolves the current stream address of the camera.
pub trait CameraLocator {
    fn resolve(&self) -> Result<StreamAddress, CameraNotFound>;
}

impl<F> CameraLocator for F
where
    F: Fn() -> Result<StreamAddress, CameraNotFound>,
{
    fn resolve(&self) -> Result<StreamAddress, CameraNotFound> {
        self()
    }
}

/// A camera with a fixed address.
#[derive(Debug, Clone)]
pub struct StaticLocator {
    address: StreamAddress,
}

impl StaticLocator {
    pub const fn new(address: StreamAddress) -> Self {
        Self { address }
    }
}

impl CameraLocator for StaticLocator {
    fn resolve(&self) -> Result<StreamAddress, CameraNotFound> {
        Ok(self.address.clone())
    }
}

/// Finds the camera by hardware address in the kernel neighbour table.
///
/// The table only lists hosts this machine has talked to recently; cameras
/// that stream continuously (or are pinged by the network) stay listed.
#[derive(Debug, Clone)]
pub struct ArpTableLocator {
    table: PathBuf,
    mac: String,
    url_template: String,
}

impl ArpTableLocator {
    /// `url_template` must contain `{ip}`, e.g. `rtsp://user:pw@{ip}/stream1`.
    pub fn new(mac: &str, url_template: impl Into<String>) -> Self {
        Self {
            table: PathBuf::from(DEFAULT_ARP_TABLE),
            mac: normalize_mac(mac),
            url_template: url_template.into(),
        }
    }

    /// Reads a different neighbour table (for tests, or other layouts).
    #[must_use]
    pub fn with_table(mut self, table: impl Into<PathBuf>) -> Self {
        self.table = table.into();
        self
    }

    fn find_ip(&self, table: &str) -> Option<String> {
        // IP address  HW type  Flags  HW address  Mask  Device
        table.lines().skip(1).find_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [ip, _, flags, hw, ..] = fields.as_slice() else {
                return None;
            };
            let complete = *flags != "0x0" && *hw != "00:00:00:00:00:00";
            (complete && normalize_mac(hw) == self.mac).then(|| (*ip).to_string())
        })
    }
}

impl CameraLocator for ArpTableLocator {
    fn resolve(&self) -> Result<StreamAddress, CameraNotFound> {
        let content = fs::read_to_string(&self.table).map_err(|source| CameraNotFound::Table {
            table: self.table.clone(),
            source,
        })?;
        let ip = self.find_ip(&content).ok_or_else(|| CameraNotFound::NoMatch {
            mac: self.mac.clone(),
            table: self.table.clone(),
        })?;
        tracing::info!(mac = %self.mac, %ip, "found camera");
        Ok(StreamAddress::new(
            self.url_template.replace(IP_PLACEHOLDER, &ip),
        )?)
    }
}

fn normalize_mac(mac: &str) -> String {
    mac.trim().to_ascii_lowercase().replace('-', ":")
}
