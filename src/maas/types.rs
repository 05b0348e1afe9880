//! MAAS resource records
//!
//! Deserialized views of the JSON the region API returns. Only the
//! fields the deploy pipeline reads are modeled; everything else in the
//! payloads is ignored. The region owns these objects and their
//! lifecycle. These are snapshots, not live handles.

use serde::Deserialize;

/// A machine as returned by the machines endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct Machine {
    pub system_id: String,
    pub hostname: String,
    /// Human-readable status ("Ready", "Deploying", ...)
    pub status_name: String,
    #[serde(default)]
    pub interface_set: Vec<Interface>,
    #[serde(default)]
    pub blockdevice_set: Vec<BlockDevice>,
    pub boot_interface: Option<Interface>,
}

impl Machine {
    pub fn is_ready(&self) -> bool {
        self.status_name == "Ready"
    }

    /// Physical block devices, in region order
    pub fn physical_disks(&self) -> impl Iterator<Item = &BlockDevice> {
        self.blockdevice_set
            .iter()
            .filter(|d| d.device_type == BlockDeviceType::Physical)
    }

    pub fn find_disk(&self, name: &str) -> Option<&BlockDevice> {
        self.blockdevice_set.iter().find(|d| d.name == name)
    }
}

/// Network interface types the region reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceType {
    Physical,
    Bond,
    Vlan,
    Bridge,
    Alias,
    Unknown,
}

/// A machine network interface
#[derive(Debug, Clone, Deserialize)]
pub struct Interface {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub interface_type: InterfaceType,
    pub mac_address: Option<String>,
    #[serde(default)]
    pub links: Vec<Link>,
    pub vlan: Option<Vlan>,
}

/// An address configuration attached to an interface
#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    pub id: u64,
    /// "auto", "dhcp", "static" or "link_up"
    pub mode: String,
    pub ip_address: Option<String>,
    pub subnet: Option<Subnet>,
}

/// Link modes accepted by the link_subnet operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    Auto,
    Dhcp,
    Static,
    LinkUp,
}

impl LinkMode {
    /// Wire value (the API expects upper case here)
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkMode::Auto => "AUTO",
            LinkMode::Dhcp => "DHCP",
            LinkMode::Static => "STATIC",
            LinkMode::LinkUp => "LINK_UP",
        }
    }
}

/// A subnet known to the region
#[derive(Debug, Clone, Deserialize)]
pub struct Subnet {
    pub id: u64,
    pub name: String,
    pub cidr: String,
}

/// A fabric with its VLANs
#[derive(Debug, Clone, Deserialize)]
pub struct Fabric {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub vlans: Vec<Vlan>,
}

impl Fabric {
    /// The fabric's untagged (default) VLAN
    pub fn default_vlan(&self) -> Option<&Vlan> {
        self.vlans.iter().find(|v| v.vid == 0)
    }

    /// Look up a VLAN by its 802.1Q ID, falling back to its name
    pub fn find_vlan(&self, vid: u16) -> Option<&Vlan> {
        self.vlans
            .iter()
            .find(|v| v.vid == u64::from(vid))
            .or_else(|| self.vlans.iter().find(|v| v.name == vid.to_string()))
    }
}

/// A VLAN on a fabric
#[derive(Debug, Clone, Deserialize)]
pub struct Vlan {
    pub id: u64,
    pub name: String,
    pub vid: u64,
}

/// Block device types the region reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockDeviceType {
    Physical,
    Virtual,
}

/// A block device on a machine, physical or RAID/LVM-backed
#[derive(Debug, Clone, Deserialize)]
pub struct BlockDevice {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: BlockDeviceType,
    pub size: u64,
    pub available_size: u64,
    /// "Unused", or a description of the consumer
    #[serde(default)]
    pub used_for: String,
    #[serde(default)]
    pub partitions: Vec<Partition>,
}

impl BlockDevice {
    pub fn is_unused(&self) -> bool {
        self.used_for == "Unused"
    }
}

/// A partition on a block device
#[derive(Debug, Clone, Deserialize)]
pub struct Partition {
    pub id: u64,
    pub size: u64,
    /// Owning block device
    #[serde(default)]
    pub device_id: u64,
}

/// RAID levels the deploy pipeline creates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaidLevel {
    Raid1,
    Raid6,
}

impl RaidLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RaidLevel::Raid1 => "raid-1",
            RaidLevel::Raid6 => "raid-6",
        }
    }
}

/// A software RAID array and the virtual device it backs
#[derive(Debug, Clone, Deserialize)]
pub struct Raid {
    pub id: u64,
    pub name: String,
    pub virtual_device: BlockDevice,
}

/// An LVM volume group
#[derive(Debug, Clone, Deserialize)]
pub struct VolumeGroup {
    pub id: u64,
    pub name: String,
}
