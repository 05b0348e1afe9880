//! Machine plan parsing and types
//!
//! The plan is a single YAML document listing hostnames with their
//! desired network bonding, OS RAID/LVM layout, spare-disk handling and
//! free-form cloud-config user-data. Declaration order is preserved:
//! machines are deployed and OS partitions are created in the order
//! they appear in the file.

pub mod loader;

use indexmap::IndexMap;
use serde::Deserialize;

/// Parsed machine plan
#[derive(Debug, Clone, Default)]
pub struct Plan {
    /// Hostname -> per-host configuration, in declaration order
    pub machines: IndexMap<String, HostConfig>,
}

/// Raw plan document as it appears on disk
///
/// A hostname may map to `null` (deploy with defaults only); that is
/// normalized to an empty [`HostConfig`] when building a [`Plan`].
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PlanFile {
    #[serde(default)]
    pub machines: IndexMap<String, Option<HostConfig>>,
}

impl From<PlanFile> for Plan {
    fn from(file: PlanFile) -> Self {
        let machines = file
            .machines
            .into_iter()
            .map(|(hostname, config)| (hostname, config.unwrap_or_default()))
            .collect();
        Self { machines }
    }
}

impl Plan {
    /// Parse a plan from YAML text
    pub fn from_yaml(content: &str) -> Result<Self, crate::DeployError> {
        let file: PlanFile = serde_yaml::from_str(content)?;
        Ok(file.into())
    }

    /// Hostnames in declaration order
    pub fn hostnames(&self) -> impl Iterator<Item = &str> {
        self.machines.keys().map(String::as_str)
    }
}

/// Per-host configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Distro series to deploy (e.g. "jammy")
    pub os: Option<String>,

    /// HWE kernel to deploy (e.g. "hwe-22.04")
    pub kernel: Option<String>,

    /// Subnet name for a DHCP link on the boot interface
    pub admin_net: Option<String>,

    /// Bonded interface with optional VLAN bridges
    pub net_bonding: Option<BondPlan>,

    /// OS disks as a RAID1 mirror
    pub os_raid1: Option<RaidPlan>,

    /// OS disks as a RAID6 array (takes precedence over os_raid1)
    pub os_raid6: Option<RaidPlan>,

    /// Mountpoint -> partition layout on the OS array, in order
    pub os_partitions: Option<IndexMap<String, OsPartition>>,

    /// What to do with disks not holding the OS
    pub unused_disks: Option<UnusedDisks>,

    /// Free-form cloud-config mapping passed through as user-data
    pub user_data: Option<serde_yaml::Mapping>,
}

/// Bond over named slave interfaces, 802.3ad with fast LACP
#[derive(Debug, Clone, Deserialize)]
pub struct BondPlan {
    /// Bond interface name (e.g. "bond0")
    pub name: String,

    /// Physical interfaces to enslave
    pub slaves: Vec<String>,

    /// Fabric holding the VLANs below (required when vlans is non-empty)
    pub fabric: Option<String>,

    /// Bridge name suffix -> VLAN attachment, in declaration order
    #[serde(default)]
    pub vlans: IndexMap<String, VlanPlan>,
}

/// One VLAN hung off the bond, wrapped in a bridge
#[derive(Debug, Clone, Deserialize)]
pub struct VlanPlan {
    /// 802.1Q VLAN ID
    pub vlan: u16,

    /// Subnet name; without it the bridge sits directly on the bond
    pub subnet: Option<String>,

    /// Static address on the subnet
    pub ip: Option<String>,

    /// Bridge MTU (default 1050)
    pub mtu: Option<u32>,

    /// Configure this VLAN first so its nameservers win
    pub default_dns: Option<bool>,

    /// Make the static link the default gateway
    pub default_gateway: Option<bool>,
}

impl VlanPlan {
    pub const DEFAULT_MTU: u32 = 1050;

    pub fn mtu(&self) -> u32 {
        self.mtu.unwrap_or(Self::DEFAULT_MTU)
    }

    pub fn default_gateway(&self) -> bool {
        self.default_gateway.unwrap_or(false)
    }
}

/// OS RAID member disks and optional LVM on top
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RaidPlan {
    /// Member disk names; empty means auto-discovery (RAID1 only)
    pub disks: Vec<String>,

    /// Put a volume group on the array instead of plain partitions
    pub use_lvm: Option<LvmPlan>,
}

/// LVM settings for the OS array
#[derive(Debug, Clone, Deserialize)]
pub struct LvmPlan {
    pub enable: bool,
    /// Volume group name
    pub name: String,
}

/// One partition (or logical volume) on the OS array
#[derive(Debug, Clone, Deserialize)]
pub struct OsPartition {
    pub size: SizeSpec,
    pub filesystem: String,
}

/// Size as raw bytes or a human expression ("50G"), passed to the API verbatim
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SizeSpec {
    Bytes(u64),
    Expression(String),
}

impl std::fmt::Display for SizeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SizeSpec::Bytes(bytes) => write!(f, "{}", bytes),
            SizeSpec::Expression(expr) => write!(f, "{}", expr),
        }
    }
}

/// Handling of disks left over after the OS array is built
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UnusedDisks {
    /// Disks formatted and mounted individually
    pub jbod_disks: Vec<JbodDisk>,

    /// Second RAID6 array over named disks
    pub raid_array: Option<RaidArrayPlan>,

    /// Bootcmd argv; paths of still-unused devices are appended to it
    pub disk_array: Option<Vec<String>>,

    /// Follow-up bootcmd after the disk_array command
    pub step2: Option<Vec<String>>,
}

/// One standalone data disk
#[derive(Debug, Clone, Deserialize)]
pub struct JbodDisk {
    /// Block device name (e.g. "sdc")
    pub device: String,
    pub fs: String,
    pub mountpoint: String,
}

/// Secondary RAID6 data array ("md1")
#[derive(Debug, Clone, Deserialize)]
pub struct RaidArrayPlan {
    pub disks: Vec<String>,
    pub fs: String,
    pub mountpoint: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
machines:
  storage-01:
    os: jammy
    kernel: hwe-22.04
    admin_net: admin
    net_bonding:
      name: bond0
      slaves: [eno1, eno2]
      fabric: fabric-0
      vlans:
        ceph:
          vlan: 100
          subnet: ceph-net
          ip: 10.0.100.11
          mtu: 9000
          default_dns: true
          default_gateway: true
        backup:
          vlan: 200
    os_raid1:
      disks: [sda, sdb]
      use_lvm:
        enable: true
        name: vg-sys
    os_partitions:
      /: { size: 50G, filesystem: ext4 }
      /var: { size: 20000000000, filesystem: xfs }
    unused_disks:
      jbod_disks:
        - { device: sdc, fs: xfs, mountpoint: /data1 }
      disk_array: [mkfs.xfs, -f]
      step2: [mount, -a]
    user_data:
      packages: [ceph-osd]
  compute-01:
"#;

    #[test]
    fn test_parse_full_plan() {
        let plan = Plan::from_yaml(SAMPLE).unwrap();
        assert_eq!(plan.machines.len(), 2);

        let host = &plan.machines["storage-01"];
        assert_eq!(host.os.as_deref(), Some("jammy"));
        assert_eq!(host.kernel.as_deref(), Some("hwe-22.04"));

        let bond = host.net_bonding.as_ref().unwrap();
        assert_eq!(bond.name, "bond0");
        assert_eq!(bond.slaves, vec!["eno1", "eno2"]);
        assert_eq!(bond.vlans.len(), 2);
        assert_eq!(bond.vlans["ceph"].vlan, 100);
        assert_eq!(bond.vlans["ceph"].mtu(), 9000);
        assert!(bond.vlans["ceph"].default_gateway());
        assert_eq!(bond.vlans["backup"].mtu(), VlanPlan::DEFAULT_MTU);
        assert!(!bond.vlans["backup"].default_gateway());

        let raid = host.os_raid1.as_ref().unwrap();
        assert_eq!(raid.disks, vec!["sda", "sdb"]);
        assert!(raid.use_lvm.as_ref().unwrap().enable);
    }

    #[test]
    fn test_os_partitions_preserve_order() {
        let plan = Plan::from_yaml(SAMPLE).unwrap();
        let host = &plan.machines["storage-01"];
        let mounts: Vec<&String> = host.os_partitions.as_ref().unwrap().keys().collect();
        assert_eq!(mounts, vec!["/", "/var"]);
    }

    #[test]
    fn test_size_spec_display() {
        let plan = Plan::from_yaml(SAMPLE).unwrap();
        let parts = plan.machines["storage-01"].os_partitions.as_ref().unwrap();
        assert_eq!(parts["/"].size.to_string(), "50G");
        assert_eq!(parts["/var"].size.to_string(), "20000000000");
    }

    #[test]
    fn test_null_host_config_normalized() {
        let plan = Plan::from_yaml(SAMPLE).unwrap();
        let host = &plan.machines["compute-01"];
        assert!(host.os.is_none());
        assert!(host.net_bonding.is_none());
    }

    #[test]
    fn test_empty_document() {
        let plan = Plan::from_yaml("machines: {}").unwrap();
        assert!(plan.machines.is_empty());
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        assert!(Plan::from_yaml("machines: [not, a, map]").is_err());
    }
}
