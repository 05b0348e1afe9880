//! Storage configuration
//!
//! The OS lives on a software RAID (a mirror over an auto-discovered
//! pair of equal-sized disks, or an explicit RAID6 set), optionally
//! carved up with LVM. Disks that are not part of the OS array can be
//! mounted individually (JBOD) or assembled into a second RAID6 array.

use std::collections::HashMap;
use tracing::{debug, info};

use crate::maas::types::{BlockDevice, Machine, Partition, RaidLevel};
use crate::plan::{HostConfig, JbodDisk, LvmPlan, RaidArrayPlan, RaidPlan};
use crate::{DeployError, MaasClient};

/// Partitions are aligned down to 4 MiB blocks
pub const BLOCK_SIZE: u64 = 4 * 1024 * 1024;

/// Space left unallocated at the end of data partitions; also the
/// amount shaved off when the region rejects a full-size OS partition
const PARTITION_SLACK: u64 = 512_000_000;

/// Build the OS array and its filesystems per the host plan
pub async fn configure_system_disks(
    client: &MaasClient,
    machine: Machine,
    host: &HostConfig,
) -> Result<Machine, DeployError> {
    let system_id = machine.system_id.clone();

    let (disks, level, lvm) = select_os_disks(&machine, host)?;
    info!(
        "OS array on {}: {:?} as {}",
        machine.hostname,
        disks.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
        level.as_str()
    );

    client.set_boot_disk(&system_id, disks[0].id).await?;

    let mut partition_ids = Vec::new();
    for disk in &disks {
        let partition = create_aligned_partition(client, &system_id, disk).await?;
        partition_ids.push(partition.id);
    }

    let raid = client
        .create_raid(&system_id, "md0", level, &partition_ids)
        .await?;

    match (lvm, &host.os_partitions) {
        (Some(lvm), Some(partitions)) => {
            let vg = client
                .create_volume_group(&system_id, &lvm.name, &[raid.virtual_device.id])
                .await?;
            for (mount_point, layout) in partitions {
                let lv_name = logical_volume_name(mount_point);
                debug!("Logical volume {} for {}", lv_name, mount_point);
                let lv = client
                    .create_logical_volume(&system_id, vg.id, &lv_name, &layout.size.to_string())
                    .await?;
                client
                    .format_block_device(&system_id, lv.id, &layout.filesystem)
                    .await?;
                client
                    .mount_block_device(&system_id, lv.id, mount_point)
                    .await?;
            }
        }
        (Some(_), None) => {
            return Err(DeployError::storage(
                "use_lvm requires os_partitions to be declared",
            ));
        }
        (None, Some(partitions)) => {
            for (mount_point, layout) in partitions {
                let partition = client
                    .create_partition(
                        &system_id,
                        raid.virtual_device.id,
                        &layout.size.to_string(),
                    )
                    .await?;
                client
                    .format_partition(
                        &system_id,
                        raid.virtual_device.id,
                        partition.id,
                        &layout.filesystem,
                    )
                    .await?;
                client
                    .mount_partition(&system_id, raid.virtual_device.id, partition.id, mount_point)
                    .await?;
            }
        }
        (None, None) => {
            client
                .format_block_device(&system_id, raid.virtual_device.id, "ext4")
                .await?;
            client
                .mount_block_device(&system_id, raid.virtual_device.id, "/")
                .await?;
        }
    }

    client.machine(&system_id).await
}

/// Pick the OS disks, RAID level and LVM settings from the plan
///
/// os_raid6 takes precedence and requires explicitly named disks;
/// os_raid1 (or no plan at all) falls back to auto-discovery of the
/// unique pair of equal-sized disks.
fn select_os_disks<'a>(
    machine: &'a Machine,
    host: &'a HostConfig,
) -> Result<(Vec<&'a BlockDevice>, RaidLevel, Option<&'a LvmPlan>), DeployError> {
    if let Some(plan) = &host.os_raid6 {
        if plan.disks.is_empty() {
            return Err(DeployError::storage(
                "RAID6 requires explicitly named disks",
            ));
        }
        let disks = named_disks(machine, &plan.disks);
        if disks.len() != plan.disks.len() {
            return Err(DeployError::storage(format!(
                "RAID6 disks {:?} not all present on {}",
                plan.disks, machine.hostname
            )));
        }
        return Ok((disks, RaidLevel::Raid6, active_lvm(plan)));
    }

    let plan = host.os_raid1.as_ref();
    let disks = match plan {
        Some(p) if !p.disks.is_empty() => {
            let disks = named_disks(machine, &p.disks);
            if disks.len() != 2 {
                return Err(DeployError::storage(format!(
                    "RAID1 needs exactly two disks, {:?} resolved to {}",
                    p.disks,
                    disks.len()
                )));
            }
            disks
        }
        _ => discover_raid1_pair(machine)?,
    };

    Ok((disks, RaidLevel::Raid1, plan.and_then(active_lvm)))
}

fn active_lvm(plan: &RaidPlan) -> Option<&LvmPlan> {
    plan.use_lvm.as_ref().filter(|lvm| lvm.enable)
}

/// Logical volume name for an OS mountpoint ("/var" becomes "vg-sys-var")
fn logical_volume_name(mount_point: &str) -> String {
    format!("vg-sys{}", mount_point.replace('/', "-"))
}

fn named_disks<'a>(machine: &'a Machine, names: &[String]) -> Vec<&'a BlockDevice> {
    machine
        .blockdevice_set
        .iter()
        .filter(|d| names.contains(&d.name))
        .collect()
}

/// Find the OS mirror pair: exactly one size class with exactly two disks
fn discover_raid1_pair(machine: &Machine) -> Result<Vec<&BlockDevice>, DeployError> {
    let mut by_size: HashMap<u64, Vec<&BlockDevice>> = HashMap::new();
    for disk in machine.physical_disks() {
        by_size.entry(disk.size).or_default().push(disk);
    }

    let mut pair: Option<Vec<&BlockDevice>> = None;
    for disks in by_size.values() {
        if disks.len() == 2 {
            if pair.is_some() {
                return Err(DeployError::storage(format!(
                    "ambiguous pair of equal-sized disks on {}",
                    machine.hostname
                )));
            }
            pair = Some(disks.clone());
        }
    }

    pair.ok_or_else(|| {
        DeployError::storage(format!(
            "OS disks cannot be discovered automatically on {}",
            machine.hostname
        ))
    })
}

/// Largest partition fitting the disk, aligned down to 4 MiB blocks
fn aligned_partition_size(available: u64) -> Result<u64, DeployError> {
    let blocks = available / BLOCK_SIZE;
    if blocks == 0 {
        return Err(DeployError::storage(format!(
            "only {} bytes available, below one {} byte block",
            available, BLOCK_SIZE
        )));
    }
    Ok(blocks * BLOCK_SIZE - 1)
}

/// Create the OS partition on one disk, retrying once with slack
///
/// Some disks report more usable space than the region will actually
/// allocate; a rejection is retried with 512 MB less.
async fn create_aligned_partition(
    client: &MaasClient,
    system_id: &str,
    disk: &BlockDevice,
) -> Result<Partition, DeployError> {
    let size = aligned_partition_size(disk.available_size)?;

    match client
        .create_partition(system_id, disk.id, &size.to_string())
        .await
    {
        Ok(partition) => Ok(partition),
        Err(e) if e.is_api_rejection() => {
            debug!(
                "Full-size partition on {} rejected, retrying with slack",
                disk.name
            );
            client
                .create_partition(
                    system_id,
                    disk.id,
                    &size.saturating_sub(PARTITION_SLACK).to_string(),
                )
                .await
        }
        Err(e) => Err(e),
    }
}

/// Format and mount standalone data disks, one partition each
pub async fn configure_jbod_disks(
    client: &MaasClient,
    machine: Machine,
    jbod: &[JbodDisk],
) -> Result<Machine, DeployError> {
    let system_id = machine.system_id.clone();
    let mut machine = machine;

    for conf in jbod {
        let disk = machine.find_disk(&conf.device).ok_or_else(|| {
            DeployError::storage(format!(
                "JBOD device '{}' not found on {}",
                conf.device, machine.hostname
            ))
        })?;

        debug!("JBOD {} -> {} ({})", conf.device, conf.mountpoint, conf.fs);
        let size = disk.available_size.saturating_sub(PARTITION_SLACK);
        let partition = client
            .create_partition(&system_id, disk.id, &size.to_string())
            .await?;
        client
            .format_partition(&system_id, disk.id, partition.id, &conf.fs)
            .await?;
        client
            .mount_partition(&system_id, disk.id, partition.id, &conf.mountpoint)
            .await?;

        machine = client.machine(&system_id).await?;
    }

    Ok(machine)
}

/// Assemble the named disks into a second RAID6 array ("md1")
pub async fn configure_raid_array(
    client: &MaasClient,
    machine: &Machine,
    plan: &RaidArrayPlan,
) -> Result<Machine, DeployError> {
    let system_id = &machine.system_id;

    let mut partition_ids = Vec::new();
    for disk in named_disks(machine, &plan.disks) {
        let size = disk.available_size.saturating_sub(PARTITION_SLACK);
        let partition = client
            .create_partition(system_id, disk.id, &size.to_string())
            .await?;
        partition_ids.push(partition.id);
    }

    if partition_ids.is_empty() {
        return Err(DeployError::storage(format!(
            "raid_array disks {:?} not present on {}",
            plan.disks, machine.hostname
        )));
    }

    let raid = client
        .create_raid(system_id, "md1", RaidLevel::Raid6, &partition_ids)
        .await?;
    client
        .format_block_device(system_id, raid.virtual_device.id, &plan.fs)
        .await?;
    client
        .mount_block_device(system_id, raid.virtual_device.id, &plan.mountpoint)
        .await?;

    client.machine(system_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn disk(id: u64, name: &str, size: u64) -> serde_json::Value {
        json!({
            "id": id,
            "name": name,
            "type": "physical",
            "size": size,
            "available_size": size,
            "used_for": "Unused",
            "partitions": []
        })
    }

    fn machine_with_disks(disks: Vec<serde_json::Value>) -> Machine {
        serde_json::from_value(json!({
            "system_id": "abc123",
            "hostname": "node-01",
            "status_name": "Ready",
            "interface_set": [],
            "blockdevice_set": disks,
            "boot_interface": null
        }))
        .unwrap()
    }

    const GB: u64 = 1_000_000_000;

    #[test]
    fn test_aligned_partition_size() {
        // 100 GB is not a whole number of 4 MiB blocks
        let size = aligned_partition_size(100 * GB).unwrap();
        assert_eq!(size % BLOCK_SIZE, BLOCK_SIZE - 1);
        assert!(size <= 100 * GB);
        assert!(100 * GB - size < 2 * BLOCK_SIZE);

        // Exact multiple still loses one byte
        assert_eq!(
            aligned_partition_size(10 * BLOCK_SIZE).unwrap(),
            10 * BLOCK_SIZE - 1
        );
    }

    #[test]
    fn test_aligned_partition_size_tiny_disk() {
        assert!(aligned_partition_size(BLOCK_SIZE - 1).is_err());
    }

    #[test]
    fn test_discover_raid1_pair() {
        let machine = machine_with_disks(vec![
            disk(1, "sda", 240 * GB),
            disk(2, "sdb", 240 * GB),
            disk(3, "sdc", 8000 * GB),
        ]);

        let pair = discover_raid1_pair(&machine).unwrap();
        let names: Vec<&str> = pair.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["sda", "sdb"]);
    }

    #[test]
    fn test_discover_raid1_pair_ambiguous() {
        let machine = machine_with_disks(vec![
            disk(1, "sda", 240 * GB),
            disk(2, "sdb", 240 * GB),
            disk(3, "sdc", 480 * GB),
            disk(4, "sdd", 480 * GB),
        ]);

        assert!(matches!(
            discover_raid1_pair(&machine),
            Err(DeployError::Storage(_))
        ));
    }

    #[test]
    fn test_discover_raid1_pair_no_pair() {
        let machine = machine_with_disks(vec![
            disk(1, "sda", 240 * GB),
            disk(2, "sdb", 480 * GB),
        ]);

        assert!(discover_raid1_pair(&machine).is_err());
    }

    #[test]
    fn test_select_os_disks_explicit_raid1() {
        let machine = machine_with_disks(vec![
            disk(1, "sda", 240 * GB),
            disk(2, "sdb", 240 * GB),
            disk(3, "sdc", 240 * GB),
        ]);

        let mut host = HostConfig::default();
        host.os_raid1 = Some(RaidPlan {
            disks: vec!["sda".to_string(), "sdc".to_string()],
            use_lvm: None,
        });

        let (disks, level, lvm) = select_os_disks(&machine, &host).unwrap();
        assert_eq!(level, RaidLevel::Raid1);
        assert!(lvm.is_none());
        let names: Vec<&str> = disks.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["sda", "sdc"]);
    }

    #[test]
    fn test_select_os_disks_raid6_requires_disks() {
        let machine = machine_with_disks(vec![disk(1, "sda", 240 * GB)]);

        let mut host = HostConfig::default();
        host.os_raid6 = Some(RaidPlan::default());

        assert!(select_os_disks(&machine, &host).is_err());
    }

    #[test]
    fn test_select_os_disks_raid6_takes_precedence() {
        let machine = machine_with_disks(vec![
            disk(1, "sda", 240 * GB),
            disk(2, "sdb", 240 * GB),
            disk(3, "sdc", 240 * GB),
        ]);

        let mut host = HostConfig::default();
        host.os_raid1 = Some(RaidPlan::default());
        host.os_raid6 = Some(RaidPlan {
            disks: vec!["sda".into(), "sdb".into(), "sdc".into()],
            use_lvm: None,
        });

        let (disks, level, _) = select_os_disks(&machine, &host).unwrap();
        assert_eq!(level, RaidLevel::Raid6);
        assert_eq!(disks.len(), 3);
    }

    #[test]
    fn test_logical_volume_names() {
        assert_eq!(logical_volume_name("/"), "vg-sys-");
        assert_eq!(logical_volume_name("/var"), "vg-sys-var");
        assert_eq!(logical_volume_name("/var/log"), "vg-sys-var-log");
    }

    #[test]
    fn test_lvm_disabled_is_ignored() {
        let plan = RaidPlan {
            disks: vec![],
            use_lvm: Some(LvmPlan {
                enable: false,
                name: "vg-sys".to_string(),
            }),
        };
        assert!(active_lvm(&plan).is_none());
    }
}
