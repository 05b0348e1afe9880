//! Cleanup of prior storage and network layout
//!
//! Deployed-and-released machines come back with stale bonds, links,
//! volume groups and partitions. Everything layered on top of the
//! physical hardware is removed before the new layout is declared.

use tracing::debug;

use crate::maas::types::{BlockDeviceType, InterfaceType, Machine};
use crate::{DeployError, MaasClient};

/// Strip the machine down to bare physical devices
///
/// Bonds are deleted, physical interfaces are disconnected (never
/// deleted), volume groups and virtual block devices are removed, and
/// every partition on a physical disk is deleted. Returns the machine
/// re-fetched from the region.
pub async fn cleanup_machine(
    client: &MaasClient,
    machine: Machine,
) -> Result<Machine, DeployError> {
    let system_id = &machine.system_id;
    debug!("Cleaning up {}", machine.hostname);

    for interface in &machine.interface_set {
        match interface.interface_type {
            InterfaceType::Bond => {
                debug!("Deleting bond {}", interface.name);
                client.delete_interface(system_id, interface.id).await?;
            }
            InterfaceType::Physical => {
                debug!("Disconnecting {}", interface.name);
                client.disconnect_interface(system_id, interface.id).await?;
            }
            _ => {}
        }
    }

    for vg in client.volume_groups(system_id).await? {
        debug!("Deleting volume group {}", vg.name);
        client.delete_volume_group(system_id, vg.id).await?;
    }

    for disk in &machine.blockdevice_set {
        if disk.device_type == BlockDeviceType::Virtual {
            debug!("Deleting virtual device {}", disk.name);
            client.delete_block_device(system_id, disk.id).await?;
        }
    }

    for disk in machine.physical_disks() {
        for partition in &disk.partitions {
            debug!("Deleting partition {} on {}", partition.id, disk.name);
            client
                .delete_partition(system_id, disk.id, partition.id)
                .await?;
        }
    }

    client.machine(system_id).await
}
