//! Cloud-config user-data assembly
//!
//! The plan's free-form `user_data` mapping is passed through as
//! cloud-config. Spare-disk handling happens here because the
//! `disk_array` variant injects a bootcmd that names every block device
//! the region still reports as unused after JBOD and data-array setup.

use serde_yaml::{Mapping, Value};
use tracing::debug;

use super::storage;
use crate::maas::types::Machine;
use crate::plan::{HostConfig, UnusedDisks};
use crate::{DeployError, MaasClient};

/// Assemble the final user-data payload for the deploy request
pub async fn build_user_data(
    client: &MaasClient,
    machine: Machine,
    host: &HostConfig,
) -> Result<Vec<u8>, DeployError> {
    let mut user_data = host.user_data.clone().unwrap_or_default();

    if let Some(unused) = &host.unused_disks {
        apply_unused_disks(client, machine, unused, &mut user_data).await?;
    }

    render_cloud_config(&user_data)
}

async fn apply_unused_disks(
    client: &MaasClient,
    machine: Machine,
    unused: &UnusedDisks,
    user_data: &mut Mapping,
) -> Result<(), DeployError> {
    let mut machine = machine;

    if !unused.jbod_disks.is_empty() {
        machine = storage::configure_jbod_disks(client, machine, &unused.jbod_disks).await?;
    }

    if let Some(raid_array) = &unused.raid_array {
        machine = storage::configure_raid_array(client, &machine, raid_array).await?;
    }

    if let Some(disk_array) = &unused.disk_array {
        insert_disk_array_bootcmd(user_data, disk_array, unused.step2.as_deref(), &machine);
    }

    Ok(())
}

/// Inject a bootcmd that runs `disk_array` over every unused device
///
/// The declared argv is extended with `/dev/<name>` for each block
/// device the region reports as unused, followed by the optional
/// `step2` command.
fn insert_disk_array_bootcmd(
    user_data: &mut Mapping,
    disk_array: &[String],
    step2: Option<&[String]>,
    machine: &Machine,
) {
    let mut command: Vec<Value> = disk_array
        .iter()
        .map(|arg| Value::String(arg.clone()))
        .collect();

    for device in machine.blockdevice_set.iter().filter(|d| d.is_unused()) {
        debug!("disk_array picks up /dev/{}", device.name);
        command.push(Value::String(format!("/dev/{}", device.name)));
    }

    let mut bootcmd = vec![Value::Sequence(command)];
    if let Some(step2) = step2 {
        bootcmd.push(Value::Sequence(
            step2.iter().map(|arg| Value::String(arg.clone())).collect(),
        ));
    }

    user_data.insert(
        Value::String("bootcmd".to_string()),
        Value::Sequence(bootcmd),
    );
}

/// Serialize a cloud-config mapping with its magic header
pub fn render_cloud_config(user_data: &Mapping) -> Result<Vec<u8>, DeployError> {
    let mut payload = b"#cloud-config\n".to_vec();
    payload.extend_from_slice(serde_yaml::to_string(user_data)?.as_bytes());
    Ok(payload)
}
