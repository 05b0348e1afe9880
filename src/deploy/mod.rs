//! Deploy pipeline
//!
//! For each machine in the plan: lookup, cleanup of prior layout,
//! network configuration, OS storage configuration, user-data assembly
//! and the deploy request. Every step is a sequence of declarative
//! calls into the region API; the region enforces object lifecycle and
//! machine state transitions.

pub mod cleanup;
pub mod network;
pub mod storage;
pub mod userdata;

use tracing::{info, warn};

use crate::maas::types::Machine;
use crate::plan::{HostConfig, Plan};
use crate::{DeployError, MaasClient};

/// Deploy every machine in the plan, in declaration order
///
/// Machines that are missing from the region or not in the Ready state
/// are skipped with a warning. Any other failure aborts the run.
pub async fn run_plan(client: &MaasClient, plan: &Plan) -> Result<(), DeployError> {
    for (hostname, host) in &plan.machines {
        let Some(machine) = find_machine(client, hostname).await? else {
            warn!("No machine named {} found", hostname);
            continue;
        };

        if !machine.is_ready() {
            warn!(
                "Machine {} is not Ready (status: {}), skipping",
                hostname, machine.status_name
            );
            continue;
        }

        deploy_machine(client, machine, host)
            .await
            .map_err(|e| match e {
                e @ DeployError::Machine { .. } => e,
                e => DeployError::machine(hostname, e.to_string()),
            })?;
    }
    Ok(())
}

/// Release every machine in the plan back to the pool
pub async fn release_plan(client: &MaasClient, plan: &Plan) -> Result<(), DeployError> {
    for hostname in plan.hostnames() {
        match find_machine(client, hostname).await? {
            Some(machine) => {
                info!("Releasing {}", hostname);
                client.release(&machine.system_id).await?;
            }
            None => warn!("No machine named {} found", hostname),
        }
    }
    Ok(())
}

async fn find_machine(
    client: &MaasClient,
    hostname: &str,
) -> Result<Option<Machine>, DeployError> {
    Ok(client
        .machines()
        .await?
        .into_iter()
        .find(|m| m.hostname == hostname))
}

/// Run the full pipeline for one Ready machine
pub async fn deploy_machine(
    client: &MaasClient,
    machine: Machine,
    host: &HostConfig,
) -> Result<(), DeployError> {
    info!("Starting deployment of {}", machine.hostname);
    let system_id = machine.system_id.clone();

    let machine = cleanup::cleanup_machine(client, machine).await?;
    let machine = network::configure_network(client, machine, host).await?;
    storage::configure_system_disks(client, machine, host).await?;

    let machine = client.machine(&system_id).await?;
    let user_data = userdata::build_user_data(client, machine, host).await?;

    client
        .deploy(
            &system_id,
            host.os.as_deref(),
            &user_data,
            host.kernel.as_deref(),
        )
        .await?;

    let machine = client.machine(&system_id).await?;
    info!(
        "Machine {} is now in {} state",
        machine.hostname, machine.status_name
    );
    Ok(())
}
