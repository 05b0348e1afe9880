//! Network configuration
//!
//! Rewires the boot interface's link, optionally builds an 802.3ad bond
//! over named slaves, and hangs VLAN interfaces off the bond with a
//! bridge on top of each (the bridges are what the deployed OS plugs
//! its workloads into).

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::maas::types::{Fabric, Interface, LinkMode, Machine};
use crate::plan::{BondPlan, HostConfig, VlanPlan};
use crate::{DeployError, MaasClient};

/// Configure the machine's network per the host plan
pub async fn configure_network(
    client: &MaasClient,
    machine: Machine,
    host: &HostConfig,
) -> Result<Machine, DeployError> {
    let system_id = machine.system_id.clone();

    match &machine.boot_interface {
        Some(boot) => {
            // Drop whatever link commissioning left behind
            if let Some(link) = boot.links.first() {
                client.unlink_subnet(&system_id, boot.id, link.id).await?;
            }

            if let Some(admin) = admin_subnet_name(host) {
                let subnet = client.subnet_by_name(admin).await?;
                debug!("DHCP link on boot interface via {}", subnet.name);
                client
                    .link_subnet(&system_id, boot.id, LinkMode::Dhcp, subnet.id, None, false)
                    .await?;
            }
        }
        None => {
            if admin_subnet_name(host).is_some() {
                return Err(DeployError::network(format!(
                    "machine {} has no boot interface",
                    machine.hostname
                )));
            }
        }
    }

    if let Some(bond_plan) = &host.net_bonding {
        configure_bond(client, &machine, bond_plan).await?;
    }

    client.machine(&system_id).await
}

/// Admin subnet name, if set
///
/// Historical plans use the literal string "None" to mean unset.
fn admin_subnet_name(host: &HostConfig) -> Option<&str> {
    host.admin_net.as_deref().filter(|name| *name != "None")
}

async fn configure_bond(
    client: &MaasClient,
    machine: &Machine,
    plan: &BondPlan,
) -> Result<(), DeployError> {
    let system_id = &machine.system_id;

    let parents: Vec<&Interface> = machine
        .interface_set
        .iter()
        .filter(|i| plan.slaves.contains(&i.name))
        .collect();

    if parents.is_empty() {
        return Err(DeployError::network(format!(
            "none of the bond slaves {:?} exist on {}",
            plan.slaves, machine.hostname
        )));
    }

    for parent in &parents {
        client.disconnect_interface(system_id, parent.id).await?;
    }

    let first_mac = parents[0].mac_address.as_deref().ok_or_else(|| {
        DeployError::network(format!("interface {} has no MAC address", parents[0].name))
    })?;
    let mac_address = bond_mac_override(first_mac)?;

    let parent_ids: Vec<u64> = parents.iter().map(|p| p.id).collect();
    info!("Creating bond {} over {:?}", plan.name, plan.slaves);
    let bond = client
        .create_bond(system_id, &plan.name, &mac_address, &parent_ids)
        .await?;

    if plan.vlans.is_empty() {
        return Ok(());
    }

    let fabric_name = plan.fabric.as_deref().ok_or_else(|| {
        DeployError::network("vlans declared without a fabric".to_string())
    })?;
    let fabric = client.fabric_by_name(fabric_name).await?;

    let default_vlan = fabric.default_vlan().ok_or_else(|| {
        DeployError::network(format!("fabric {} has no untagged VLAN", fabric.name))
    })?;
    client
        .set_interface_vlan(system_id, bond.id, default_vlan.id)
        .await?;

    for (name, vlan_plan) in ordered_vlans(&plan.vlans) {
        configure_vlan_bridge(client, system_id, &bond, &fabric, name, vlan_plan).await?;
    }

    Ok(())
}

/// Override the bond MAC with a locally-administered address
///
/// systemd-networkd matches interfaces by MAC, so the bond must not
/// share one with its first slave (launchpad #1804861). The last four
/// octets are kept for uniqueness.
fn bond_mac_override(mac: &str) -> Result<String, DeployError> {
    if mac.len() != 17 || !mac.is_ascii() {
        return Err(DeployError::network(format!(
            "unexpected MAC address '{}'",
            mac
        )));
    }
    Ok(format!("52:54:{}", &mac[6..]))
}

/// VLANs in configuration order
///
/// The first entry carrying `default_dns: true` is configured first so
/// its nameservers win, then every entry without a `default_dns` key in
/// declaration order. An entry with an explicit `default_dns` that
/// loses the election is skipped (historical behavior, preserved).
fn ordered_vlans(vlans: &IndexMap<String, VlanPlan>) -> Vec<(&str, &VlanPlan)> {
    let mut ordered = Vec::new();

    if let Some((name, vlan)) = vlans.iter().find(|(_, v)| v.default_dns == Some(true)) {
        ordered.push((name.as_str(), vlan));
    }

    for (name, vlan) in vlans {
        if vlan.default_dns.is_none() {
            ordered.push((name.as_str(), vlan));
        }
    }

    ordered
}

async fn configure_vlan_bridge(
    client: &MaasClient,
    system_id: &str,
    bond: &Interface,
    fabric: &Fabric,
    name: &str,
    plan: &VlanPlan,
) -> Result<(), DeployError> {
    let bridge_name = format!("br-{}", name);

    if let Some(subnet_name) = &plan.subnet {
        let vlan = fabric.find_vlan(plan.vlan).ok_or_else(|| {
            DeployError::network(format!(
                "VLAN {} not found on fabric {}",
                plan.vlan, fabric.name
            ))
        })?;

        debug!("Creating {} on VLAN {}", bridge_name, plan.vlan);
        let vif = client
            .create_vlan_interface(system_id, vlan.id, bond.id)
            .await?;
        let bridge = client
            .create_bridge(system_id, &bridge_name, vif.id, plan.mtu())
            .await?;

        if let Some(ip) = &plan.ip {
            let subnet = client.subnet_by_name(subnet_name).await?;
            client
                .link_subnet(
                    system_id,
                    bridge.id,
                    LinkMode::Static,
                    subnet.id,
                    Some(ip),
                    plan.default_gateway(),
                )
                .await?;
        }
    } else {
        debug!("Creating {} directly on {}", bridge_name, bond.name);
        client
            .create_bridge(system_id, &bridge_name, bond.id, plan.mtu())
            .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vlan_plan(vid: u16, default_dns: Option<bool>) -> VlanPlan {
        VlanPlan {
            vlan: vid,
            subnet: None,
            ip: None,
            mtu: None,
            default_dns,
            default_gateway: None,
        }
    }

    #[test]
    fn test_bond_mac_override() {
        let mac = bond_mac_override("aa:bb:cc:dd:ee:ff").unwrap();
        assert_eq!(mac, "52:54:cc:dd:ee:ff");
    }

    #[test]
    fn test_bond_mac_override_rejects_garbage() {
        assert!(bond_mac_override("not-a-mac").is_err());
        assert!(bond_mac_override("").is_err());
        // 17 bytes but not ASCII: must error, not slice mid-character
        assert!(bond_mac_override("aa:bbé:cc:dd:ee:").is_err());
    }

    #[test]
    fn test_ordered_vlans_dns_first() {
        let mut vlans = IndexMap::new();
        vlans.insert("backup".to_string(), vlan_plan(200, None));
        vlans.insert("ceph".to_string(), vlan_plan(100, Some(true)));
        vlans.insert("public".to_string(), vlan_plan(300, None));

        let names: Vec<&str> = ordered_vlans(&vlans).iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["ceph", "backup", "public"]);
    }

    #[test]
    fn test_ordered_vlans_explicit_false_skipped() {
        let mut vlans = IndexMap::new();
        vlans.insert("ceph".to_string(), vlan_plan(100, Some(true)));
        vlans.insert("spare".to_string(), vlan_plan(400, Some(false)));
        vlans.insert("backup".to_string(), vlan_plan(200, None));

        let names: Vec<&str> = ordered_vlans(&vlans).iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["ceph", "backup"]);
    }

    #[test]
    fn test_admin_subnet_name_none_literal() {
        let mut host = HostConfig::default();
        assert!(admin_subnet_name(&host).is_none());

        host.admin_net = Some("None".to_string());
        assert!(admin_subnet_name(&host).is_none());

        host.admin_net = Some("admin".to_string());
        assert_eq!(admin_subnet_name(&host), Some("admin"));
    }
}
