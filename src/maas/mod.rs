//! MAAS region API client
//!
//! Thin typed wrapper over the region's 2.0 REST API. The region owns
//! machines, storage and network objects; every method here is one
//! declarative HTTP call (create this RAID, link that subnet) with no
//! retries and no local state.
//!
//! Authentication is the API's OAuth 1.0 PLAINTEXT scheme: the key from
//! the UI is `consumer:token:secret` and each request carries a signed
//! Authorization header built from it.

pub mod types;

use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;
use uuid::Uuid;

use crate::DeployError;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use types::{
    BlockDevice, Fabric, Interface, LinkMode, Machine, Partition, Raid, RaidLevel, Subnet,
    VolumeGroup,
};

/// Parsed MAAS API key (`consumer:token:secret`)
#[derive(Debug, Clone)]
pub struct ApiCredentials {
    consumer_key: String,
    token_key: String,
    token_secret: String,
}

impl ApiCredentials {
    pub fn parse(key: &str) -> Result<Self, DeployError> {
        let mut parts = key.trim().split(':');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(consumer), Some(token), Some(secret), None)
                if !consumer.is_empty() && !token.is_empty() && !secret.is_empty() =>
            {
                Ok(Self {
                    consumer_key: consumer.to_string(),
                    token_key: token.to_string(),
                    token_secret: secret.to_string(),
                })
            }
            _ => Err(DeployError::Credentials(
                "expected 'consumer:token:secret'".to_string(),
            )),
        }
    }
}

/// Client for one MAAS region endpoint
pub struct MaasClient {
    client: Client,
    base_url: String,
    credentials: ApiCredentials,
}

impl MaasClient {
    /// Connect to the region at `api_url` (e.g. "http://maas:5240/MAAS/")
    pub fn new(api_url: &str, api_key: &str) -> Result<Self, DeployError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Ok(Self {
            client,
            base_url: api_url.trim_end_matches('/').to_string(),
            credentials: ApiCredentials::parse(api_key)?,
        })
    }

    /// Construct against an arbitrary base URL (used by tests)
    pub fn with_base_url(base_url: &str, api_key: &str) -> Result<Self, DeployError> {
        Self::new(base_url, api_key)
    }

    /// The endpoint this client talks to
    pub fn api_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/2.0{}", self.base_url, path)
    }

    /// OAuth 1.0 PLAINTEXT Authorization header for one request
    fn authorization_header(&self) -> String {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let nonce = Uuid::new_v4();

        format!(
            "OAuth oauth_version=\"1.0\", oauth_signature_method=\"PLAINTEXT\", \
             oauth_consumer_key=\"{}\", oauth_token=\"{}\", oauth_signature=\"&{}\", \
             oauth_nonce=\"{}\", oauth_timestamp=\"{}\"",
            self.credentials.consumer_key,
            self.credentials.token_key,
            self.credentials.token_secret,
            nonce,
            timestamp
        )
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, DeployError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(DeployError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, DeployError> {
        debug!("GET {}", path);
        let response = self
            .client
            .get(self.url(path))
            .header(AUTHORIZATION, self.authorization_header())
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<T, DeployError> {
        debug!("POST {}", path);
        let response = self
            .client
            .post(self.url(path))
            .header(AUTHORIZATION, self.authorization_header())
            .form(form)
            .send()
            .await?;
        Self::decode(response).await
    }

    /// POST for operations whose response body we do not need
    async fn post_op(&self, path: &str, form: &[(&str, String)]) -> Result<(), DeployError> {
        debug!("POST {}", path);
        let response = self
            .client
            .post(self.url(path))
            .header(AUTHORIZATION, self.authorization_header())
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeployError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    async fn put_form(&self, path: &str, form: &[(&str, String)]) -> Result<(), DeployError> {
        debug!("PUT {}", path);
        let response = self
            .client
            .put(self.url(path))
            .header(AUTHORIZATION, self.authorization_header())
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeployError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), DeployError> {
        debug!("DELETE {}", path);
        let response = self
            .client
            .delete(self.url(path))
            .header(AUTHORIZATION, self.authorization_header())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeployError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    // ---- Machines ----

    /// All machines in the region
    pub async fn machines(&self) -> Result<Vec<Machine>, DeployError> {
        self.get_json("/machines/").await
    }

    /// Re-fetch one machine (the region recomputes derived state)
    pub async fn machine(&self, system_id: &str) -> Result<Machine, DeployError> {
        self.get_json(&format!("/machines/{}/", system_id)).await
    }

    /// Request deployment; user-data travels base64-encoded
    pub async fn deploy(
        &self,
        system_id: &str,
        distro_series: Option<&str>,
        user_data: &[u8],
        hwe_kernel: Option<&str>,
    ) -> Result<Machine, DeployError> {
        let mut form = vec![("user_data", BASE64.encode(user_data))];
        if let Some(series) = distro_series {
            form.push(("distro_series", series.to_string()));
        }
        if let Some(kernel) = hwe_kernel {
            form.push(("hwe_kernel", kernel.to_string()));
        }
        self.post_form(&format!("/machines/{}/?op=deploy", system_id), &form)
            .await
    }

    /// Hand the machine back to the pool
    pub async fn release(&self, system_id: &str) -> Result<Machine, DeployError> {
        self.post_form(&format!("/machines/{}/?op=release", system_id), &[])
            .await
    }

    // ---- Storage ----

    pub async fn set_boot_disk(&self, system_id: &str, device_id: u64) -> Result<(), DeployError> {
        self.post_op(
            &format!(
                "/nodes/{}/blockdevices/{}/?op=set_boot_disk",
                system_id, device_id
            ),
            &[],
        )
        .await
    }

    pub async fn delete_block_device(
        &self,
        system_id: &str,
        device_id: u64,
    ) -> Result<(), DeployError> {
        self.delete(&format!("/nodes/{}/blockdevices/{}/", system_id, device_id))
            .await
    }

    /// Create a partition; `size` is bytes or a human expression the API accepts
    pub async fn create_partition(
        &self,
        system_id: &str,
        device_id: u64,
        size: &str,
    ) -> Result<Partition, DeployError> {
        self.post_form(
            &format!("/nodes/{}/blockdevices/{}/partitions/", system_id, device_id),
            &[("size", size.to_string())],
        )
        .await
    }

    pub async fn delete_partition(
        &self,
        system_id: &str,
        device_id: u64,
        partition_id: u64,
    ) -> Result<(), DeployError> {
        self.delete(&format!(
            "/nodes/{}/blockdevices/{}/partition/{}",
            system_id, device_id, partition_id
        ))
        .await
    }

    pub async fn format_partition(
        &self,
        system_id: &str,
        device_id: u64,
        partition_id: u64,
        fstype: &str,
    ) -> Result<(), DeployError> {
        self.post_op(
            &format!(
                "/nodes/{}/blockdevices/{}/partition/{}?op=format",
                system_id, device_id, partition_id
            ),
            &[("fstype", fstype.to_string())],
        )
        .await
    }

    pub async fn mount_partition(
        &self,
        system_id: &str,
        device_id: u64,
        partition_id: u64,
        mount_point: &str,
    ) -> Result<(), DeployError> {
        self.post_op(
            &format!(
                "/nodes/{}/blockdevices/{}/partition/{}?op=mount",
                system_id, device_id, partition_id
            ),
            &[("mount_point", mount_point.to_string())],
        )
        .await
    }

    pub async fn format_block_device(
        &self,
        system_id: &str,
        device_id: u64,
        fstype: &str,
    ) -> Result<(), DeployError> {
        self.post_op(
            &format!("/nodes/{}/blockdevices/{}/?op=format", system_id, device_id),
            &[("fstype", fstype.to_string())],
        )
        .await
    }

    pub async fn mount_block_device(
        &self,
        system_id: &str,
        device_id: u64,
        mount_point: &str,
    ) -> Result<(), DeployError> {
        self.post_op(
            &format!("/nodes/{}/blockdevices/{}/?op=mount", system_id, device_id),
            &[("mount_point", mount_point.to_string())],
        )
        .await
    }

    /// Assemble a software RAID over existing partitions
    pub async fn create_raid(
        &self,
        system_id: &str,
        name: &str,
        level: RaidLevel,
        partition_ids: &[u64],
    ) -> Result<Raid, DeployError> {
        let mut form = vec![
            ("name", name.to_string()),
            ("level", level.as_str().to_string()),
        ];
        for id in partition_ids {
            form.push(("partitions", id.to_string()));
        }
        self.post_form(&format!("/nodes/{}/raids/", system_id), &form)
            .await
    }

    pub async fn volume_groups(&self, system_id: &str) -> Result<Vec<VolumeGroup>, DeployError> {
        self.get_json(&format!("/nodes/{}/volume-groups/", system_id))
            .await
    }

    pub async fn create_volume_group(
        &self,
        system_id: &str,
        name: &str,
        block_device_ids: &[u64],
    ) -> Result<VolumeGroup, DeployError> {
        let mut form = vec![("name", name.to_string())];
        for id in block_device_ids {
            form.push(("block_devices", id.to_string()));
        }
        self.post_form(&format!("/nodes/{}/volume-groups/", system_id), &form)
            .await
    }

    pub async fn delete_volume_group(
        &self,
        system_id: &str,
        volume_group_id: u64,
    ) -> Result<(), DeployError> {
        self.delete(&format!(
            "/nodes/{}/volume-group/{}/",
            system_id, volume_group_id
        ))
        .await
    }

    /// Create a logical volume; returns its virtual block device
    pub async fn create_logical_volume(
        &self,
        system_id: &str,
        volume_group_id: u64,
        name: &str,
        size: &str,
    ) -> Result<BlockDevice, DeployError> {
        self.post_form(
            &format!(
                "/nodes/{}/volume-group/{}/?op=create_logical_volume",
                system_id, volume_group_id
            ),
            &[("name", name.to_string()), ("size", size.to_string())],
        )
        .await
    }

    // ---- Network ----

    pub async fn subnets(&self) -> Result<Vec<Subnet>, DeployError> {
        self.get_json("/subnets/").await
    }

    pub async fn fabrics(&self) -> Result<Vec<Fabric>, DeployError> {
        self.get_json("/fabrics/").await
    }

    pub async fn delete_interface(
        &self,
        system_id: &str,
        interface_id: u64,
    ) -> Result<(), DeployError> {
        self.delete(&format!("/nodes/{}/interfaces/{}/", system_id, interface_id))
            .await
    }

    /// Drop all links and VLAN attachment from an interface
    pub async fn disconnect_interface(
        &self,
        system_id: &str,
        interface_id: u64,
    ) -> Result<(), DeployError> {
        self.post_op(
            &format!(
                "/nodes/{}/interfaces/{}/?op=disconnect",
                system_id, interface_id
            ),
            &[],
        )
        .await
    }

    pub async fn create_bond(
        &self,
        system_id: &str,
        name: &str,
        mac_address: &str,
        parent_ids: &[u64],
    ) -> Result<Interface, DeployError> {
        let mut form = vec![
            ("name", name.to_string()),
            ("mac_address", mac_address.to_string()),
            ("bond_mode", "802.3ad".to_string()),
            ("bond_lacp_rate", "fast".to_string()),
            ("bond_xmit_hash_policy", "layer3+4".to_string()),
        ];
        for id in parent_ids {
            form.push(("parents", id.to_string()));
        }
        self.post_form(&format!("/nodes/{}/interfaces/?op=create_bond", system_id), &form)
            .await
    }

    pub async fn create_vlan_interface(
        &self,
        system_id: &str,
        vlan_id: u64,
        parent_id: u64,
    ) -> Result<Interface, DeployError> {
        self.post_form(
            &format!("/nodes/{}/interfaces/?op=create_vlan", system_id),
            &[("vlan", vlan_id.to_string()), ("parent", parent_id.to_string())],
        )
        .await
    }

    pub async fn create_bridge(
        &self,
        system_id: &str,
        name: &str,
        parent_id: u64,
        mtu: u32,
    ) -> Result<Interface, DeployError> {
        self.post_form(
            &format!("/nodes/{}/interfaces/?op=create_bridge", system_id),
            &[
                ("name", name.to_string()),
                ("parent", parent_id.to_string()),
                ("mtu", mtu.to_string()),
            ],
        )
        .await
    }

    /// Move an interface onto a VLAN (bond onto the fabric's untagged VLAN)
    pub async fn set_interface_vlan(
        &self,
        system_id: &str,
        interface_id: u64,
        vlan_id: u64,
    ) -> Result<(), DeployError> {
        self.put_form(
            &format!("/nodes/{}/interfaces/{}/", system_id, interface_id),
            &[("vlan", vlan_id.to_string())],
        )
        .await
    }

    /// Attach an address configuration to an interface
    pub async fn link_subnet(
        &self,
        system_id: &str,
        interface_id: u64,
        mode: LinkMode,
        subnet_id: u64,
        ip_address: Option<&str>,
        default_gateway: bool,
    ) -> Result<(), DeployError> {
        let mut form = vec![
            ("mode", mode.as_str().to_string()),
            ("subnet", subnet_id.to_string()),
        ];
        if let Some(ip) = ip_address {
            form.push(("ip_address", ip.to_string()));
        }
        if default_gateway {
            form.push(("default_gateway", "true".to_string()));
        }
        self.post_op(
            &format!(
                "/nodes/{}/interfaces/{}/?op=link_subnet",
                system_id, interface_id
            ),
            &form,
        )
        .await
    }

    pub async fn unlink_subnet(
        &self,
        system_id: &str,
        interface_id: u64,
        link_id: u64,
    ) -> Result<(), DeployError> {
        self.post_op(
            &format!(
                "/nodes/{}/interfaces/{}/?op=unlink_subnet",
                system_id, interface_id
            ),
            &[("id", link_id.to_string())],
        )
        .await
    }

    /// Find a subnet by name
    pub async fn subnet_by_name(&self, name: &str) -> Result<Subnet, DeployError> {
        self.subnets()
            .await?
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| DeployError::network(format!("subnet '{}' not found", name)))
    }

    /// Find a fabric by name
    pub async fn fabric_by_name(&self, name: &str) -> Result<Fabric, DeployError> {
        self.fabrics()
            .await?
            .into_iter()
            .find(|f| f.name == name)
            .ok_or_else(|| DeployError::network(format!("fabric '{}' not found", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_credentials() {
        let creds = ApiCredentials::parse("AAA:BBB:CCC").unwrap();
        assert_eq!(creds.consumer_key, "AAA");
        assert_eq!(creds.token_key, "BBB");
        assert_eq!(creds.token_secret, "CCC");
    }

    #[test]
    fn test_parse_credentials_rejects_bad_shapes() {
        assert!(ApiCredentials::parse("AAA:BBB").is_err());
        assert!(ApiCredentials::parse("AAA:BBB:CCC:DDD").is_err());
        assert!(ApiCredentials::parse("::").is_err());
        assert!(ApiCredentials::parse("").is_err());
    }

    #[test]
    fn test_url_joins_api_root() {
        let client = MaasClient::new("http://maas:5240/MAAS/", "a:b:c").unwrap();
        assert_eq!(
            client.url("/machines/"),
            "http://maas:5240/MAAS/api/2.0/machines/"
        );
        assert_eq!(client.api_url(), "http://maas:5240/MAAS");
    }

    #[test]
    fn test_authorization_header_shape() {
        let client = MaasClient::new("http://maas:5240/MAAS", "consumer:token:secret").unwrap();
        let header = client.authorization_header();
        assert!(header.starts_with("OAuth oauth_version=\"1.0\""));
        assert!(header.contains("oauth_signature_method=\"PLAINTEXT\""));
        assert!(header.contains("oauth_consumer_key=\"consumer\""));
        assert!(header.contains("oauth_token=\"token\""));
        assert!(header.contains("oauth_signature=\"&secret\""));
    }
}
