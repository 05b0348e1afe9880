//! maas-deploy library
//!
//! Configures and deploys bare-metal machines registered in a MAAS
//! (Metal as a Service) region from a single YAML plan.
//!
//! For each declared hostname the tool performs, in order:
//! lookup, cleanup of prior storage/network layout, bonded network and
//! VLAN/bridge configuration, RAID/LVM/partition layout, cloud-config
//! user-data assembly, and finally the deploy request. A release mode
//! hands every machine in the plan back to the pool.
//!
//! The MAAS region owns the machines and all storage/network objects;
//! this crate only issues declarative create/delete/format/mount calls
//! against them through [`maas::MaasClient`].

pub mod deploy;
pub mod maas;
pub mod plan;

mod error;

pub use error::DeployError;
pub use maas::MaasClient;
pub use plan::Plan;
