//! Plan loader
//!
//! Reads the machine plan from disk and normalizes it.

use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

use super::Plan;
use crate::DeployError;

/// Load the machine plan from a YAML file
pub async fn load_plan(path: impl AsRef<Path>) -> Result<Plan, DeployError> {
    let path = path.as_ref();
    debug!("Loading machine plan from {}", path.display());

    let content = fs::read_to_string(path).await?;
    let plan = Plan::from_yaml(&content)?;

    if plan.machines.is_empty() {
        return Err(DeployError::Plan(format!(
            "{} declares no machines",
            path.display()
        )));
    }

    info!("Loaded plan with {} machines", plan.machines.len());
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_plan() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("machines.yaml");

        fs::write(&path, "machines:\n  node-01:\n    os: jammy\n")
            .await
            .unwrap();

        let plan = load_plan(&path).await.unwrap();
        assert_eq!(plan.machines.len(), 1);
        assert_eq!(plan.machines["node-01"].os.as_deref(), Some("jammy"));
    }

    #[tokio::test]
    async fn test_load_plan_missing_file() {
        let result = load_plan("/nonexistent/machines.yaml").await;
        assert!(matches!(result, Err(DeployError::Io(_))));
    }

    #[tokio::test]
    async fn test_load_plan_no_machines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("machines.yaml");

        fs::write(&path, "machines: {}\n").await.unwrap();

        let result = load_plan(&path).await;
        assert!(matches!(result, Err(DeployError::Plan(_))));
    }
}
