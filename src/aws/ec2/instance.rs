//! Compute instance convergence
//!
//! Instances are matched by an arbitrary caller predicate rather than a
//! fixed tag so callers can converge on whatever identity scheme they use;
//! the CLI surface matches on the `Name` tag. Terminated instances never
//! match — they are treated as not existing.

use super::types::{Image, Instance, LaunchSpec};
use super::Ec2Client;
use crate::aws::cli::ControlPlane;
use crate::wait::poll_until;
use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstances {
    #[serde(default)]
    reservations: Vec<Reservation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Reservation {
    #[serde(default)]
    instances: Vec<Instance>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeImages {
    #[serde(default)]
    images: Vec<Image>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RunInstances {
    #[serde(default)]
    instances: Vec<Instance>,
}

impl<C: ControlPlane> Ec2Client<C> {
    /// Find the first instance satisfying `matches`, in provider-returned
    /// reservation order.
    pub async fn find_instance(
        &self,
        matches: impl Fn(&Instance) -> bool,
    ) -> Result<Option<Instance>> {
        let listed = self
            .cp
            .run("ec2", &["describe-instances"], &[])
            .await
            .context("Failed to list instances")?;
        let listed: DescribeInstances =
            serde_json::from_value(listed).context("Unexpected describe-instances output")?;

        Ok(listed
            .reservations
            .into_iter()
            .flat_map(|reservation| reservation.instances)
            .find(|instance| matches(instance)))
    }

    /// Ensure an instance satisfying `matches` exists, creating one from
    /// `spec` when none does.
    ///
    /// A freshly created instance is polled until it reaches `running`, with
    /// no timeout. An instance that already existed is returned as-is even
    /// when it is not running (a warning is logged); only fresh creations
    /// wait for boot.
    pub async fn ensure_instance(
        &self,
        matches: impl Fn(&Instance) -> bool,
        spec: &LaunchSpec,
    ) -> Result<(Instance, bool)> {
        let live =
            |instance: &Instance| matches(instance) && !instance.state.is_terminated();

        if let Some(instance) = self.find_instance(&live).await? {
            if !instance.state.is_running() {
                warn!(
                    instance_id = %instance.instance_id,
                    state = %instance.state,
                    "Instance exists but is not running; wait for it or terminate it"
                );
            } else {
                debug!(instance_id = %instance.instance_id, "Instance already running");
            }
            return Ok((instance, false));
        }

        let device_name = self.resolve_root_device(&spec.image_id).await?;
        info!(
            image_id = %spec.image_id,
            root_device = %device_name,
            "Creating instance"
        );
        let created = self
            .cp
            .run("ec2", &["run-instances"], &spec.cli_options(&device_name))
            .await
            .context("Failed to create instance")?;
        let created: RunInstances =
            serde_json::from_value(created).context("Unexpected run-instances output")?;
        let instance = created
            .instances
            .into_iter()
            .next()
            .context("No instance returned from create call")?;

        if instance.state.is_running() {
            return Ok((instance, true));
        }

        info!(
            instance_id = %instance.instance_id,
            "Waiting for instance to reach running state"
        );
        let instance = poll_until(
            &self.poll,
            || async {
                let found = self.find_instance(&live).await?;
                Ok(found.filter(|instance| instance.state.is_running()))
            },
            "instance",
        )
        .await?;

        info!(instance_id = %instance.instance_id, "Instance is running");
        Ok((instance, true))
    }

    /// Resolve the root device name of an image from its first block-device
    /// mapping.
    async fn resolve_root_device(&self, image_id: &str) -> Result<String> {
        let listed = self
            .cp
            .run(
                "ec2",
                &["describe-images"],
                &[("--image-ids", image_id.to_string())],
            )
            .await
            .with_context(|| format!("Failed to describe image {image_id}"))?;
        let listed: DescribeImages =
            serde_json::from_value(listed).context("Unexpected describe-images output")?;

        let image = listed
            .images
            .into_iter()
            .next()
            .with_context(|| format!("Image {image_id} not found"))?;
        let mapping = image
            .block_device_mappings
            .into_iter()
            .next()
            .with_context(|| format!("Image {image_id} has no block device mappings"))?;

        Ok(mapping.device_name)
    }
}
