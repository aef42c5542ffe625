//! Security-group ingress convergence

use super::types::SecurityGroup;
use super::Ec2Client;
use crate::aws::cli::ControlPlane;
use crate::aws::tags::{has_tag, TAG_INGRESS_INITED};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use tracing::{debug, info};

/// Ports opened when the caller does not say otherwise: ssh, http, https.
pub const DEFAULT_INGRESS_PORTS: &[u16] = &[22, 80, 443];

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeSecurityGroups {
    #[serde(default)]
    security_groups: Vec<SecurityGroup>,
}

impl<C: ControlPlane> Ec2Client<C> {
    /// Ensure the security group accepts inbound TCP on `ports` from
    /// anywhere (`0.0.0.0/0`).
    ///
    /// The group is looked up by id, not by tag: a reference that no longer
    /// resolves means the caller's stored id is stale, which is fatal rather
    /// than logged-and-skipped. Returns the ports actually opened.
    pub async fn ensure_security_group_connectivity(
        &self,
        group_id: &str,
        ports: &[u16],
    ) -> Result<Vec<u16>> {
        let listed = self
            .cp
            .run("ec2", &["describe-security-groups"], &[])
            .await
            .context("Failed to list security groups")?;
        let listed: DescribeSecurityGroups = serde_json::from_value(listed)
            .context("Unexpected describe-security-groups output")?;

        let group = listed
            .security_groups
            .into_iter()
            .find(|group| group.group_id == group_id)
            .with_context(|| {
                format!("Security group {group_id} no longer exists; the stored reference is stale")
            })?;

        if has_tag(&group.tags, TAG_INGRESS_INITED, "True") {
            debug!(group_id, "Ingress already initialized");
            return Ok(Vec::new());
        }

        // The marker above is only ever read, never written, so this branch
        // runs on every invocation; idempotency rests on the per-port scan
        // below.
        info!(group_id, "Setting inbound access for https and ssh");
        let existing: HashSet<i64> = group
            .ip_permissions
            .iter()
            .filter_map(|permission| permission.from_port)
            .collect();

        let mut opened = Vec::new();
        for &port in ports {
            if existing.contains(&i64::from(port)) {
                continue;
            }
            info!(group_id, port, "Enabling inbound tcp port");
            match self
                .cp
                .run(
                    "ec2",
                    &["authorize-security-group-ingress"],
                    &[
                        ("--group-id", group_id.to_string()),
                        ("--protocol", "tcp".to_string()),
                        ("--port", port.to_string()),
                        ("--cidr", "0.0.0.0/0".to_string()),
                    ],
                )
                .await
            {
                Ok(_) => opened.push(port),
                Err(error) if error.is_already_exists() => {
                    debug!(group_id, port, "Ingress rule already present")
                }
                Err(error) => {
                    return Err(error)
                        .with_context(|| format!("Failed to authorize ingress on port {port}"))
                }
            }
        }

        Ok(opened)
    }
}
