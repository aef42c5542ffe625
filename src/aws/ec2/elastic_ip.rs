//! Elastic IP convergence

use super::types::ElasticIp;
use super::Ec2Client;
use crate::aws::cli::ControlPlane;
use crate::aws::tags::{has_tag, tag_spec, TAG_NAME};
use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeAddresses {
    #[serde(default)]
    addresses: Vec<ElasticIp>,
}

impl<C: ControlPlane> Ec2Client<C> {
    /// Ensure an elastic IP tagged `Name=name` exists.
    ///
    /// Returns the address and whether it was newly allocated. When several
    /// addresses carry the tag (drift from manual provisioning), the first in
    /// provider-returned order wins and the rest are silently ignored.
    pub async fn ensure_elastic_ip(&self, name: &str) -> Result<(ElasticIp, bool)> {
        let listed = self
            .cp
            .run("ec2", &["describe-addresses"], &[])
            .await
            .context("Failed to list elastic IPs")?;
        let listed: DescribeAddresses =
            serde_json::from_value(listed).context("Unexpected describe-addresses output")?;

        if let Some(existing) = listed
            .addresses
            .into_iter()
            .find(|address| has_tag(&address.tags, TAG_NAME, name))
        {
            debug!(
                name,
                allocation_id = %existing.allocation_id,
                public_ip = %existing.public_ip,
                "Elastic IP already allocated"
            );
            return Ok((existing, false));
        }

        info!(name, "Allocating elastic IP");
        let created = self
            .cp
            .run(
                "ec2",
                &["allocate-address"],
                &[(
                    "--tag-specifications",
                    tag_spec("address", &[(TAG_NAME, name)]),
                )],
            )
            .await
            .context("Failed to allocate elastic IP")?;
        let address: ElasticIp =
            serde_json::from_value(created).context("Unexpected allocate-address output")?;

        info!(
            name,
            allocation_id = %address.allocation_id,
            public_ip = %address.public_ip,
            "Allocated elastic IP"
        );

        Ok((address, true))
    }
}
