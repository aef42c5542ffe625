//! SSH key pair convergence
//!
//! A key pair's identity is the conjunction of two facts: the private-key
//! file exists locally, and a key pair of the same name exists remotely.
//! When either half is missing the pair is rebuilt from scratch — including
//! the case where the local file is fine but the remote pair was deleted
//! out-of-band, in which case the old local key is discarded and any holder
//! of it loses access. That trade-off is deliberate and preserved.

use super::types::KeyPair;
use super::Ec2Client;
use crate::aws::cli::ControlPlane;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::{debug, info};

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeKeyPairs {
    #[serde(default)]
    key_pairs: Vec<KeyPair>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreatedKeyPair {
    key_name: String,
    key_material: String,
}

impl<C: ControlPlane> Ec2Client<C> {
    /// Ensure the key pair `name` exists remotely with its private key at
    /// `keyfile`.
    ///
    /// Returns `false` when both halves were already in place (no mutation),
    /// `true` when the pair was rebuilt. The rebuild path deletes any remote
    /// pair of that name first, tolerating failure when none exists.
    pub async fn ensure_key_pair(&self, name: &str, keyfile: &Path) -> Result<bool> {
        let mut intact = keyfile.is_file();
        if intact {
            let listed = self
                .cp
                .run("ec2", &["describe-key-pairs"], &[])
                .await
                .context("Failed to list key pairs")?;
            let listed: DescribeKeyPairs =
                serde_json::from_value(listed).context("Unexpected describe-key-pairs output")?;
            intact = listed.key_pairs.iter().any(|pair| pair.key_name == name);
        }

        if intact {
            debug!(name, keyfile = %keyfile.display(), "Key pair intact locally and remotely");
            return Ok(false);
        }

        // Local and remote halves disagree: clear the remote side and rebuild
        // both. Delete failure is swallowed — most commonly there is simply
        // nothing to delete.
        match self
            .cp
            .run(
                "ec2",
                &["delete-key-pair"],
                &[("--key-name", name.to_string())],
            )
            .await
        {
            Ok(_) => info!(name, "Deleted remote key pair before recreation"),
            Err(error) if error.is_not_found() => {
                debug!(name, "No remote key pair to delete")
            }
            Err(error) => debug!(name, error = %error, "Ignoring delete-key-pair failure"),
        }

        info!(name, "Creating key pair");
        let created = self
            .cp
            .run(
                "ec2",
                &["create-key-pair"],
                &[("--key-name", name.to_string())],
            )
            .await
            .context("Failed to create key pair")?;
        let created: CreatedKeyPair =
            serde_json::from_value(created).context("Unexpected create-key-pair output")?;

        tokio::fs::write(keyfile, created.key_material.as_bytes())
            .await
            .with_context(|| format!("Failed to write key material to {}", keyfile.display()))?;

        let mut perms = tokio::fs::metadata(keyfile)
            .await
            .with_context(|| format!("Failed to stat {}", keyfile.display()))?
            .permissions();
        perms.set_mode(0o400);
        tokio::fs::set_permissions(keyfile, perms)
            .await
            .with_context(|| format!("Failed to restrict permissions on {}", keyfile.display()))?;

        info!(
            name = %created.key_name,
            keyfile = %keyfile.display(),
            "Wrote new private key material"
        );

        Ok(true)
    }
}
