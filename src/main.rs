//! converge: idempotent provisioning of AWS deployment infrastructure
//!
//! Ensures elastic IPs, key pairs, security-group ingress, and instances
//! exist in the configured account, and manages the deployment manifest the
//! infrastructure serves.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use converge::aws::ec2::LaunchSpec;
use converge::aws::tags::{has_tag, TAG_NAME};
use converge::aws::{AwsCli, Ec2Client};
use converge::manifest::Manifest;
use converge::repos;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "converge")]
#[command(about = "Idempotent provisioning of AWS deployment infrastructure")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Converge one AWS resource toward its desired state
    Provision {
        #[command(flatten)]
        account: AccountArgs,

        #[command(subcommand)]
        resource: ProvisionCommand,
    },

    /// Manage deployment versions in the manifest
    Versions {
        #[command(flatten)]
        manifest: ManifestArgs,

        #[command(subcommand)]
        action: VersionsCommand,
    },
}

#[derive(clap::Args, Debug)]
struct AccountArgs {
    /// AWS profile to issue commands under
    #[arg(long, env = "CONVERGE_AWS_PROFILE", default_value = "default")]
    profile: String,

    /// AWS region
    #[arg(long, env = "CONVERGE_AWS_REGION", default_value = "us-west-2")]
    region: String,
}

#[derive(clap::Args, Debug)]
struct ManifestArgs {
    /// Path to the manifest file with deployment and version information
    #[arg(long, env = "CONVERGE_MANIFEST", default_value = "./manifest")]
    manifest: PathBuf,

    /// Folder where package repos are checked out
    #[arg(long, env = "CONVERGE_REPODIR", default_value = "/tmp/repos")]
    repodir: PathBuf,
}

#[derive(Subcommand, Debug)]
enum ProvisionCommand {
    /// Ensure an elastic IP tagged with the given name exists
    ElasticIp {
        /// Logical name of the address
        #[arg(short, long)]
        name: String,
    },

    /// Ensure a key pair exists remotely with its private key on disk
    KeyPair {
        /// Key pair name
        #[arg(short, long)]
        name: String,

        /// Path of the local private-key file
        #[arg(short, long)]
        keyfile: PathBuf,
    },

    /// Ensure inbound connectivity on an existing security group
    SecurityGroup {
        /// Security group id (e.g. sg-0123456789abcdef0)
        #[arg(short, long)]
        group_id: String,

        /// Comma-separated TCP ports to open
        #[arg(short, long, default_value = "22,80,443")]
        ports: String,
    },

    /// Ensure an instance carrying the given Name tag exists and boot it
    Instance {
        /// Logical name of the instance (written as its Name tag)
        #[arg(short, long)]
        name: String,

        /// Machine image to create from
        #[arg(long)]
        image_id: String,

        /// EC2 instance type
        #[arg(long)]
        instance_type: Option<String>,

        /// Root volume size override in GiB
        #[arg(long)]
        volume_size: Option<u32>,

        /// Key pair for SSH access
        #[arg(long)]
        key_name: Option<String>,

        /// Security group for the instance
        #[arg(long)]
        security_group_id: Option<String>,

        /// VPC subnet to launch into
        #[arg(long)]
        subnet_id: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum VersionsCommand {
    /// Start a new version of the deployment
    New {
        /// Name of the version, e.g. v1 (defaults to a date-derived tag)
        name: Option<String>,
    },

    /// Snapshot and commit the pending version, tagging changed packages
    Commit,

    /// Add a package to the pending version
    AddPackage {
        /// Name of the package to add
        name: String,

        /// URL of the repo to fetch from
        repo_url: String,

        /// Tag of the repo to check out from
        #[arg(long, default_value = repos::DEFAULT_MAIN)]
        tag: String,
    },

    /// Remove a package from the pending version
    RemovePackage {
        /// Name of the package to remove
        name: String,
    },

    /// Check out every package of a version at its pinned tag
    Checkout {
        /// Version of the deployment to check out
        version: String,
    },

    /// Describe one version, or the whole deployment
    Describe {
        /// Version to describe (omit for the whole deployment)
        version: Option<String>,
    },
}

fn parse_ports(raw: &str) -> Result<Vec<u16>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u16>()
                .with_context(|| format!("Invalid port: {part}"))
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Provision { account, resource } => {
            let ec2 = Ec2Client::new(AwsCli::new(account.profile, account.region));
            run_provision(&ec2, resource).await
        }
        Command::Versions { manifest, action } => run_versions(manifest, action).await,
    }
}

async fn run_provision(ec2: &Ec2Client<AwsCli>, resource: ProvisionCommand) -> Result<()> {
    match resource {
        ProvisionCommand::ElasticIp { name } => {
            let (address, created) = ec2.ensure_elastic_ip(&name).await?;
            info!(
                name = %name,
                allocation_id = %address.allocation_id,
                public_ip = %address.public_ip,
                created,
                "Elastic IP converged"
            );
            println!("{} {}", address.allocation_id, address.public_ip);
        }
        ProvisionCommand::KeyPair { name, keyfile } => {
            let recreated = ec2.ensure_key_pair(&name, &keyfile).await?;
            info!(name = %name, recreated, "Key pair converged");
        }
        ProvisionCommand::SecurityGroup { group_id, ports } => {
            let ports = parse_ports(&ports)?;
            let opened = ec2
                .ensure_security_group_connectivity(&group_id, &ports)
                .await?;
            info!(group_id = %group_id, opened = ?opened, "Security group converged");
        }
        ProvisionCommand::Instance {
            name,
            image_id,
            instance_type,
            volume_size,
            key_name,
            security_group_id,
            subnet_id,
        } => {
            let mut spec = LaunchSpec::new(image_id).with_name_tag(&name);
            if let Some(instance_type) = instance_type {
                spec = spec.with_instance_type(instance_type);
            }
            if let Some(volume_size) = volume_size {
                spec = spec.with_volume_size(volume_size);
            }
            if let Some(key_name) = key_name {
                spec = spec.with_key_name(key_name);
            }
            if let Some(group_id) = security_group_id {
                spec = spec.with_security_group(group_id);
            }
            if let Some(subnet_id) = subnet_id {
                spec = spec.with_subnet(subnet_id);
            }

            let (instance, created) = ec2
                .ensure_instance(|instance| has_tag(&instance.tags, TAG_NAME, &name), &spec)
                .await?;
            info!(
                name = %name,
                instance_id = %instance.instance_id,
                state = %instance.state,
                created,
                "Instance converged"
            );
            println!("{}", instance.instance_id);
        }
    }
    Ok(())
}

async fn run_versions(args: ManifestArgs, action: VersionsCommand) -> Result<()> {
    let mut manifest = Manifest::load(&args.manifest)?;
    match action {
        VersionsCommand::New { name } => {
            let tag = manifest.new_version(name)?;
            info!(tag = %tag, "Version pending");
        }
        VersionsCommand::Commit => manifest.commit(&args.repodir).await?,
        VersionsCommand::AddPackage {
            name,
            repo_url,
            tag,
        } => manifest.add_package(&name, &repo_url, &tag)?,
        VersionsCommand::RemovePackage { name } => manifest.remove_package(&name)?,
        VersionsCommand::Checkout { version } => manifest.checkout(&version, &args.repodir).await?,
        VersionsCommand::Describe { version } => {
            print!("{}", manifest.describe(version.as_deref())?)
        }
    }
    Ok(())
}
