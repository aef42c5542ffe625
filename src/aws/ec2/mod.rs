//! EC2 resource convergence
//!
//! One "ensure" operation per resource kind, each implementing find-or-create
//! against tag-based identity: list what exists, match on the identity tag,
//! and only create (tagging at creation) when nothing matches. Safe to invoke
//! repeatedly; never deletes a matching resource (the key-pair path is the
//! one deliberate delete-then-recreate exception).
//!
//! All operations run sequentially — one control-plane command outstanding at
//! a time. Two concurrent callers ensuring the same logical name can both
//! observe "not found" and both create; tag-based idempotency is only correct
//! under a single-writer assumption.

mod elastic_ip;
mod instance;
mod key_pair;
mod security_group;
mod types;

pub use security_group::DEFAULT_INGRESS_PORTS;
pub use types::{
    BlockDeviceMapping, ElasticIp, Image, Instance, InstanceState, IpPermission, IpRange, KeyPair,
    LaunchSpec, SecurityGroup, DEFAULT_VOLUME_SIZE_GIB,
};

use crate::aws::cli::ControlPlane;
use crate::wait::PollConfig;

/// EC2 convergence client, generic over the control plane so the engine can
/// be driven by a fake in tests.
pub struct Ec2Client<C> {
    pub(crate) cp: C,
    pub(crate) poll: PollConfig,
}

impl<C: ControlPlane> Ec2Client<C> {
    /// Wrap a control plane with the default (3-second) poll cadence.
    pub fn new(cp: C) -> Self {
        Self {
            cp,
            poll: PollConfig::default(),
        }
    }

    /// Override the poll configuration (interval, cancellation).
    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// The underlying control plane.
    pub fn control_plane(&self) -> &C {
        &self.cp
    }
}
