//! converge - idempotent provisioning of AWS deployment infrastructure
//!
//! This crate converges cloud resources (elastic IPs, SSH key pairs,
//! security-group ingress, compute instances) toward a desired state by
//! issuing commands to the provider's control plane and matching existing
//! resources by tag rather than by provider-assigned id. Every `ensure_*`
//! operation is safe to repeat; nothing here deletes a matching resource.
//!
//! ## Modules
//!
//! - [`aws`]: control-plane client, tag identity, and the resource ensurers
//! - [`wait`]: fixed-interval polling for asynchronous state transitions
//! - [`manifest`]: deployment manifest (versioned package sets) the
//!   provisioned infrastructure ultimately serves
//! - [`repos`]: git plumbing for checking out package repos at pinned tags

pub mod aws;
pub mod manifest;
pub mod repos;
pub mod wait;
