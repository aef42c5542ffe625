//! AWS control-plane access and resource convergence

pub mod cli;
pub mod ec2;
pub mod error;
pub mod tags;

pub use cli::{AwsCli, ControlPlane};
pub use ec2::Ec2Client;
pub use error::{classify_stderr, AwsErrorKind, CliError};
