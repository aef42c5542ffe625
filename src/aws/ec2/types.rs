//! EC2 resource types and launch configuration
//!
//! Typed views over the control plane's JSON output. Deserialization is
//! deliberately lenient about fields this engine does not consume.

use crate::aws::tags::{tag_spec, Tag, TAG_NAME};
use serde::Deserialize;
use std::fmt;

/// Root volume size applied when a launch spec carries no override, in GiB.
pub const DEFAULT_VOLUME_SIZE_GIB: u32 = 100;

/// An allocated elastic IP address.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ElasticIp {
    pub allocation_id: String,
    pub public_ip: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// A registered SSH key pair (remote half only; the private key lives in a
/// local file whose presence is part of the pair's logical identity).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeyPair {
    pub key_name: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// One CIDR range of an ingress rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IpRange {
    pub cidr_ip: String,
}

/// One ingress permission of a security group.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IpPermission {
    #[serde(default)]
    pub ip_protocol: Option<String>,
    /// Absent for protocols without port semantics.
    #[serde(default)]
    pub from_port: Option<i64>,
    #[serde(default)]
    pub to_port: Option<i64>,
    #[serde(default)]
    pub ip_ranges: Vec<IpRange>,
}

/// A security group and its current ingress rules.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecurityGroup {
    pub group_id: String,
    #[serde(default)]
    pub ip_permissions: Vec<IpPermission>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// Lifecycle state of an instance, as reported by the provider.
///
/// Modeled as an explicit enum so call sites make typed transition checks
/// instead of comparing strings; provider labels this engine does not know
/// land in `Other` rather than failing deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "InstanceStateRepr")]
pub enum InstanceState {
    #[default]
    Pending,
    Running,
    ShuttingDown,
    Stopping,
    Stopped,
    Terminated,
    Other(String),
}

impl InstanceState {
    /// Parse a provider state label.
    pub fn from_label(label: &str) -> Self {
        match label {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "shutting-down" => Self::ShuttingDown,
            "stopping" => Self::Stopping,
            "stopped" => Self::Stopped,
            "terminated" => Self::Terminated,
            other => Self::Other(other.to_string()),
        }
    }

    /// The provider's label for this state.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::ShuttingDown => "shutting-down",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Terminated => "terminated",
            Self::Other(label) => label,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Terminated instances are invisible to the ensure engine: they never
    /// satisfy a match, even when their tags do.
    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The provider nests state as `{"Name": "running", "Code": 16}`; accept a
/// bare label as well.
#[derive(Deserialize)]
#[serde(untagged)]
enum InstanceStateRepr {
    Object {
        #[serde(rename = "Name")]
        name: String,
    },
    Label(String),
}

impl From<InstanceStateRepr> for InstanceState {
    fn from(repr: InstanceStateRepr) -> Self {
        match repr {
            InstanceStateRepr::Object { name } => Self::from_label(&name),
            InstanceStateRepr::Label(label) => Self::from_label(&label),
        }
    }
}

/// One block device attachment of an instance or image.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BlockDeviceMapping {
    pub device_name: String,
}

/// A compute instance.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Instance {
    pub instance_id: String,
    #[serde(default)]
    pub state: InstanceState,
    #[serde(default)]
    pub block_device_mappings: Vec<BlockDeviceMapping>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// A machine image, read only for its root device name.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Image {
    pub image_id: String,
    #[serde(default)]
    pub block_device_mappings: Vec<BlockDeviceMapping>,
}

/// Desired-state parameters for creating an instance.
///
/// The ensurer augments this with a computed block-device mapping (root
/// device name resolved from the image, volume size defaulted to
/// [`DEFAULT_VOLUME_SIZE_GIB`]) before submitting the create call.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub image_id: String,
    pub instance_type: Option<String>,
    pub key_name: Option<String>,
    pub security_group_id: Option<String>,
    pub subnet_id: Option<String>,
    /// Root volume size override in GiB.
    pub volume_size: Option<u32>,
    /// Logical name written as a `Name` tag at creation time. Required for
    /// tag-based lookup to find the instance on later ensure calls.
    pub name_tag: Option<String>,
    /// Pass-through options appended verbatim to the create call.
    pub extra_options: Vec<(String, String)>,
}

impl LaunchSpec {
    /// Create a spec for the given image; everything else is optional.
    pub fn new(image_id: impl Into<String>) -> Self {
        Self {
            image_id: image_id.into(),
            instance_type: None,
            key_name: None,
            security_group_id: None,
            subnet_id: None,
            volume_size: None,
            name_tag: None,
            extra_options: Vec::new(),
        }
    }

    pub fn with_instance_type(mut self, instance_type: impl Into<String>) -> Self {
        self.instance_type = Some(instance_type.into());
        self
    }

    pub fn with_key_name(mut self, key_name: impl Into<String>) -> Self {
        self.key_name = Some(key_name.into());
        self
    }

    pub fn with_security_group(mut self, security_group_id: impl Into<String>) -> Self {
        self.security_group_id = Some(security_group_id.into());
        self
    }

    pub fn with_subnet(mut self, subnet_id: impl Into<String>) -> Self {
        self.subnet_id = Some(subnet_id.into());
        self
    }

    pub fn with_volume_size(mut self, gib: u32) -> Self {
        self.volume_size = Some(gib);
        self
    }

    pub fn with_name_tag(mut self, name: impl Into<String>) -> Self {
        self.name_tag = Some(name.into());
        self
    }

    pub fn with_option(mut self, flag: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_options.push((flag.into(), value.into()));
        self
    }

    /// Render the create-call option list, merging the computed block-device
    /// mapping for `device_name`.
    pub(crate) fn cli_options(&self, device_name: &str) -> Vec<(&str, String)> {
        let volume_size = self.volume_size.unwrap_or(DEFAULT_VOLUME_SIZE_GIB);
        let mut options: Vec<(&str, String)> = vec![("--image-id", self.image_id.clone())];
        if let Some(instance_type) = &self.instance_type {
            options.push(("--instance-type", instance_type.clone()));
        }
        if let Some(key_name) = &self.key_name {
            options.push(("--key-name", key_name.clone()));
        }
        if let Some(group_id) = &self.security_group_id {
            options.push(("--security-group-ids", group_id.clone()));
        }
        if let Some(subnet_id) = &self.subnet_id {
            options.push(("--subnet-id", subnet_id.clone()));
        }
        if let Some(name) = &self.name_tag {
            options.push((
                "--tag-specifications",
                tag_spec("instance", &[(TAG_NAME, name)]),
            ));
        }
        options.push((
            "--block-device-mappings",
            format!("DeviceName={device_name},Ebs={{VolumeSize={volume_size}}}"),
        ));
        for (flag, value) in &self.extra_options {
            options.push((flag.as_str(), value.clone()));
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn instance_state_round_trips_labels() {
        for label in [
            "pending",
            "running",
            "shutting-down",
            "stopping",
            "stopped",
            "terminated",
        ] {
            assert_eq!(InstanceState::from_label(label).as_str(), label);
        }
    }

    #[test]
    fn unknown_state_label_is_preserved() {
        let state = InstanceState::from_label("rebooting");
        assert_eq!(state, InstanceState::Other("rebooting".to_string()));
        assert!(!state.is_running());
        assert!(!state.is_terminated());
    }

    #[test]
    fn instance_deserializes_from_provider_shape() {
        let instance: Instance = serde_json::from_value(json!({
            "InstanceId": "i-0123",
            "State": {"Name": "running", "Code": 16},
            "BlockDeviceMappings": [{"DeviceName": "/dev/xvda"}],
            "Tags": [{"Key": "Name", "Value": "bastion"}]
        }))
        .unwrap();

        assert_eq!(instance.instance_id, "i-0123");
        assert!(instance.state.is_running());
        assert_eq!(instance.block_device_mappings[0].device_name, "/dev/xvda");
    }

    #[test]
    fn instance_without_state_defaults_to_pending() {
        let instance: Instance =
            serde_json::from_value(json!({"InstanceId": "i-0123"})).unwrap();
        assert_eq!(instance.state, InstanceState::Pending);
    }

    #[test]
    fn launch_spec_default_volume_size() {
        let spec = LaunchSpec::new("ami-1");
        let options = spec.cli_options("/dev/xvda");
        let mapping = options
            .iter()
            .find(|(flag, _)| *flag == "--block-device-mappings")
            .map(|(_, value)| value.clone())
            .unwrap();
        assert_eq!(mapping, "DeviceName=/dev/xvda,Ebs={VolumeSize=100}");
    }

    #[test]
    fn launch_spec_merges_override_and_tags() {
        let spec = LaunchSpec::new("ami-1")
            .with_instance_type("t3.large")
            .with_volume_size(250)
            .with_name_tag("bastion")
            .with_option("--no-associate-public-ip-address", "");
        let options = spec.cli_options("/dev/sda1");

        assert!(options.contains(&("--image-id", "ami-1".to_string())));
        assert!(options.contains(&("--instance-type", "t3.large".to_string())));
        assert!(options.contains(&(
            "--tag-specifications",
            "ResourceType=instance,Tags=[{Key=Name,Value=bastion}]".to_string()
        )));
        assert!(options.contains(&(
            "--block-device-mappings",
            "DeviceName=/dev/sda1,Ebs={VolumeSize=250}".to_string()
        )));
    }
}
