//! Resource tags and tag-based identity
//!
//! Converge never trusts provider-assigned identifiers for idempotency:
//! logical identity is a tag (conventionally `Name`) written at creation time
//! and re-derived on every ensure call by listing and matching. This module
//! holds the tag model, the identity predicate, and the literal
//! tag-specification grammar the CLI expects at creation time.

use serde::Deserialize;

/// Tag key carrying a resource's logical name.
pub const TAG_NAME: &str = "Name";

/// Marker tag checked before (re-)authorizing security-group ingress.
pub const TAG_INGRESS_INITED: &str = "IngressInited";

/// A single key/value tag on a provider resource.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// True iff `tags` contains an entry with exactly the given key and value.
///
/// String equality only: no case-folding, no wildcards.
pub fn has_tag(tags: &[Tag], key: &str, value: &str) -> bool {
    tags.iter().any(|tag| tag.key == key && tag.value == value)
}

/// Render the CLI's literal tag-specification grammar:
/// `ResourceType=<type>,Tags=[{Key=<k>,Value=<v>},…]`.
///
/// Passed as the value of `--tag-specifications` so resources are tagged
/// atomically at creation, never in a follow-up call.
pub fn tag_spec(resource_type: &str, tags: &[(&str, &str)]) -> String {
    let rendered: Vec<String> = tags
        .iter()
        .map(|(key, value)| format!("{{Key={key},Value={value}}}"))
        .collect();
    format!(
        "ResourceType={resource_type},Tags=[{}]",
        rendered.join(",")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags() -> Vec<Tag> {
        vec![Tag::new("Name", "bastion"), Tag::new("Env", "prod")]
    }

    #[test]
    fn has_tag_matches_exact_pair() {
        assert!(has_tag(&tags(), "Name", "bastion"));
        assert!(has_tag(&tags(), "Env", "prod"));
    }

    #[test]
    fn has_tag_requires_both_key_and_value() {
        assert!(!has_tag(&tags(), "Name", "prod"));
        assert!(!has_tag(&tags(), "Env", "bastion"));
        assert!(!has_tag(&tags(), "Missing", "bastion"));
    }

    #[test]
    fn has_tag_is_case_sensitive() {
        assert!(!has_tag(&tags(), "name", "bastion"));
        assert!(!has_tag(&tags(), "Name", "Bastion"));
    }

    #[test]
    fn has_tag_on_empty_set() {
        assert!(!has_tag(&[], "Name", "bastion"));
    }

    #[test]
    fn tag_spec_literal_grammar() {
        assert_eq!(
            tag_spec("address", &[("Name", "bastion")]),
            "ResourceType=address,Tags=[{Key=Name,Value=bastion}]"
        );
        assert_eq!(
            tag_spec("instance", &[("Name", "web"), ("Env", "prod")]),
            "ResourceType=instance,Tags=[{Key=Name,Value=web},{Key=Env,Value=prod}]"
        );
    }

    #[test]
    fn tag_deserializes_from_provider_shape() {
        let tag: Tag = serde_json::from_str(r#"{"Key": "Name", "Value": "bastion"}"#).unwrap();
        assert_eq!(tag, Tag::new("Name", "bastion"));
    }
}
