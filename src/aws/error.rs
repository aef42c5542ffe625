//! Control-plane error types and classification
//!
//! The CLI reports provider errors as an exit status plus a textual error
//! code on stderr. `CliError` carries that verbatim; `classify_stderr` maps
//! the known codes onto coarse categories so callers can tell swallow-able
//! conditions (deleting a key pair that is already gone, re-authorizing an
//! ingress rule that already exists) from real faults.

use thiserror::Error;

/// Failure of a single control-plane command.
///
/// Replaces the null-on-failure sentinel of older tooling: "empty but
/// successful" is `Ok(Value::Null)` at the call site, never an error.
#[derive(Debug, Error)]
pub enum CliError {
    /// The command could not be started at all.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The command ran and reported failure.
    #[error("`{command}` exited with status {status}: {stderr}")]
    Command {
        command: String,
        status: i32,
        stderr: String,
    },

    /// The command succeeded but its output was not well-formed JSON.
    #[error("malformed output from `{command}`: {source}")]
    Parse {
        command: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CliError {
    /// Classify the provider error code embedded in this failure, if any.
    ///
    /// Only `Command` failures carry provider codes; spawn and parse
    /// failures are always [`AwsErrorKind::Unknown`].
    pub fn classify(&self) -> AwsErrorKind {
        match self {
            CliError::Command { stderr, .. } => classify_stderr(stderr),
            _ => AwsErrorKind::Unknown,
        }
    }

    /// True if the failure says the referenced resource does not exist.
    pub fn is_not_found(&self) -> bool {
        self.classify() == AwsErrorKind::NotFound
    }

    /// True if the failure says the requested resource or rule already exists.
    pub fn is_already_exists(&self) -> bool {
        self.classify() == AwsErrorKind::AlreadyExists
    }
}

/// Coarse categories of provider error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwsErrorKind {
    /// The referenced resource does not exist.
    NotFound,
    /// The resource or rule being created already exists.
    AlreadyExists,
    /// Anything else.
    Unknown,
}

/// Known provider error codes for "not found" conditions
const NOT_FOUND_CODES: &[&str] = &[
    "InvalidKeyPair.NotFound",
    "InvalidAllocationID.NotFound",
    "InvalidGroup.NotFound",
    "InvalidInstanceID.NotFound",
    "InvalidPermission.NotFound",
    "InvalidAMIID.NotFound",
];

/// Known provider error codes for "already exists" conditions
const ALREADY_EXISTS_CODES: &[&str] = &[
    "InvalidPermission.Duplicate",
    "InvalidKeyPair.Duplicate",
    "InvalidGroup.Duplicate",
];

/// Classify a provider error code found anywhere in command stderr.
pub fn classify_stderr(stderr: &str) -> AwsErrorKind {
    if NOT_FOUND_CODES.iter().any(|code| stderr.contains(code)) {
        AwsErrorKind::NotFound
    } else if ALREADY_EXISTS_CODES.iter().any(|code| stderr.contains(code)) {
        AwsErrorKind::AlreadyExists
    } else {
        AwsErrorKind::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command_error(stderr: &str) -> CliError {
        CliError::Command {
            command: "aws ec2 delete-key-pair".to_string(),
            status: 254,
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn not_found_codes() {
        for code in NOT_FOUND_CODES {
            let kind = classify_stderr(&format!("An error occurred ({code}) when calling"));
            assert_eq!(kind, AwsErrorKind::NotFound, "code: {code}");
        }
    }

    #[test]
    fn already_exists_codes() {
        for code in ALREADY_EXISTS_CODES {
            let kind = classify_stderr(&format!("An error occurred ({code}) when calling"));
            assert_eq!(kind, AwsErrorKind::AlreadyExists, "code: {code}");
        }
    }

    #[test]
    fn unknown_codes() {
        assert_eq!(classify_stderr("connection refused"), AwsErrorKind::Unknown);
        assert_eq!(classify_stderr(""), AwsErrorKind::Unknown);
    }

    #[test]
    fn cli_error_predicates() {
        assert!(command_error(
            "An error occurred (InvalidKeyPair.NotFound) when calling the DeleteKeyPair operation"
        )
        .is_not_found());
        assert!(command_error(
            "An error occurred (InvalidPermission.Duplicate) when calling the \
             AuthorizeSecurityGroupIngress operation"
        )
        .is_already_exists());
        assert!(!command_error("something else entirely").is_not_found());
    }

    #[test]
    fn spawn_and_parse_are_unknown() {
        let spawn = CliError::Spawn {
            command: "aws ec2 describe-addresses".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        assert_eq!(spawn.classify(), AwsErrorKind::Unknown);
        assert!(!spawn.is_not_found());
    }
}
