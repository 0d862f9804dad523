use serde::{Deserialize, Serialize};

use crate::API_VERSION;

pub mod auction;
pub mod discovery;
pub mod websub;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error(
    "Unsupported API version {found}, this node speaks version {}",
    API_VERSION
)]
pub struct UnsupportedVersion {
    pub found: String,
}

/// `{version, data}` wrapper used by every payload of the protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub version: u32,
    pub data:    T,
}

impl<T> Envelope<T> {
    pub fn new(data: T) -> Self { Self { version: API_VERSION, data } }
}

/// A request body that may come wrapped in an [`Envelope`] or bare.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Versioned<T> {
    Enveloped(Envelope<T>),
    Bare(T),
}

impl<T> Versioned<T> {
    pub fn into_checked(self) -> Result<T, UnsupportedVersion> {
        match self {
            Versioned::Enveloped(Envelope { version, data }) => {
                if version != API_VERSION {
                    return Err(UnsupportedVersion {
                        found: version.to_string(),
                    });
                }
                Ok(data)
            }
            Versioned::Bare(data) => Ok(data),
        }
    }
}

/// Check the value of the version header, if any was sent.
pub fn check_version_header(
    value: Option<&str>,
) -> Result<(), UnsupportedVersion> {
    match value.map(str::trim) {
        None => Ok(()),
        Some(raw) if raw == API_VERSION.to_string() => Ok(()),
        Some(raw) => Err(UnsupportedVersion { found: raw.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Sample {
        job_type: String,
    }

    #[test]
    fn test_enveloped_and_bare_bodies() {
        let enveloped: Versioned<Sample> = serde_json::from_str(
            r#"{"version": 1, "data": {"jobType": "testJob"}}"#,
        )
        .unwrap();
        let bare: Versioned<Sample> =
            serde_json::from_str(r#"{"jobType": "testJob"}"#).unwrap();
        let expected = Sample { job_type: "testJob".to_string() };
        assert_eq!(enveloped.into_checked().unwrap(), expected);
        assert_eq!(bare.into_checked().unwrap(), expected);
    }

    #[test]
    fn test_wrong_envelope_version() {
        let enveloped: Versioned<Sample> = serde_json::from_str(
            r#"{"version": 2, "data": {"jobType": "testJob"}}"#,
        )
        .unwrap();
        assert_eq!(
            enveloped.into_checked(),
            Err(UnsupportedVersion { found: "2".to_string() })
        );
    }

    #[parameterized(
        missing = {None, true},
        current = {Some("1"), true},
        padded = {Some(" 1 "), true},
        future = {Some("2"), false},
        garbage = {Some("v1"), false},
    )]
    fn test_version_header(value: Option<&str>, accepted: bool) {
        assert_eq!(check_version_header(value).is_ok(), accepted);
    }
}
