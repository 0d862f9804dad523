use core::str::FromStr;
use std::fmt;

use lazy_regex::regex_is_match;
use nutype::nutype;
use serde::de::Visitor;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Version of the wire protocol spoken by this auction house.
pub const API_VERSION: u32 = 1;

/// encapsulate the UUIDs in custom struct to let the compiler differentiate
/// them
macro_rules! impl_id_encapsulation {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd)]
        pub struct $name {
            id: Uuid,
        }

        impl $name {
            pub fn new_random() -> Self { $name { id: Uuid::new_v4() } }
        }

        impl From<Uuid> for $name {
            #[inline(always)]
            fn from(id: Uuid) -> Self { $name { id } }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            #[inline(always)]
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::from_str(s).map(|id| id.into())
            }
        }

        impl fmt::Display for $name {
            #[inline(always)]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}", self.id)
            }
        }

        impl Serialize for $name {
            #[inline(always)]
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.id.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                struct MyVisitor;

                impl<'de> Visitor<'de> for MyVisitor {
                    type Value = $name;

                    fn expecting(
                        &self,
                        formatter: &mut fmt::Formatter,
                    ) -> fmt::Result {
                        formatter.write_str(
                            format!("a {}, i.e., a UUIDv4", stringify!($name))
                                .as_str(),
                        )
                    }

                    fn visit_str<E>(
                        self,
                        value: &str,
                    ) -> Result<Self::Value, E>
                    where
                        E: serde::de::Error,
                    {
                        Ok($name {
                            id: Uuid::parse_str(value).map_err(E::custom)?,
                        })
                    }
                }

                deserializer.deserialize_str(MyVisitor)
            }
        }
    };
}

impl_id_encapsulation!(AuctionId);

/// Whether the string is an absolute URI (`scheme://rest`).
pub fn is_absolute_uri(uri: &str) -> bool {
    regex_is_match!(r"^[A-Za-z][A-Za-z0-9+.\-]*://[^\s/?#]+\S*$", uri)
}

pub fn ensure_trailing_slash(uri: String) -> String {
    if uri.ends_with('/') {
        uri
    } else {
        uri + "/"
    }
}

/// Canonical base URI of an auction house, always ending with a `/` so
/// routes can be appended directly.
#[nutype(
    sanitize(trim, with = ensure_trailing_slash),
    validate(predicate = is_absolute_uri),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        PartialOrd,
        Ord,
        Display,
        Deref,
        Serialize,
        Deserialize
    )
)]
pub struct PeerUri(String);

impl PeerUri {
    /// `route` must not start with a `/`.
    pub fn join(&self, route: &str) -> String {
        format!("{}{}", self.as_str(), route)
    }
}

/// The application area of a node. Nodes only talk to nodes of the same
/// ring.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum RingType {
    Odd,
    Even,
}

impl fmt::Display for RingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RingType::Odd => write!(f, "ODD"),
            RingType::Even => write!(f, "EVEN"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown ring type {0:?}, expected ODD or EVEN")]
pub struct UnknownRingType(String);

impl FromStr for RingType {
    type Err = UnknownRingType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ODD" => Ok(RingType::Odd),
            "EVEN" => Ok(RingType::Even),
            _ => Err(UnknownRingType(s.to_string())),
        }
    }
}

pub mod domain;
pub mod dto;
pub mod view;
