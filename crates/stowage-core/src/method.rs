//! HTTP methods a pre-signed URL can authorize.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Request method a pre-signed URL is issued for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientMethod {
    Get,
    Put,
}

impl ClientMethod {
    pub const ALL: [ClientMethod; 2] = [ClientMethod::Get, ClientMethod::Put];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "Get",
            Self::Put => "Put",
        }
    }
}

impl fmt::Display for ClientMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidArgument(format!("{s} is not a client method")))
    }
}

/// Parameters of a pre-signed request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PresignParams {
    pub expires_in: Duration,
    pub content_md5: Option<String>,
    pub extra: BTreeMap<String, String>,
}

impl Default for PresignParams {
    fn default() -> Self {
        Self {
            expires_in: Duration::from_secs(3600),
            content_md5: None,
            extra: BTreeMap::new(),
        }
    }
}
