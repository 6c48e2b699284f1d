//! Backend configuration lookup.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Key/value configuration handed to backend factories and validators.
pub trait Config {
    /// The value stored under `key`, if any.
    fn config(&self, key: &str) -> Option<String>;
}

/// Fetch a required key, failing with a configuration error naming `kind`.
pub fn require(config: &dyn Config, kind: &str, key: &str) -> Result<String> {
    config
        .config(key)
        .ok_or_else(|| Error::config(kind, format!("missing {key} config")))
}

/// A [`Config`] backed by an ordered map.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigMap(BTreeMap<String, String>);

impl ConfigMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Overlay `other` on top of this map.
    pub fn merge(&mut self, other: ConfigMap) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse a `key=value` pair, as given on a command line.
    pub fn parse_pair(pair: &str) -> Result<(String, String)> {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| Error::InvalidArgument(format!("expected key=value, got {pair:?}")))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::InvalidArgument(format!("empty key in {pair:?}")));
        }
        Ok((key.to_string(), value.to_string()))
    }
}

impl Config for ConfigMap {
    fn config(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ConfigMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
