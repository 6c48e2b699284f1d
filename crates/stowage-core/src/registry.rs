//! Kind registry: backend name → factory, URL recognizer, validator.
//!
//! Backends register themselves once during process start-up (see
//! `stowage_sdk::register_builtin`) and the registry is read-only after
//! that in steady state. The process-wide instance lives behind a single
//! `RwLock`; [`Registry`] can also be used on its own.

use std::sync::{LazyLock, PoisonError, RwLock};

use tracing::{debug, info};
use url::Url;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::traits::Location;

/// Builds a location from configuration.
pub type MakeFn = fn(&dyn Config) -> Result<Box<dyn Location>>;

/// Decides whether a URL belongs to a kind, normally by its scheme.
pub type RecognizeFn = fn(&Url) -> bool;

/// Checks configuration without connecting anywhere.
pub type ValidateFn = fn(&dyn Config) -> Result<()>;

/// Everything the registry knows about one kind.
#[derive(Clone, Copy, Debug)]
pub struct KindSpec {
    pub kind: &'static str,
    pub make: MakeFn,
    pub recognize: RecognizeFn,
    pub validate: Option<ValidateFn>,
}

impl KindSpec {
    pub fn new(kind: &'static str, make: MakeFn, recognize: RecognizeFn) -> Self {
        Self {
            kind,
            make,
            recognize,
            validate: None,
        }
    }

    pub fn with_validator(mut self, validate: ValidateFn) -> Self {
        self.validate = Some(validate);
        self
    }

    /// Run the validator, if any, then the factory.
    pub fn dial(&self, config: &dyn Config) -> Result<Box<dyn Location>> {
        if let Some(validate) = self.validate {
            validate(config)?;
        }
        let location = (self.make)(config)?;
        info!(kind = self.kind, "dialed location");
        Ok(location)
    }
}

/// Ordered set of kinds; order is first-registration order.
#[derive(Debug, Default)]
pub struct Registry {
    kinds: Vec<KindSpec>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a kind. Registering a kind that is already present leaves the
    /// registry untouched and returns `false`.
    pub fn register(&mut self, spec: KindSpec) -> bool {
        if self.get(spec.kind).is_some() {
            debug!(kind = spec.kind, "kind already registered; ignoring");
            return false;
        }
        debug!(kind = spec.kind, "registered kind");
        self.kinds.push(spec);
        true
    }

    /// Add a kind, failing with [`Error::DuplicateKind`] if it is present.
    pub fn try_register(&mut self, spec: KindSpec) -> Result<()> {
        if self.register(spec) {
            Ok(())
        } else {
            Err(Error::DuplicateKind(spec.kind.to_string()))
        }
    }

    /// Registered kind names in registration order.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.kinds.iter().map(|spec| spec.kind).collect()
    }

    pub fn get(&self, kind: &str) -> Option<&KindSpec> {
        self.kinds.iter().find(|spec| spec.kind == kind)
    }

    /// The first kind, in registration order, that recognizes `url`.
    pub fn kind_by_url(&self, url: &Url) -> Result<&'static str> {
        self.kinds
            .iter()
            .find(|spec| (spec.recognize)(url))
            .map(|spec| spec.kind)
            .ok_or_else(|| Error::NoMatchingKind(url.to_string()))
    }

    /// Resolve a kind name, or a URL whose scheme a kind recognizes.
    pub fn resolve(&self, kind_or_url: &str) -> Result<KindSpec> {
        if let Some(spec) = self.get(kind_or_url) {
            return Ok(*spec);
        }
        match Url::parse(kind_or_url) {
            Ok(url) => {
                let kind = self.kind_by_url(&url)?;
                self.get(kind)
                    .copied()
                    .ok_or_else(|| Error::UnknownKind(kind.to_string()))
            }
            Err(_) => Err(Error::UnknownKind(kind_or_url.to_string())),
        }
    }

    /// Run the validator of `kind` against `config`.
    pub fn validate(&self, kind: &str, config: &dyn Config) -> Result<()> {
        let spec = self
            .get(kind)
            .ok_or_else(|| Error::UnknownKind(kind.to_string()))?;
        match spec.validate {
            Some(validate) => validate(config),
            None => Ok(()),
        }
    }

    pub fn dial(&self, kind_or_url: &str, config: &dyn Config) -> Result<Box<dyn Location>> {
        self.resolve(kind_or_url)?.dial(config)
    }
}

static REGISTRY: LazyLock<RwLock<Registry>> = LazyLock::new(|| RwLock::new(Registry::new()));

/// Register a kind in the process-wide registry. Re-registering an existing
/// kind is a no-op that returns `false`.
pub fn register(
    kind: &'static str,
    make: MakeFn,
    recognize: RecognizeFn,
    validate: Option<ValidateFn>,
) -> bool {
    let spec = KindSpec {
        kind,
        make,
        recognize,
        validate,
    };
    REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .register(spec)
}

/// Register a kind, failing with [`Error::DuplicateKind`] if present.
pub fn try_register(spec: KindSpec) -> Result<()> {
    REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .try_register(spec)
}

/// Registered kinds in registration order.
pub fn kinds() -> Vec<&'static str> {
    REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .kinds()
}

pub fn kind_by_url(url: &Url) -> Result<&'static str> {
    REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .kind_by_url(url)
}

pub fn validate(kind: &str, config: &dyn Config) -> Result<()> {
    let spec = lookup(kind)?;
    match spec.validate {
        Some(validate) => validate(config),
        None => Ok(()),
    }
}

/// Open a location by kind name or URL, validating the configuration first.
pub fn dial(kind_or_url: &str, config: &dyn Config) -> Result<Box<dyn Location>> {
    lookup(kind_or_url)?.dial(config)
}

// The lock is released before any backend code runs.
fn lookup(kind_or_url: &str) -> Result<KindSpec> {
    REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .resolve(kind_or_url)
}
