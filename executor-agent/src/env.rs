use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};

/// Snapshot of the environment the agent inherited at startup.
///
/// Captured once and never mutated; every request composes its own copy via
/// [`EnvBaseline::compose`], so concurrent requests cannot see each other's
/// overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvBaseline {
    vars: Vec<(OsString, OsString)>,
}

impl EnvBaseline {
    /// Snapshot the current process environment.
    pub fn capture() -> Self {
        Self::from_vars(std::env::vars_os())
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    #[cfg(test)]
    pub fn get(&self, key: impl AsRef<OsStr>) -> Option<&OsStr> {
        let key = key.as_ref();
        self.vars
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_os_str())
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Merge request overrides onto a copy of the baseline.
    ///
    /// A key already present keeps its position and takes the override's
    /// value; new keys are appended in key order. The result never holds two
    /// entries for the same key that an override touched.
    pub fn compose(&self, overrides: &BTreeMap<String, String>) -> Vec<(OsString, OsString)> {
        let mut composed = self.vars.clone();
        for (key, value) in overrides {
            match composed
                .iter_mut()
                .find(|(existing, _)| existing.as_os_str() == OsStr::new(key))
            {
                Some(entry) => entry.1 = OsString::from(value),
                None => composed.push((OsString::from(key), OsString::from(value))),
            }
        }
        composed
    }
}
