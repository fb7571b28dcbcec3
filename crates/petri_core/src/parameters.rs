//! String key/value configuration passed to entities and simulations

use std::str::FromStr;

use indexmap::IndexMap;

use crate::abi::{Real, Vector};
use crate::error::{Error, Result};

/// Ordered set of named string values.
///
/// Loaders fill it from whatever format they read; entities pull typed
/// values out with [`Parameters::get_parsed`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters {
    values: IndexMap<String, String>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Builder-style [`Parameters::set`]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn exists(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.values.shift_remove(name)
    }

    /// Parse a value, `Ok(None)` when it is absent
    pub fn get_parsed<T: FromStr>(&self, name: &str) -> Result<Option<T>> {
        match self.values.get(name) {
            None => Ok(None),
            Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
                Error::InvalidArgument(format!("parameter '{}' has invalid value '{}'", name, raw))
            }),
        }
    }

    /// Parse a value or fall back to `default` when absent
    pub fn get_or<T: FromStr>(&self, name: &str, default: T) -> Result<T> {
        Ok(self.get_parsed(name)?.unwrap_or(default))
    }

    /// Parse a `"x y"` (or `"x,y"`) vector
    pub fn get_vector(&self, name: &str) -> Result<Option<Vector>> {
        let Some(raw) = self.values.get(name) else {
            return Ok(None);
        };

        let parts: Vec<&str> = raw
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|s| !s.is_empty())
            .collect();

        let invalid = || Error::InvalidArgument(format!("parameter '{}' is not a vector: '{}'", name, raw));

        match parts.as_slice() {
            [x, y] => {
                let x: Real = x.parse().map_err(|_| invalid())?;
                let y: Real = y.parse().map_err(|_| invalid())?;
                Ok(Some(Vector::new(x, y)))
            }
            [v] => {
                let v: Real = v.parse().map_err(|_| invalid())?;
                Ok(Some(Vector::splat(v)))
            }
            _ => Err(invalid()),
        }
    }

    /// Comma separated list of names
    pub fn get_list(&self, name: &str) -> Vec<String> {
        self.values
            .get(name)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Copy every value from `other`, overwriting existing ones
    pub fn merge(&mut self, other: &Parameters) {
        for (name, value) in other.iter() {
            self.set(name, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Parameters::new();
        for (k, v) in iter {
            params.set(k, v);
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_access() {
        let params = Parameters::new()
            .with("count", "12")
            .with("rate", " 0.5 ")
            .with("position", "1.5 -2")
            .with("programs", "a, b,,c");

        assert_eq!(params.get_parsed::<u32>("count").unwrap(), Some(12));
        assert_eq!(params.get_or::<Real>("rate", 1.0).unwrap(), 0.5);
        assert_eq!(params.get_or::<Real>("missing", 7.0).unwrap(), 7.0);
        assert_eq!(params.get_vector("position").unwrap(), Some(Vector::new(1.5, -2.0)));
        assert_eq!(params.get_list("programs"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_invalid_value_is_reported() {
        let params = Parameters::new().with("count", "twelve").with("position", "1 2 3");
        assert!(matches!(params.get_parsed::<u32>("count"), Err(Error::InvalidArgument(_))));
        assert!(params.get_vector("position").is_err());
    }
}
