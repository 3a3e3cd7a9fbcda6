//! The data a template is rendered against

use crate::error::ConfigError;
use crate::value::Value;
use error_stack::{IntoReport, Report, Result, ResultExt};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::Path;

/// A self-validating data root
///
/// The renderer validates the configuration before every render and evaluates
/// templates against [`Configuration::data`].
pub trait Configuration: Debug + Send + Sync {
    fn validate(&self) -> Result<(), ConfigError>;
    fn data(&self) -> &Value;
}

/// Configuration merged from YAML/JSON documents and `key=value` variables
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    data: Value,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data: Value::Map(BTreeMap::new()),
        }
    }
}

impl Config {
    pub fn new(data: Value) -> Self {
        Self { data }
    }

    /// Parse a YAML document. JSON is accepted too, being a subset of YAML
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.merge(parse_yaml(text)?);
        Ok(config)
    }

    /// Load `files` in order, then apply `vars`
    ///
    /// Files ending in `.json` are parsed as JSON, everything else as YAML.
    /// Later documents are deep-merged over earlier ones.
    pub fn load<P: AsRef<Path>>(files: &[P], vars: &[String]) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for file in files {
            let path = file.as_ref();
            log::debug!("loading configuration: {}", path.display());
            let text = std::fs::read_to_string(path)
                .into_report()
                .change_context(ConfigError)
                .attach_printable_lazy(|| {
                    format!("could not read configuration file: `{}`", path.display())
                })?;
            let is_json = path.extension().map_or(false, |e| e == "json");
            let doc = if is_json {
                serde_json::from_str::<serde_json::Value>(&text)
                    .into_report()
                    .change_context(ConfigError)
                    .map(Value::from)
            } else {
                parse_yaml(&text)
            };
            let doc = doc.attach_printable_lazy(|| {
                format!("could not parse configuration file: `{}`", path.display())
            })?;
            config.merge(doc);
        }
        for var in vars {
            config.set_var(var)?;
        }
        Ok(config)
    }

    /// Deep-merge `other` over the current data. Maps are merged key by key,
    /// anything else replaces what was there. A nil document is ignored.
    pub fn merge(&mut self, other: Value) {
        if other.is_nil() {
            return;
        }
        merge_into(&mut self.data, other);
    }

    /// Set the value at a dotted key, creating maps along the way
    pub fn set(&mut self, key: &str, value: Value) {
        let path = key.split('.').collect::<Vec<_>>();
        set_path(&mut self.data, &path, value);
    }

    /// Apply a `key=value` variable. The value is always a string
    pub fn set_var(&mut self, var: &str) -> Result<(), ConfigError> {
        match var.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                log::debug!("setting variable `{key}`");
                self.set(key, Value::from(value));
                Ok(())
            }
            _ => Err(Report::new(ConfigError)
                .attach_printable(format!("variable must be of the form key=value: `{var}`"))),
        }
    }
}

impl Configuration for Config {
    fn validate(&self) -> Result<(), ConfigError> {
        match &self.data {
            Value::Map(_) => Ok(()),
            other => Err(Report::new(ConfigError).attach_printable(format!(
                "configuration root must be a map, got {}",
                other.kind()
            ))),
        }
    }

    fn data(&self) -> &Value {
        &self.data
    }
}

fn parse_yaml(text: &str) -> Result<Value, ConfigError> {
    serde_yaml::from_str::<serde_yaml::Value>(text)
        .into_report()
        .change_context(ConfigError)
        .map(Value::from)
}

fn set_path(target: &mut Value, path: &[&str], value: Value) {
    match path.split_first() {
        None => *target = value,
        Some((head, rest)) => {
            if !matches!(target, Value::Map(_)) {
                *target = Value::Map(BTreeMap::new());
            }
            if let Value::Map(map) = target {
                set_path(map.entry(head.to_string()).or_default(), rest, value);
            }
        }
    }
}

fn merge_into(base: &mut Value, other: Value) {
    match (base, other) {
        (Value::Map(base), Value::Map(other)) => {
            for (k, v) in other {
                match base.get_mut(&k) {
                    Some(existing) => merge_into(existing, v),
                    None => {
                        base.insert(k, v);
                    }
                }
            }
        }
        (base, other) => *base = other,
    }
}

#[cfg(test)]
mod ut {
    use super::*;

    fn yaml(text: &str) -> Value {
        Value::from(serde_yaml::from_str::<serde_yaml::Value>(text).unwrap())
    }

    #[test]
    fn test_default_is_valid_empty_map() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(Some(0), config.data().len());
    }

    #[test]
    fn test_root_must_be_map() {
        assert!(Config::new(Value::from("x")).validate().is_err());
        assert!(Config::new(Value::Nil).validate().is_err());
        assert!(Config::from_yaml_str("[1, 2]").unwrap().validate().is_err());
        assert!(Config::from_yaml_str("a: 1").unwrap().validate().is_ok());
    }

    #[test]
    fn test_empty_document() {
        let config = Config::from_yaml_str("").unwrap();
        assert_eq!(&Value::Map(BTreeMap::new()), config.data());
    }

    #[test]
    fn test_deep_merge() {
        let mut config = Config::from_yaml_str("a: {x: 1, y: 2}\nb: [1]").unwrap();
        config.merge(yaml("a: {y: 3, z: 4}\nb: [2, 3]"));
        assert_eq!(&yaml("a: {x: 1, y: 3, z: 4}\nb: [2, 3]"), config.data());
    }

    #[test]
    fn test_set_dotted() {
        let mut config = Config::from_yaml_str("a: {b: 1}\nc: scalar").unwrap();
        config.set("a.d", Value::from("x"));
        config.set("c.e", Value::from("y"));
        config.set("top", Value::from("z"));
        assert_eq!(
            &yaml("a: {b: 1, d: x}\nc: {e: y}\ntop: z"),
            config.data()
        );
    }

    #[test]
    fn test_set_var() {
        let mut config = Config::default();
        config.set_var("something=test").unwrap();
        config.set_var("eq=a=b").unwrap();
        assert_eq!(&yaml("something: test\neq: a=b"), config.data());
        assert!(config.set_var("novalue").is_err());
        assert!(config.set_var("=x").is_err());
    }

    #[test]
    fn test_load_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.yaml");
        let second = dir.path().join("b.json");
        std::fs::write(&first, "name: first\nport: 80\n").unwrap();
        std::fs::write(&second, r#"{"name": "second"}"#).unwrap();
        let config = Config::load(&[&first, &second], &["port=8080".to_string()]).unwrap();
        assert_eq!(&yaml("name: second\nport: '8080'"), config.data());
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{not json").unwrap();
        assert!(Config::load(&[&bad], &[]).is_err());
        assert!(Config::load(&[dir.path().join("missing.yaml")], &[]).is_err());
    }
}
