//! Environment resolution
//!
//! Layers, lowest to highest precedence:
//! 1. the invoking process's environment (minus host-only variables)
//! 2. `.env` in the project root
//! 3. `.env.local` in the project root
//! 4. explicit `KEY=VALUE` overrides from the caller

pub mod dotenv;

use crate::config::schema::EnvironmentConfig;
use crate::error::DotrunResult;
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Project-root env files, in precedence order
pub const ENV_FILES: &[&str] = &[".env", ".env.local"];

/// Final variable mapping for one invocation, keyed and ordered by name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedEnvironment {
    vars: BTreeMap<String, String>,
}

impl ResolvedEnvironment {
    /// Look up a variable
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Iterate in key order
    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.vars.iter()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl<'a> IntoIterator for &'a ResolvedEnvironment {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.vars.iter()
    }
}

impl FromIterator<(String, String)> for ResolvedEnvironment {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}

/// Merges the environment layers into a `ResolvedEnvironment`
#[derive(Debug, Clone)]
pub struct EnvironmentResolver {
    inherited: Vec<(String, String)>,
}

impl EnvironmentResolver {
    /// Resolver seeded from the current process environment
    pub fn from_process(config: &EnvironmentConfig) -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)));
        Self::with_inherited(vars, config)
    }

    /// Resolver seeded from an explicit inherited environment
    pub fn with_inherited<I>(inherited: I, config: &EnvironmentConfig) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let inherited = inherited
            .into_iter()
            .filter(|(k, _)| !config.exclude_host.iter().any(|x| x == k))
            .collect();
        Self { inherited }
    }

    /// Merge all layers for the project at `project_dir`
    pub fn resolve(
        &self,
        project_dir: &Path,
        overrides: &[(String, String)],
    ) -> DotrunResult<ResolvedEnvironment> {
        let mut vars: BTreeMap<String, String> = self.inherited.iter().cloned().collect();

        for file in ENV_FILES {
            let path = project_dir.join(file);
            if let Some(file_vars) = dotenv::read_env_file(&path)? {
                debug!("Loaded {} variables from {}", file_vars.len(), path.display());
                vars.extend(file_vars);
            }
        }

        for (key, value) in overrides {
            debug!("Override: {}", key);
            vars.insert(key.clone(), value.clone());
        }

        Ok(ResolvedEnvironment { vars })
    }
}
