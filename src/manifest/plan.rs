//! Install plan and package script lookup

use crate::config::schema::InstallConfig;
use crate::error::{DotrunError, DotrunResult};
use crate::manifest::Manifest;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// One install command to run inside the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallStep {
    /// Manifest that triggered this step
    pub manifest: Manifest,
    /// Command and arguments
    pub argv: Vec<String>,
}

impl InstallStep {
    /// Command line for messages
    pub fn display(&self) -> String {
        self.argv.join(" ")
    }
}

/// Decide which install commands a project needs
///
/// Node dependencies come first; Python dependencies are installed from
/// requirements.txt when present, otherwise from pyproject.toml.
pub fn plan_install(project_dir: &Path, config: &InstallConfig) -> Vec<InstallStep> {
    let mut steps = Vec::new();

    if Manifest::Package.is_present(project_dir) && !config.node.is_empty() {
        steps.push(InstallStep {
            manifest: Manifest::Package,
            argv: config.node.clone(),
        });
    }

    if Manifest::Requirements.is_present(project_dir) {
        if !config.python_requirements.is_empty() {
            steps.push(InstallStep {
                manifest: Manifest::Requirements,
                argv: config.python_requirements.clone(),
            });
        }
    } else if Manifest::PyProject.is_present(project_dir) && !config.python_project.is_empty() {
        steps.push(InstallStep {
            manifest: Manifest::PyProject,
            argv: config.python_project.clone(),
        });
    }

    steps
}

/// Scripts declared in package.json, empty if there is no package.json
pub fn package_scripts(project_dir: &Path) -> DotrunResult<HashMap<String, String>> {
    let path = Manifest::Package.path_in(project_dir);
    if !path.is_file() {
        return Ok(HashMap::new());
    }

    let content = fs::read_to_string(&path)
        .map_err(|e| DotrunError::io(format!("reading {}", path.display()), e))?;
    let package: serde_json::Value = serde_json::from_str(&content)?;

    let scripts = package["scripts"]
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();

    Ok(scripts)
}
