use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const STATE_DIR_NAME: &str = ".slicemig";
pub const CONFIG_FILENAME: &str = "config.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub project_root: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub cwd: PathBuf,
}

impl ResolutionContext {
    pub fn from_process() -> Result<Self> {
        let cwd = env::current_dir().context("failed to read current directory")?;
        Ok(Self { cwd })
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub project_root: PathBuf,
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    pub root_source: ValueSource,
    pub config_source: ValueSource,
}

impl ResolvedPaths {
    /// Output directories are taken relative to the project root.
    pub fn output_dir<P: AsRef<Path>>(&self, configured: P) -> PathBuf {
        absolutize(configured.as_ref(), &self.project_root)
    }

    pub fn diagnostics(&self) -> String {
        format!(
            "project_root={} ({})\nstate_dir={}\nconfig_path={} ({}, {})",
            normalize_for_display(&self.project_root),
            self.root_source.as_str(),
            normalize_for_display(&self.state_dir),
            normalize_for_display(&self.config_path),
            self.config_source.as_str(),
            if self.config_path.exists() {
                "found"
            } else {
                "missing"
            },
        )
    }
}

pub fn resolve_paths(
    context: &ResolutionContext,
    overrides: &PathOverrides,
) -> Result<ResolvedPaths> {
    Ok(resolve_paths_with_lookup(context, overrides, |key| {
        env::var(key).ok()
    }))
}

fn resolve_paths_with_lookup<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: F,
) -> ResolvedPaths
where
    F: Fn(&str) -> Option<String>,
{
    let (project_root, root_source) = if let Some(path) = overrides.project_root.as_deref() {
        (absolutize(path, &context.cwd), ValueSource::Flag)
    } else if let Some(value) = non_blank(lookup_env("SLICEMIG_PROJECT_ROOT")) {
        (absolutize(Path::new(&value), &context.cwd), ValueSource::Env)
    } else {
        (context.cwd.clone(), ValueSource::Default)
    };

    let state_dir = project_root.join(STATE_DIR_NAME);
    let (config_path, config_source) = if let Some(path) = overrides.config.as_deref() {
        (absolutize(path, &project_root), ValueSource::Flag)
    } else if let Some(value) = non_blank(lookup_env("SLICEMIG_CONFIG")) {
        (absolutize(Path::new(&value), &project_root), ValueSource::Env)
    } else {
        (state_dir.join(CONFIG_FILENAME), ValueSource::Default)
    };

    ResolvedPaths {
        project_root,
        state_dir,
        config_path,
        root_source,
        config_source,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

pub fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tempfile::tempdir;

    use super::{PathOverrides, ResolutionContext, ValueSource, resolve_paths_with_lookup};

    #[test]
    fn resolve_paths_prefers_flag_over_env() {
        let temp = tempdir().expect("tempdir");
        let cwd = temp.path().join("cwd");
        let from_flag = temp.path().join("flag-root");

        let overrides = PathOverrides {
            project_root: Some(from_flag.clone()),
            ..PathOverrides::default()
        };
        let context = ResolutionContext { cwd };
        let env = HashMap::from([(
            "SLICEMIG_PROJECT_ROOT".to_string(),
            temp.path().join("env-root").to_string_lossy().to_string(),
        )]);

        let resolved = resolve_paths_with_lookup(&context, &overrides, |key| env.get(key).cloned());
        assert_eq!(resolved.project_root, from_flag);
        assert_eq!(resolved.root_source, ValueSource::Flag);
        assert_eq!(
            resolved.config_path,
            from_flag.join(".slicemig").join("config.toml")
        );
        assert_eq!(resolved.config_source, ValueSource::Default);
    }

    #[test]
    fn resolve_paths_uses_env_then_cwd() {
        let temp = tempdir().expect("tempdir");
        let cwd = temp.path().join("cwd");
        let context = ResolutionContext { cwd: cwd.clone() };

        let env = HashMap::from([
            ("SLICEMIG_PROJECT_ROOT".to_string(), "nested".to_string()),
            ("SLICEMIG_CONFIG".to_string(), "custom.toml".to_string()),
        ]);
        let resolved = resolve_paths_with_lookup(&context, &PathOverrides::default(), |key| {
            env.get(key).cloned()
        });
        assert_eq!(resolved.project_root, cwd.join("nested"));
        assert_eq!(resolved.root_source, ValueSource::Env);
        assert_eq!(resolved.config_path, cwd.join("nested").join("custom.toml"));
        assert_eq!(resolved.config_source, ValueSource::Env);

        let fallback = resolve_paths_with_lookup(&context, &PathOverrides::default(), |_| None);
        assert_eq!(fallback.project_root, cwd);
        assert_eq!(fallback.root_source, ValueSource::Default);
    }

    #[test]
    fn output_dir_is_relative_to_project_root() {
        let temp = tempdir().expect("tempdir");
        let context = ResolutionContext {
            cwd: temp.path().to_path_buf(),
        };
        let resolved = resolve_paths_with_lookup(&context, &PathOverrides::default(), |_| None);
        assert_eq!(
            resolved.output_dir("updated_documents"),
            temp.path().join("updated_documents")
        );
        let absolute = temp.path().join("elsewhere");
        assert_eq!(resolved.output_dir(&absolute), absolute);
        assert!(resolved.diagnostics().contains("config_path="));
    }
}
