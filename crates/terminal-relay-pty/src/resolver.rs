//! Shell and environment resolution for launch configuration.
//!
//! Resolution never fails: missing or invalid pieces fall back to
//! best-effort defaults so session creation always succeeds.

use std::collections::HashMap;

use terminal_relay_core::{
    Dimensions, LaunchConfig, LaunchResolver, ResolvedLaunchConfig, ResolverEnv, WorkspaceContext,
};

/// Default resolver: system shell, merged environment, `${VAR}`
/// substitution and workspace-folder working directories.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellResolver;

impl LaunchResolver for ShellResolver {
    fn resolve(
        &self,
        launch: &LaunchConfig,
        resolver_env: &ResolverEnv,
        workspace: &WorkspaceContext,
    ) -> ResolvedLaunchConfig {
        let shell = launch
            .shell
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(default_shell);

        // Merge order: process environment, then resolver-contributed
        // variables, then per-launch overrides (substituted last so they
        // can reference everything below them).
        let mut env: HashMap<String, String> = std::env::vars().collect();
        env.extend(resolver_env.vars.clone());
        env.entry("TERM".to_string())
            .or_insert_with(|| "xterm-256color".to_string());

        let mut substitution_vars = env.clone();
        if let Some(folder) = workspace.folders.first() {
            substitution_vars.insert("workspaceFolder".to_string(), folder.clone());
        }

        for (key, value) in &launch.env {
            env.insert(key.clone(), substitute_variables(value, &substitution_vars));
        }

        let cwd = launch
            .cwd
            .as_deref()
            .filter(|c| !c.is_empty())
            .map(|c| substitute_variables(c, &substitution_vars))
            .or_else(|| workspace.folders.first().cloned())
            .or_else(home_dir)
            .unwrap_or_else(|| ".".to_string());

        let dimensions = if launch.dimensions.is_valid() {
            launch.dimensions
        } else {
            Dimensions::default()
        };

        ResolvedLaunchConfig {
            shell,
            args: launch.args.clone(),
            env,
            cwd,
            dimensions,
        }
    }
}

/// System default shell.
pub fn default_shell() -> String {
    if cfg!(windows) {
        std::env::var("COMSPEC").unwrap_or_else(|_| "powershell.exe".to_string())
    } else {
        std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string())
    }
}

/// Substitute `${NAME}` references against the given variables.
///
/// Unknown variables expand to the empty string; an unterminated
/// reference is passed through verbatim.
fn substitute_variables(input: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                if let Some(value) = vars.get(&after[..end]) {
                    out.push_str(value);
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn home_dir() -> Option<String> {
    std::env::var("HOME")
        .ok()
        .or_else(|| std::env::var("USERPROFILE").ok())
        .filter(|h| !h.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(
        launch: &LaunchConfig,
        resolver_env: &ResolverEnv,
        workspace: &WorkspaceContext,
    ) -> ResolvedLaunchConfig {
        ShellResolver.resolve(launch, resolver_env, workspace)
    }

    #[test]
    fn test_default_shell_is_non_empty() {
        assert!(!default_shell().is_empty());
    }

    #[test]
    fn test_resolve_uses_requested_shell() {
        let launch = LaunchConfig {
            shell: Some("/bin/dash".to_string()),
            ..LaunchConfig::default()
        };
        let resolved = resolve(&launch, &ResolverEnv::default(), &WorkspaceContext::default());
        assert_eq!(resolved.shell, "/bin/dash");
    }

    #[test]
    fn test_resolve_empty_shell_falls_back() {
        let launch = LaunchConfig {
            shell: Some(String::new()),
            ..LaunchConfig::default()
        };
        let resolved = resolve(&launch, &ResolverEnv::default(), &WorkspaceContext::default());
        assert_eq!(resolved.shell, default_shell());
    }

    #[test]
    fn test_env_merge_precedence() {
        let mut resolver_env = ResolverEnv::default();
        resolver_env
            .vars
            .insert("RELAY_VAR".to_string(), "from_resolver".to_string());

        let mut launch = LaunchConfig::default();
        launch
            .env
            .insert("RELAY_VAR".to_string(), "from_launch".to_string());

        let resolved = resolve(&launch, &resolver_env, &WorkspaceContext::default());
        assert_eq!(resolved.env.get("RELAY_VAR").unwrap(), "from_launch");
        assert!(resolved.env.contains_key("TERM"));
    }

    #[test]
    fn test_variable_substitution() {
        let mut vars = HashMap::new();
        vars.insert("FOO".to_string(), "bar".to_string());

        assert_eq!(substitute_variables("${FOO}/baz", &vars), "bar/baz");
        assert_eq!(substitute_variables("no refs", &vars), "no refs");
        assert_eq!(substitute_variables("${MISSING}/x", &vars), "/x");
        assert_eq!(substitute_variables("${UNTERMINATED", &vars), "${UNTERMINATED");
    }

    #[test]
    fn test_cwd_prefers_launch_then_workspace() {
        let workspace = WorkspaceContext {
            folders: vec!["/workspaces/project".to_string()],
        };

        let launch = LaunchConfig {
            cwd: Some("/explicit".to_string()),
            ..LaunchConfig::default()
        };
        let resolved = resolve(&launch, &ResolverEnv::default(), &workspace);
        assert_eq!(resolved.cwd, "/explicit");

        let launch = LaunchConfig::default();
        let resolved = resolve(&launch, &ResolverEnv::default(), &workspace);
        assert_eq!(resolved.cwd, "/workspaces/project");
    }

    #[test]
    fn test_cwd_workspace_folder_substitution() {
        let workspace = WorkspaceContext {
            folders: vec!["/workspaces/project".to_string()],
        };
        let launch = LaunchConfig {
            cwd: Some("${workspaceFolder}/src".to_string()),
            ..LaunchConfig::default()
        };
        let resolved = resolve(&launch, &ResolverEnv::default(), &workspace);
        assert_eq!(resolved.cwd, "/workspaces/project/src");
    }

    #[test]
    fn test_invalid_dimensions_default() {
        let launch = LaunchConfig {
            dimensions: Dimensions::new(0, 0),
            ..LaunchConfig::default()
        };
        let resolved = resolve(&launch, &ResolverEnv::default(), &WorkspaceContext::default());
        assert_eq!(resolved.dimensions, Dimensions::default());
    }
}
