//! Launch-Command Resolver — external to the core per SPEC_FULL.md §2/§6.
//!
//! Maps `(agentKind, model?, codexProvider?)` to a concrete command, argument
//! list, and environment additions. The Session Manager only requires that
//! the resulting command exist on `$PATH` or be an absolute path; otherwise
//! it downgrades the session to `terminal` and returns a warning.

use crate::core::agent_detection::AgentType;

#[derive(Debug, Clone, Default)]
pub struct LaunchArgs<'a> {
    pub model: Option<&'a str>,
    pub codex_provider: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct ResolvedLaunch {
    pub command: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

/// Returns `None` for `AgentType::Terminal` — the session simply keeps the
/// warm login shell, no command is written into it.
pub fn resolve(agent_type: AgentType, launch: LaunchArgs<'_>) -> Option<ResolvedLaunch> {
    match agent_type {
        AgentType::Terminal => None,
        AgentType::ClaudeCode => Some(ResolvedLaunch {
            command: "claude".to_string(),
            args: Vec::new(),
            env: Vec::new(),
        }),
        AgentType::GeminiCli => {
            let mut args = Vec::new();
            if let Some(model) = launch.model {
                args.push("--model".to_string());
                args.push(model.to_string());
            }
            Some(ResolvedLaunch {
                command: "gemini".to_string(),
                args,
                env: Vec::new(),
            })
        }
        AgentType::Codex => {
            let mut args = Vec::new();
            if let Some(model) = launch.model {
                args.push("--model".to_string());
                args.push(model.to_string());
            }
            Some(ResolvedLaunch {
                command: "codex".to_string(),
                args,
                env: Vec::new(),
            })
        }
        AgentType::Openrouter => {
            // openrouter sessions are the codex binary with a provider override;
            // codex reads this from the environment rather than a flag.
            let mut args = Vec::new();
            if let Some(model) = launch.model {
                args.push("--model".to_string());
                args.push(model.to_string());
            }
            let provider = launch.codex_provider.unwrap_or("openrouter");
            Some(ResolvedLaunch {
                command: "codex".to_string(),
                args,
                env: vec![("CODEX_PROVIDER".to_string(), provider.to_string())],
            })
        }
    }
}

/// `true` if `command` is runnable as written: either an absolute path that
/// exists, or a bare name resolvable on `$PATH`.
pub fn command_is_runnable(command: &str) -> bool {
    let path = std::path::Path::new(command);
    if path.is_absolute() {
        return path.is_file();
    }

    let Some(path_var) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path_var).any(|dir| dir.join(command).is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_has_no_launch_command() {
        assert!(resolve(AgentType::Terminal, LaunchArgs::default()).is_none());
    }

    #[test]
    fn openrouter_delegates_to_codex_with_provider_env() {
        let resolved = resolve(
            AgentType::Openrouter,
            LaunchArgs {
                model: None,
                codex_provider: Some("together"),
            },
        )
        .expect("openrouter resolves");
        assert_eq!(resolved.command, "codex");
        assert_eq!(
            resolved.env,
            vec![("CODEX_PROVIDER".to_string(), "together".to_string())]
        );
    }

    #[test]
    fn claude_code_has_no_required_args() {
        let resolved = resolve(AgentType::ClaudeCode, LaunchArgs::default()).unwrap();
        assert_eq!(resolved.command, "claude");
        assert!(resolved.args.is_empty());
    }

    #[test]
    fn command_is_runnable_finds_sh_on_path() {
        assert!(command_is_runnable("sh"));
        assert!(!command_is_runnable("definitely-not-a-real-binary-xyz"));
    }
}
