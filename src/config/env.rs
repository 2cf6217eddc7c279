//! Environment snapshot
//!
//! The process environment is read once at startup and passed down, so
//! backend selection and branch detection are pure functions of it.

use std::collections::HashMap;
use std::path::PathBuf;

/// CI vendor markers, any of which means we are on CI
const CI_VARS: &[&str] = &[
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "CIRCLECI",
    "TRAVIS",
    "JENKINS_URL",
    "BUILDKITE",
    "TEAMCITY_VERSION",
    "TF_BUILD",
];

/// Branch variables set by CI providers, in lookup order
const BRANCH_VARS: &[&str] = &[
    "CIRCLE_BRANCH",
    "TRAVIS_BRANCH",
    "GITHUB_HEAD_REF",
    "GITHUB_REF_NAME",
    "CI_COMMIT_REF_NAME",
    "BUILDKITE_BRANCH",
];

/// Captured environment variables
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    /// Snapshot the current process environment
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Build an environment from explicit pairs
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Get a variable, treating empty values as unset
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Whether we are running on a CI provider
    pub fn is_ci(&self) -> bool {
        if let Some(ci) = self.get("CI") {
            return !matches!(ci.to_ascii_lowercase().as_str(), "false" | "0");
        }
        CI_VARS.iter().any(|var| self.get(var).is_some())
    }

    /// Branch name reported by the CI provider, if any
    pub fn ci_branch(&self) -> Option<&str> {
        BRANCH_VARS.iter().find_map(|var| self.get(var))
    }

    /// Root for scratch directories
    pub fn temp_root(&self) -> PathBuf {
        self.get("TMPDIR")
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ci_detection() {
        assert!(Environment::from_pairs([("CI", "true")]).is_ci());
        assert!(Environment::from_pairs([("CIRCLECI", "1")]).is_ci());
        assert!(!Environment::from_pairs([("CI", "false")]).is_ci());
        assert!(!Environment::from_pairs([("HOME", "/root")]).is_ci());
    }

    #[test]
    fn ci_branch_lookup_order() {
        let env = Environment::from_pairs([
            ("TRAVIS_BRANCH", "travis"),
            ("CIRCLE_BRANCH", "circle"),
        ]);
        assert_eq!(env.ci_branch(), Some("circle"));

        let env = Environment::from_pairs([("GITHUB_HEAD_REF", ""), ("GITHUB_REF_NAME", "main")]);
        assert_eq!(env.ci_branch(), Some("main"));
    }

    #[test]
    fn temp_root_prefers_tmpdir() {
        let env = Environment::from_pairs([("TMPDIR", "/scratch")]);
        assert_eq!(env.temp_root(), PathBuf::from("/scratch"));
    }
}
