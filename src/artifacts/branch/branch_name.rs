use crate::artifacts::branch::{HEADS_PREFIX, INVALID_BRANCH_NAME_REGEX, REMOTES_PREFIX};
use crate::errors::{Result, VcsError};
use derive_new::new;

/// Full reference path relative to the repository directory, e.g. `refs/heads/master`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord, new)]
pub struct SymRefName(String);

impl SymRefName {
    pub fn as_ref_path(&self) -> &str {
        &self.0
    }

    pub fn is_branch(&self) -> bool {
        self.0.starts_with(HEADS_PREFIX)
    }
}

impl std::fmt::Display for SymRefName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Short, validated branch name, e.g. `master` or `feature/login`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct BranchName(String);

impl BranchName {
    pub fn try_parse(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(VcsError::InvalidArgument("branch name cannot be empty".into()));
        }

        let re = regex::Regex::new(INVALID_BRANCH_NAME_REGEX).map_err(|e| {
            VcsError::InvalidState(format!("invalid branch name regex: {e}"))
        })?;

        if re.is_match(&name) {
            Err(VcsError::InvalidArgument(format!("invalid branch name: {name}")))
        } else {
            Ok(Self(name))
        }
    }

    /// `refs/heads/<name>` → `<name>`
    pub fn try_parse_sym_ref_name(sym_ref_name: &SymRefName) -> Result<Self> {
        let name = sym_ref_name
            .as_ref_path()
            .strip_prefix(HEADS_PREFIX)
            .ok_or_else(|| {
                VcsError::InvalidArgument(format!(
                    "symbolic ref name must start with '{HEADS_PREFIX}', got '{sym_ref_name}'"
                ))
            })?;

        Self::try_parse(name)
    }

    /// `refs/heads/<name>`
    pub fn to_head_ref(&self) -> SymRefName {
        SymRefName::new(format!("{HEADS_PREFIX}{}", self.0))
    }

    /// `refs/remotes/<remote>/<name>`
    pub fn to_remote_ref(&self, remote: &str) -> SymRefName {
        SymRefName::new(format!("{REMOTES_PREFIX}{remote}/{}", self.0))
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BranchName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::proptest;

    proptest! {
        #[test]
        fn accepts_plain_names(branch_name in "[a-zA-Z0-9_-]+") {
            assert!(BranchName::try_parse(branch_name).is_ok());
        }

        #[test]
        fn accepts_hierarchical_names(prefix in "[a-zA-Z0-9_-]+", suffix in "[a-zA-Z0-9_-]+") {
            assert!(BranchName::try_parse(format!("{prefix}/{suffix}")).is_ok());
        }

        #[test]
        fn rejects_leading_dot(suffix in "[a-zA-Z0-9_-]+") {
            assert!(BranchName::try_parse(format!(".{suffix}")).is_err());
        }

        #[test]
        fn rejects_lock_suffix(prefix in "[a-zA-Z0-9_-]+") {
            assert!(BranchName::try_parse(format!("{prefix}.lock")).is_err());
        }

        #[test]
        fn rejects_consecutive_dots(prefix in "[a-zA-Z0-9_-]+", suffix in "[a-zA-Z0-9_-]+") {
            assert!(BranchName::try_parse(format!("{prefix}..{suffix}")).is_err());
        }

        #[test]
        fn rejects_special_chars(
            prefix in "[a-zA-Z0-9_-]+",
            suffix in "[a-zA-Z0-9_-]+",
            special_char in r"[\*:\?\[\\^~ ]"
        ) {
            assert!(BranchName::try_parse(format!("{prefix}{special_char}{suffix}")).is_err());
        }
    }

    #[test]
    fn rejects_empty_and_slash_edges() {
        assert!(BranchName::try_parse("").is_err());
        assert!(BranchName::try_parse("/main").is_err());
        assert!(BranchName::try_parse("main/").is_err());
        assert!(BranchName::try_parse("a@{b}").is_err());
    }

    #[test]
    fn maps_between_short_and_full_names() {
        let branch = BranchName::try_parse("feature/x").unwrap();
        assert_eq!(branch.to_head_ref().as_ref_path(), "refs/heads/feature/x");
        assert_eq!(
            branch.to_remote_ref("origin").as_ref_path(),
            "refs/remotes/origin/feature/x"
        );
        assert_eq!(
            BranchName::try_parse_sym_ref_name(&branch.to_head_ref()).unwrap(),
            branch
        );
        assert!(BranchName::try_parse_sym_ref_name(&SymRefName::new("HEAD".into())).is_err());
    }
}
