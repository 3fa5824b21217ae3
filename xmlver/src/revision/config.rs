//! Configuration of the version history.

use std::collections::HashMap;

use tracing::debug;

use crate::constants::PARAM_OVERWRITE;
use crate::diff::DiffConfig;

/// Settings of a [`VersionHistory`](super::VersionHistory).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VersioningConfig {
    /// Reject writes based on a revision that another session has since
    /// replaced.
    pub check_for_conflicts: bool,
    pub diff: DiffConfig,
}

impl VersioningConfig {
    /// Reads string-keyed parameters. `overwrite` set to `false` or `no`
    /// enables conflict checks; unknown parameters are ignored.
    pub fn from_parameters(parameters: &HashMap<String, String>) -> Self {
        let mut config = VersioningConfig::default();
        if let Some(overwrite) = parameters.get(PARAM_OVERWRITE) {
            config.check_for_conflicts = overwrite == "false" || overwrite == "no";
        }
        debug!(check_for_conflicts = config.check_for_conflicts, "versioning configured");
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_overwrite_parameter() {
        let checks = |pairs: &[(&str, &str)]| {
            VersioningConfig::from_parameters(&params(pairs)).check_for_conflicts
        };
        assert!(!checks(&[]));
        assert!(checks(&[("overwrite", "no")]));
        assert!(checks(&[("overwrite", "false")]));
        assert!(!checks(&[("overwrite", "yes")]));
        assert!(!checks(&[("overwrite", "FALSE")]));
    }
}
