//! Analyzer configuration

use crate::error::AnalysisError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Upper bound on queue steps taken by [`crate::GlobalEnv::run`].
    /// Reaching it means propagation did not converge.
    pub max_iterations: usize,
    /// Treat `proc` and intersection signature types as hard errors instead
    /// of contributing nothing.
    pub strict_signatures: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100_000,
            strict_signatures: false,
        }
    }
}

impl AnalyzerConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading analyzer config {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("parsing analyzer config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), AnalysisError> {
        if self.max_iterations == 0 {
            return Err(AnalysisError::Config("max_iterations must be positive".to_string()));
        }
        Ok(())
    }

    pub fn strict(mut self) -> Self {
        self.strict_signatures = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: AnalyzerConfig =
            serde_json::from_str(r#"{"strict_signatures": true}"#).unwrap();
        assert!(config.strict_signatures);
        assert_eq!(config.max_iterations, AnalyzerConfig::default().max_iterations);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_iterations": 64}}"#).unwrap();

        let config = AnalyzerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_iterations, 64);
        assert!(!config.strict_signatures);
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_iterations": 0}}"#).unwrap();

        let err = AnalyzerConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("max_iterations"));
    }

    #[test]
    fn test_unreadable_file_has_context() {
        let err = AnalyzerConfig::from_file(Path::new("/nonexistent/tyflow.json")).unwrap_err();
        assert!(err.to_string().contains("reading analyzer config"));
    }
}
