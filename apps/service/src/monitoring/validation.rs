use thiserror::Error;
use url::Url;

use super::scheduler::CheckDefinition;

/// Carries every violation found in a check list, not just the first
#[derive(Debug, Error)]
#[error("invalid health check configuration:\n{}", .issues.join("\n"))]
pub struct ValidationError {
    pub issues: Vec<String>,
}

/// Validate a full check list before any probing starts
pub fn validate_checks(checks: &[CheckDefinition]) -> Result<(), ValidationError> {
    let mut issues = Vec::new();

    if checks.is_empty() {
        issues.push("at least one health check must be configured".to_string());
    }

    for check in checks {
        if check.period.is_zero() {
            issues.push(format!("check '{}': period must be positive", check.url));
        }

        match Url::parse(&check.url) {
            Ok(url) => {
                if url.host_str().is_none_or(str::is_empty) {
                    issues.push(format!("check '{}': url has no host", check.url));
                }
            }
            Err(err) => {
                issues.push(format!("check '{}': can't parse url: {err}", check.url));
            }
        }
    }

    if issues.is_empty() { Ok(()) } else { Err(ValidationError { issues }) }
}
