//! Institution domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A bank or custodian that issues statements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Institution {
    pub id: Uuid,
    /// Short uppercase key, e.g. "UBS"
    pub code: String,
    pub name: String,
    /// Parser tag used when the caller does not pick one
    pub default_format: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Institution {
    pub fn new(code: &str, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: Self::normalize_code(code),
            name: name.into(),
            default_format: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_default_format(mut self, format: impl Into<String>) -> Self {
        self.default_format = Some(format.into());
        self
    }

    /// Normalize an institution code to its stored form
    pub fn normalize_code(code: &str) -> String {
        code.trim().to_uppercase()
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.code.is_empty() {
            return Err("institution code cannot be empty");
        }
        if !self
            .code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err("institution code may only contain letters, digits, '-' and '_'");
        }
        if self.name.trim().is_empty() {
            return Err("institution name cannot be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_is_normalized() {
        let institution = Institution::new(" ubs ", "UBS Switzerland AG");
        assert_eq!(institution.code, "UBS");
        assert!(institution.validate().is_ok());
    }

    #[test]
    fn test_code_validation() {
        let institution = Institution::new("UBS AG", "UBS");
        assert!(institution.validate().is_err());

        let institution = Institution::new("", "Nameless");
        assert!(institution.validate().is_err());
    }
}
