//! Account domain model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of account held at an institution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    /// Securities deposit
    Custody,
    /// Cash / current account
    Cash,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Custody => "custody",
            Self::Cash => "cash",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "custody" | "depot" | "securities" => Ok(Self::Custody),
            "cash" | "current" => Ok(Self::Cash),
            other => Err(format!("unknown account type '{}'", other)),
        }
    }
}

/// An account at an institution, identified by its account number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: Uuid,
    pub institution_id: Uuid,
    pub account_number: String,
    pub name: String,
    /// ISO 4217 currency code, normalized to uppercase
    pub currency: String,
    pub account_type: AccountType,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(
        institution_id: Uuid,
        account_number: &str,
        name: impl Into<String>,
        currency: &str,
        account_type: AccountType,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            institution_id,
            account_number: Self::normalize_number(account_number),
            name: name.into(),
            currency: Self::normalize_currency(currency),
            account_type,
            created_at: Utc::now(),
        }
    }

    /// Normalize currency code to uppercase
    pub fn normalize_currency(currency: &str) -> String {
        currency.trim().to_uppercase()
    }

    /// Account numbers are matched exactly after trimming and collapsing inner whitespace
    pub fn normalize_number(number: &str) -> String {
        number.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Validate account data
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.account_number.is_empty() {
            return Err("account number cannot be empty");
        }
        if self.name.trim().is_empty() {
            return Err("account name cannot be empty");
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err("currency must be a 3-letter ISO code");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_normalization() {
        assert_eq!(Account::normalize_currency("chf"), "CHF");
        assert_eq!(Account::normalize_currency(" eur "), "EUR");
    }

    #[test]
    fn test_number_normalization() {
        assert_eq!(Account::normalize_number("  0233 00123456  "), "0233 00123456");
        assert_eq!(Account::normalize_number("U1234567"), "U1234567");
    }

    #[test]
    fn test_account_validation() {
        let mut account = Account::new(
            Uuid::new_v4(),
            "0233-123456.01",
            "Depot",
            "chf",
            AccountType::Custody,
        );
        assert!(account.validate().is_ok());

        account.currency = "SWISS".to_string();
        assert!(account.validate().is_err());

        account.currency = "CHF".to_string();
        account.name = " ".to_string();
        assert!(account.validate().is_err());
    }

    #[test]
    fn test_account_type_parsing() {
        assert_eq!("Custody".parse::<AccountType>(), Ok(AccountType::Custody));
        assert_eq!("cash".parse::<AccountType>(), Ok(AccountType::Cash));
        assert!("loan".parse::<AccountType>().is_err());
    }
}
