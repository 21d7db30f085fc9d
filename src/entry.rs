use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_derive::Deserialize;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::amount::{amount_from_str, AmountFormat};
use crate::dateutil::parse_ymd;
use crate::error::OfaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Rough,
    Validated,
    Deleted,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Rough => "rough",
            EntryStatus::Validated => "validated",
            EntryStatus::Deleted => "deleted",
        }
    }

    /// Deleted entries never take part in a balance.
    pub fn is_balanced(&self) -> bool {
        *self != EntryStatus::Deleted
    }
}

impl FromStr for EntryStatus {
    type Err = OfaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rough" => Ok(EntryStatus::Rough),
            "validated" => Ok(EntryStatus::Validated),
            "deleted" => Ok(EntryStatus::Deleted),
            other => Err(OfaError::Validation(format!(
                "Unknown entry status {:?}",
                other
            ))),
        }
    }
}

/// One line of an accounting entry: a debit or a credit on a single account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub date: NaiveDate,
    pub ledger: String,
    pub account: String,
    pub label: String,
    pub debit: Decimal,
    pub credit: Decimal,
    pub status: EntryStatus,
}

impl Entry {
    pub fn validate(&self) -> Result<(), OfaError> {
        if self.account.trim().is_empty() {
            return Err(OfaError::Validation(String::from(
                "Entry must have an account",
            )));
        }
        if self.debit.is_sign_negative() || self.credit.is_sign_negative() {
            return Err(OfaError::Validation(format!(
                "Negative debit or credit on account {}",
                self.account
            )));
        }
        if self.debit.is_zero() == self.credit.is_zero() {
            return Err(OfaError::Validation(format!(
                "Entry on account {} must have either a debit or a credit",
                self.account
            )));
        }
        Ok(())
    }
}

/// Row of an entries CSV export, amounts written with the dossier separators.
#[derive(Debug, Deserialize)]
pub struct CsvEntry {
    date: String,
    ledger: String,
    account: String,
    #[serde(default)]
    label: String,
    #[serde(default)]
    debit: String,
    #[serde(default)]
    credit: String,
    status: String,
}

impl CsvEntry {
    pub fn into_entry(self, format: &AmountFormat) -> Result<Entry, OfaError> {
        fn optional_amount(text: &str, format: &AmountFormat) -> Result<Decimal, OfaError> {
            if text.trim().is_empty() {
                return Ok(Decimal::ZERO);
            }
            Ok(amount_from_str(text, format)?)
        }

        let entry = Entry {
            date: parse_ymd(&self.date)?,
            ledger: self.ledger,
            account: self.account.trim().to_string(),
            label: self.label,
            debit: optional_amount(&self.debit, format)?,
            credit: optional_amount(&self.credit, format)?,
            status: self.status.parse()?,
        };
        entry.validate()?;
        Ok(entry)
    }
}

/// Debit and credit totals of one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountBalance {
    pub account: String,
    pub debit: Decimal,
    pub credit: Decimal,
}

impl AccountBalance {
    fn new(account: &str) -> AccountBalance {
        AccountBalance {
            account: account.to_string(),
            debit: Decimal::ZERO,
            credit: Decimal::ZERO,
        }
    }

    /// Debits increase the net amount, credits decrease it.
    pub fn net(&self) -> Decimal {
        self.debit - self.credit
    }
}

/// Accumulate entry amounts per account, ordered by account id.
pub fn balances_by_account<I>(rows: I) -> Vec<AccountBalance>
where
    I: IntoIterator<Item = (String, Decimal, Decimal)>,
{
    let mut by_account: BTreeMap<String, AccountBalance> = BTreeMap::new();
    for (account, debit, credit) in rows {
        let balance = by_account
            .entry(account.clone())
            .or_insert_with(|| AccountBalance::new(&account));
        balance.debit += debit;
        balance.credit += credit;
    }
    by_account.into_values().collect()
}

/**
 * Whether `account` belongs to the `from`..`to` account range.
 *
 * Account ids compare as text, and sub-accounts of the upper bound are
 * included: `445710` is within `44566-44571`.
 */
pub fn account_in_range(account: &str, from: &str, to: &str) -> bool {
    account >= from && (account <= to || account.starts_with(to))
}

/// Where the `%ACC()` function reads its balances from.
pub trait BalanceSource {
    /// Balances of rough and validated entries on the account range, dated
    /// within `begin`..=`end`.
    fn balance_rough_validated(
        &self,
        from_account: &str,
        to_account: &str,
        begin: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AccountBalance>, OfaError>;
}

impl BalanceSource for Vec<Entry> {
    fn balance_rough_validated(
        &self,
        from_account: &str,
        to_account: &str,
        begin: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AccountBalance>, OfaError> {
        Ok(balances_by_account(
            self.iter()
                .filter(|e| e.status.is_balanced())
                .filter(|e| e.date >= begin && e.date <= end)
                .filter(|e| account_in_range(&e.account, from_account, to_account))
                .map(|e| (e.account.clone(), e.debit, e.credit)),
        ))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn entry(date: &str, account: &str, debit: i64, credit: i64) -> Entry {
        Entry {
            date: parse_ymd(date).unwrap(),
            ledger: String::from("BQ"),
            account: account.to_string(),
            label: String::from("test"),
            debit: Decimal::from(debit),
            credit: Decimal::from(credit),
            status: EntryStatus::Validated,
        }
    }

    fn ymd(date: &str) -> NaiveDate {
        parse_ymd(date).unwrap()
    }

    #[test]
    fn test_account_ranges() {
        assert!(account_in_range("512", "512", "512"));
        assert!(account_in_range("5121", "512", "512"));
        assert!(account_in_range("513", "512", "513"));
        assert!(account_in_range("5139", "512", "513"));
        assert!(!account_in_range("511", "512", "513"));
        assert!(!account_in_range("514", "512", "513"));
        assert!(!account_in_range("51", "512", "513"));
    }

    #[test]
    fn test_balance_sums_per_account() {
        let entries = vec![
            entry("2024-01-05", "512", 50, 0),
            entry("2024-01-06", "513", 0, 20),
            entry("2024-01-07", "512", 0, 5),
        ];
        let balances = entries
            .balance_rough_validated("512", "513", ymd("2024-01-01"), ymd("2024-01-31"))
            .unwrap();
        assert_eq!(
            balances,
            vec![
                AccountBalance {
                    account: String::from("512"),
                    debit: Decimal::from(50),
                    credit: Decimal::from(5),
                },
                AccountBalance {
                    account: String::from("513"),
                    debit: Decimal::from(0),
                    credit: Decimal::from(20),
                },
            ]
        );
        assert_eq!(balances[0].net(), Decimal::from(45));
    }

    #[test]
    fn test_balance_skips_deleted_and_out_of_period() {
        let mut deleted = entry("2024-01-05", "512", 100, 0);
        deleted.status = EntryStatus::Deleted;
        let mut rough = entry("2024-01-31", "512", 7, 0);
        rough.status = EntryStatus::Rough;
        let entries = vec![
            deleted,
            rough,
            entry("2023-12-31", "512", 1000, 0),
            entry("2024-02-01", "512", 1000, 0),
        ];
        let balances = entries
            .balance_rough_validated("512", "512", ymd("2024-01-01"), ymd("2024-01-31"))
            .unwrap();
        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].net(), Decimal::from(7));
    }

    #[test]
    fn test_entry_needs_one_side() {
        assert!(entry("2024-01-05", "512", 10, 0).validate().is_ok());
        assert!(entry("2024-01-05", "512", 10, 10).validate().is_err());
        assert!(entry("2024-01-05", "512", 0, 0).validate().is_err());
        assert!(entry("2024-01-05", " ", 10, 0).validate().is_err());
    }

    #[test]
    fn test_csv_entry_uses_dossier_separators() {
        let format = AmountFormat::new(',', Some(' '), 2).unwrap();
        let csv_entry = CsvEntry {
            date: String::from("2024-01-05"),
            ledger: String::from("VE"),
            account: String::from(" 44571 "),
            label: String::from("Sale"),
            debit: String::new(),
            credit: String::from("1 200,50"),
            status: String::from("Rough"),
        };
        let entry = csv_entry.into_entry(&format).unwrap();
        assert_eq!(entry.account, "44571");
        assert_eq!(entry.debit, Decimal::ZERO);
        assert_eq!(entry.credit, Decimal::new(120_050, 2));
        assert_eq!(entry.status, EntryStatus::Rough);
    }

    #[test]
    fn test_unknown_status() {
        assert!("posted".parse::<EntryStatus>().is_err());
    }

    #[test]
    fn test_status_text() {
        for status in [EntryStatus::Rough, EntryStatus::Validated, EntryStatus::Deleted] {
            assert_eq!(status.as_str().parse::<EntryStatus>().unwrap(), status);
        }
        assert_eq!(" Validated ".parse::<EntryStatus>().unwrap(), EntryStatus::Validated);
    }
}
