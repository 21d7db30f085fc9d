use chrono::NaiveDate;
use log::{info, warn};
use rust_decimal::Decimal;
use serde_derive::Serialize;
use std::fmt;

use crate::amount::{amount_to_str, AmountFormat};
use crate::entry::BalanceSource;
use crate::error::{EvalError, OfaError};
use crate::formula::{eval_amount, EvalContext};
use crate::tva_form::{FormDetail, TvaForm};

/// One row of a declaration, with the amounts last computed (or typed) for it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordDetail {
    pub level: u32,
    pub code: Option<String>,
    pub label: String,
    pub has_base: bool,
    pub base_rule: Option<String>,
    pub base: Decimal,
    pub has_amount: bool,
    pub amount_rule: Option<String>,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleField {
    Base,
    Amount,
}

impl fmt::Display for RuleField {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RuleField::Base => write!(f, "base"),
            RuleField::Amount => write!(f, "amount"),
        }
    }
}

impl From<&FormDetail> for RecordDetail {
    fn from(detail: &FormDetail) -> Self {
        RecordDetail {
            level: detail.level,
            code: detail.code.clone(),
            label: detail.label.clone(),
            has_base: detail.has_base,
            base_rule: detail.base_rule.clone(),
            base: Decimal::ZERO,
            has_amount: detail.has_amount,
            amount_rule: detail.amount_rule.clone(),
            amount: Decimal::ZERO,
        }
    }
}

impl RecordDetail {
    /// The rule to evaluate for this field, if the row carries one.
    pub fn rule(&self, field: RuleField) -> Option<&str> {
        let (enabled, rule) = match field {
            RuleField::Base => (self.has_base, &self.base_rule),
            RuleField::Amount => (self.has_amount, &self.amount_rule),
        };
        match rule.as_deref() {
            Some(rule) if enabled && !rule.trim().is_empty() => Some(rule),
            _ => None,
        }
    }

    pub fn set_value(&mut self, field: RuleField, value: Decimal) {
        match field {
            RuleField::Base => self.base = value,
            RuleField::Amount => self.amount = value,
        }
    }
}

/// A rule that could not be evaluated; its previous value was kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleFailure {
    pub row: usize,
    pub field: RuleField,
    pub rule: String,
    pub error: EvalError,
}

impl fmt::Display for RuleFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "row {} {} {:?}: {}",
            self.row + 1,
            self.field,
            self.rule,
            self.error
        )
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ComputeReport {
    pub computed: usize,
    pub failures: Vec<RuleFailure>,
}

impl ComputeReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A TVA declaration for a period, instantiated from a form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TvaRecord {
    pub mnemo: String,
    pub label: String,
    pub begin: NaiveDate,
    pub end: NaiveDate,
    pub is_validated: bool,
    pub notes: Option<String>,
    pub details: Vec<RecordDetail>,
}

impl TvaRecord {
    pub fn new_from_form(
        form: &TvaForm,
        begin: NaiveDate,
        end: NaiveDate,
    ) -> Result<TvaRecord, OfaError> {
        if begin > end {
            return Err(OfaError::Validation(format!(
                "Declaration period cannot begin ({}) after it ends ({})",
                begin, end
            )));
        }

        Ok(TvaRecord {
            mnemo: form.mnemo.clone(),
            label: form.label.clone(),
            begin,
            end,
            is_validated: false,
            notes: form.notes.clone(),
            details: form.details.iter().map(RecordDetail::from).collect(),
        })
    }

    /**
     * Evaluate the rules of every row, in order, overwriting the stored values.
     *
     * A row sees the values computed for the rows above it in this same pass.
     * A rule which fails to evaluate keeps its previous value and is reported.
     */
    pub fn compute(
        &mut self,
        balances: &dyn BalanceSource,
        format: &AmountFormat,
    ) -> Result<ComputeReport, OfaError> {
        if self.is_validated {
            return Err(OfaError::Validation(format!(
                "Declaration {} ending on {} is validated and cannot be computed again",
                self.mnemo, self.end
            )));
        }

        let mut report = ComputeReport::default();
        for row in 0..self.details.len() {
            for field in [RuleField::Base, RuleField::Amount] {
                let rule = match self.details[row].rule(field) {
                    Some(rule) => rule.to_string(),
                    None => continue,
                };

                let result = {
                    let ctx = EvalContext {
                        rows: &self.details,
                        begin: self.begin,
                        end: self.end,
                        balances,
                        format,
                    };
                    eval_amount(&rule, &ctx)
                };

                match result {
                    Ok(value) => {
                        self.details[row].set_value(field, value);
                        report.computed += 1;
                    }
                    Err(error) => {
                        let failure = RuleFailure {
                            row,
                            field,
                            rule,
                            error,
                        };
                        warn!("{} ending on {}: {}", self.mnemo, self.end, failure);
                        report.failures.push(failure);
                    }
                }
            }
        }

        info!(
            "Computed {} rule(s) of {} ending on {} ({} failed)",
            report.computed,
            self.mnemo,
            self.end,
            report.failures.len()
        );
        Ok(report)
    }

    pub fn validate(&mut self) -> Result<(), OfaError> {
        if self.is_validated {
            return Err(OfaError::Validation(format!(
                "Declaration {} ending on {} is already validated",
                self.mnemo, self.end
            )));
        }
        self.is_validated = true;
        Ok(())
    }

    pub fn describe(&self, format: &AmountFormat) -> String {
        let status = if self.is_validated {
            "validated"
        } else {
            "draft"
        };
        let mut lines = vec![format!(
            "{} - {} ({} to {}, {})",
            self.mnemo, self.label, self.begin, self.end, status
        )];

        for detail in &self.details {
            let indent = "  ".repeat(detail.level as usize);
            let code = detail.code.as_deref().unwrap_or("");
            let base = if detail.has_base {
                amount_to_str(&detail.base, format)
            } else {
                String::new()
            };
            let amount = if detail.has_amount {
                amount_to_str(&detail.amount, format)
            } else {
                String::new()
            };
            lines.push(format!(
                "{:>4} {:<40} {:>16} {:>16}",
                code,
                format!("{}{}", indent, detail.label),
                base,
                amount
            ));
        }
        lines.join("\n")
    }
}
