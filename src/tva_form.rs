use log::warn;
use serde_derive::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::OfaError;

/// One row of a declaration template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FormDetail {
    #[serde(default)]
    pub level: u32,
    pub code: Option<String>,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub has_base: bool,
    pub base_rule: Option<String>,
    #[serde(default)]
    pub has_amount: bool,
    pub amount_rule: Option<String>,
}

/// A TVA declaration template, from which declarations are instantiated.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TvaForm {
    pub mnemo: String,
    pub label: String,
    pub notes: Option<String>,
    #[serde(default, rename = "row")]
    pub details: Vec<FormDetail>,
}

impl TvaForm {
    /// Read a form definition from a TOML file
    ///
    /// See `data/ca3.toml` for a sample definition:
    ///
    /// ```toml
    /// mnemo = 'CA3'
    /// label = 'Monthly VAT return'
    ///
    /// [[row]]
    /// code = '08'
    /// label = 'Sales at 20%'
    /// has_base = true
    /// base_rule = '%EVAL(-%ACC(7061))'
    /// has_amount = true
    /// amount_rule = '%EVAL(-%ACC(445711))'
    /// ```
    pub fn from_toml_file(path: &Path) -> Result<TvaForm, OfaError> {
        let form_toml = fs::read_to_string(path)?;
        TvaForm::from_toml(&form_toml)
    }

    pub fn from_toml(form_toml: &str) -> Result<TvaForm, OfaError> {
        let form: TvaForm = toml::from_str(form_toml)?;
        form.validate()?;
        Ok(form)
    }

    pub fn validate(&self) -> Result<(), OfaError> {
        if self.mnemo.trim().is_empty() {
            return Err(OfaError::Validation(String::from(
                "A TVA form must have a mnemonic",
            )));
        }
        if self.label.trim().is_empty() {
            return Err(OfaError::Validation(format!(
                "TVA form {} must have a label",
                self.mnemo
            )));
        }

        // Not an error: %COD() just picks the first row carrying the code
        for code in self.duplicate_codes() {
            warn!(
                "TVA form {}: code {:?} is used by several rows",
                self.mnemo, code
            );
        }
        Ok(())
    }

    /// Codes carried by more than one row, in order of first duplication.
    pub fn duplicate_codes(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for code in self.details.iter().filter_map(|d| d.code.as_deref()) {
            if !seen.insert(code) && !duplicates.contains(&code) {
                duplicates.push(code);
            }
        }
        duplicates
    }
}
