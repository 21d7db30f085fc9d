use serde_derive::Deserialize;

use std::fs;
use std::io::ErrorKind;

use crate::amount::AmountFormat;
use crate::error::OfaError;

#[derive(Deserialize)]
pub struct DossierSettings {
    pub path: String,
}

#[derive(Deserialize)]
#[serde(default)]
struct Amounts {
    decimal_sep: String,
    thousands_sep: String, // May be empty: no grouping
    digits: u32,
}

impl Default for Amounts {
    fn default() -> Amounts {
        Amounts {
            decimal_sep: String::from("."),
            thousands_sep: String::from(","),
            digits: 2,
        }
    }
}

fn single_char(value: &str, what: &str) -> Result<char, OfaError> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(OfaError::Config(format!(
            "{} must be a single character, got {:?}",
            what, value
        ))),
    }
}

impl Amounts {
    fn format(&self) -> Result<AmountFormat, OfaError> {
        let decimal_sep = single_char(&self.decimal_sep, "decimal_sep")?;
        let thousands_sep = if self.thousands_sep.is_empty() {
            None
        } else {
            Some(single_char(&self.thousands_sep, "thousands_sep")?)
        };
        AmountFormat::new(decimal_sep, thousands_sep, self.digits)
    }
}

#[derive(Deserialize)]
pub struct Config {
    pub dossier: DossierSettings,
    #[serde(default)]
    amounts: Amounts,
}

impl Default for Config {
    /// Settings for use with the sample data
    fn default() -> Config {
        Config {
            dossier: DossierSettings {
                path: String::from("dossier.sqlite3"),
            },
            amounts: Amounts::default(),
        }
    }
}

impl Config {
    pub fn amount_format(&self) -> Result<AmountFormat, OfaError> {
        self.amounts.format()
    }

    /// Return a Config from file, or default settings if not present
    ///
    /// See `example_config.toml` for a sample configuration:
    ///
    /// ```toml
    /// [dossier]
    /// path = '/path/to/dossier.sqlite3'
    ///
    /// [amounts]
    /// decimal_sep = ','
    /// thousands_sep = ' '
    /// digits = 2
    /// ```
    pub fn from_file(path: &str) -> Result<Config, OfaError> {
        let config_toml = match fs::read_to_string(path) {
            Ok(file) => file,
            // Silently fall back to the default
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Config::default()),
            Err(e) => return Err(e.into()),
        };

        let config: Config = toml::from_str(&config_toml)?;
        // Report bad separators now rather than at first use
        config.amount_format()?;
        Ok(config)
    }
}
