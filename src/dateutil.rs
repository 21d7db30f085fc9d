use chrono::NaiveDate;

use crate::error::OfaError;

static YMD_FORMAT: &str = "%Y-%m-%d";

/// Parse a `YYYY-MM-DD` date, as typed on the command line or stored in SQLite.
pub fn parse_ymd(ymd: &str) -> Result<NaiveDate, OfaError> {
    NaiveDate::parse_from_str(ymd.trim(), YMD_FORMAT).map_err(|_| OfaError::Date(ymd.to_string()))
}

// Dates are stored as text so that lexical order is chronological order
pub fn date_for_sqlite(date: NaiveDate) -> String {
    date.format(YMD_FORMAT).to_string()
}
