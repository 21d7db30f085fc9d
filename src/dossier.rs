use chrono::NaiveDate;
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use crate::amount::AmountFormat;
use crate::dateutil::{date_for_sqlite, parse_ymd};
use crate::entry::{balances_by_account, AccountBalance, BalanceSource, CsvEntry, Entry};
use crate::error::{AmountError, OfaError};
use crate::tva_form::{FormDetail, TvaForm};
use crate::tva_record::{RecordDetail, TvaRecord};

static SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS entries (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        effect_date TEXT NOT NULL,              -- YYYY-MM-DD
        ledger      TEXT NOT NULL,
        account     TEXT NOT NULL,
        label       TEXT NOT NULL DEFAULT '',
        debit       TEXT NOT NULL DEFAULT '0',  -- decimal, as text
        credit      TEXT NOT NULL DEFAULT '0',
        status      TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS entries_account ON entries (account, effect_date);

    CREATE TABLE IF NOT EXISTS tva_forms (
        mnemo TEXT PRIMARY KEY,
        label TEXT NOT NULL,
        notes TEXT
    );
    CREATE TABLE IF NOT EXISTS tva_forms_det (
        mnemo       TEXT NOT NULL,
        row_num     INTEGER NOT NULL,
        level       INTEGER NOT NULL,
        code        TEXT,
        label       TEXT NOT NULL,
        has_base    INTEGER NOT NULL,
        base_rule   TEXT,
        has_amount  INTEGER NOT NULL,
        amount_rule TEXT,
        PRIMARY KEY (mnemo, row_num)
    );

    CREATE TABLE IF NOT EXISTS tva_records (
        mnemo        TEXT NOT NULL,
        end_date     TEXT NOT NULL,
        begin_date   TEXT NOT NULL,
        label        TEXT NOT NULL,
        is_validated INTEGER NOT NULL,
        notes        TEXT,
        PRIMARY KEY (mnemo, end_date)
    );
    CREATE TABLE IF NOT EXISTS tva_records_det (
        mnemo       TEXT NOT NULL,
        end_date    TEXT NOT NULL,
        row_num     INTEGER NOT NULL,
        level       INTEGER NOT NULL,
        code        TEXT,
        label       TEXT NOT NULL,
        has_base    INTEGER NOT NULL,
        base_rule   TEXT,
        base        TEXT NOT NULL,
        has_amount  INTEGER NOT NULL,
        amount_rule TEXT,
        amount      TEXT NOT NULL,
        PRIMARY KEY (mnemo, end_date, row_num)
    );
";

// Amounts are stored with `Decimal`'s own formatting, independent of the locale
fn stored_amount(text: &str) -> Result<Decimal, OfaError> {
    Decimal::from_str(text).map_err(|_| AmountError::Invalid(text.to_string()).into())
}

/// The accounting data of one firm, kept in a SQLite file.
pub struct Dossier {
    conn: Connection,
}

impl Dossier {
    pub fn open(filename: &str) -> Result<Dossier, OfaError> {
        info!("Opening dossier {}", filename);
        Dossier::from_connection(Connection::open(filename)?)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Dossier, OfaError> {
        Dossier::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Dossier, OfaError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Dossier { conn })
    }

    pub fn insert_entry(&mut self, entry: &Entry) -> Result<(), OfaError> {
        entry.validate()?;
        insert_entry(&self.conn, entry)
    }

    /// Import every entry of a CSV export, or none of them if one is invalid.
    pub fn import_csv<R: Read>(&mut self, reader: R, format: &AmountFormat) -> Result<usize, OfaError> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let mut entries = Vec::new();
        for record in csv_reader.deserialize() {
            let csv_entry: CsvEntry = record?;
            entries.push(csv_entry.into_entry(format)?);
        }

        let tx = self.conn.transaction()?;
        for entry in &entries {
            insert_entry(&tx, entry)?;
        }
        tx.commit()?;

        info!("Imported {} entries", entries.len());
        Ok(entries.len())
    }

    pub fn import_csv_file(&mut self, path: &Path, format: &AmountFormat) -> Result<usize, OfaError> {
        let file = File::open(path)?;
        self.import_csv(file, format)
    }

    pub fn count_entries(&self) -> Result<usize, OfaError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn form_exists(&self, mnemo: &str) -> Result<bool, OfaError> {
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT mnemo FROM tva_forms WHERE mnemo = ?1",
                params![mnemo],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn insert_form(&mut self, form: &TvaForm) -> Result<(), OfaError> {
        form.validate()?;
        if self.form_exists(&form.mnemo)? {
            return Err(OfaError::Validation(format!(
                "TVA form {} already exists",
                form.mnemo
            )));
        }

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO tva_forms (mnemo, label, notes) VALUES (?1, ?2, ?3)",
            params![form.mnemo, form.label, form.notes],
        )?;
        insert_form_details(&tx, &form.mnemo, &form.details)?;
        tx.commit()?;
        Ok(())
    }

    /// Replace the label, notes and rows of an existing form.
    pub fn update_form(&mut self, form: &TvaForm) -> Result<(), OfaError> {
        form.validate()?;

        let tx = self.conn.transaction()?;
        let updated = tx.execute(
            "UPDATE tva_forms SET label = ?2, notes = ?3 WHERE mnemo = ?1",
            params![form.mnemo, form.label, form.notes],
        )?;
        if updated == 0 {
            return Err(OfaError::FormNotFound(form.mnemo.clone()));
        }
        tx.execute(
            "DELETE FROM tva_forms_det WHERE mnemo = ?1",
            params![form.mnemo],
        )?;
        insert_form_details(&tx, &form.mnemo, &form.details)?;
        tx.commit()?;
        Ok(())
    }

    /// Delete a form, unless some declaration was instantiated from it.
    pub fn delete_form(&mut self, mnemo: &str) -> Result<(), OfaError> {
        let records: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM tva_records WHERE mnemo = ?1",
            params![mnemo],
            |row| row.get(0),
        )?;
        if records > 0 {
            return Err(OfaError::Validation(format!(
                "TVA form {} is used by {} declaration(s)",
                mnemo, records
            )));
        }

        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM tva_forms_det WHERE mnemo = ?1", params![mnemo])?;
        let deleted = tx.execute("DELETE FROM tva_forms WHERE mnemo = ?1", params![mnemo])?;
        if deleted == 0 {
            return Err(OfaError::FormNotFound(mnemo.to_string()));
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_form(&self, mnemo: &str) -> Result<TvaForm, OfaError> {
        let head: Option<(String, Option<String>)> = self
            .conn
            .query_row(
                "SELECT label, notes FROM tva_forms WHERE mnemo = ?1",
                params![mnemo],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (label, notes) = head.ok_or_else(|| OfaError::FormNotFound(mnemo.to_string()))?;

        let mut stmt = self.conn.prepare(
            "SELECT level, code, label, has_base, base_rule, has_amount, amount_rule
               FROM tva_forms_det
              WHERE mnemo = ?1
              ORDER BY row_num",
        )?;
        let details = stmt
            .query_map(params![mnemo], |row| {
                Ok(FormDetail {
                    level: row.get(0)?,
                    code: row.get(1)?,
                    label: row.get(2)?,
                    has_base: row.get(3)?,
                    base_rule: row.get(4)?,
                    has_amount: row.get(5)?,
                    amount_rule: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<FormDetail>>>()?;

        Ok(TvaForm {
            mnemo: mnemo.to_string(),
            label,
            notes,
            details,
        })
    }

    pub fn list_forms(&self) -> Result<Vec<TvaForm>, OfaError> {
        let mut stmt = self
            .conn
            .prepare("SELECT mnemo FROM tva_forms ORDER BY mnemo")?;
        let mnemos = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        mnemos.iter().map(|mnemo| self.get_form(mnemo)).collect()
    }

    pub fn insert_record(&mut self, record: &TvaRecord) -> Result<(), OfaError> {
        if !self.form_exists(&record.mnemo)? {
            return Err(OfaError::FormNotFound(record.mnemo.clone()));
        }
        if self.find_record(&record.mnemo, record.end)?.is_some() {
            return Err(OfaError::Validation(format!(
                "A {} declaration already ends on {}",
                record.mnemo, record.end
            )));
        }

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO tva_records (mnemo, end_date, begin_date, label, is_validated, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.mnemo,
                date_for_sqlite(record.end),
                date_for_sqlite(record.begin),
                record.label,
                record.is_validated,
                record.notes
            ],
        )?;
        insert_record_details(&tx, record)?;
        tx.commit()?;
        Ok(())
    }

    pub fn update_record(&mut self, record: &TvaRecord) -> Result<(), OfaError> {
        let end = date_for_sqlite(record.end);

        let tx = self.conn.transaction()?;
        let updated = tx.execute(
            "UPDATE tva_records
                SET begin_date = ?3, label = ?4, is_validated = ?5, notes = ?6
              WHERE mnemo = ?1 AND end_date = ?2",
            params![
                record.mnemo,
                end,
                date_for_sqlite(record.begin),
                record.label,
                record.is_validated,
                record.notes
            ],
        )?;
        if updated == 0 {
            return Err(OfaError::RecordNotFound(record.mnemo.clone(), record.end));
        }
        tx.execute(
            "DELETE FROM tva_records_det WHERE mnemo = ?1 AND end_date = ?2",
            params![record.mnemo, end],
        )?;
        insert_record_details(&tx, record)?;
        tx.commit()?;
        Ok(())
    }

    /// Delete a declaration which has not been validated yet.
    pub fn delete_record(&mut self, mnemo: &str, end: NaiveDate) -> Result<(), OfaError> {
        let record = self.get_record(mnemo, end)?;
        if record.is_validated {
            return Err(OfaError::Validation(format!(
                "Declaration {} ending on {} is validated and cannot be deleted",
                mnemo, end
            )));
        }

        let end = date_for_sqlite(end);
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM tva_records_det WHERE mnemo = ?1 AND end_date = ?2",
            params![mnemo, end],
        )?;
        tx.execute(
            "DELETE FROM tva_records WHERE mnemo = ?1 AND end_date = ?2",
            params![mnemo, end],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_record(&self, mnemo: &str, end: NaiveDate) -> Result<TvaRecord, OfaError> {
        self.find_record(mnemo, end)?
            .ok_or_else(|| OfaError::RecordNotFound(mnemo.to_string(), end))
    }

    pub fn find_record(&self, mnemo: &str, end: NaiveDate) -> Result<Option<TvaRecord>, OfaError> {
        let end_text = date_for_sqlite(end);
        let head: Option<(String, String, bool, Option<String>)> = self
            .conn
            .query_row(
                "SELECT begin_date, label, is_validated, notes
                   FROM tva_records
                  WHERE mnemo = ?1 AND end_date = ?2",
                params![mnemo, end_text],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;
        let (begin, label, is_validated, notes) = match head {
            Some(head) => head,
            None => return Ok(None),
        };

        let mut stmt = self.conn.prepare(
            "SELECT level, code, label, has_base, base_rule, base,
                    has_amount, amount_rule, amount
               FROM tva_records_det
              WHERE mnemo = ?1 AND end_date = ?2
              ORDER BY row_num",
        )?;
        // Amounts are read as text, then parsed outside of the row mapping
        let rows = stmt
            .query_map(params![mnemo, end_text], |row| {
                let detail = RecordDetail {
                    level: row.get(0)?,
                    code: row.get(1)?,
                    label: row.get(2)?,
                    has_base: row.get(3)?,
                    base_rule: row.get(4)?,
                    has_amount: row.get(6)?,
                    amount_rule: row.get(7)?,
                    ..RecordDetail::default()
                };
                let base: String = row.get(5)?;
                let amount: String = row.get(8)?;
                Ok((detail, base, amount))
            })?
            .collect::<rusqlite::Result<Vec<(RecordDetail, String, String)>>>()?;

        let mut details = Vec::with_capacity(rows.len());
        for (mut detail, base, amount) in rows {
            detail.base = stored_amount(&base)?;
            detail.amount = stored_amount(&amount)?;
            details.push(detail);
        }

        Ok(Some(TvaRecord {
            mnemo: mnemo.to_string(),
            label,
            begin: parse_ymd(&begin)?,
            end,
            is_validated,
            notes,
            details,
        }))
    }

    /// Declarations instantiated from the form, oldest period first.
    pub fn list_records(&self, mnemo: &str) -> Result<Vec<TvaRecord>, OfaError> {
        let mut stmt = self.conn.prepare(
            "SELECT end_date FROM tva_records WHERE mnemo = ?1 ORDER BY end_date",
        )?;
        let ends = stmt
            .query_map(params![mnemo], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        ends.iter()
            .map(|end| self.get_record(mnemo, parse_ymd(end)?))
            .collect()
    }
}

impl BalanceSource for Dossier {
    fn balance_rough_validated(
        &self,
        from_account: &str,
        to_account: &str,
        begin: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AccountBalance>, OfaError> {
        // Same range as `account_in_range`: sub-accounts of the upper bound are included
        let mut stmt = self.conn.prepare_cached(
            "SELECT account, debit, credit
               FROM entries
              WHERE status IN ('rough', 'validated')
                AND account >= ?1
                AND (account <= ?2 OR substr(account, 1, length(?2)) = ?2)
                AND effect_date >= ?3
                AND effect_date <= ?4",
        )?;
        let rows = stmt
            .query_map(
                params![
                    from_account,
                    to_account,
                    date_for_sqlite(begin),
                    date_for_sqlite(end)
                ],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?
            .collect::<rusqlite::Result<Vec<(String, String, String)>>>()?;

        debug!(
            "{} entries on {}-{} from {} to {}",
            rows.len(),
            from_account,
            to_account,
            begin,
            end
        );

        let mut amounts = Vec::with_capacity(rows.len());
        for (account, debit, credit) in rows {
            amounts.push((account, stored_amount(&debit)?, stored_amount(&credit)?));
        }
        Ok(balances_by_account(amounts))
    }
}

fn insert_entry(conn: &Connection, entry: &Entry) -> Result<(), OfaError> {
    conn.execute(
        "INSERT INTO entries (effect_date, ledger, account, label, debit, credit, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            date_for_sqlite(entry.date),
            entry.ledger,
            entry.account,
            entry.label,
            entry.debit.to_string(),
            entry.credit.to_string(),
            entry.status.as_str()
        ],
    )?;
    Ok(())
}

fn insert_form_details(conn: &Connection, mnemo: &str, details: &[FormDetail]) -> Result<(), OfaError> {
    let mut stmt = conn.prepare(
        "INSERT INTO tva_forms_det
                (mnemo, row_num, level, code, label, has_base, base_rule, has_amount, amount_rule)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;
    for (row_num, detail) in details.iter().enumerate() {
        stmt.execute(params![
            mnemo,
            row_num as i64,
            detail.level,
            detail.code,
            detail.label,
            detail.has_base,
            detail.base_rule,
            detail.has_amount,
            detail.amount_rule
        ])?;
    }
    Ok(())
}

fn insert_record_details(conn: &Connection, record: &TvaRecord) -> Result<(), OfaError> {
    let end = date_for_sqlite(record.end);
    let mut stmt = conn.prepare(
        "INSERT INTO tva_records_det
                (mnemo, end_date, row_num, level, code, label, has_base, base_rule, base,
                 has_amount, amount_rule, amount)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
    )?;
    for (row_num, detail) in record.details.iter().enumerate() {
        stmt.execute(params![
            record.mnemo,
            end,
            row_num as i64,
            detail.level,
            detail.code,
            detail.label,
            detail.has_base,
            detail.base_rule,
            detail.base.to_string(),
            detail.has_amount,
            detail.amount_rule,
            detail.amount.to_string()
        ])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::tests::entry;
    use crate::entry::EntryStatus;

    static ENTRIES_CSV: &str = "\
date,ledger,account,label,debit,credit,status
2024-01-10,VE,411,Invoice 1,1 200,00,,validated
2024-01-10,VE,7061,Invoice 1,,1 000,00,validated
2024-01-10,VE,445711,Invoice 1,,200,00,validated
2024-01-15,AC,44566,Supplies,60,00,,rough
2024-01-16,AC,44566,Cancelled,500,00,,deleted
";

    fn ymd(date: &str) -> NaiveDate {
        parse_ymd(date).unwrap()
    }

    fn french() -> AmountFormat {
        AmountFormat::new(',', Some(' '), 2).unwrap()
    }

    fn form() -> TvaForm {
        TvaForm::from_toml(
            r#"
            mnemo = 'CA3'
            label = 'Monthly VAT return'
            [[row]]
            code = '08'
            label = 'Sales at 20%'
            has_base = true
            base_rule = '%EVAL(-%ACC(7061))'
            has_amount = true
            amount_rule = '%EVAL(-%ACC(445711))'
            [[row]]
            code = '20'
            label = 'Deductible VAT'
            has_amount = true
            amount_rule = '%ACC(44566)'
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_import_csv() {
        let mut dossier = Dossier::open_in_memory().unwrap();
        let imported = dossier.import_csv(ENTRIES_CSV.as_bytes(), &french());
        // French amounts need quoting in a comma-separated file
        assert!(imported.is_err());
        assert_eq!(dossier.count_entries().unwrap(), 0);

        let quoted = "\
date,ledger,account,label,debit,credit,status
2024-01-10,VE,411,Invoice 1,\"1 200,00\",,validated
2024-01-10,VE,7061,Invoice 1,,\"1 000,00\",validated
2024-01-10,VE,445711,Invoice 1,,\"200,00\",validated
2024-01-15,AC,44566,Supplies,\"60,00\",,rough
2024-01-16,AC,44566,Cancelled,\"500,00\",,deleted
";
        assert_eq!(dossier.import_csv(quoted.as_bytes(), &french()).unwrap(), 5);
        assert_eq!(dossier.count_entries().unwrap(), 5);
    }

    #[test]
    fn test_import_is_all_or_nothing() {
        let mut dossier = Dossier::open_in_memory().unwrap();
        let csv = "\
date,ledger,account,label,debit,credit,status
2024-01-10,VE,411,ok,10,,validated
2024-01-10,VE,7061,both sides,10,10,validated
";
        assert!(matches!(
            dossier.import_csv(csv.as_bytes(), &AmountFormat::default()),
            Err(OfaError::Validation(_))
        ));
        assert_eq!(dossier.count_entries().unwrap(), 0);
    }

    #[test]
    fn test_balance_query() {
        let mut dossier = Dossier::open_in_memory().unwrap();
        dossier.insert_entry(&entry("2024-01-10", "512", 50, 0)).unwrap();
        dossier.insert_entry(&entry("2024-01-11", "5121", 0, 20)).unwrap();
        dossier.insert_entry(&entry("2024-01-12", "513", 7, 0)).unwrap();
        dossier.insert_entry(&entry("2024-02-12", "512", 1000, 0)).unwrap();
        let mut deleted = entry("2024-01-13", "512", 1000, 0);
        deleted.status = EntryStatus::Deleted;
        dossier.insert_entry(&deleted).unwrap();

        let balances = dossier
            .balance_rough_validated("512", "512", ymd("2024-01-01"), ymd("2024-01-31"))
            .unwrap();
        let accounts: Vec<&str> = balances.iter().map(|b| b.account.as_str()).collect();
        assert_eq!(accounts, vec!["512", "5121"]);
        let net: Decimal = balances.iter().map(|b| b.net()).sum();
        assert_eq!(net, Decimal::from(30));

        let balances = dossier
            .balance_rough_validated("512", "513", ymd("2024-01-01"), ymd("2024-01-31"))
            .unwrap();
        assert_eq!(balances.len(), 3);
    }

    #[test]
    fn test_sql_and_memory_balances_agree() {
        let mut dossier = Dossier::open_in_memory().unwrap();
        let entries = vec![
            entry("2024-01-10", "44566", 60, 0),
            entry("2024-01-11", "445662", 15, 0),
            entry("2024-01-12", "44567", 0, 5),
            entry("2024-01-31", "4456", 3, 0),
        ];
        for e in &entries {
            dossier.insert_entry(e).unwrap();
        }
        let (begin, end) = (ymd("2024-01-01"), ymd("2024-01-31"));
        for (from, to) in [("44566", "44566"), ("4456", "44567"), ("44567", "4457")] {
            assert_eq!(
                dossier.balance_rough_validated(from, to, begin, end).unwrap(),
                entries.balance_rough_validated(from, to, begin, end).unwrap(),
                "range {}-{}",
                from,
                to
            );
        }
    }

    #[test]
    fn test_form_lifecycle() {
        let mut dossier = Dossier::open_in_memory().unwrap();
        let mut form = form();
        dossier.insert_form(&form).unwrap();
        assert!(dossier.insert_form(&form).is_err());
        assert_eq!(dossier.get_form("CA3").unwrap(), form);

        form.label = String::from("CA3 return");
        form.details.pop();
        dossier.update_form(&form).unwrap();
        assert_eq!(dossier.get_form("CA3").unwrap(), form);
        assert_eq!(dossier.list_forms().unwrap(), vec![form]);

        dossier.delete_form("CA3").unwrap();
        assert!(matches!(
            dossier.get_form("CA3"),
            Err(OfaError::FormNotFound(_))
        ));
        assert!(matches!(
            dossier.delete_form("CA3"),
            Err(OfaError::FormNotFound(_))
        ));
    }

    #[test]
    fn test_record_lifecycle() {
        let mut dossier = Dossier::open_in_memory().unwrap();
        dossier.insert_entry(&entry("2024-01-10", "445711", 0, 200)).unwrap();
        dossier.insert_entry(&entry("2024-01-10", "7061", 0, 1000)).unwrap();
        let form = form();
        dossier.insert_form(&form).unwrap();

        let (begin, end) = (ymd("2024-01-01"), ymd("2024-01-31"));
        let mut record = TvaRecord::new_from_form(&form, begin, end).unwrap();
        let format = AmountFormat::default();
        assert!(record.compute(&dossier, &format).unwrap().is_complete());
        assert_eq!(record.details[0].base, Decimal::from(1000));
        dossier.insert_record(&record).unwrap();
        assert!(dossier.insert_record(&record).is_err());

        let stored = dossier.get_record("CA3", end).unwrap();
        assert_eq!(stored, record);

        record.validate().unwrap();
        dossier.update_record(&record).unwrap();
        assert!(dossier.get_record("CA3", end).unwrap().is_validated);
        assert_eq!(dossier.list_records("CA3").unwrap().len(), 1);

        // Neither the declaration nor its form can go away now
        assert!(dossier.delete_record("CA3", end).is_err());
        assert!(dossier.delete_form("CA3").is_err());
    }

    #[test]
    fn test_record_needs_its_form() {
        let mut dossier = Dossier::open_in_memory().unwrap();
        let record = TvaRecord::new_from_form(&form(), ymd("2024-01-01"), ymd("2024-01-31")).unwrap();
        assert!(matches!(
            dossier.insert_record(&record),
            Err(OfaError::FormNotFound(_))
        ));
        assert!(matches!(
            dossier.update_record(&record),
            Err(OfaError::RecordNotFound(_, _))
        ));
    }

    #[test]
    fn test_delete_draft_record() {
        let mut dossier = Dossier::open_in_memory().unwrap();
        let form = form();
        dossier.insert_form(&form).unwrap();
        let end = ymd("2024-01-31");
        let record = TvaRecord::new_from_form(&form, ymd("2024-01-01"), end).unwrap();
        dossier.insert_record(&record).unwrap();

        dossier.delete_record("CA3", end).unwrap();
        assert!(dossier.list_records("CA3").unwrap().is_empty());
        assert!(matches!(
            dossier.get_record("CA3", end),
            Err(OfaError::RecordNotFound(_, _))
        ));
    }
}
