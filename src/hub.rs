use chrono::NaiveDate;
use log::info;
use std::fmt;
use std::path::Path;

use crate::amount::AmountFormat;
use crate::config::Config;
use crate::dossier::Dossier;
use crate::entry::Entry;
use crate::error::OfaError;
use crate::tva_form::TvaForm;
use crate::tva_record::{ComputeReport, TvaRecord};

/// What an event is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubObject {
    TvaForm(String),
    TvaRecord { mnemo: String, end: NaiveDate },
    Entries,
}

impl fmt::Display for HubObject {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HubObject::TvaForm(mnemo) => write!(f, "TVA form {}", mnemo),
            HubObject::TvaRecord { mnemo, end } => {
                write!(f, "TVA declaration {} ending on {}", mnemo, end)
            }
            HubObject::Entries => write!(f, "entries"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubEvent {
    New(HubObject),
    Updated(HubObject),
    Deleted(HubObject),
    /// The whole dataset changed, cached views must be rebuilt.
    Reload(HubObject),
}

impl fmt::Display for HubEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HubEvent::New(object) => write!(f, "new {}", object),
            HubEvent::Updated(object) => write!(f, "updated {}", object),
            HubEvent::Deleted(object) => write!(f, "deleted {}", object),
            HubEvent::Reload(object) => write!(f, "reload {}", object),
        }
    }
}

pub trait HubListener {
    fn on_hub_event(&mut self, event: &HubEvent);
}

pub struct LogListener;

impl HubListener for LogListener {
    fn on_hub_event(&mut self, event: &HubEvent) {
        info!("Hub: {}", event);
    }
}

fn record_object(record: &TvaRecord) -> HubObject {
    HubObject::TvaRecord {
        mnemo: record.mnemo.clone(),
        end: record.end,
    }
}

/**
 * The opened dossier, with its amount preferences.
 *
 * Every change made through the hub is broadcast to the registered listeners
 * once it has been stored.
 */
pub struct Hub {
    dossier: Dossier,
    format: AmountFormat,
    listeners: Vec<Box<dyn HubListener>>,
}

impl Hub {
    pub fn new(dossier: Dossier, format: AmountFormat) -> Hub {
        Hub {
            dossier,
            format,
            listeners: Vec::new(),
        }
    }

    pub fn open(config: &Config) -> Result<Hub, OfaError> {
        let format = config.amount_format()?;
        let dossier = Dossier::open(&config.dossier.path)?;
        Ok(Hub::new(dossier, format))
    }

    pub fn register(&mut self, listener: Box<dyn HubListener>) {
        self.listeners.push(listener);
    }

    pub fn dossier(&self) -> &Dossier {
        &self.dossier
    }

    pub fn format(&self) -> &AmountFormat {
        &self.format
    }

    fn emit(&mut self, event: HubEvent) {
        for listener in self.listeners.iter_mut() {
            listener.on_hub_event(&event);
        }
    }

    pub fn import_entries(&mut self, path: &Path) -> Result<usize, OfaError> {
        let imported = self.dossier.import_csv_file(path, &self.format)?;
        self.emit(HubEvent::Reload(HubObject::Entries));
        Ok(imported)
    }

    pub fn insert_entry(&mut self, entry: &Entry) -> Result<(), OfaError> {
        self.dossier.insert_entry(entry)?;
        self.emit(HubEvent::Reload(HubObject::Entries));
        Ok(())
    }

    /// Insert the form, or replace it if the mnemonic is already known.
    pub fn save_form(&mut self, form: &TvaForm) -> Result<(), OfaError> {
        let object = HubObject::TvaForm(form.mnemo.clone());
        match self.dossier.get_form(&form.mnemo) {
            Ok(_) => {
                self.dossier.update_form(form)?;
                self.emit(HubEvent::Updated(object));
            }
            Err(OfaError::FormNotFound(_)) => {
                self.dossier.insert_form(form)?;
                self.emit(HubEvent::New(object));
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    pub fn delete_form(&mut self, mnemo: &str) -> Result<(), OfaError> {
        self.dossier.delete_form(mnemo)?;
        self.emit(HubEvent::Deleted(HubObject::TvaForm(mnemo.to_string())));
        Ok(())
    }

    pub fn compute_record(&self, record: &mut TvaRecord) -> Result<ComputeReport, OfaError> {
        record.compute(&self.dossier, &self.format)
    }

    /// Instantiate a declaration from its form, compute it and store it.
    pub fn declare(
        &mut self,
        mnemo: &str,
        begin: NaiveDate,
        end: NaiveDate,
    ) -> Result<(TvaRecord, ComputeReport), OfaError> {
        if self.dossier.find_record(mnemo, end)?.is_some() {
            return Err(OfaError::Validation(format!(
                "A {} declaration already ends on {}",
                mnemo, end
            )));
        }
        let form = self.dossier.get_form(mnemo)?;
        let mut record = TvaRecord::new_from_form(&form, begin, end)?;
        let report = self.compute_record(&mut record)?;
        self.dossier.insert_record(&record)?;
        self.emit(HubEvent::New(record_object(&record)));
        Ok((record, report))
    }

    /// Compute a stored declaration again, overwriting its amounts.
    pub fn recompute(
        &mut self,
        mnemo: &str,
        end: NaiveDate,
    ) -> Result<(TvaRecord, ComputeReport), OfaError> {
        let mut record = self.dossier.get_record(mnemo, end)?;
        let report = self.compute_record(&mut record)?;
        self.dossier.update_record(&record)?;
        self.emit(HubEvent::Updated(record_object(&record)));
        Ok((record, report))
    }

    pub fn validate_record(&mut self, mnemo: &str, end: NaiveDate) -> Result<TvaRecord, OfaError> {
        let mut record = self.dossier.get_record(mnemo, end)?;
        record.validate()?;
        self.dossier.update_record(&record)?;
        self.emit(HubEvent::Updated(record_object(&record)));
        Ok(record)
    }

    pub fn delete_record(&mut self, mnemo: &str, end: NaiveDate) -> Result<(), OfaError> {
        self.dossier.delete_record(mnemo, end)?;
        self.emit(HubEvent::Deleted(HubObject::TvaRecord {
            mnemo: mnemo.to_string(),
            end,
        }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dateutil::parse_ymd;
    use crate::entry::tests::entry;
    use rust_decimal::Decimal;
    use std::cell::RefCell;
    use std::io::Write;
    use std::rc::Rc;

    struct Recorder {
        events: Rc<RefCell<Vec<HubEvent>>>,
    }

    impl HubListener for Recorder {
        fn on_hub_event(&mut self, event: &HubEvent) {
            self.events.borrow_mut().push(event.clone());
        }
    }

    fn hub() -> (Hub, Rc<RefCell<Vec<HubEvent>>>) {
        let mut hub = Hub::new(Dossier::open_in_memory().unwrap(), AmountFormat::default());
        let events = Rc::new(RefCell::new(Vec::new()));
        hub.register(Box::new(Recorder {
            events: Rc::clone(&events),
        }));
        hub.register(Box::new(LogListener));
        (hub, events)
    }

    fn form() -> TvaForm {
        TvaForm::from_toml(
            r#"
            mnemo = 'CA3'
            label = 'Monthly VAT return'
            [[row]]
            code = '08'
            has_amount = true
            amount_rule = '%EVAL(-%ACC(445711))'
            [[row]]
            code = '28'
            has_amount = true
            amount_rule = '%COD(08)*2'
            "#,
        )
        .unwrap()
    }

    fn ymd(date: &str) -> NaiveDate {
        parse_ymd(date).unwrap()
    }

    #[test]
    fn test_form_events() {
        let (mut hub, events) = hub();
        let mut form = form();
        hub.save_form(&form).unwrap();
        form.label = String::from("Renamed");
        hub.save_form(&form).unwrap();
        hub.delete_form("CA3").unwrap();

        let object = HubObject::TvaForm(String::from("CA3"));
        assert_eq!(
            *events.borrow(),
            vec![
                HubEvent::New(object.clone()),
                HubEvent::Updated(object.clone()),
                HubEvent::Deleted(object),
            ]
        );
    }

    #[test]
    fn test_failed_change_emits_nothing() {
        let (mut hub, events) = hub();
        assert!(hub.delete_form("CA3").is_err());
        assert!(hub.declare("CA3", ymd("2024-01-01"), ymd("2024-01-31")).is_err());
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn test_declaration_lifecycle() {
        let (mut hub, events) = hub();
        hub.save_form(&form()).unwrap();
        hub.insert_entry(&entry("2024-01-10", "445711", 0, 200))
            .unwrap();

        let (begin, end) = (ymd("2024-01-01"), ymd("2024-01-31"));
        let (record, report) = hub.declare("CA3", begin, end).unwrap();
        assert!(report.is_complete());
        assert_eq!(record.details[1].amount, Decimal::from(400));

        hub.insert_entry(&entry("2024-01-20", "445711", 0, 50))
            .unwrap();
        let (record, _) = hub.recompute("CA3", end).unwrap();
        assert_eq!(record.details[1].amount, Decimal::from(500));

        let record = hub.validate_record("CA3", end).unwrap();
        assert!(record.is_validated);
        assert!(hub.recompute("CA3", end).is_err());
        assert!(hub.delete_record("CA3", end).is_err());

        let object = HubObject::TvaRecord {
            mnemo: String::from("CA3"),
            end,
        };
        assert_eq!(
            events.borrow()[1..].to_vec(),
            vec![
                HubEvent::Reload(HubObject::Entries),
                HubEvent::New(object.clone()),
                HubEvent::Reload(HubObject::Entries),
                HubEvent::Updated(object.clone()),
                HubEvent::Updated(object),
            ]
        );
    }

    #[test]
    fn test_declare_twice_is_refused() {
        let (mut hub, events) = hub();
        hub.save_form(&form()).unwrap();
        let (begin, end) = (ymd("2024-01-01"), ymd("2024-01-31"));
        hub.declare("CA3", begin, end).unwrap();
        let emitted = events.borrow().len();

        assert!(matches!(
            hub.declare("CA3", ymd("2024-01-15"), end),
            Err(OfaError::Validation(_))
        ));
        assert_eq!(events.borrow().len(), emitted);
        assert_eq!(hub.dossier().get_record("CA3", end).unwrap().begin, begin);
    }

    #[test]
    fn test_import_reloads_entries() {
        let (mut hub, events) = hub();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "date,ledger,account,label,debit,credit,status").unwrap();
        writeln!(file, "2024-01-10,BQ,512,Deposit,\"1,500.00\",,validated").unwrap();
        writeln!(file, "2024-01-10,BQ,411,Deposit,,\"1,500.00\",validated").unwrap();
        file.flush().unwrap();

        assert_eq!(hub.import_entries(file.path()).unwrap(), 2);
        assert_eq!(hub.dossier().count_entries().unwrap(), 2);
        assert_eq!(
            *events.borrow(),
            vec![HubEvent::Reload(HubObject::Entries)]
        );
    }

    #[test]
    fn test_sample_declaration() {
        let (mut hub, _) = hub();
        hub.import_entries(Path::new("data/entries.csv")).unwrap();
        hub.save_form(&TvaForm::from_toml_file(Path::new("data/ca3.toml")).unwrap())
            .unwrap();

        let (record, report) = hub
            .declare("CA3", ymd("2024-01-01"), ymd("2024-01-31"))
            .unwrap();
        assert!(report.is_complete());

        let amounts: Vec<(&str, Decimal, Decimal)> = record
            .details
            .iter()
            .filter_map(|d| d.code.as_deref().map(|code| (code, d.base, d.amount)))
            .collect();
        let dec = |n: i64| Decimal::from(n);
        assert_eq!(
            amounts,
            vec![
                ("08", dec(1000), dec(200)),
                ("09", dec(500), dec(50)),
                ("16", dec(0), dec(250)),
                ("19", dec(0), dec(300)),
                ("20", dec(0), dec(60)),
                ("23", dec(0), dec(360)),
                ("25", dec(0), dec(110)),
                ("28", dec(0), dec(-110)),
            ]
        );
    }

    #[test]
    fn test_event_display() {
        let event = HubEvent::Deleted(HubObject::TvaRecord {
            mnemo: String::from("CA3"),
            end: ymd("2024-01-31"),
        });
        assert_eq!(
            event.to_string(),
            "deleted TVA declaration CA3 ending on 2024-01-31"
        );
    }
}
