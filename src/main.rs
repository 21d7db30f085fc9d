use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::process;

mod amount;
mod config;
mod dateutil;
mod dossier;
mod entry;
mod error;
mod formula;
mod hub;
mod tva_form;
mod tva_record;

use amount::{amount_from_str, AmountFormat};
use config::Config;
use dateutil::parse_ymd;
use entry::Entry;
use error::OfaError;
use formula::{eval_rule, EvalContext};
use hub::{Hub, LogListener};
use tva_form::TvaForm;
use tva_record::{ComputeReport, TvaRecord};

#[derive(Parser)]
#[command(name = "ofa_tva")]
#[command(about = "Compute TVA declarations from an Openbook dossier")]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = "ofa.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import accounting entries from a CSV file
    Import { path: PathBuf },
    /// Record a single entry line
    Entry(EntryArgs),
    /// Create or replace a TVA form from a TOML file
    LoadForm { path: PathBuf },
    /// Delete a TVA form without declarations
    DeleteForm { mnemo: String },
    /// List TVA forms
    Forms,
    /// List the declarations of a form
    Records { mnemo: String },
    /// Compute and store a new declaration
    Declare {
        mnemo: String,
        #[arg(value_parser = date_arg)]
        begin: NaiveDate,
        #[arg(value_parser = date_arg)]
        end: NaiveDate,
    },
    /// Compute a stored declaration again
    Compute {
        mnemo: String,
        #[arg(value_parser = date_arg)]
        end: NaiveDate,
    },
    /// Freeze a declaration
    Validate {
        mnemo: String,
        #[arg(value_parser = date_arg)]
        end: NaiveDate,
    },
    /// Delete a draft declaration
    Delete {
        mnemo: String,
        #[arg(value_parser = date_arg)]
        end: NaiveDate,
    },
    /// Display a declaration
    Show {
        mnemo: String,
        #[arg(value_parser = date_arg)]
        end: NaiveDate,
        /// Print the declaration as JSON
        #[arg(long)]
        json: bool,
    },
    /// Evaluate a single rule over a period
    Eval {
        #[arg(allow_hyphen_values = true)]
        rule: String,
        #[arg(value_parser = date_arg)]
        begin: NaiveDate,
        #[arg(value_parser = date_arg)]
        end: NaiveDate,
    },
}

#[derive(Args)]
struct EntryArgs {
    #[arg(value_parser = date_arg)]
    date: NaiveDate,
    ledger: String,
    account: String,
    #[arg(default_value = "")]
    label: String,
    /// Debit amount, written with the configured separators
    #[arg(long, conflicts_with = "credit", required_unless_present = "credit")]
    debit: Option<String>,
    /// Credit amount, written with the configured separators
    #[arg(long)]
    credit: Option<String>,
    #[arg(long, default_value = "rough")]
    status: String,
}

impl EntryArgs {
    fn into_entry(self, format: &AmountFormat) -> Result<Entry, OfaError> {
        let amount = |text: Option<String>| -> Result<Decimal, OfaError> {
            match text {
                Some(text) => Ok(amount_from_str(&text, format)?),
                None => Ok(Decimal::ZERO),
            }
        };
        Ok(Entry {
            date: self.date,
            ledger: self.ledger,
            account: self.account,
            label: self.label,
            debit: amount(self.debit)?,
            credit: amount(self.credit)?,
            status: self.status.parse()?,
        })
    }
}

fn date_arg(text: &str) -> Result<NaiveDate, String> {
    parse_ymd(text).map_err(|e| e.to_string())
}

fn print_record(record: &TvaRecord, hub: &Hub) {
    println!("{}\n", record.describe(hub.format()));
}

fn print_report(report: &ComputeReport) {
    if report.is_complete() {
        println!("{} rule(s) computed", report.computed);
        return;
    }
    println!(
        "{} rule(s) computed, {} could not be evaluated:",
        report.computed,
        report.failures.len()
    );
    for failure in &report.failures {
        println!(" - {}", failure);
    }
}

fn run(cli: Cli) -> Result<(), OfaError> {
    let config = Config::from_file(&cli.config)?;
    let mut hub = Hub::open(&config)?;
    hub.register(Box::new(LogListener));

    match cli.command {
        Command::Import { path } => {
            let imported = hub.import_entries(&path)?;
            println!(
                "Imported {} entries ({} in the dossier)",
                imported,
                hub.dossier().count_entries()?
            );
        }
        Command::Entry(args) => {
            let entry = args.into_entry(hub.format())?;
            hub.insert_entry(&entry)?;
            println!("Recorded entry on account {}", entry.account);
        }
        Command::LoadForm { path } => {
            let form = TvaForm::from_toml_file(&path)?;
            hub.save_form(&form)?;
            println!("Saved TVA form {} ({} rows)", form.mnemo, form.details.len());
        }
        Command::DeleteForm { mnemo } => {
            hub.delete_form(&mnemo)?;
            println!("Deleted TVA form {}", mnemo);
        }
        Command::Forms => {
            for form in hub.dossier().list_forms()? {
                println!(" - {}: {} ({} rows)", form.mnemo, form.label, form.details.len());
            }
        }
        Command::Records { mnemo } => {
            for record in hub.dossier().list_records(&mnemo)? {
                let status = if record.is_validated {
                    "validated"
                } else {
                    "draft"
                };
                println!(" - {} to {} ({})", record.begin, record.end, status);
            }
        }
        Command::Declare { mnemo, begin, end } => {
            let (record, report) = hub.declare(&mnemo, begin, end)?;
            print_record(&record, &hub);
            print_report(&report);
        }
        Command::Compute { mnemo, end } => {
            let (record, report) = hub.recompute(&mnemo, end)?;
            print_record(&record, &hub);
            print_report(&report);
        }
        Command::Validate { mnemo, end } => {
            let record = hub.validate_record(&mnemo, end)?;
            println!("Validated {} ending on {}", record.mnemo, record.end);
        }
        Command::Delete { mnemo, end } => {
            hub.delete_record(&mnemo, end)?;
            println!("Deleted {} ending on {}", mnemo, end);
        }
        Command::Show { mnemo, end, json } => {
            let record = hub.dossier().get_record(&mnemo, end)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                print_record(&record, &hub);
            }
        }
        Command::Eval { rule, begin, end } => {
            let ctx = EvalContext {
                rows: &[],
                begin,
                end,
                balances: hub.dossier(),
                format: hub.format(),
            };
            println!("{}", eval_rule(&rule, &ctx)?);
        }
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
