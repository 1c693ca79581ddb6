//! CSV reports.
//!
//! A report is a serializable row type registered with `define_report!`. `add_report` opens
//! `{directory}/{file_prefix}{short_name}.csv` for it and `send_report` appends one row. Files
//! are opened under the options set through `report_options()`, so options must be set before
//! reports are added.
use std::any::TypeId;
use std::cell::RefCell;
use std::fs::{create_dir_all, File};
use std::path::PathBuf;

use csv::Writer;
use log::trace;
use serde::Serialize;

use crate::context::Context;
use crate::error::ContagionError;
use crate::hashing::HashMap;
use crate::simulation::SimulationOutcome;
use crate::statistics::TerminalState;

pub trait Report: 'static {
    // Returns report type
    fn type_id(&self) -> TypeId;
    // Serializes the data with the correct writer
    fn serialize(&self, writer: &mut Writer<File>) -> Result<(), ContagionError>;
}

/// Use this macro to define a unique report type
#[macro_export]
macro_rules! define_report {
    ($name:ident) => {
        impl $crate::report::Report for $name {
            fn type_id(&self) -> std::any::TypeId {
                std::any::TypeId::of::<$name>()
            }

            fn serialize(
                &self,
                writer: &mut $crate::csv::Writer<std::fs::File>,
            ) -> Result<(), $crate::error::ContagionError> {
                writer.serialize(self)?;
                Ok(())
            }
        }
    };
}
pub use define_report;

/// Where report files go and what they are called.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigReportOptions {
    pub file_prefix: String,
    pub directory: PathBuf,
    pub overwrite: bool,
}

impl ConfigReportOptions {
    #[must_use]
    pub fn new() -> Self {
        ConfigReportOptions {
            file_prefix: String::new(),
            directory: PathBuf::from("."),
            overwrite: false,
        }
    }

    pub fn file_prefix(&mut self, file_prefix: String) -> &mut ConfigReportOptions {
        self.file_prefix = file_prefix;
        self
    }

    pub fn directory(&mut self, directory: PathBuf) -> &mut ConfigReportOptions {
        self.directory = directory;
        self
    }

    pub fn overwrite(&mut self, overwrite: bool) -> &mut ConfigReportOptions {
        self.overwrite = overwrite;
        self
    }

    #[must_use]
    pub fn report_path(&self, short_name: &str) -> PathBuf {
        self.directory
            .join(format!("{}{short_name}.csv", self.file_prefix))
    }
}

struct ReportData {
    file_writers: RefCell<HashMap<TypeId, Writer<File>>>,
    config: ConfigReportOptions,
}

// * file_writers: Maps report type to file writer
// * config: Contains all the customizable filename options that the user supplies
crate::define_data_plugin!(
    ReportPlugin,
    ReportData,
    ReportData {
        file_writers: RefCell::new(HashMap::default()),
        config: ConfigReportOptions::new(),
    }
);

pub trait ContextReportExt {
    /// Options applied to reports added from now on.
    fn report_options(&mut self) -> &mut ConfigReportOptions;

    /// Creates the file for report type `T` and writes its header on the first row.
    ///
    /// # Errors
    ///
    /// Returns `ReportError` if the file exists and overwriting is off, or `IoError` if the
    /// directory or file cannot be created.
    fn add_report<T: Report>(&mut self, short_name: &str) -> Result<(), ContagionError>;

    /// Appends `report` as one row of its file.
    ///
    /// # Errors
    ///
    /// Returns `ReportError` if no file was added for the report type, or the write error.
    fn send_report<T: Report>(&self, report: T) -> Result<(), ContagionError>;
}

impl ContextReportExt for Context {
    fn report_options(&mut self) -> &mut ConfigReportOptions {
        &mut self.get_data_container_mut(ReportPlugin).config
    }

    fn add_report<T: Report>(&mut self, short_name: &str) -> Result<(), ContagionError> {
        let data_container = self.get_data_container_mut(ReportPlugin);
        let path = data_container.config.report_path(short_name);
        if path.exists() && !data_container.config.overwrite {
            return Err(ContagionError::ReportError(format!(
                "{} already exists; enable overwrite to replace it",
                path.display()
            )));
        }
        create_dir_all(&data_container.config.directory)?;
        let file = File::create(&path)?;
        trace!("writing {short_name} report to {}", path.display());
        data_container
            .file_writers
            .borrow_mut()
            .insert(TypeId::of::<T>(), Writer::from_writer(file));
        Ok(())
    }

    fn send_report<T: Report>(&self, report: T) -> Result<(), ContagionError> {
        let missing = || {
            ContagionError::ReportError(format!(
                "no file was added for report type {}",
                std::any::type_name::<T>()
            ))
        };
        let data_container = self.get_data_container(ReportPlugin).ok_or_else(missing)?;
        let mut file_writers = data_container.file_writers.borrow_mut();
        let writer = file_writers
            .get_mut(&report.type_id())
            .ok_or_else(missing)?;
        report.serialize(writer)?;
        writer.flush()?;
        Ok(())
    }
}

/// One row of `daily.csv`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DailyReportRow {
    pub day: u32,
    pub healthy: usize,
    pub total_infected: usize,
    pub total_hospitalized: usize,
    pub total_deceased: usize,
    pub total_vaccinated: usize,
    pub new_infections: usize,
    pub new_hospitalizations: usize,
    pub new_deaths: usize,
    pub new_recoveries: usize,
}

define_report!(DailyReportRow);

define_report!(TerminalState);

/// Writes `daily.csv` and `final_states.csv` for a finished run.
///
/// # Errors
///
/// Returns the first error from creating or writing either file.
pub fn write_outcome_reports(
    context: &mut Context,
    outcome: &SimulationOutcome,
) -> Result<(), ContagionError> {
    context.add_report::<DailyReportRow>("daily")?;
    let healthy = outcome.series.healthy();
    for (record, healthy) in outcome.series.records().iter().zip(healthy) {
        context.send_report(DailyReportRow {
            day: record.day,
            healthy,
            total_infected: record.total_infected,
            total_hospitalized: record.total_hospitalized,
            total_deceased: record.total_deceased,
            total_vaccinated: record.total_vaccinated,
            new_infections: record.new_infections,
            new_hospitalizations: record.new_hospitalizations,
            new_deaths: record.new_deaths,
            new_recoveries: record.new_recoveries,
        })?;
    }

    context.add_report::<TerminalState>("final_states")?;
    for state in &outcome.final_states {
        context.send_report(state.clone())?;
    }
    Ok(())
}
