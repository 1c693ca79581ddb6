//! Scenario loading.
//!
//! A scenario file is JSON with the run parameters and the paths of the CSV files produced by
//! the population builder. Paths are resolved relative to the scenario file.
use std::path::{Path, PathBuf};

use log::info;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::ContagionError;
use crate::global_properties::ContextGlobalPropertiesExt;
use crate::immunity::{ContextImmunityExt, EfficacyRow, EfficacyTable};
use crate::network::ContextNetworkExt;
use crate::parameters::{Parameters, Params};
use crate::population::{ContextPopulationExt, IndividualRecord, PersonId};
use crate::vaccination::{ContextVaccinationExt, DoseSchedule, DoseScheduleEntry};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputPaths {
    pub population: PathBuf,
    #[serde(default)]
    pub neighbors: Option<PathBuf>,
    #[serde(default)]
    pub efficacy: Option<PathBuf>,
    #[serde(default)]
    pub dose_schedule: Option<PathBuf>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub parameters: Params,
    pub inputs: InputPaths,
}

/// One directed entry of the neighbor file.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NeighborRecord {
    pub person: PersonId,
    pub neighbor: PersonId,
    pub distance: f64,
}

fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, ContagionError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

/// Adds every individual of a population file, in file order.
///
/// # Errors
///
/// Returns `CsvError` for unreadable files or rows and `ConfigurationError` for ids that are not
/// dense from 1 or invalid risk multipliers.
pub fn load_population(context: &mut Context, path: &Path) -> Result<usize, ContagionError> {
    let records: Vec<IndividualRecord> = read_csv(path)?;
    let count = records.len();
    for record in records {
        context.add_individual(record)?;
    }
    Ok(count)
}

/// # Errors
///
/// Returns `CsvError` for unreadable files or rows, or the error of the first rejected entry.
pub fn load_neighbors(context: &mut Context, path: &Path) -> Result<usize, ContagionError> {
    let records: Vec<NeighborRecord> = read_csv(path)?;
    let count = records.len();
    for record in records {
        context.add_neighbor(record.person, record.neighbor, record.distance)?;
    }
    Ok(count)
}

/// # Errors
///
/// Returns `CsvError` for unreadable files or rows and `ConfigurationRangeError` for invalid
/// efficacies or ranges.
pub fn load_efficacy_table(path: &Path) -> Result<EfficacyTable, ContagionError> {
    let rows: Vec<EfficacyRow> = read_csv(path)?;
    EfficacyTable::from_rows(rows)
}

/// # Errors
///
/// Returns `CsvError` for unreadable files or rows.
pub fn load_dose_schedule(path: &Path) -> Result<DoseSchedule, ContagionError> {
    let entries: Vec<DoseScheduleEntry> = read_csv(path)?;
    Ok(DoseSchedule::from_entries(entries))
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

pub trait ContextLoaderExt {
    /// Loads a scenario file into the context: stores the parameters, adds the population and
    /// the neighbor graph, installs the efficacy table and the dose schedule, then freezes the
    /// network.
    ///
    /// # Errors
    ///
    /// Returns the first I/O, parse or validation error encountered.
    fn load_scenario(&mut self, path: &Path) -> Result<ScenarioConfig, ContagionError>;
}

impl ContextLoaderExt for Context {
    fn load_scenario(&mut self, path: &Path) -> Result<ScenarioConfig, ContagionError> {
        let config: ScenarioConfig = self.load_parameters_from_json(path)?;
        self.set_global_property_value(Parameters, config.parameters.clone())?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));

        let inputs = &config.inputs;
        let individuals = load_population(self, &resolve(base, &inputs.population))?;
        let neighbors = match &inputs.neighbors {
            Some(neighbors) => load_neighbors(self, &resolve(base, neighbors))?,
            None => 0,
        };
        self.freeze_network();
        if let Some(efficacy) = &inputs.efficacy {
            let table = load_efficacy_table(&resolve(base, efficacy))?;
            self.set_efficacy_lookup(table);
        }
        if let Some(dose_schedule) = &inputs.dose_schedule {
            let schedule = load_dose_schedule(&resolve(base, dose_schedule))?;
            self.set_dose_schedule(schedule);
        }

        info!(
            "loaded scenario {}: {individuals} individuals, {neighbors} neighbor entries",
            path.display()
        );
        Ok(config)
    }
}
