//! The immunity model.
//!
//! An individual's risk multiplier for an outcome combines their base biological risk with the
//! protection from either a recent vaccination or a past infection. Protection is read from an
//! efficacy table keyed by (vaccine label, age, months since the event, outcome). Infection
//! acquired immunity uses the pseudo vaccine label `Infection`. A missing table row is a
//! configuration error, never a silent default.
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::ContagionError;
use crate::parameters::{ContextParametersExt, ImmunityPrecedence};
use crate::population::{ContextPopulationExt, Individual, PersonId};

/// Label used in the efficacy table for infection acquired immunity.
pub const INFECTION_LABEL: &str = "Infection";

pub const DAYS_PER_MONTH: f64 = 30.5;

/// Vaccine protection applies while fewer than this many months have elapsed.
pub const VACCINE_PROTECTION_MONTHS: f64 = 12.0;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeType {
    Transmission,
    Hospitalization,
    Death,
}

impl Display for OutcomeType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            OutcomeType::Transmission => "transmission",
            OutcomeType::Hospitalization => "hospitalization",
            OutcomeType::Death => "death",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EfficacyKey<'a> {
    pub label: &'a str,
    pub age: u32,
    pub months: f64,
    pub outcome: OutcomeType,
}

impl Display for EfficacyKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "efficacy({}, age {}, {:.2} months, {})",
            self.label, self.age, self.months, self.outcome
        )
    }
}

/// Source of efficacy fractions in `[0, 1]`.
pub trait EfficacyLookup {
    /// Returns `None` when no entry covers `key`.
    fn efficacy(&self, key: &EfficacyKey) -> Option<f64>;
}

/// One row of the efficacy table. Both ranges are inclusive.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EfficacyRow {
    pub vaccine: String,
    pub age_min: u32,
    pub age_max: u32,
    pub months_min: f64,
    pub months_max: f64,
    pub outcome: OutcomeType,
    pub efficacy: f64,
}

impl EfficacyRow {
    fn matches(&self, key: &EfficacyKey) -> bool {
        self.vaccine == key.label
            && self.outcome == key.outcome
            && (self.age_min..=self.age_max).contains(&key.age)
            && self.months_min <= key.months
            && key.months <= self.months_max
    }
}

/// Efficacy rows searched in order; the first matching row wins.
#[derive(Clone, Debug, Default)]
pub struct EfficacyTable {
    rows: Vec<EfficacyRow>,
}

impl EfficacyTable {
    #[must_use]
    pub fn new() -> Self {
        EfficacyTable::default()
    }

    /// # Errors
    ///
    /// Returns `ConfigurationRangeError` if the efficacy is outside `[0, 1]` and
    /// `ConfigurationError` if a range is inverted.
    pub fn add_row(&mut self, row: EfficacyRow) -> Result<(), ContagionError> {
        if !(0.0..=1.0).contains(&row.efficacy) {
            return Err(ContagionError::out_of_range(
                format!("efficacy of {} ({})", row.vaccine, row.outcome),
                row.efficacy,
            ));
        }
        if row.age_min > row.age_max
            || row.months_min.is_nan()
            || row.months_max.is_nan()
            || row.months_min > row.months_max
        {
            return Err(ContagionError::configuration(
                format!("efficacy of {} ({})", row.vaccine, row.outcome),
                format!(
                    "inverted range: ages {}..={}, months {}..={}",
                    row.age_min, row.age_max, row.months_min, row.months_max
                ),
            ));
        }
        self.rows.push(row);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns the first row validation failure.
    pub fn from_rows(rows: impl IntoIterator<Item = EfficacyRow>) -> Result<Self, ContagionError> {
        let mut table = EfficacyTable::new();
        for row in rows {
            table.add_row(row)?;
        }
        Ok(table)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl EfficacyLookup for EfficacyTable {
    fn efficacy(&self, key: &EfficacyKey) -> Option<f64> {
        self.rows
            .iter()
            .find(|row| row.matches(key))
            .map(|row| row.efficacy)
    }
}

fn months_since(event_day: u32, day: u32) -> f64 {
    f64::from(day.saturating_sub(event_day)) / DAYS_PER_MONTH
}

/// Computes the risk multiplier of `individual` for `outcome` on `day`.
///
/// # Errors
///
/// Returns `ConfigurationError` naming the rendered key if the active immunity record has no
/// matching efficacy entry.
pub fn compute_multiplier(
    individual: &Individual,
    day: u32,
    outcome: OutcomeType,
    precedence: ImmunityPrecedence,
    lookup: &dyn EfficacyLookup,
) -> Result<f64, ContagionError> {
    let base = match outcome {
        OutcomeType::Transmission => 1.0,
        OutcomeType::Hospitalization => individual.hospitalization_risk,
        OutcomeType::Death => individual.death_risk,
    };

    let vaccine = individual.vaccination().and_then(|record| {
        let months = months_since(record.day, day);
        (months < VACCINE_PROTECTION_MONTHS).then_some((record.vaccine.as_str(), months))
    });
    let infection = individual
        .infection_immunity_day()
        .map(|recovered| (INFECTION_LABEL, months_since(recovered, day)));
    let active = match precedence {
        ImmunityPrecedence::VaccineFirst => vaccine.or(infection),
        ImmunityPrecedence::InfectionFirst => infection.or(vaccine),
    };

    let Some((label, months)) = active else {
        return Ok(base);
    };
    let key = EfficacyKey {
        label,
        age: individual.age,
        months,
        outcome,
    };
    let efficacy = lookup
        .efficacy(&key)
        .ok_or_else(|| ContagionError::configuration(key.to_string(), "no matching efficacy row"))?;
    Ok(base * (1.0 - efficacy))
}

struct ImmunityData {
    lookup: Box<dyn EfficacyLookup>,
}

crate::define_data_plugin!(
    ImmunityPlugin,
    ImmunityData,
    ImmunityData {
        lookup: Box::new(EfficacyTable::new()),
    }
);

pub trait ContextImmunityExt {
    /// Installs the efficacy source, replacing any previous one.
    fn set_efficacy_lookup(&mut self, lookup: impl EfficacyLookup + 'static);

    /// The multiplier of `person_id` for `outcome` on `day`, under the configured precedence.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPersonId`, or `ConfigurationError` for a missing efficacy entry or
    /// missing parameters.
    fn get_immunity_multiplier(
        &self,
        person_id: PersonId,
        day: u32,
        outcome: OutcomeType,
    ) -> Result<f64, ContagionError>;
}

impl ContextImmunityExt for Context {
    fn set_efficacy_lookup(&mut self, lookup: impl EfficacyLookup + 'static) {
        self.get_data_container_mut(ImmunityPlugin).lookup = Box::new(lookup);
    }

    fn get_immunity_multiplier(
        &self,
        person_id: PersonId,
        day: u32,
        outcome: OutcomeType,
    ) -> Result<f64, ContagionError> {
        let individual = self.get_individual(person_id)?;
        let precedence = self.get_params()?.immunity_precedence;
        let empty = EfficacyTable::new();
        let lookup: &dyn EfficacyLookup = match self.get_data_container(ImmunityPlugin) {
            Some(data) => data.lookup.as_ref(),
            None => &empty,
        };
        compute_multiplier(individual, day, outcome, precedence, lookup)
    }
}
