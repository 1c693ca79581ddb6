//! Model parameters.
//!
//! `Params` carries every tunable of a run: durations, base probabilities, the distance
//! attenuation, the initial situation and the vaccination strategy. It is stored as the
//! `Parameters` global property and validated when set, so every component reads values that are
//! already known to be in range.
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::define_global_property;
use crate::error::ContagionError;
use crate::global_properties::ContextGlobalPropertiesExt;
use crate::vaccination::Strategy;

/// Mean and standard deviation (in days) of a normally distributed state duration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DurationDistribution {
    pub mean: f64,
    pub std_dev: f64,
}

impl DurationDistribution {
    #[must_use]
    pub const fn new(mean: f64, std_dev: f64) -> Self {
        DurationDistribution { mean, std_dev }
    }

    /// # Errors
    ///
    /// Returns `ConfigurationError` if the mean or standard deviation is negative or not finite.
    pub fn normal(&self, name: &str) -> Result<Normal<f64>, ContagionError> {
        if !self.mean.is_finite() || self.mean < 0.0 {
            return Err(ContagionError::configuration(
                name,
                format!("mean must be a non-negative number, got {}", self.mean),
            ));
        }
        Normal::new(self.mean, self.std_dev).map_err(|error| {
            ContagionError::configuration(name, format!("std_dev {}: {error}", self.std_dev))
        })
    }
}

/// Which immunity record is consulted first when an individual has both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImmunityPrecedence {
    #[default]
    VaccineFirst,
    InfectionFirst,
}

/// What to do with a combined probability above 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbabilityPolicy {
    /// Values above 1 are drawn as certainty.
    #[default]
    Saturate,
    /// Values above 1 abort the run.
    Reject,
}

impl ProbabilityPolicy {
    /// Turns a combined probability into one that can be drawn.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationRangeError` for a negative or NaN value, and for a value above 1
    /// under `Reject`.
    pub fn apply(self, name: &str, value: f64) -> Result<f64, ContagionError> {
        if value.is_nan() || value < 0.0 {
            return Err(ContagionError::out_of_range(name, value));
        }
        if value <= 1.0 {
            return Ok(value);
        }
        match self {
            ProbabilityPolicy::Saturate => Ok(1.0),
            ProbabilityPolicy::Reject => Err(ContagionError::out_of_range(name, value)),
        }
    }
}

/// Individuals seeded on day 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialSituation {
    pub infected: usize,
    pub hospitalized: usize,
}

impl Default for InitialSituation {
    fn default() -> Self {
        InitialSituation {
            infected: 16,
            hospitalized: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Params {
    /// Last day that may be simulated.
    pub simulation_duration: u32,
    pub infection_duration: DurationDistribution,
    pub hospitalization_duration: DurationDistribution,
    pub transmission_probability: f64,
    pub hospitalization_probability: f64,
    pub death_probability: f64,
    pub distance_coefficient: f64,
    /// Lower bound of the attenuation divisor.
    pub distance_floor: f64,
    pub minimum_vaccination_age: u32,
    pub immunity_precedence: ImmunityPrecedence,
    pub probability_policy: ProbabilityPolicy,
    pub initial_situation: InitialSituation,
    pub strategy: Strategy,
}

impl Default for Params {
    fn default() -> Self {
        Params {
            simulation_duration: 365,
            infection_duration: DurationDistribution::new(7.0, 1.5),
            hospitalization_duration: DurationDistribution::new(30.0, 1.5),
            transmission_probability: 4.1e-4,
            hospitalization_probability: 0.0442,
            death_probability: 0.2,
            distance_coefficient: 1.0,
            distance_floor: 0.2,
            minimum_vaccination_age: 12,
            immunity_precedence: ImmunityPrecedence::default(),
            probability_policy: ProbabilityPolicy::default(),
            initial_situation: InitialSituation::default(),
            strategy: Strategy::default(),
        }
    }
}

fn validate_probability(name: &str, value: f64) -> Result<(), ContagionError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ContagionError::out_of_range(name, value))
    }
}

fn validate_params(params: &Params) -> Result<(), ContagionError> {
    params.infection_duration.normal("infection_duration")?;
    params
        .hospitalization_duration
        .normal("hospitalization_duration")?;

    validate_probability("transmission_probability", params.transmission_probability)?;
    validate_probability(
        "hospitalization_probability",
        params.hospitalization_probability,
    )?;
    validate_probability("death_probability", params.death_probability)?;

    if !params.distance_coefficient.is_finite() || params.distance_coefficient < 0.0 {
        return Err(ContagionError::configuration(
            "distance_coefficient",
            format!(
                "must be a non-negative number, got {}",
                params.distance_coefficient
            ),
        ));
    }
    if !params.distance_floor.is_finite() || params.distance_floor <= 0.0 {
        return Err(ContagionError::configuration(
            "distance_floor",
            format!("must be a positive number, got {}", params.distance_floor),
        ));
    }

    params.strategy.validate()
}

define_global_property!(Parameters, Params, validate_params);

pub trait ContextParametersExt {
    /// # Errors
    ///
    /// Returns `ConfigurationError` if `Parameters` has not been set.
    fn get_params(&self) -> Result<&Params, ContagionError>;
}

impl ContextParametersExt for Context {
    fn get_params(&self) -> Result<&Params, ContagionError> {
        self.get_global_property_value(Parameters).ok_or_else(|| {
            ContagionError::configuration("Parameters", "model parameters have not been set")
        })
    }
}
