//! The transition engine.
//!
//! Once per day, timed health states count down. The hospitalized cohort is processed first,
//! then the infected (non-hospitalized) cohort. An individual whose timer is already zero takes
//! exactly one branch, decided by a single Bernoulli draw:
//!
//! * hospitalized: death with probability `death_probability x multiplier`, otherwise recovery;
//! * infected: hospitalization with probability `hospitalization_probability x multiplier`,
//!   otherwise recovery.
//!
//! An individual with a positive timer has it decremented instead; an infected individual then
//! gets a chance to infect its neighbors.
use log::{debug, trace};

use crate::cohort::ContextCohortExt;
use crate::context::Context;
use crate::define_rng;
use crate::error::ContagionError;
use crate::immunity::{ContextImmunityExt, OutcomeType};
use crate::parameters::{ContextParametersExt, DurationDistribution};
use crate::population::{ContextPopulationExt, HealthStatus, PersonId};
use crate::propagation::ContextPropagationExt;
use crate::random::{ContextRandomExt, RngId};
use crate::statistics::ContextStatisticsExt;

define_rng!(ProgressionRng);

/// Draws a state duration in whole days: a normal draw rounded to nearest, negative draws
/// clamped to zero.
///
/// # Errors
///
/// Returns `ConfigurationError` if the distribution is invalid.
pub(crate) fn sample_duration<R: RngId>(
    context: &Context,
    rng_id: R,
    distribution: &DurationDistribution,
    name: &str,
) -> Result<u32, ContagionError> {
    let normal = distribution.normal(name)?;
    let days = context.sample_distr(rng_id, normal).round();
    // `as` saturates for out of range floats.
    Ok(days.max(0.0) as u32)
}

/// Draws a Bernoulli outcome for `base x multiplier`, after the run's probability policy.
///
/// # Errors
///
/// Returns `ConfigurationRangeError` if the policy rejects the combined probability.
pub(crate) fn draw_event<R: RngId>(
    context: &Context,
    rng_id: R,
    name: &str,
    probability: f64,
) -> Result<bool, ContagionError> {
    let policy = context.get_params()?.probability_policy;
    let probability = policy.apply(name, probability)?;
    Ok(context.sample_bool(rng_id, probability))
}

fn process_hospitalized(
    context: &mut Context,
    person_id: PersonId,
    day: u32,
) -> Result<(), ContagionError> {
    let individual = context.get_individual(person_id)?;
    if individual.health() != HealthStatus::Hospitalized {
        return Err(ContagionError::InvalidStateError {
            person_id,
            status: individual.health(),
            days_remaining: individual.days_remaining(),
        });
    }
    if individual.days_remaining() != Some(0) {
        context.decrement_timer(person_id)?;
        return Ok(());
    }

    let base = context.get_params()?.death_probability;
    let multiplier = context.get_immunity_multiplier(person_id, day, OutcomeType::Death)?;
    if draw_event(context, ProgressionRng, "death_probability", base * multiplier)? {
        trace!("day {day}: person {person_id} died");
        context.kill(person_id, day)?;
        context.get_cohorts_mut().add_deceased(person_id);
        context.get_counters_mut().new_deaths += 1;
    } else {
        trace!("day {day}: person {person_id} left hospital");
        context.recover(person_id, day)?;
        context.get_cohorts_mut().remove_recovered(person_id);
        context.get_counters_mut().new_recoveries += 1;
    }
    Ok(())
}

fn process_infected(
    context: &mut Context,
    person_id: PersonId,
    day: u32,
) -> Result<(), ContagionError> {
    let individual = context.get_individual(person_id)?;
    if individual.health() != HealthStatus::Infected {
        return Err(ContagionError::InvalidStateError {
            person_id,
            status: individual.health(),
            days_remaining: individual.days_remaining(),
        });
    }
    if individual.days_remaining() != Some(0) {
        context.decrement_timer(person_id)?;
        context.propagate_from(person_id, day)?;
        return Ok(());
    }

    let params = context.get_params()?;
    let base = params.hospitalization_probability;
    let duration = params.hospitalization_duration;
    let multiplier =
        context.get_immunity_multiplier(person_id, day, OutcomeType::Hospitalization)?;
    if draw_event(
        context,
        ProgressionRng,
        "hospitalization_probability",
        base * multiplier,
    )? {
        let days = sample_duration(
            context,
            ProgressionRng,
            &duration,
            "hospitalization_duration",
        )?;
        trace!("day {day}: person {person_id} hospitalized for {days} days");
        context.hospitalize(person_id, days, day)?;
        context.get_cohorts_mut().add_hospitalized(person_id);
        context.get_counters_mut().new_hospitalizations += 1;
    } else {
        trace!("day {day}: person {person_id} recovered");
        context.recover(person_id, day)?;
        context.get_cohorts_mut().remove_recovered(person_id);
        context.get_counters_mut().new_recoveries += 1;
    }
    Ok(())
}

pub trait ContextTransitionExt {
    /// Advances every timed individual by one day, hospitalized cohort first.
    ///
    /// # Errors
    ///
    /// Returns `RunAborted` carrying the day and the individual being processed.
    fn run_transitions(&mut self, day: u32) -> Result<(), ContagionError>;
}

impl ContextTransitionExt for Context {
    fn run_transitions(&mut self, day: u32) -> Result<(), ContagionError> {
        let hospitalized = self.get_cohorts().hospitalized_snapshot();
        for &person_id in &hospitalized {
            process_hospitalized(self, person_id, day)
                .map_err(|error| error.aborted(day, Some(person_id)))?;
        }

        // Taken after the hospitalized phase so that its removals are already applied. People
        // infected below are not in the snapshot and start counting down tomorrow.
        let infected = self.get_cohorts().infected_snapshot();
        for &person_id in &infected {
            process_infected(self, person_id, day)
                .map_err(|error| error.aborted(day, Some(person_id)))?;
        }

        debug!(
            "day {day}: processed {} hospitalized and {} infected",
            hospitalized.len(),
            infected.len()
        );
        Ok(())
    }
}
