//! The simulation loop.
//!
//! `run_simulation` seeds day 0, records its statistics and then schedules days as plans. Each
//! day `d` is three plans at time `d`:
//!
//! | phase   | work                                                      |
//! |---------|-----------------------------------------------------------|
//! | `First` | transitions (hospitalized cohort, then infected cohort)   |
//! | `Normal`| vaccination                                               |
//! | `Last`  | statistics record, termination check, schedule `d + 1`    |
//!
//! A fatal error is stored and the context is shut down, so the failing day is never recorded.
use std::fmt;

use log::{debug, error, info};
use serde::Serialize;

use crate::cohort::ContextCohortExt;
use crate::context::{Context, ExecutionPhase};
use crate::define_rng;
use crate::error::ContagionError;
use crate::network::ContextNetworkExt;
use crate::parameters::ContextParametersExt;
use crate::population::{ContextPopulationExt, PersonId};
use crate::random::ContextRandomExt;
use crate::statistics::{ContextStatisticsExt, DailySeries, TerminalState};
use crate::transition::{sample_duration, ContextTransitionExt};
use crate::vaccination::ContextVaccinationExt;

define_rng!(SeedingRng);

/// Why the loop stopped.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The infected cohort became empty.
    NoInfected,
    /// `simulation_duration` days were simulated.
    DayLimit,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StopReason::NoInfected => write!(f, "no infected individuals remain"),
            StopReason::DayLimit => write!(f, "day limit reached"),
        }
    }
}

/// Everything a finished run hands to the presentation layer.
#[derive(Clone, Debug)]
pub struct SimulationOutcome {
    pub series: DailySeries,
    pub final_states: Vec<TerminalState>,
    pub last_day: u32,
    pub stop_reason: StopReason,
}

#[derive(Default)]
struct SimulationData {
    started: bool,
    last_day: u32,
    stop_reason: Option<StopReason>,
    fatal_error: Option<ContagionError>,
}

crate::define_data_plugin!(SimulationPlugin, SimulationData, SimulationData::default());

/// Stops the run with a fatal error. Only the first error is kept; `run_simulation` returns it.
pub(crate) fn abort_run(context: &mut Context, error: ContagionError) {
    error!("{error}");
    let data_container = context.get_data_container_mut(SimulationPlugin);
    if data_container.fatal_error.is_none() {
        data_container.fatal_error = Some(error);
    }
    context.shutdown();
}

fn stop(context: &mut Context, day: u32, reason: StopReason) {
    info!("stopping after day {day}: {reason}");
    let data_container = context.get_data_container_mut(SimulationPlugin);
    data_container.last_day = day;
    data_container.stop_reason = Some(reason);
    context.shutdown();
}

/// Stop or continue after `day` has been recorded.
fn check_termination(context: &mut Context, day: u32) -> Result<(), ContagionError> {
    let duration = context.get_params()?.simulation_duration;
    if context.get_cohorts().infected_count() == 0 {
        stop(context, day, StopReason::NoInfected);
    } else if day >= duration {
        stop(context, day, StopReason::DayLimit);
    } else {
        context.get_data_container_mut(SimulationPlugin).last_day = day;
        schedule_day(context, day + 1);
    }
    Ok(())
}

fn schedule_day(context: &mut Context, day: u32) {
    let time = f64::from(day);
    context.add_plan_with_phase(
        time,
        move |context| {
            if let Err(error) = context.run_transitions(day) {
                abort_run(context, error);
            }
        },
        ExecutionPhase::First,
    );
    context.add_plan_with_phase(
        time,
        move |context| {
            if let Err(error) = context.run_vaccination(day) {
                abort_run(context, error.aborted(day, None));
            }
        },
        ExecutionPhase::Normal,
    );
    schedule_end_of_day(context, day);
}

fn schedule_end_of_day(context: &mut Context, day: u32) {
    context.add_plan_with_phase(
        f64::from(day),
        move |context| {
            context.record_day(day);
            if let Err(error) = check_termination(context, day) {
                abort_run(context, error.aborted(day, None));
            }
        },
        ExecutionPhase::Last,
    );
}

pub trait ContextSimulationExt {
    /// Puts `person_id` in the Infected state at day 0 for `days` days.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateError` if the individual is not Neutral.
    fn seed_infection(&mut self, person_id: PersonId, days: u32) -> Result<(), ContagionError>;

    /// Puts `person_id` in the Hospitalized state at day 0 for `days` days.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateError` if the individual is not Neutral.
    fn seed_hospitalization(&mut self, person_id: PersonId, days: u32)
        -> Result<(), ContagionError>;

    /// Draws the initial situation: distinct individuals, uniformly without replacement, the
    /// first `infected` of them infected and the next `hospitalized` hospitalized.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if more seeds are requested than there are individuals.
    fn seed_population(&mut self) -> Result<(), ContagionError>;

    /// Seeds, runs every day until termination and returns the outcome.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if parameters are missing or the simulation already ran,
    /// or `RunAborted` with the day (and individual, when known) of a fatal error.
    fn run_simulation(&mut self) -> Result<SimulationOutcome, ContagionError>;
}

impl ContextSimulationExt for Context {
    fn seed_infection(&mut self, person_id: PersonId, days: u32) -> Result<(), ContagionError> {
        self.infect(person_id, days, 0)?;
        self.get_cohorts_mut().add_infected(person_id);
        Ok(())
    }

    fn seed_hospitalization(
        &mut self,
        person_id: PersonId,
        days: u32,
    ) -> Result<(), ContagionError> {
        self.hospitalize(person_id, days, 0)?;
        self.get_cohorts_mut().add_hospitalized(person_id);
        Ok(())
    }

    fn seed_population(&mut self) -> Result<(), ContagionError> {
        let params = self.get_params()?;
        let situation = params.initial_situation;
        let infection_duration = params.infection_duration;
        let hospitalization_duration = params.hospitalization_duration;

        let population_size = self.get_population_size();
        let requested = situation.infected + situation.hospitalized;
        if requested > population_size {
            return Err(ContagionError::configuration(
                "initial_situation",
                format!("{requested} seeds requested for a population of {population_size}"),
            ));
        }

        let drawn = self.sample_without_replacement(SeedingRng, population_size, requested);
        for (seed, index) in drawn.into_iter().enumerate() {
            let person_id = PersonId::from_index(index);
            if seed < situation.infected {
                let days = sample_duration(
                    self,
                    SeedingRng,
                    &infection_duration,
                    "infection_duration",
                )?;
                self.seed_infection(person_id, days)?;
            } else {
                let days = sample_duration(
                    self,
                    SeedingRng,
                    &hospitalization_duration,
                    "hospitalization_duration",
                )?;
                self.seed_hospitalization(person_id, days)?;
            }
        }
        debug!(
            "seeded {} infected and {} hospitalized",
            situation.infected, situation.hospitalized
        );
        Ok(())
    }

    fn run_simulation(&mut self) -> Result<SimulationOutcome, ContagionError> {
        let params = self.get_params()?;
        let minimum_age = params.minimum_vaccination_age;
        let duration = params.simulation_duration;
        if self.get_data_container_mut(SimulationPlugin).started {
            return Err(ContagionError::configuration(
                "simulation",
                "the simulation has already been run",
            ));
        }
        self.get_data_container_mut(SimulationPlugin).started = true;
        self.freeze_network();

        self.seed_population()
            .map_err(|error| error.aborted(0, None))?;
        let eligible: Vec<PersonId> = self
            .person_ids()
            .filter(|&person_id| {
                self.get_individual(person_id)
                    .is_ok_and(|individual| {
                        individual.age >= minimum_age && individual.vaccination().is_none()
                    })
            })
            .collect();
        let cohorts = self.get_cohorts_mut();
        for person_id in eligible {
            cohorts.add_to_pool(person_id);
        }
        info!(
            "starting simulation of {} individuals for up to {duration} days",
            self.get_population_size()
        );

        // Day 0 is recorded from a plan so that seeding events reach subscribers first.
        schedule_end_of_day(self, 0);
        self.execute();

        let data_container = self.get_data_container_mut(SimulationPlugin);
        if let Some(error) = data_container.fatal_error.take() {
            return Err(error);
        }
        let last_day = data_container.last_day;
        let stop_reason = data_container.stop_reason.unwrap_or(StopReason::DayLimit);
        Ok(SimulationOutcome {
            series: self.get_daily_series(),
            final_states: self.collect_terminal_states(),
            last_day,
            stop_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::global_properties::ContextGlobalPropertiesExt;
    use crate::parameters::{InitialSituation, Parameters, Params};
    use crate::population::tests::add_people;
    use crate::population::HealthStatus;

    fn setup(people: u32, params: Params) -> Context {
        let mut context = Context::new();
        context.init_random(3);
        context
            .set_global_property_value(Parameters, params)
            .unwrap();
        add_people(&mut context, people);
        context
    }

    fn no_seeds() -> Params {
        Params {
            initial_situation: InitialSituation {
                infected: 0,
                hospitalized: 0,
            },
            ..Params::default()
        }
    }

    #[test]
    fn seeds_are_distinct() {
        let params = Params {
            initial_situation: InitialSituation {
                infected: 6,
                hospitalized: 4,
            },
            ..Params::default()
        };
        let mut context = setup(10, params);
        context.seed_population().unwrap();
        assert_eq!(context.get_cohorts().infected_count(), 10);
        assert_eq!(context.get_cohorts().hospitalized_count(), 4);
        context.verify_cohorts().unwrap();
    }

    #[test]
    fn too_many_seeds_is_configuration_error() {
        let mut context = setup(3, Params::default());
        assert!(matches!(
            context.seed_population(),
            Err(ContagionError::ConfigurationError { key, .. }) if key == "initial_situation"
        ));
    }

    #[test]
    fn no_infected_stops_at_day_zero() {
        let mut context = setup(5, no_seeds());
        let outcome = context.run_simulation().unwrap();
        assert_eq!(outcome.last_day, 0);
        assert_eq!(outcome.stop_reason, StopReason::NoInfected);
        assert_eq!(outcome.series.len(), 1);
        assert_eq!(outcome.final_states.len(), 5);
    }

    #[test]
    fn day_limit_stops_the_run() {
        let params = Params {
            simulation_duration: 3,
            ..no_seeds()
        };
        let mut context = setup(2, params);
        context.seed_infection(PersonId::new(1), 100).unwrap();
        let outcome = context.run_simulation().unwrap();
        assert_eq!(outcome.stop_reason, StopReason::DayLimit);
        assert_eq!(outcome.last_day, 3);
        assert_eq!(outcome.series.len(), 4);
        assert_eq!(
            context.get_individual(PersonId::new(1)).unwrap().days_remaining(),
            Some(97)
        );
    }

    #[test]
    fn recovery_ends_the_run() {
        let params = Params {
            hospitalization_probability: 0.0,
            ..no_seeds()
        };
        let mut context = setup(3, params);
        context.seed_infection(PersonId::new(1), 1).unwrap();
        let outcome = context.run_simulation().unwrap();
        assert_eq!(outcome.stop_reason, StopReason::NoInfected);
        assert_eq!(outcome.last_day, 2);
        let record = outcome.series.last().unwrap();
        assert_eq!(record.total_infected, 0);
        assert_eq!(record.new_recoveries, 1);
        assert_eq!(
            outcome.final_states[0].infection_immunity_day,
            Some(2)
        );
        assert_eq!(outcome.final_states[0].health, HealthStatus::Neutral);
    }

    #[test]
    fn fatal_error_skips_failing_day() {
        let mut context = setup(2, no_seeds());
        context.seed_infection(PersonId::new(1), 2).unwrap();
        // Cohort member that is still Neutral.
        context.get_cohorts_mut().add_infected(PersonId::new(2));
        let error = context.run_simulation().unwrap_err();
        assert!(matches!(
            error,
            ContagionError::RunAborted { day: 1, person_id: Some(id), .. } if id == PersonId::new(2)
        ));
        assert_eq!(context.get_daily_series().len(), 1);
    }

    #[test]
    fn second_run_is_rejected() {
        let mut context = setup(2, no_seeds());
        context.run_simulation().unwrap();
        assert!(context.run_simulation().is_err());
    }

    #[test]
    fn pool_holds_individuals_of_vaccinable_age() {
        let mut context = Context::new();
        context.init_random(3);
        context
            .set_global_property_value(Parameters, no_seeds())
            .unwrap();
        for (id, age) in [(1, 5), (2, 12), (3, 70)] {
            context
                .add_individual(crate::population::tests::record(id, age))
                .unwrap();
        }
        context.run_simulation().unwrap();
        let cohorts = context.get_cohorts();
        assert!(!cohorts.in_pool(PersonId::new(1)));
        assert!(cohorts.in_pool(PersonId::new(2)));
        assert!(cohorts.in_pool(PersonId::new(3)));
    }
}
