//! Transmission along the contact network.
//!
//! An infectious individual attempts one infection per neighbor per day. The chance of success
//! falls off with distance:
//!
//! ```text
//! p = transmission_probability x multiplier / max(distance x distance_coefficient, distance_floor)
//! ```
//!
//! where the multiplier is the neighbor's immunity multiplier for transmission.
use log::trace;

use crate::cohort::ContextCohortExt;
use crate::context::Context;
use crate::define_rng;
use crate::error::ContagionError;
use crate::immunity::{ContextImmunityExt, OutcomeType};
use crate::network::{ContextNetworkExt, Neighbor};
use crate::parameters::ContextParametersExt;
use crate::population::{ContextPopulationExt, HealthStatus, PersonId};
use crate::statistics::ContextStatisticsExt;
use crate::transition::{draw_event, sample_duration};

define_rng!(TransmissionRng);

/// Divisor applied to the base transmission probability for a contact at `distance`.
#[must_use]
pub fn distance_divisor(distance: f64, coefficient: f64, floor: f64) -> f64 {
    (distance * coefficient).max(floor)
}

fn try_infect(
    context: &mut Context,
    infector: PersonId,
    neighbor: &Neighbor,
    day: u32,
) -> Result<bool, ContagionError> {
    // Earlier contacts today may already have infected this neighbor.
    if context.get_individual(neighbor.neighbor)?.health() != HealthStatus::Neutral {
        return Ok(false);
    }

    let params = context.get_params()?;
    let divisor = distance_divisor(
        neighbor.distance,
        params.distance_coefficient,
        params.distance_floor,
    );
    let base = params.transmission_probability;
    let duration = params.infection_duration;
    let multiplier =
        context.get_immunity_multiplier(neighbor.neighbor, day, OutcomeType::Transmission)?;
    if !draw_event(
        context,
        TransmissionRng,
        "transmission_probability",
        base * multiplier / divisor,
    )? {
        return Ok(false);
    }

    let days = sample_duration(context, TransmissionRng, &duration, "infection_duration")?;
    trace!(
        "day {day}: person {infector} infected person {} for {days} days",
        neighbor.neighbor
    );
    context.infect(neighbor.neighbor, days, day)?;
    context.get_cohorts_mut().add_infected(neighbor.neighbor);
    context.get_counters_mut().new_infections += 1;
    Ok(true)
}

pub trait ContextPropagationExt {
    /// Gives every neutral neighbor of `infector` one chance to be infected on `day`. Returns the
    /// number of new infections.
    ///
    /// # Errors
    ///
    /// Returns `RunAborted` carrying the neighbor being processed, or the error of a failed
    /// lookup of `infector` itself.
    fn propagate_from(&mut self, infector: PersonId, day: u32) -> Result<usize, ContagionError>;
}

impl ContextPropagationExt for Context {
    fn propagate_from(&mut self, infector: PersonId, day: u32) -> Result<usize, ContagionError> {
        self.get_individual(infector)?;
        let neighbors = self.get_neighbors(infector).to_vec();
        let mut infected = 0;
        for neighbor in &neighbors {
            if try_infect(self, infector, neighbor, day)
                .map_err(|error| error.aborted(day, Some(neighbor.neighbor)))?
            {
                infected += 1;
            }
        }
        Ok(infected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use crate::global_properties::ContextGlobalPropertiesExt;
    use crate::immunity::tests::row;
    use crate::immunity::EfficacyTable;
    use crate::parameters::{Parameters, Params};
    use crate::population::tests::add_people;
    use crate::population::VaccineType;
    use crate::random::ContextRandomExt;

    fn pid(id: u32) -> PersonId {
        PersonId::new(id)
    }

    fn setup(people: u32, params: Params) -> Context {
        let mut context = Context::new();
        context.init_random(21);
        context
            .set_global_property_value(Parameters, params)
            .unwrap();
        add_people(&mut context, people);
        context
    }

    fn certain() -> Params {
        Params {
            transmission_probability: 1.0,
            distance_floor: 1.0,
            ..Params::default()
        }
    }

    #[test]
    fn divisor_uses_floor() {
        assert_approx_eq!(distance_divisor(0.0, 1.0, 0.2), 0.2);
        assert_approx_eq!(distance_divisor(3.0, 2.0, 0.2), 6.0);
    }

    #[test]
    fn certain_transmission_infects_every_neutral_neighbor() {
        let mut context = setup(4, certain());
        context.infect(pid(1), 5, 0).unwrap();
        context.get_cohorts_mut().add_infected(pid(1));
        for id in 2..=4 {
            context.add_neighbor_bidi(pid(1), pid(id), 0.5).unwrap();
        }
        context.kill_for_test(pid(4));

        assert_eq!(context.propagate_from(pid(1), 1).unwrap(), 2);
        for id in 2..=3 {
            let individual = context.get_individual(pid(id)).unwrap();
            assert_eq!(individual.health(), HealthStatus::Infected);
            assert!(context.get_cohorts().is_infected(pid(id)));
        }
        assert_eq!(
            context.get_individual(pid(4)).unwrap().health(),
            HealthStatus::Deceased
        );
        assert_eq!(context.get_counters().new_infections, 2);
    }

    #[test]
    fn neighbor_is_infected_at_most_once_per_day() {
        let mut context = setup(3, certain());
        for id in 1..=2 {
            context.infect(pid(id), 5, 0).unwrap();
            context.get_cohorts_mut().add_infected(pid(id));
            context.add_neighbor_bidi(pid(id), pid(3), 0.1).unwrap();
        }
        assert_eq!(context.propagate_from(pid(1), 1).unwrap(), 1);
        assert_eq!(context.propagate_from(pid(2), 1).unwrap(), 0);
        assert_eq!(context.get_counters().new_infections, 1);
    }

    #[test]
    fn zero_probability_never_infects() {
        let params = Params {
            transmission_probability: 0.0,
            ..Params::default()
        };
        let mut context = setup(10, params);
        context.infect(pid(1), 5, 0).unwrap();
        for id in 2..=10 {
            context.add_neighbor(pid(1), pid(id), 0.0).unwrap();
        }
        for day in 1..=20 {
            assert_eq!(context.propagate_from(pid(1), day).unwrap(), 0);
        }
    }

    #[test]
    fn fully_effective_vaccine_blocks_transmission() {
        let mut context = setup(2, certain());
        context.set_efficacy_lookup(
            EfficacyTable::from_rows([row("Pfizer", OutcomeType::Transmission, 1.0)]).unwrap(),
        );
        context
            .vaccinate(pid(2), VaccineType::new("Pfizer"), 0)
            .unwrap();
        context.infect(pid(1), 5, 0).unwrap();
        context.add_neighbor(pid(1), pid(2), 0.0).unwrap();
        assert_eq!(context.propagate_from(pid(1), 10).unwrap(), 0);
    }

    #[test]
    fn missing_efficacy_row_aborts_with_neighbor() {
        let mut context = setup(2, certain());
        context
            .vaccinate(pid(2), VaccineType::new("Moderna"), 0)
            .unwrap();
        context.infect(pid(1), 5, 0).unwrap();
        context.add_neighbor(pid(1), pid(2), 0.0).unwrap();
        let error = context.propagate_from(pid(1), 3).unwrap_err();
        assert!(matches!(
            error,
            ContagionError::RunAborted { day: 3, person_id: Some(id), .. } if id == pid(2)
        ));
        assert!(matches!(
            error.root_cause(),
            ContagionError::ConfigurationError { .. }
        ));
    }

    trait KillForTest {
        fn kill_for_test(&mut self, person_id: PersonId);
    }

    impl KillForTest for Context {
        fn kill_for_test(&mut self, person_id: PersonId) {
            self.hospitalize(person_id, 0, 0).unwrap();
            self.kill(person_id, 0).unwrap();
            self.get_cohorts_mut().add_deceased(person_id);
        }
    }
}
