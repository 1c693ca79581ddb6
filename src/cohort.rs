//! Cohort bookkeeping.
//!
//! The simulation keeps running membership lists instead of scanning the whole population each
//! day: infected (which includes the hospitalized), hospitalized, deceased, vaccinated, and the
//! pool of individuals old enough to be vaccinated who have not been yet. Sets are insertion
//! ordered so that iteration, and therefore the sequence of random draws, is reproducible.
//!
//! Phases never iterate a live set. They take a snapshot with one of the `*_snapshot` methods
//! and apply changes to the live sets as they go.
use std::sync::LazyLock;

use indexmap::IndexSet;
use log::debug;
use rustc_hash::FxBuildHasher;

use crate::context::Context;
use crate::error::ContagionError;
use crate::population::{ContextPopulationExt, HealthStatus, PersonId};

type CohortSet = IndexSet<PersonId, FxBuildHasher>;

#[derive(Debug, Default)]
pub struct Cohorts {
    infected: CohortSet,
    hospitalized: CohortSet,
    deceased: CohortSet,
    vaccinated: CohortSet,
    unvaccinated_pool: CohortSet,
}

static EMPTY_COHORTS: LazyLock<Cohorts> = LazyLock::new(Cohorts::default);

impl Cohorts {
    pub fn add_infected(&mut self, person_id: PersonId) {
        self.infected.insert(person_id);
    }

    /// Hospitalized individuals are also members of the infected cohort.
    pub fn add_hospitalized(&mut self, person_id: PersonId) {
        self.infected.insert(person_id);
        self.hospitalized.insert(person_id);
    }

    pub fn remove_recovered(&mut self, person_id: PersonId) {
        self.infected.shift_remove(&person_id);
        self.hospitalized.shift_remove(&person_id);
    }

    /// Moves an individual to the deceased cohort and out of every active one. The vaccinated
    /// cohort is a cumulative count and keeps them.
    pub fn add_deceased(&mut self, person_id: PersonId) {
        self.remove_recovered(person_id);
        self.unvaccinated_pool.shift_remove(&person_id);
        self.deceased.insert(person_id);
    }

    pub fn add_to_pool(&mut self, person_id: PersonId) {
        self.unvaccinated_pool.insert(person_id);
    }

    pub fn add_vaccinated(&mut self, person_id: PersonId) {
        self.unvaccinated_pool.shift_remove(&person_id);
        self.vaccinated.insert(person_id);
    }

    #[must_use]
    pub fn infected_count(&self) -> usize {
        self.infected.len()
    }

    #[must_use]
    pub fn hospitalized_count(&self) -> usize {
        self.hospitalized.len()
    }

    #[must_use]
    pub fn deceased_count(&self) -> usize {
        self.deceased.len()
    }

    #[must_use]
    pub fn vaccinated_count(&self) -> usize {
        self.vaccinated.len()
    }

    #[must_use]
    pub fn pool_count(&self) -> usize {
        self.unvaccinated_pool.len()
    }

    #[must_use]
    pub fn is_infected(&self, person_id: PersonId) -> bool {
        self.infected.contains(&person_id)
    }

    #[must_use]
    pub fn is_hospitalized(&self, person_id: PersonId) -> bool {
        self.hospitalized.contains(&person_id)
    }

    #[must_use]
    pub fn is_deceased(&self, person_id: PersonId) -> bool {
        self.deceased.contains(&person_id)
    }

    #[must_use]
    pub fn is_vaccinated(&self, person_id: PersonId) -> bool {
        self.vaccinated.contains(&person_id)
    }

    #[must_use]
    pub fn in_pool(&self, person_id: PersonId) -> bool {
        self.unvaccinated_pool.contains(&person_id)
    }

    #[must_use]
    pub fn hospitalized_snapshot(&self) -> Vec<PersonId> {
        self.hospitalized.iter().copied().collect()
    }

    /// Infected members that are not hospitalized.
    #[must_use]
    pub fn infected_snapshot(&self) -> Vec<PersonId> {
        self.infected
            .iter()
            .copied()
            .filter(|person_id| !self.hospitalized.contains(person_id))
            .collect()
    }

    #[must_use]
    pub fn pool_snapshot(&self) -> Vec<PersonId> {
        self.unvaccinated_pool.iter().copied().collect()
    }
}

crate::define_data_plugin!(CohortPlugin, Cohorts, Cohorts::default());

pub trait ContextCohortExt {
    fn get_cohorts(&self) -> &Cohorts;

    fn get_cohorts_mut(&mut self) -> &mut Cohorts;

    /// Checks that the cohorts agree with every individual's health state, so that
    /// {Neutral, Infected, Hospitalized, Deceased} partition the population.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateError` for the first individual whose membership does not match.
    fn verify_cohorts(&self) -> Result<(), ContagionError>;
}

impl ContextCohortExt for Context {
    fn get_cohorts(&self) -> &Cohorts {
        self.get_data_container(CohortPlugin)
            .unwrap_or(&EMPTY_COHORTS)
    }

    fn get_cohorts_mut(&mut self) -> &mut Cohorts {
        self.get_data_container_mut(CohortPlugin)
    }

    fn verify_cohorts(&self) -> Result<(), ContagionError> {
        let cohorts = self.get_cohorts();
        let mut counted = 0;
        for person_id in self.person_ids() {
            let individual = self.get_individual(person_id)?;
            individual.check_consistency()?;
            let membership = (
                cohorts.is_infected(person_id),
                cohorts.is_hospitalized(person_id),
                cohorts.is_deceased(person_id),
            );
            let expected = match individual.health() {
                HealthStatus::Neutral => (false, false, false),
                HealthStatus::Infected => (true, false, false),
                HealthStatus::Hospitalized => (true, true, false),
                HealthStatus::Deceased => (false, false, true),
            };
            if membership != expected
                || (individual.health() == HealthStatus::Deceased && cohorts.in_pool(person_id))
            {
                return Err(ContagionError::InvalidStateError {
                    person_id,
                    status: individual.health(),
                    days_remaining: individual.days_remaining(),
                });
            }
            counted += 1;
        }
        debug!("verified cohorts for {counted} individuals");
        Ok(())
    }
}
