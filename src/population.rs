//! Individuals and their health state.
//!
//! The population is a dense, 1-based list of `Individual`s stored in a data plugin. Static
//! attributes are fixed when an individual is added; the health state only changes through the
//! transition methods of `ContextPopulationExt`, each of which checks that the move is legal
//! from the current state and emits a `HealthStatusChangeEvent`.
use std::fmt::{self, Display};

use log::trace;
use serde::{Deserialize, Serialize};

use crate::context::{Context, Event};
use crate::error::ContagionError;

/// Stable identifier of an individual. Ids are dense and start at 1.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonId(u32);

impl PersonId {
    #[must_use]
    pub const fn new(id: u32) -> Self {
        PersonId(id)
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Position in the population vector, or `None` for the invalid id 0.
    pub(crate) fn index(self) -> Option<usize> {
        (self.0 as usize).checked_sub(1)
    }

    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn from_index(index: usize) -> Self {
        PersonId(index as u32 + 1)
    }
}

impl Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Female,
    Male,
}

/// The single health state machine: `Neutral -> Infected -> Hospitalized -> Deceased`, with
/// recovery from `Infected` or `Hospitalized` back to `Neutral`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthStatus {
    Neutral,
    Infected,
    Hospitalized,
    Deceased,
}

impl HealthStatus {
    /// Whether the state carries a countdown timer.
    #[must_use]
    pub fn is_timed(self) -> bool {
        matches!(self, HealthStatus::Infected | HealthStatus::Hospitalized)
    }
}

/// A vaccine label, as used in the dose schedule and the efficacy table.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VaccineType(String);

impl VaccineType {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        VaccineType(label.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for VaccineType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VaccinationRecord {
    pub vaccine: VaccineType,
    pub day: u32,
}

/// Static attributes of an individual, as produced by the population builder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndividualRecord {
    pub id: PersonId,
    pub age: u32,
    pub sex: Sex,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub occupation: Option<String>,
    pub hospitalization_risk: f64,
    pub death_risk: f64,
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|occupation| !occupation.trim().is_empty()))
}

#[derive(Clone, Debug)]
pub struct Individual {
    pub id: PersonId,
    pub age: u32,
    pub sex: Sex,
    pub occupation: Option<String>,
    pub hospitalization_risk: f64,
    pub death_risk: f64,
    health: HealthStatus,
    days_remaining: Option<u32>,
    vaccination: Option<VaccinationRecord>,
    doses_received: u32,
    infection_immunity_day: Option<u32>,
    death_day: Option<u32>,
}

impl Individual {
    pub(crate) fn from_record(record: IndividualRecord) -> Self {
        Individual {
            id: record.id,
            age: record.age,
            sex: record.sex,
            occupation: record.occupation,
            hospitalization_risk: record.hospitalization_risk,
            death_risk: record.death_risk,
            health: HealthStatus::Neutral,
            days_remaining: None,
            vaccination: None,
            doses_received: 0,
            infection_immunity_day: None,
            death_day: None,
        }
    }

    #[must_use]
    pub fn health(&self) -> HealthStatus {
        self.health
    }

    #[must_use]
    pub fn days_remaining(&self) -> Option<u32> {
        self.days_remaining
    }

    #[must_use]
    pub fn vaccination(&self) -> Option<&VaccinationRecord> {
        self.vaccination.as_ref()
    }

    #[must_use]
    pub fn doses_received(&self) -> u32 {
        self.doses_received
    }

    /// Day of the last recovery, if any.
    #[must_use]
    pub fn infection_immunity_day(&self) -> Option<u32> {
        self.infection_immunity_day
    }

    #[must_use]
    pub fn death_day(&self) -> Option<u32> {
        self.death_day
    }

    fn invalid_state(&self) -> ContagionError {
        ContagionError::InvalidStateError {
            person_id: self.id,
            status: self.health,
            days_remaining: self.days_remaining,
        }
    }

    /// Checks that the timer is present exactly when the state is timed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateError` describing the inconsistent individual.
    pub fn check_consistency(&self) -> Result<(), ContagionError> {
        if self.health.is_timed() == self.days_remaining.is_some() {
            Ok(())
        } else {
            Err(self.invalid_state())
        }
    }
}

/// Emitted whenever an individual's `HealthStatus` changes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HealthStatusChangeEvent {
    pub person_id: PersonId,
    pub previous: HealthStatus,
    pub current: HealthStatus,
    pub day: u32,
}
impl Event for HealthStatusChangeEvent {}

#[derive(Default)]
struct PopulationData {
    individuals: Vec<Individual>,
}

impl PopulationData {
    fn get(&self, person_id: PersonId) -> Result<&Individual, ContagionError> {
        person_id
            .index()
            .and_then(|index| self.individuals.get(index))
            .ok_or(ContagionError::InvalidPersonId(person_id))
    }

    fn get_mut(&mut self, person_id: PersonId) -> Result<&mut Individual, ContagionError> {
        person_id
            .index()
            .and_then(|index| self.individuals.get_mut(index))
            .ok_or(ContagionError::InvalidPersonId(person_id))
    }
}

crate::define_data_plugin!(PopulationPlugin, PopulationData, PopulationData::default());

pub trait ContextPopulationExt {
    /// Adds an individual. Ids must be added densely in order, starting at 1.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the id is not the next one or a risk multiplier is negative
    /// or not finite.
    fn add_individual(&mut self, record: IndividualRecord) -> Result<PersonId, ContagionError>;

    fn get_population_size(&self) -> usize;

    /// All ids in ascending order.
    fn person_ids(&self) -> impl Iterator<Item = PersonId>;

    /// # Errors
    ///
    /// Returns `InvalidPersonId` if no such individual exists.
    fn get_individual(&self, person_id: PersonId) -> Result<&Individual, ContagionError>;

    /// Moves a `Neutral` individual to `Infected` with `days` on the timer.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateError` if the individual is not `Neutral`.
    fn infect(&mut self, person_id: PersonId, days: u32, day: u32) -> Result<(), ContagionError>;

    /// Moves a `Neutral` or `Infected` individual to `Hospitalized` with `days` on the timer.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateError` from any other state.
    fn hospitalize(&mut self, person_id: PersonId, days: u32, day: u32)
        -> Result<(), ContagionError>;

    /// Returns an `Infected` or `Hospitalized` individual to `Neutral` and records `day` as the
    /// start of infection-acquired immunity.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateError` from any other state.
    fn recover(&mut self, person_id: PersonId, day: u32) -> Result<(), ContagionError>;

    /// Moves a `Hospitalized` individual to `Deceased`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateError` from any other state.
    fn kill(&mut self, person_id: PersonId, day: u32) -> Result<(), ContagionError>;

    /// Decrements a positive timer and returns the new value.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateError` if the timer is absent or already zero.
    fn decrement_timer(&mut self, person_id: PersonId) -> Result<u32, ContagionError>;

    /// Records a dose. Vaccination does not change the health state.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateError` if the individual is `Deceased`.
    fn vaccinate(
        &mut self,
        person_id: PersonId,
        vaccine: VaccineType,
        day: u32,
    ) -> Result<(), ContagionError>;
}

fn set_health(
    context: &mut Context,
    person_id: PersonId,
    day: u32,
    allowed: &[HealthStatus],
    update: impl FnOnce(&mut Individual),
) -> Result<(), ContagionError> {
    let individual = context
        .get_data_container_mut(PopulationPlugin)
        .get_mut(person_id)?;
    let previous = individual.health;
    if !allowed.contains(&previous) {
        return Err(individual.invalid_state());
    }
    update(individual);
    let current = individual.health;
    trace!("person {person_id}: {previous:?} -> {current:?} on day {day}");
    context.emit_event(HealthStatusChangeEvent {
        person_id,
        previous,
        current,
        day,
    });
    Ok(())
}

impl ContextPopulationExt for Context {
    fn add_individual(&mut self, record: IndividualRecord) -> Result<PersonId, ContagionError> {
        let data_container = self.get_data_container_mut(PopulationPlugin);
        let expected = data_container.individuals.len() + 1;
        if record.id.get() as usize != expected {
            return Err(ContagionError::configuration(
                format!("population id {}", record.id),
                format!("ids must be dense and start at 1, expected {expected}"),
            ));
        }
        for (name, value) in [
            ("hospitalization_risk", record.hospitalization_risk),
            ("death_risk", record.death_risk),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ContagionError::configuration(
                    format!("{name} of person {}", record.id),
                    format!("must be a non-negative number, got {value}"),
                ));
            }
        }
        let person_id = record.id;
        data_container
            .individuals
            .push(Individual::from_record(record));
        Ok(person_id)
    }

    fn get_population_size(&self) -> usize {
        self.get_data_container(PopulationPlugin)
            .map_or(0, |data| data.individuals.len())
    }

    fn person_ids(&self) -> impl Iterator<Item = PersonId> {
        let size = u32::try_from(self.get_population_size()).unwrap_or(u32::MAX);
        (1..=size).map(PersonId::new)
    }

    fn get_individual(&self, person_id: PersonId) -> Result<&Individual, ContagionError> {
        self.get_data_container(PopulationPlugin)
            .ok_or(ContagionError::InvalidPersonId(person_id))?
            .get(person_id)
    }

    fn infect(&mut self, person_id: PersonId, days: u32, day: u32) -> Result<(), ContagionError> {
        set_health(self, person_id, day, &[HealthStatus::Neutral], |individual| {
            individual.health = HealthStatus::Infected;
            individual.days_remaining = Some(days);
        })
    }

    fn hospitalize(
        &mut self,
        person_id: PersonId,
        days: u32,
        day: u32,
    ) -> Result<(), ContagionError> {
        set_health(
            self,
            person_id,
            day,
            &[HealthStatus::Neutral, HealthStatus::Infected],
            |individual| {
                individual.health = HealthStatus::Hospitalized;
                individual.days_remaining = Some(days);
            },
        )
    }

    fn recover(&mut self, person_id: PersonId, day: u32) -> Result<(), ContagionError> {
        set_health(
            self,
            person_id,
            day,
            &[HealthStatus::Infected, HealthStatus::Hospitalized],
            |individual| {
                individual.health = HealthStatus::Neutral;
                individual.days_remaining = None;
                individual.infection_immunity_day = Some(day);
            },
        )
    }

    fn kill(&mut self, person_id: PersonId, day: u32) -> Result<(), ContagionError> {
        set_health(
            self,
            person_id,
            day,
            &[HealthStatus::Hospitalized],
            |individual| {
                individual.health = HealthStatus::Deceased;
                individual.days_remaining = None;
                individual.death_day = Some(day);
            },
        )
    }

    fn decrement_timer(&mut self, person_id: PersonId) -> Result<u32, ContagionError> {
        let individual = self
            .get_data_container_mut(PopulationPlugin)
            .get_mut(person_id)?;
        match individual.days_remaining {
            Some(days) if days > 0 && individual.health.is_timed() => {
                individual.days_remaining = Some(days - 1);
                Ok(days - 1)
            }
            _ => Err(individual.invalid_state()),
        }
    }

    fn vaccinate(
        &mut self,
        person_id: PersonId,
        vaccine: VaccineType,
        day: u32,
    ) -> Result<(), ContagionError> {
        let individual = self
            .get_data_container_mut(PopulationPlugin)
            .get_mut(person_id)?;
        if individual.health == HealthStatus::Deceased {
            return Err(individual.invalid_state());
        }
        trace!("person {person_id}: vaccinated with {vaccine} on day {day}");
        individual.vaccination = Some(VaccinationRecord { vaccine, day });
        individual.doses_received += 1;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    pub(crate) fn record(id: u32, age: u32) -> IndividualRecord {
        IndividualRecord {
            id: PersonId::new(id),
            age,
            sex: Sex::Female,
            occupation: None,
            hospitalization_risk: 1.0,
            death_risk: 1.0,
        }
    }

    pub(crate) fn add_people(context: &mut Context, count: u32) {
        for id in 1..=count {
            context.add_individual(record(id, 40)).unwrap();
        }
    }

    #[test]
    fn ids_are_dense_from_one() {
        let mut context = Context::new();
        assert_eq!(context.get_population_size(), 0);
        add_people(&mut context, 3);
        assert_eq!(context.get_population_size(), 3);
        assert_eq!(
            context.person_ids().collect::<Vec<_>>(),
            vec![PersonId::new(1), PersonId::new(2), PersonId::new(3)]
        );
        let result = context.add_individual(record(5, 40));
        assert!(matches!(
            result,
            Err(ContagionError::ConfigurationError { .. })
        ));
    }

    #[test]
    fn negative_risk_is_rejected() {
        let mut context = Context::new();
        let mut bad = record(1, 40);
        bad.death_risk = -1.0;
        assert!(context.add_individual(bad).is_err());
    }

    #[test]
    fn unknown_ids_are_errors() {
        let mut context = Context::new();
        add_people(&mut context, 2);
        assert!(matches!(
            context.get_individual(PersonId::new(0)),
            Err(ContagionError::InvalidPersonId(_))
        ));
        assert!(matches!(
            context.get_individual(PersonId::new(3)),
            Err(ContagionError::InvalidPersonId(_))
        ));
    }

    #[test]
    fn full_course_to_death() {
        let mut context = Context::new();
        add_people(&mut context, 1);
        let person = PersonId::new(1);

        context.infect(person, 2, 0).unwrap();
        assert_eq!(context.decrement_timer(person).unwrap(), 1);
        assert_eq!(context.decrement_timer(person).unwrap(), 0);
        assert!(matches!(
            context.decrement_timer(person),
            Err(ContagionError::InvalidStateError { .. })
        ));

        context.hospitalize(person, 1, 3).unwrap();
        let individual = context.get_individual(person).unwrap();
        assert_eq!(individual.health(), HealthStatus::Hospitalized);
        assert_eq!(individual.days_remaining(), Some(1));

        context.kill(person, 5).unwrap();
        let individual = context.get_individual(person).unwrap();
        assert_eq!(individual.health(), HealthStatus::Deceased);
        assert_eq!(individual.days_remaining(), None);
        assert_eq!(individual.death_day(), Some(5));
        individual.check_consistency().unwrap();
    }

    #[test]
    fn recovery_records_immunity_day() {
        let mut context = Context::new();
        add_people(&mut context, 1);
        let person = PersonId::new(1);
        context.infect(person, 0, 0).unwrap();
        context.recover(person, 4).unwrap();
        let individual = context.get_individual(person).unwrap();
        assert_eq!(individual.health(), HealthStatus::Neutral);
        assert_eq!(individual.infection_immunity_day(), Some(4));
        assert_eq!(individual.days_remaining(), None);
    }

    #[test]
    fn illegal_transitions_are_invalid_state() {
        let mut context = Context::new();
        add_people(&mut context, 1);
        let person = PersonId::new(1);
        assert!(matches!(
            context.recover(person, 1),
            Err(ContagionError::InvalidStateError {
                status: HealthStatus::Neutral,
                ..
            })
        ));
        assert!(context.kill(person, 1).is_err());
        assert!(context.decrement_timer(person).is_err());

        context.hospitalize(person, 3, 0).unwrap();
        context.kill(person, 4).unwrap_err();
        context.recover(person, 1).unwrap();
        context.hospitalize(person, 1, 2).unwrap();
        context.kill(person, 3).unwrap();
        assert!(context.infect(person, 3, 4).is_err());
        assert!(context.recover(person, 4).is_err());
        assert!(context
            .vaccinate(person, VaccineType::new("Pfizer"), 4)
            .is_err());
    }

    #[test]
    fn vaccination_keeps_health_state() {
        let mut context = Context::new();
        add_people(&mut context, 1);
        let person = PersonId::new(1);
        context
            .vaccinate(person, VaccineType::new("Moderna"), 10)
            .unwrap();
        let individual = context.get_individual(person).unwrap();
        assert_eq!(individual.health(), HealthStatus::Neutral);
        assert_eq!(individual.doses_received(), 1);
        assert_eq!(
            individual.vaccination(),
            Some(&VaccinationRecord {
                vaccine: VaccineType::new("Moderna"),
                day: 10
            })
        );
    }

    #[test]
    fn changes_emit_events() {
        let mut context = Context::new();
        add_people(&mut context, 1);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        context.subscribe_to_event(move |_context, event: HealthStatusChangeEvent| {
            sink.borrow_mut()
                .push((event.previous, event.current, event.day));
        });
        let person = PersonId::new(1);
        context.infect(person, 1, 0).unwrap();
        context.recover(person, 2).unwrap();
        context.execute();
        assert_eq!(
            *seen.borrow(),
            vec![
                (HealthStatus::Neutral, HealthStatus::Infected, 0),
                (HealthStatus::Infected, HealthStatus::Neutral, 2),
            ]
        );
    }
}
