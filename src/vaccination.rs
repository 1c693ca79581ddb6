//! The vaccination allocator.
//!
//! A campaign starts on `Strategy::campaign_start_day`; campaign day 1 is that day. Each day the
//! dose schedule's national deliveries for the campaign day are scaled to the simulated
//! population and added to a per-vaccine balance. Doses are then handed out to a shuffled
//! snapshot of the not-yet-vaccinated pool, skipping anyone who is not `Neutral` or whom no open
//! eligibility clause admits. Unused doses carry over to the next day.
use std::collections::BTreeMap;

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::cohort::ContextCohortExt;
use crate::context::Context;
use crate::define_rng;
use crate::error::ContagionError;
use crate::parameters::ContextParametersExt;
use crate::population::{ContextPopulationExt, HealthStatus, Individual, VaccineType};
use crate::random::ContextRandomExt;

define_rng!(VaccinationRng);

/// Opens vaccination to a group from `activation_day` (campaign relative) onwards. Every
/// constraint that is present must hold.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EligibilityClause {
    pub activation_day: u32,
    pub min_age: Option<u32>,
    pub max_age: Option<u32>,
    pub occupations: Option<Vec<String>>,
    /// Upper bound on doses already received; `Some(0)` admits only the never vaccinated.
    /// `run_vaccination` offers doses to unvaccinated candidates only, so there it always
    /// holds; it applies when clauses are checked against arbitrary individuals.
    pub max_prior_doses: Option<u32>,
}

impl EligibilityClause {
    #[must_use]
    pub fn is_open(&self, campaign_day: u32) -> bool {
        self.activation_day <= campaign_day
    }

    #[must_use]
    pub fn matches(&self, individual: &Individual) -> bool {
        self.min_age.is_none_or(|min_age| individual.age >= min_age)
            && self.max_age.is_none_or(|max_age| individual.age <= max_age)
            && self.occupations.as_ref().is_none_or(|occupations| {
                individual
                    .occupation
                    .as_ref()
                    .is_some_and(|occupation| occupations.contains(occupation))
            })
            && self
                .max_prior_doses
                .is_none_or(|max_doses| individual.doses_received() <= max_doses)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Strategy {
    pub campaign_start_day: u32,
    /// Population the national dose counts refer to.
    pub reference_population_size: u64,
    pub clauses: Vec<EligibilityClause>,
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy {
            campaign_start_day: 1,
            reference_population_size: 67_813_396,
            clauses: Vec::new(),
        }
    }
}

impl Strategy {
    /// # Errors
    ///
    /// Returns `ConfigurationError` for a zero reference population or a clause whose age
    /// bounds are inverted.
    pub fn validate(&self) -> Result<(), ContagionError> {
        if self.reference_population_size == 0 {
            return Err(ContagionError::configuration(
                "strategy.reference_population_size",
                "must be positive",
            ));
        }
        for (index, clause) in self.clauses.iter().enumerate() {
            if let (Some(min_age), Some(max_age)) = (clause.min_age, clause.max_age) {
                if min_age > max_age {
                    return Err(ContagionError::configuration(
                        format!("strategy.clauses[{index}]"),
                        format!("min_age {min_age} is greater than max_age {max_age}"),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Campaign day for simulation `day`, or `None` before the campaign starts.
    #[must_use]
    pub fn campaign_day(&self, day: u32) -> Option<u32> {
        day.checked_sub(self.campaign_start_day)
            .map(|offset| offset + 1)
    }

    /// Whether any clause open on `campaign_day` admits `individual`.
    #[must_use]
    pub fn is_eligible(&self, individual: &Individual, campaign_day: u32) -> bool {
        self.clauses
            .iter()
            .any(|clause| clause.is_open(campaign_day) && clause.matches(individual))
    }

    /// National doses scaled to a population of `population_size`, rounded to nearest.
    #[must_use]
    pub fn scale_doses(&self, doses: u64, population_size: usize) -> u64 {
        let scaled =
            doses as f64 * population_size as f64 / self.reference_population_size as f64;
        scaled.round() as u64
    }
}

/// One delivery of the dose schedule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DoseScheduleEntry {
    pub day: u32,
    pub vaccine: VaccineType,
    pub doses: u64,
}

/// National deliveries indexed by campaign day.
#[derive(Clone, Debug, Default)]
pub struct DoseSchedule {
    by_day: BTreeMap<u32, Vec<(VaccineType, u64)>>,
}

impl DoseSchedule {
    #[must_use]
    pub fn new() -> Self {
        DoseSchedule::default()
    }

    pub fn add(&mut self, entry: DoseScheduleEntry) {
        self.by_day
            .entry(entry.day)
            .or_default()
            .push((entry.vaccine, entry.doses));
    }

    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = DoseScheduleEntry>) -> Self {
        let mut schedule = DoseSchedule::new();
        for entry in entries {
            schedule.add(entry);
        }
        schedule
    }

    /// Deliveries for `campaign_day`, in schedule order.
    #[must_use]
    pub fn get(&self, campaign_day: u32) -> &[(VaccineType, u64)] {
        self.by_day
            .get(&campaign_day)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_day.is_empty()
    }
}

/// Cumulative doses of one vaccine type.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DoseLedger {
    pub made_available: u64,
    pub administered: u64,
}

impl DoseLedger {
    /// Doses available but not yet given.
    #[must_use]
    pub fn balance(&self) -> u64 {
        self.made_available - self.administered
    }
}

#[derive(Default)]
struct VaccinationData {
    schedule: DoseSchedule,
    // Ordered by vaccine label so allocation order is stable.
    ledgers: BTreeMap<VaccineType, DoseLedger>,
}

crate::define_data_plugin!(
    VaccinationPlugin,
    VaccinationData,
    VaccinationData::default()
);

pub trait ContextVaccinationExt {
    fn set_dose_schedule(&mut self, schedule: DoseSchedule);

    /// Adds doses of `vaccine` to its balance.
    fn add_doses(&mut self, vaccine: &VaccineType, doses: u64);

    fn get_dose_balance(&self, vaccine: &VaccineType) -> u64;

    /// All ledgers, ordered by vaccine label.
    fn get_dose_ledgers(&self) -> Vec<(VaccineType, DoseLedger)>;

    /// Delivers the day's scheduled doses and allocates every available dose. Returns the number
    /// of individuals vaccinated.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if parameters are missing, or `RunAborted` naming the
    /// candidate whose vaccination could not be recorded.
    fn run_vaccination(&mut self, day: u32) -> Result<usize, ContagionError>;
}

impl ContextVaccinationExt for Context {
    fn set_dose_schedule(&mut self, schedule: DoseSchedule) {
        self.get_data_container_mut(VaccinationPlugin).schedule = schedule;
    }

    fn add_doses(&mut self, vaccine: &VaccineType, doses: u64) {
        self.get_data_container_mut(VaccinationPlugin)
            .ledgers
            .entry(vaccine.clone())
            .or_default()
            .made_available += doses;
    }

    fn get_dose_balance(&self, vaccine: &VaccineType) -> u64 {
        self.get_data_container(VaccinationPlugin)
            .and_then(|data| data.ledgers.get(vaccine))
            .map_or(0, DoseLedger::balance)
    }

    fn get_dose_ledgers(&self) -> Vec<(VaccineType, DoseLedger)> {
        self.get_data_container(VaccinationPlugin)
            .map(|data| {
                data.ledgers
                    .iter()
                    .map(|(vaccine, ledger)| (vaccine.clone(), *ledger))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn run_vaccination(&mut self, day: u32) -> Result<usize, ContagionError> {
        let strategy = self.get_params()?.strategy.clone();
        let Some(campaign_day) = strategy.campaign_day(day) else {
            return Ok(0);
        };

        let population_size = self.get_population_size();
        let deliveries = self
            .get_data_container(VaccinationPlugin)
            .map(|data| data.schedule.get(campaign_day).to_vec())
            .unwrap_or_default();
        for (vaccine, doses) in deliveries {
            let scaled = strategy.scale_doses(doses, population_size);
            debug!("day {day}: {scaled} doses of {vaccine} delivered ({doses} national)");
            self.add_doses(&vaccine, scaled);
        }

        let mut remaining: Vec<(VaccineType, u64)> = self
            .get_dose_ledgers()
            .into_iter()
            .map(|(vaccine, ledger)| (vaccine, ledger.balance()))
            .filter(|(_, balance)| *balance > 0)
            .collect();
        if remaining.is_empty() {
            return Ok(0);
        }

        let mut candidates = self.get_cohorts().pool_snapshot();
        self.shuffle(VaccinationRng, &mut candidates);
        let mut candidates = candidates.into_iter();

        let mut vaccinated = 0;
        for (vaccine, balance) in &mut remaining {
            while *balance > 0 {
                let Some(person_id) = candidates.next() else {
                    break;
                };
                let individual = self
                    .get_individual(person_id)
                    .map_err(|error| error.aborted(day, Some(person_id)))?;
                if individual.health() != HealthStatus::Neutral
                    || individual.vaccination().is_some()
                    || !strategy.is_eligible(individual, campaign_day)
                {
                    continue;
                }
                trace!("day {day}: vaccinating person {person_id} with {vaccine}");
                self.vaccinate(person_id, vaccine.clone(), day)
                    .map_err(|error| error.aborted(day, Some(person_id)))?;
                self.get_cohorts_mut().add_vaccinated(person_id);
                if let Some(ledger) = self
                    .get_data_container_mut(VaccinationPlugin)
                    .ledgers
                    .get_mut(vaccine)
                {
                    ledger.administered += 1;
                }
                *balance -= 1;
                vaccinated += 1;
            }
        }
        debug!("day {day}: vaccinated {vaccinated} individuals");
        Ok(vaccinated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::global_properties::ContextGlobalPropertiesExt;
    use crate::parameters::{Parameters, Params};
    use crate::population::tests::record;
    use crate::population::PersonId;

    fn clause(activation_day: u32) -> EligibilityClause {
        EligibilityClause {
            activation_day,
            ..EligibilityClause::default()
        }
    }

    fn setup(people: u32, strategy: Strategy) -> Context {
        let mut context = Context::new();
        context.init_random(42);
        context
            .set_global_property_value(
                Parameters,
                Params {
                    strategy,
                    ..Params::default()
                },
            )
            .unwrap();
        for id in 1..=people {
            let person_id = context.add_individual(record(id, 20 + id)).unwrap();
            context.get_cohorts_mut().add_to_pool(person_id);
        }
        context
    }

    fn open_strategy() -> Strategy {
        Strategy {
            campaign_start_day: 1,
            reference_population_size: 100,
            clauses: vec![clause(1)],
        }
    }

    #[test]
    fn clause_constraints() {
        let mut person = Individual::from_record(record(1, 70));
        let senior = EligibilityClause {
            min_age: Some(65),
            ..clause(1)
        };
        assert!(senior.matches(&person));
        person.age = 60;
        assert!(!senior.matches(&person));

        let nurses = EligibilityClause {
            occupations: Some(vec!["health".to_string()]),
            ..clause(1)
        };
        assert!(!nurses.matches(&person));
        person.occupation = Some("health".to_string());
        assert!(nurses.matches(&person));

        let no_repeat = EligibilityClause {
            max_prior_doses: Some(0),
            max_age: Some(60),
            ..clause(1)
        };
        assert!(no_repeat.matches(&person));

        let mut context = Context::new();
        let person_id = context.add_individual(record(1, 40)).unwrap();
        context
            .vaccinate(person_id, VaccineType::new("Pfizer"), 3)
            .unwrap();
        let vaccinated = context.get_individual(person_id).unwrap();
        assert!(!no_repeat.matches(vaccinated));
        let one_more = EligibilityClause {
            max_prior_doses: Some(1),
            ..no_repeat
        };
        assert!(one_more.matches(vaccinated));
    }

    #[test]
    fn clauses_accumulate_by_campaign_day() {
        let strategy = Strategy {
            clauses: vec![
                EligibilityClause {
                    min_age: Some(75),
                    ..clause(1)
                },
                EligibilityClause {
                    min_age: Some(50),
                    ..clause(10)
                },
            ],
            ..Strategy::default()
        };
        let person = Individual::from_record(record(1, 60));
        assert!(!strategy.is_eligible(&person, 9));
        assert!(strategy.is_eligible(&person, 10));
        assert!(strategy.is_eligible(&person, 30));
    }

    #[test]
    fn campaign_day_is_one_based() {
        let strategy = Strategy {
            campaign_start_day: 5,
            ..Strategy::default()
        };
        assert_eq!(strategy.campaign_day(4), None);
        assert_eq!(strategy.campaign_day(5), Some(1));
        assert_eq!(strategy.campaign_day(9), Some(5));
    }

    #[test]
    fn doses_are_scaled_and_rounded() {
        let strategy = Strategy {
            reference_population_size: 1000,
            ..Strategy::default()
        };
        assert_eq!(strategy.scale_doses(500, 10), 5);
        assert_eq!(strategy.scale_doses(150, 10), 2);
        assert_eq!(strategy.scale_doses(40, 10), 0);
    }

    #[test]
    fn inverted_clause_is_invalid() {
        let strategy = Strategy {
            clauses: vec![EligibilityClause {
                min_age: Some(80),
                max_age: Some(60),
                ..clause(1)
            }],
            ..Strategy::default()
        };
        assert!(strategy.validate().is_err());
    }

    #[test]
    fn five_doses_for_ten_candidates() {
        let mut context = setup(10, open_strategy());
        let vaccine = VaccineType::new("Pfizer");
        context.add_doses(&vaccine, 5);

        assert_eq!(context.run_vaccination(1).unwrap(), 5);
        assert_eq!(context.get_cohorts().vaccinated_count(), 5);
        assert_eq!(context.get_cohorts().pool_count(), 5);
        assert_eq!(context.get_dose_balance(&vaccine), 0);
        for person_id in context.get_cohorts().pool_snapshot() {
            assert!(context.get_individual(person_id).unwrap().vaccination().is_none());
        }
    }

    #[test]
    fn nothing_before_campaign_start() {
        let strategy = Strategy {
            campaign_start_day: 3,
            ..open_strategy()
        };
        let mut context = setup(4, strategy);
        context.add_doses(&VaccineType::new("Pfizer"), 4);
        assert_eq!(context.run_vaccination(2).unwrap(), 0);
        assert_eq!(context.run_vaccination(3).unwrap(), 4);
    }

    #[test]
    fn unused_doses_carry_over() {
        let mut context = setup(3, open_strategy());
        let vaccine = VaccineType::new("Moderna");
        context.set_dose_schedule(DoseSchedule::from_entries([DoseScheduleEntry {
            day: 1,
            vaccine: vaccine.clone(),
            doses: 500,
        }]));

        // 500 * 3 / 100 = 15 doses for 3 candidates.
        assert_eq!(context.run_vaccination(1).unwrap(), 3);
        assert_eq!(context.get_dose_balance(&vaccine), 12);
        let ledgers = context.get_dose_ledgers();
        assert_eq!(
            ledgers,
            vec![(
                vaccine.clone(),
                DoseLedger {
                    made_available: 15,
                    administered: 3
                }
            )]
        );

        context.add_individual(record(4, 30)).unwrap();
        context.get_cohorts_mut().add_to_pool(PersonId::new(4));
        assert_eq!(context.run_vaccination(2).unwrap(), 1);
        assert_eq!(context.get_dose_balance(&vaccine), 11);
    }

    #[test]
    fn only_neutral_eligible_candidates() {
        let strategy = Strategy {
            clauses: vec![EligibilityClause {
                min_age: Some(23),
                ..clause(1)
            }],
            ..open_strategy()
        };
        // Ages are 21, 22, 23, 24.
        let mut context = setup(4, strategy);
        context.infect(PersonId::new(4), 5, 0).unwrap();
        context.add_doses(&VaccineType::new("Pfizer"), 10);

        assert_eq!(context.run_vaccination(1).unwrap(), 1);
        assert!(context.get_cohorts().is_vaccinated(PersonId::new(3)));
        assert_eq!(context.get_dose_balance(&VaccineType::new("Pfizer")), 9);
    }

    #[test]
    fn vaccine_types_share_the_pool() {
        let mut context = setup(5, open_strategy());
        context.add_doses(&VaccineType::new("Moderna"), 2);
        context.add_doses(&VaccineType::new("Pfizer"), 2);
        assert_eq!(context.run_vaccination(1).unwrap(), 4);

        let mut counts = BTreeMap::new();
        for person_id in context.person_ids() {
            if let Some(record) = context.get_individual(person_id).unwrap().vaccination() {
                *counts.entry(record.vaccine.to_string()).or_insert(0) += 1;
            }
        }
        assert_eq!(counts.get("Moderna"), Some(&2));
        assert_eq!(counts.get("Pfizer"), Some(&2));
    }

    #[test]
    fn failed_candidate_is_named_in_error() {
        let mut context = setup(2, open_strategy());
        context.get_cohorts_mut().add_to_pool(PersonId::new(9));
        context.add_doses(&VaccineType::new("Pfizer"), 3);

        match context.run_vaccination(4) {
            Err(ContagionError::RunAborted {
                day,
                person_id,
                source,
            }) => {
                assert_eq!(day, 4);
                assert_eq!(person_id, Some(PersonId::new(9)));
                assert!(matches!(*source, ContagionError::InvalidPersonId(_)));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn allocation_is_reproducible() {
        let run = || {
            let mut context = setup(20, open_strategy());
            context.add_doses(&VaccineType::new("Pfizer"), 7);
            context.run_vaccination(1).unwrap();
            context.get_cohorts().pool_snapshot()
        };
        assert_eq!(run(), run());
    }
}
