//! Daily statistics.
//!
//! During a day the engine increments `DailyCounters`. At the end of the day `record_day` turns
//! the counters and the current cohort sizes into one `DailyRecord`, appends it to the series
//! and resets the counters. The series is append-only and starts with the day 0 record of the
//! seeded situation. Derived series such as the healthy count are computed on demand.
use log::info;
use serde::{Deserialize, Serialize};

use crate::cohort::ContextCohortExt;
use crate::context::Context;
use crate::population::{ContextPopulationExt, HealthStatus, PersonId, VaccineType};

/// New events counted during the current day.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DailyCounters {
    pub new_infections: usize,
    pub new_hospitalizations: usize,
    pub new_deaths: usize,
    pub new_recoveries: usize,
}

/// One row of the per-day series.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub day: u32,
    /// Includes the hospitalized.
    pub total_infected: usize,
    pub total_hospitalized: usize,
    pub total_deceased: usize,
    pub total_vaccinated: usize,
    pub new_infections: usize,
    pub new_hospitalizations: usize,
    pub new_deaths: usize,
    pub new_recoveries: usize,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DailySeries {
    population_size: usize,
    records: Vec<DailyRecord>,
}

impl DailySeries {
    #[must_use]
    pub fn records(&self) -> &[DailyRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn get(&self, day: u32) -> Option<&DailyRecord> {
        self.records.iter().find(|record| record.day == day)
    }

    #[must_use]
    pub fn last(&self) -> Option<&DailyRecord> {
        self.records.last()
    }

    #[must_use]
    pub fn population_size(&self) -> usize {
        self.population_size
    }

    /// Individuals neither infected nor deceased, per day.
    #[must_use]
    pub fn healthy(&self) -> Vec<usize> {
        self.records
            .iter()
            .map(|record| {
                self.population_size
                    .saturating_sub(record.total_infected)
                    .saturating_sub(record.total_deceased)
            })
            .collect()
    }

    #[must_use]
    pub fn total_infected(&self) -> Vec<usize> {
        self.records.iter().map(|record| record.total_infected).collect()
    }

    #[must_use]
    pub fn new_infections(&self) -> Vec<usize> {
        self.records.iter().map(|record| record.new_infections).collect()
    }

    /// Sum of new infections over all recorded days.
    #[must_use]
    pub fn cumulative_infections(&self) -> usize {
        self.records.iter().map(|record| record.new_infections).sum()
    }
}

/// Final state of one individual.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TerminalState {
    pub person_id: PersonId,
    pub health: HealthStatus,
    pub vaccine: Option<VaccineType>,
    pub vaccination_day: Option<u32>,
    pub infection_immunity_day: Option<u32>,
    pub death_day: Option<u32>,
}

#[derive(Default)]
struct StatisticsData {
    today: DailyCounters,
    series: DailySeries,
}

crate::define_data_plugin!(StatisticsPlugin, StatisticsData, StatisticsData::default());

pub trait ContextStatisticsExt {
    fn get_counters_mut(&mut self) -> &mut DailyCounters;

    fn get_counters(&self) -> DailyCounters;

    /// Appends the record for `day` from the current cohorts and counters, then resets the
    /// counters.
    fn record_day(&mut self, day: u32) -> DailyRecord;

    fn get_daily_series(&self) -> DailySeries;

    fn collect_terminal_states(&self) -> Vec<TerminalState>;
}

impl ContextStatisticsExt for Context {
    fn get_counters_mut(&mut self) -> &mut DailyCounters {
        &mut self.get_data_container_mut(StatisticsPlugin).today
    }

    fn get_counters(&self) -> DailyCounters {
        self.get_data_container(StatisticsPlugin)
            .map(|data| data.today)
            .unwrap_or_default()
    }

    fn record_day(&mut self, day: u32) -> DailyRecord {
        let population_size = self.get_population_size();
        let cohorts = self.get_cohorts();
        let (total_infected, total_hospitalized, total_deceased, total_vaccinated) = (
            cohorts.infected_count(),
            cohorts.hospitalized_count(),
            cohorts.deceased_count(),
            cohorts.vaccinated_count(),
        );

        let data_container = self.get_data_container_mut(StatisticsPlugin);
        let today = std::mem::take(&mut data_container.today);
        let record = DailyRecord {
            day,
            total_infected,
            total_hospitalized,
            total_deceased,
            total_vaccinated,
            new_infections: today.new_infections,
            new_hospitalizations: today.new_hospitalizations,
            new_deaths: today.new_deaths,
            new_recoveries: today.new_recoveries,
        };
        data_container.series.population_size = population_size;
        data_container.series.records.push(record);

        info!(
            "Day {day}: infected {total_infected}, hospitalized {total_hospitalized}, \
             deceased {total_deceased}, vaccinated {total_vaccinated}"
        );
        record
    }

    fn get_daily_series(&self) -> DailySeries {
        self.get_data_container(StatisticsPlugin)
            .map(|data| data.series.clone())
            .unwrap_or_default()
    }

    fn collect_terminal_states(&self) -> Vec<TerminalState> {
        self.person_ids()
            .filter_map(|person_id| self.get_individual(person_id).ok())
            .map(|individual| TerminalState {
                person_id: individual.id,
                health: individual.health(),
                vaccine: individual
                    .vaccination()
                    .map(|record| record.vaccine.clone()),
                vaccination_day: individual.vaccination().map(|record| record.day),
                infection_immunity_day: individual.infection_immunity_day(),
                death_day: individual.death_day(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::tests::add_people;

    #[test]
    fn record_resets_counters() {
        let mut context = Context::new();
        add_people(&mut context, 5);
        context.infect(PersonId::new(1), 3, 0).unwrap();
        context.get_cohorts_mut().add_infected(PersonId::new(1));
        context.get_counters_mut().new_infections += 1;

        let record = context.record_day(1);
        assert_eq!(record.day, 1);
        assert_eq!(record.total_infected, 1);
        assert_eq!(record.new_infections, 1);
        assert_eq!(context.get_counters(), DailyCounters::default());

        let record = context.record_day(2);
        assert_eq!(record.new_infections, 0);
        assert_eq!(record.total_infected, 1);
        assert_eq!(context.get_daily_series().len(), 2);
    }

    #[test]
    fn healthy_is_derived() {
        let mut context = Context::new();
        add_people(&mut context, 4);
        context.get_cohorts_mut().add_hospitalized(PersonId::new(1));
        context.get_cohorts_mut().add_deceased(PersonId::new(2));
        context.record_day(0);

        let series = context.get_daily_series();
        assert_eq!(series.population_size(), 4);
        assert_eq!(series.healthy(), vec![2]);
        assert_eq!(series.get(0).unwrap().total_hospitalized, 1);
        assert!(series.get(1).is_none());
    }

    #[test]
    fn terminal_states_cover_everyone() {
        let mut context = Context::new();
        add_people(&mut context, 3);
        context
            .vaccinate(PersonId::new(2), VaccineType::new("Pfizer"), 4)
            .unwrap();
        context.infect(PersonId::new(3), 0, 1).unwrap();
        context.recover(PersonId::new(3), 2).unwrap();

        let states = context.collect_terminal_states();
        assert_eq!(states.len(), 3);
        assert_eq!(states[1].vaccine, Some(VaccineType::new("Pfizer")));
        assert_eq!(states[1].vaccination_day, Some(4));
        assert_eq!(states[2].infection_immunity_day, Some(2));
        assert!(states
            .iter()
            .all(|state| state.health == HealthStatus::Neutral));
    }
}
