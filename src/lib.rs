//! A day-stepped epidemic propagation engine.
//!
//! A synthetic population of individuals, each with demographic attributes, risk multipliers
//! and a list of spatial neighbors, is advanced one simulated day at a time:
//!
//! * the transition engine counts down infection and hospitalization timers and resolves their
//!   expiry by a single random draw (recovery, hospitalization or death);
//! * the propagation engine lets every infectious individual try to infect each of its neutral
//!   neighbors with a probability that decreases with distance;
//! * the vaccination allocator distributes the day's scaled dose deliveries to eligible
//!   individuals in random order;
//! * the statistics aggregator records cohort sizes and the day's new events.
//!
//! Vaccine- and infection-acquired protection reduces every probability through the immunity
//! model, which reads an external efficacy table.
//!
//! All state lives in one `Context`. Modules store their data in it as plugins and expose their
//! operations through `Context*Ext` traits:
//!
//! ```no_run
//! use std::path::Path;
//! use contagion::prelude::*;
//!
//! let mut context = Context::new();
//! context.init_random(42);
//! context.load_scenario(Path::new("scenario.json"))?;
//! let outcome = context.run_simulation()?;
//! println!("stopped after day {}: {}", outcome.last_day, outcome.stop_reason);
//! # Ok::<(), ContagionError>(())
//! ```
pub mod cohort;
pub mod context;
pub mod error;
pub mod global_properties;
pub mod hashing;
pub mod immunity;
pub mod incidence_report;
pub mod loader;
pub mod log;
pub mod network;
pub mod parameters;
pub mod plan;
pub mod population;
pub mod propagation;
pub mod random;
pub mod report;
pub mod runner;
pub mod simulation;
pub mod statistics;
pub mod transition;
pub mod vaccination;

// Re-exported for use in macros
pub use csv;
pub use rand;

pub mod prelude {
    pub use crate::cohort::ContextCohortExt;
    pub use crate::context::{Context, ExecutionPhase};
    pub use crate::error::ContagionError;
    pub use crate::global_properties::ContextGlobalPropertiesExt;
    pub use crate::immunity::{
        ContextImmunityExt, EfficacyKey, EfficacyLookup, EfficacyRow, EfficacyTable, OutcomeType,
    };
    pub use crate::loader::ContextLoaderExt;
    pub use crate::network::ContextNetworkExt;
    pub use crate::parameters::{
        ContextParametersExt, DurationDistribution, ImmunityPrecedence, InitialSituation,
        Parameters, Params, ProbabilityPolicy,
    };
    pub use crate::population::{
        ContextPopulationExt, HealthStatus, HealthStatusChangeEvent, IndividualRecord, PersonId,
        Sex, VaccineType,
    };
    pub use crate::propagation::ContextPropagationExt;
    pub use crate::random::ContextRandomExt;
    pub use crate::report::ContextReportExt;
    pub use crate::simulation::{ContextSimulationExt, SimulationOutcome, StopReason};
    pub use crate::statistics::{ContextStatisticsExt, DailyRecord, DailySeries, TerminalState};
    pub use crate::transition::ContextTransitionExt;
    pub use crate::vaccination::{
        ContextVaccinationExt, DoseSchedule, DoseScheduleEntry, EligibilityClause, Strategy,
    };
}
