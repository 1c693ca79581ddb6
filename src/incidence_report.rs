use serde::Serialize;

use crate::context::Context;
use crate::define_report;
use crate::error::ContagionError;
use crate::population::{HealthStatus, HealthStatusChangeEvent, PersonId};
use crate::report::ContextReportExt;
use crate::simulation::abort_run;

#[derive(Serialize, Clone)]
struct IncidenceReportItem {
    day: u32,
    person_id: PersonId,
    previous: HealthStatus,
    current: HealthStatus,
}

define_report!(IncidenceReportItem);

fn handle_health_status_change(context: &mut Context, event: HealthStatusChangeEvent) {
    let item = IncidenceReportItem {
        day: event.day,
        person_id: event.person_id,
        previous: event.previous,
        current: event.current,
    };
    if let Err(e) = context.send_report(item) {
        abort_run(context, e.aborted(event.day, Some(event.person_id)));
    }
}

/// Opens `incidence.csv` and records one row per health-state change from now on. A row that
/// cannot be written aborts the run.
///
/// # Errors
///
/// Returns the error from creating the report file.
pub fn init(context: &mut Context) -> Result<(), ContagionError> {
    context.add_report::<IncidenceReportItem>("incidence")?;
    context.subscribe_to_event::<HealthStatusChangeEvent>(|context, event| {
        handle_health_status_change(context, event);
    });
    Ok(())
}
