use std::path::PathBuf;

use clap::{Args, Command, FromArgMatches as _};

use crate::context::Context;
use crate::error::ContagionError;
use crate::incidence_report;
use crate::loader::ContextLoaderExt;
use crate::log::{set_log_level, set_module_filter, LevelFilter};
use crate::random::ContextRandomExt;
use crate::report::{write_outcome_reports, ContextReportExt};
use crate::simulation::{ContextSimulationExt, SimulationOutcome};

/// Default cli arguments for the contagion runner
#[derive(Args, Debug)]
pub struct BaseArgs {
    /// Path of the scenario file (parameters and input files)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Random seed
    #[arg(short, long, default_value = "0")]
    pub random_seed: u64,

    /// Optional directory for CSV reports; no reports are written without it
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Prefix prepended to every report file name
    #[arg(short, long, default_value = "")]
    pub prefix: String,

    /// Replace report files that already exist
    #[arg(short, long)]
    pub force_overwrite: bool,

    /// Enable logging at this level (error, warn, info, debug, trace)
    #[arg(short, long)]
    pub log_level: Option<LevelFilter>,

    /// Override the log level of one module, e.g. `contagion::propagation=trace`. Repeatable.
    #[arg(long = "log-filter", value_parser = parse_module_filter)]
    pub log_filters: Vec<(String, LevelFilter)>,
}

fn parse_module_filter(s: &str) -> Result<(String, LevelFilter), String> {
    let (module, level) = s
        .split_once('=')
        .ok_or_else(|| format!("expected <module>=<level>, got `{s}`"))?;
    if module.is_empty() {
        return Err(format!("missing module path in `{s}`"));
    }
    let level = level
        .parse::<LevelFilter>()
        .map_err(|_| format!("unknown log level `{level}`"))?;
    Ok((module.to_string(), level))
}

fn create_contagion_cli() -> Command {
    let cli = Command::new("contagion").about("Simulates an epidemic on a synthetic population");
    BaseArgs::augment_args(cli)
}

/// Runs a simulation with the command line arguments of the process.
///
/// `setup_fn` runs after the scenario is loaded and before the first day, e.g. to subscribe to
/// events or seed individuals by hand.
///
/// # Errors
/// Returns an error if argument parsing, loading, the setup function or the run fails
pub fn run_with_args<F>(setup_fn: F) -> Result<SimulationOutcome, Box<dyn std::error::Error>>
where
    F: Fn(&mut Context, &BaseArgs) -> Result<(), ContagionError>,
{
    let matches = create_contagion_cli().get_matches();
    let args = BaseArgs::from_arg_matches(&matches)?;
    Ok(run_with_args_internal(&args, setup_fn)?)
}

pub(crate) fn run_with_args_internal<F>(
    args: &BaseArgs,
    setup_fn: F,
) -> Result<SimulationOutcome, ContagionError>
where
    F: Fn(&mut Context, &BaseArgs) -> Result<(), ContagionError>,
{
    if let Some(level) = args.log_level {
        set_log_level(level);
    }
    for (module, level) in &args.log_filters {
        set_module_filter(module, *level);
    }

    let mut context = Context::new();
    context.init_random(args.random_seed);

    println!("Loading scenario from: {}", args.config.display());
    context.load_scenario(&args.config)?;

    if let Some(output_dir) = &args.output_dir {
        context
            .report_options()
            .directory(output_dir.clone())
            .file_prefix(args.prefix.clone())
            .overwrite(args.force_overwrite);
        incidence_report::init(&mut context)?;
    }

    setup_fn(&mut context, args)?;

    let outcome = context.run_simulation()?;
    if args.output_dir.is_some() {
        write_outcome_reports(&mut context, &outcome)?;
    }

    let last = outcome.series.last().copied().unwrap_or_default();
    println!(
        "Simulation finished after {} days ({}): {} new infections, {} deceased, {} vaccinated",
        outcome.last_day,
        outcome.stop_reason,
        outcome.series.cumulative_infections(),
        last.total_deceased,
        last.total_vaccinated
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::ContextParametersExt;
    use crate::population::{ContextPopulationExt, PersonId};
    use tempfile::tempdir;

    fn args(output_dir: Option<PathBuf>) -> BaseArgs {
        BaseArgs {
            config: PathBuf::from("tests/data/config.json"),
            random_seed: 42,
            output_dir,
            prefix: String::new(),
            force_overwrite: false,
            log_level: None,
            log_filters: Vec::new(),
        }
    }

    #[test]
    fn module_filter_argument() {
        assert_eq!(
            parse_module_filter("contagion::propagation=trace").unwrap(),
            ("contagion::propagation".to_string(), LevelFilter::Trace)
        );
        assert!(parse_module_filter("contagion::propagation").is_err());
        assert!(parse_module_filter("=info").is_err());
        assert!(parse_module_filter("contagion::loader=loud").is_err());

        let matches = create_contagion_cli()
            .try_get_matches_from([
                "contagion",
                "-c",
                "scenario.json",
                "--log-filter",
                "contagion::propagation=trace",
                "--log-filter",
                "contagion::vaccination=off",
            ])
            .unwrap();
        let parsed = BaseArgs::from_arg_matches(&matches).unwrap();
        assert_eq!(parsed.log_filters.len(), 2);
        assert_eq!(parsed.log_filters[1].1, LevelFilter::Off);
    }

    #[test]
    fn runs_fixture_scenario() {
        let outcome = run_with_args_internal(&args(None), |context, _| {
            assert_eq!(context.get_population_size(), 40);
            assert!(context.get_params()?.simulation_duration > 0);
            Ok(())
        })
        .unwrap();
        assert_eq!(outcome.final_states.len(), 40);
        assert_eq!(outcome.series.len(), outcome.last_day as usize + 1);
    }

    #[test]
    fn same_seed_same_series() {
        let first = run_with_args_internal(&args(None), |_, _| Ok(())).unwrap();
        let second = run_with_args_internal(&args(None), |_, _| Ok(())).unwrap();
        assert_eq!(first.series, second.series);
        assert_eq!(first.final_states, second.final_states);
    }

    #[test]
    fn setup_error_is_returned() {
        let result = run_with_args_internal(&args(None), |context, _| {
            context.get_individual(PersonId::new(1000)).map(|_| ())
        });
        assert!(matches!(result, Err(ContagionError::InvalidPersonId(_))));
    }

    #[test]
    fn writes_reports_with_prefix() {
        let dir = tempdir().unwrap();
        let mut base = args(Some(dir.path().to_path_buf()));
        base.prefix = "seed42_".to_string();
        run_with_args_internal(&base, |_, _| Ok(())).unwrap();
        for name in ["daily", "final_states", "incidence"] {
            assert!(dir.path().join(format!("seed42_{name}.csv")).exists());
        }

        // A second run into the same directory needs --force-overwrite.
        assert!(matches!(
            run_with_args_internal(&base, |_, _| Ok(())),
            Err(ContagionError::ReportError(_))
        ));
        base.force_overwrite = true;
        run_with_args_internal(&base, |_, _| Ok(())).unwrap();
    }
}
