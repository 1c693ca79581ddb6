//! Logging for the engine's internal behavior. Not to be confused with _reporting_, which
//! writes the simulation's results to CSV files.
//!
//! The engine emits messages through the `log` macros: `info!` for the one-line daily summary,
//! `debug!` for cohort-level work and `trace!` for individual draws and transitions.
//!
//! Logging is off until a level is set, either with `--log-level <level>` on the command line or
//! with `set_log_level`. Module filters override the global level for one module path; the
//! command line sets them with `--log-filter <module>=<level>`.
//!
//! ```rust
//! use contagion::log::{set_log_level, set_module_filter, LevelFilter};
//!
//! // Daily summaries only, plus every draw of the transmission engine.
//! set_log_level(LevelFilter::Info);
//! set_module_filter("contagion::propagation", LevelFilter::Trace);
//! ```
#[cfg(feature = "logging")]
mod standard_logger;

#[cfg(not(feature = "logging"))]
mod null_logger;

pub use log::{debug, error, info, trace, warn, LevelFilter};

use std::sync::{LazyLock, Mutex, MutexGuard};

#[cfg(feature = "logging")]
use log4rs::Handle;

use crate::hashing::HashMap;

/// The per-draw trace lines of the propagation engine are hidden unless a filter asks for them.
const DEFAULT_MODULE_FILTERS: [(&str, LevelFilter); 1] =
    [("contagion::propagation", LevelFilter::Debug)];

static LOG_CONFIGURATION: LazyLock<Mutex<LogConfiguration>> = LazyLock::new(Mutex::default);

/// The process-wide logging state: a global level plus per-module overrides, and the handle of
/// the installed backend.
#[derive(Debug)]
pub(in crate::log) struct LogConfiguration {
    /// `LevelFilter::Off` disables logging.
    pub(in crate::log) global_log_level: LevelFilter,
    pub(in crate::log) module_filters: HashMap<String, LevelFilter>,

    #[cfg(feature = "logging")]
    root_handle: Option<Handle>,
}

impl Default for LogConfiguration {
    fn default() -> Self {
        Self {
            global_log_level: LevelFilter::Off,
            module_filters: DEFAULT_MODULE_FILTERS
                .iter()
                .map(|&(module, level)| (module.to_string(), level))
                .collect(),

            #[cfg(feature = "logging")]
            root_handle: None,
        }
    }
}

impl LogConfiguration {
    fn set_log_level(&mut self, level: LevelFilter) {
        self.global_log_level = level;
        self.set_config();
    }

    fn set_module_filter(&mut self, module: &str, level: LevelFilter) {
        if self.module_filters.get(module) == Some(&level) {
            return;
        }
        self.module_filters.insert(module.to_string(), level);
        self.set_config();
    }
}

fn get_log_configuration() -> MutexGuard<'static, LogConfiguration> {
    LOG_CONFIGURATION.lock().expect("Mutex poisoned")
}

/// Sets the global log level. `LevelFilter::Off` disables logging.
pub fn set_log_level(level: LevelFilter) {
    get_log_configuration().set_log_level(level);
}

/// Sets the level for messages whose target starts with `module_path`, overriding the global
/// level for that module.
pub fn set_module_filter(module_path: &str, level: LevelFilter) {
    get_log_configuration().set_module_filter(module_path, level);
}
