//! The simulation `Context`.
//!
//! A `Context` owns everything a run needs: the plan queue that orders simulated days, a queue of
//! immediate callbacks, the typed data plugins each module stores its state in, and the event
//! subscriptions used by reports. Modules extend it through `Context*Ext` traits rather than by
//! holding references to each other.
use std::any::{Any, TypeId};
use std::collections::VecDeque;
use std::rc::Rc;

use log::trace;

use crate::hashing::HashMap;
use crate::plan::Queue;

/// A typed slot for module state inside a `Context`. Use `define_data_plugin!` to declare one.
pub trait DataPlugin: Any {
    type DataContainer: Any;

    fn create_data_container() -> Self::DataContainer;
}

/// Defines a data plugin type `$plugin` whose container of type `$data_container` is created
/// lazily from `$default` on first mutable access.
#[macro_export]
macro_rules! define_data_plugin {
    ($plugin:ident, $data_container:ty, $default: expr) => {
        #[derive(Copy, Clone)]
        struct $plugin;

        impl $crate::context::DataPlugin for $plugin {
            type DataContainer = $data_container;

            fn create_data_container() -> Self::DataContainer {
                $default
            }
        }
    };
}
pub use define_data_plugin;

/// Events are plain copyable values; subscribers receive them as queued callbacks.
pub trait Event: Copy + 'static {}

/// Order in which plans scheduled for the same time run.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExecutionPhase {
    First,
    Normal,
    Last,
}

type Callback = dyn FnOnce(&mut Context);
type EventHandler<E> = dyn Fn(&mut Context, E);

pub struct Context {
    plan_queue: Queue<Box<Callback>, ExecutionPhase>,
    callback_queue: VecDeque<Box<Callback>>,
    event_handlers: HashMap<TypeId, Box<dyn Any>>,
    data_plugins: HashMap<TypeId, Box<dyn Any>>,
    current_time: f64,
    shutdown_requested: bool,
}

impl Context {
    #[must_use]
    pub fn new() -> Context {
        Context {
            plan_queue: Queue::new(),
            callback_queue: VecDeque::new(),
            event_handlers: HashMap::default(),
            data_plugins: HashMap::default(),
            current_time: 0.0,
            shutdown_requested: false,
        }
    }

    /// Schedules `callback` at `time` in the `Normal` phase.
    ///
    /// # Panics
    ///
    /// Panics if `time` is NaN, infinite, or earlier than the current time.
    pub fn add_plan(&mut self, time: f64, callback: impl FnOnce(&mut Context) + 'static) {
        self.add_plan_with_phase(time, callback, ExecutionPhase::Normal);
    }

    /// Schedules `callback` at `time` in the given phase.
    ///
    /// # Panics
    ///
    /// Panics if `time` is NaN, infinite, or earlier than the current time.
    pub fn add_plan_with_phase(
        &mut self,
        time: f64,
        callback: impl FnOnce(&mut Context) + 'static,
        phase: ExecutionPhase,
    ) {
        assert!(
            !(time.is_nan() || time.is_infinite() || time < self.current_time),
            "Invalid time value"
        );
        self.plan_queue.add_plan(time, Box::new(callback), phase);
    }

    /// Runs `callback` before the next plan, after any callbacks already queued.
    pub fn queue_callback(&mut self, callback: impl FnOnce(&mut Context) + 'static) {
        self.callback_queue.push_back(Box::new(callback));
    }

    pub fn subscribe_to_event<E: Event>(&mut self, handler: impl Fn(&mut Context, E) + 'static) {
        let handlers = self
            .event_handlers
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(Vec::<Rc<EventHandler<E>>>::new()));
        let handlers: &mut Vec<Rc<EventHandler<E>>> =
            handlers.downcast_mut().expect("Type mismatch");
        handlers.push(Rc::new(handler));
    }

    /// Queues every handler subscribed to `E`. Handlers run after the current plan returns.
    pub fn emit_event<E: Event>(&mut self, event: E) {
        let Some(handlers) = self.event_handlers.get(&TypeId::of::<E>()) else {
            return;
        };
        let handlers: &Vec<Rc<EventHandler<E>>> = handlers.downcast_ref().expect("Type mismatch");
        for handler in handlers.clone() {
            self.queue_callback(move |context| handler(context, event));
        }
    }

    /// Returns the container for `T`, creating it on first use.
    #[allow(clippy::missing_panics_doc)]
    pub fn get_data_container_mut<T: DataPlugin>(&mut self, _plugin: T) -> &mut T::DataContainer {
        self.data_plugins
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(T::create_data_container()))
            .downcast_mut::<T::DataContainer>()
            .expect("Type mismatch")
    }

    /// Returns the container for `T` if it has been created.
    #[must_use]
    pub fn get_data_container<T: DataPlugin>(&self, _plugin: T) -> Option<&T::DataContainer> {
        self.data_plugins
            .get(&TypeId::of::<T>())
            .and_then(|data| data.downcast_ref::<T::DataContainer>())
    }

    #[must_use]
    pub fn get_current_time(&self) -> f64 {
        self.current_time
    }

    /// Stops `execute` before the next callback or plan. Pending plans are dropped unrun.
    pub fn shutdown(&mut self) {
        trace!("shutdown requested at time {}", self.current_time);
        self.shutdown_requested = true;
    }

    /// Runs callbacks and plans until both queues are empty or `shutdown` is called.
    pub fn execute(&mut self) {
        loop {
            if self.shutdown_requested {
                break;
            }

            if let Some(callback) = self.callback_queue.pop_front() {
                callback(self);
                continue;
            }

            match self.plan_queue.get_next_plan() {
                Some(plan) => {
                    self.current_time = plan.time;
                    (plan.data)(self);
                }
                None => break,
            }
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
