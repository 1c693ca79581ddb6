//! Named random number streams.
//!
//! Every source of randomness in the engine draws from its own stream, declared with
//! `define_rng!`. All streams derive from one base seed set with `init_random`, offset by a hash
//! of the stream's name, so that adding draws to one component never shifts the sequence seen by
//! another and a fixed seed reproduces a run exactly.
use std::any::{Any, TypeId};
use std::cell::{RefCell, RefMut};

use log::trace;
use rand::distr::uniform::{SampleRange, SampleUniform};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore, SeedableRng};
use rand_distr::Distribution;

use crate::context::Context;
use crate::hashing::{hash_str, HashMap};

/// Defines a unit type `$random_id` that names an independent random stream.
#[macro_export]
macro_rules! define_rng {
    ($random_id:ident) => {
        #[derive(Copy, Clone)]
        struct $random_id;

        impl $crate::random::RngId for $random_id {
            type RngType = $crate::rand::rngs::StdRng;

            fn get_name() -> &'static str {
                stringify!($random_id)
            }
        }
    };
}
pub use define_rng;

pub trait RngId: Copy + Any {
    type RngType: SeedableRng + RngCore;

    fn get_name() -> &'static str;
}

struct RngHolder {
    rng: Box<dyn Any>,
}

struct RngData {
    base_seed: u64,
    // Behind a `RefCell` so streams can be drawn from through `&Context`.
    rng_holders: RefCell<HashMap<TypeId, RngHolder>>,
}

crate::define_data_plugin!(
    RngPlugin,
    RngData,
    RngData {
        base_seed: 0,
        rng_holders: RefCell::new(HashMap::default()),
    }
);

fn get_rng<R: RngId>(context: &Context) -> RefMut<'_, R::RngType> {
    let data_container = context
        .get_data_container(RngPlugin)
        .expect("You must initialize the random number generator with a base seed");

    let rng_holders = data_container.rng_holders.borrow_mut();
    RefMut::map(rng_holders, |holders| {
        holders
            .entry(TypeId::of::<R>())
            .or_insert_with(|| {
                trace!(
                    "creating rng {} (base seed {})",
                    R::get_name(),
                    data_container.base_seed
                );
                let seed = data_container
                    .base_seed
                    .wrapping_add(hash_str(R::get_name()));
                RngHolder {
                    rng: Box::new(R::RngType::seed_from_u64(seed)),
                }
            })
            .rng
            .downcast_mut::<R::RngType>()
            .expect("Type mismatch")
    })
}

pub trait ContextRandomExt {
    /// Sets the base seed and discards any existing streams so they are re-seeded on next use.
    fn init_random(&mut self, base_seed: u64);

    /// Applies `sampler` to the stream named by `rng_id`.
    ///
    /// Panics if `init_random` has not been called.
    fn sample<R: RngId, T>(&self, rng_id: R, sampler: impl FnOnce(&mut R::RngType) -> T) -> T;

    fn sample_distr<R: RngId, T>(&self, rng_id: R, distribution: impl Distribution<T>) -> T;

    fn sample_range<R: RngId, S, T>(&self, rng_id: R, range: S) -> T
    where
        S: SampleRange<T>,
        T: SampleUniform;

    /// Returns true with probability `p`.
    ///
    /// Panics if `p` is not in `[0, 1]`; callers validate probabilities before drawing.
    fn sample_bool<R: RngId>(&self, rng_id: R, p: f64) -> bool;

    /// Shuffles `items` in place.
    fn shuffle<R: RngId, T>(&self, rng_id: R, items: &mut [T]);

    /// Draws `amount` distinct indices from `0..length`, uniformly and without replacement.
    ///
    /// Panics if `amount > length`.
    fn sample_without_replacement<R: RngId>(
        &self,
        rng_id: R,
        length: usize,
        amount: usize,
    ) -> Vec<usize>;
}

impl ContextRandomExt for Context {
    fn init_random(&mut self, base_seed: u64) {
        trace!("initializing random module with seed {base_seed}");
        let data_container = self.get_data_container_mut(RngPlugin);
        data_container.base_seed = base_seed;
        data_container.rng_holders.borrow_mut().clear();
    }

    fn sample<R: RngId, T>(&self, _rng_id: R, sampler: impl FnOnce(&mut R::RngType) -> T) -> T {
        let mut rng = get_rng::<R>(self);
        sampler(&mut rng)
    }

    fn sample_distr<R: RngId, T>(&self, rng_id: R, distribution: impl Distribution<T>) -> T {
        self.sample(rng_id, |rng| distribution.sample(rng))
    }

    fn sample_range<R: RngId, S, T>(&self, rng_id: R, range: S) -> T
    where
        S: SampleRange<T>,
        T: SampleUniform,
    {
        self.sample(rng_id, |rng| rng.random_range(range))
    }

    fn sample_bool<R: RngId>(&self, rng_id: R, p: f64) -> bool {
        self.sample(rng_id, |rng| rng.random_bool(p))
    }

    fn shuffle<R: RngId, T>(&self, rng_id: R, items: &mut [T]) {
        self.sample(rng_id, |rng| items.shuffle(rng));
    }

    fn sample_without_replacement<R: RngId>(
        &self,
        rng_id: R,
        length: usize,
        amount: usize,
    ) -> Vec<usize> {
        self.sample(rng_id, |rng| {
            rand::seq::index::sample(rng, length, amount).into_vec()
        })
    }
}
