//! The spatial neighbor graph.
//!
//! Each individual has an ordered list of `Neighbor`s: other individuals within the interaction
//! radius, with the distance to them. The graph is built once from the population builder's
//! output and then frozen; the engine only reads it.
use log::debug;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::ContagionError;
use crate::population::{ContextPopulationExt, PersonId};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub neighbor: PersonId,
    pub distance: f64,
}

#[derive(Default)]
struct NetworkData {
    // Indexed by `PersonId::index`.
    neighbors: Vec<Vec<Neighbor>>,
    frozen: bool,
}

impl NetworkData {
    fn add_neighbor(
        &mut self,
        person_id: PersonId,
        neighbor: PersonId,
        distance: f64,
    ) -> Result<(), ContagionError> {
        if self.frozen {
            return Err(ContagionError::NetworkFrozen);
        }
        if person_id == neighbor {
            return Err(ContagionError::CannotMakeEdgeToSelf(person_id));
        }
        if distance.is_nan() || distance.is_infinite() || distance.is_sign_negative() {
            return Err(ContagionError::InvalidDistance {
                person_id,
                neighbor,
                distance,
            });
        }
        let index = person_id
            .index()
            .ok_or(ContagionError::InvalidPersonId(person_id))?;

        // Make sure we have data for this person.
        if index >= self.neighbors.len() {
            self.neighbors.resize_with(index + 1, Vec::new);
        }
        let edges = &mut self.neighbors[index];
        if edges.iter().any(|edge| edge.neighbor == neighbor) {
            return Err(ContagionError::DuplicateNeighbor {
                person_id,
                neighbor,
            });
        }
        edges.push(Neighbor { neighbor, distance });
        Ok(())
    }

    fn get_neighbors(&self, person_id: PersonId) -> &[Neighbor] {
        person_id
            .index()
            .and_then(|index| self.neighbors.get(index))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

crate::define_data_plugin!(NetworkPlugin, NetworkData, NetworkData::default());

fn check_exists(context: &Context, person_id: PersonId) -> Result<(), ContagionError> {
    context.get_individual(person_id).map(|_| ())
}

pub trait ContextNetworkExt {
    /// Adds a directed entry `person_id -> neighbor`. Entries keep insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if either id is unknown, the entry is a self-loop or a duplicate, the
    /// distance is negative or not finite, or the graph is frozen.
    fn add_neighbor(
        &mut self,
        person_id: PersonId,
        neighbor: PersonId,
        distance: f64,
    ) -> Result<(), ContagionError>;

    /// Adds both directions of an edge.
    ///
    /// # Errors
    ///
    /// Same conditions as `add_neighbor`.
    fn add_neighbor_bidi(
        &mut self,
        person1: PersonId,
        person2: PersonId,
        distance: f64,
    ) -> Result<(), ContagionError>;

    /// The neighbors of `person_id`, in insertion order. Unknown ids have none.
    fn get_neighbors(&self, person_id: PersonId) -> &[Neighbor];

    /// Makes the graph immutable for the rest of the run.
    fn freeze_network(&mut self);

    fn is_network_frozen(&self) -> bool;

    /// Total number of directed entries.
    fn neighbor_entry_count(&self) -> usize;
}

impl ContextNetworkExt for Context {
    fn add_neighbor(
        &mut self,
        person_id: PersonId,
        neighbor: PersonId,
        distance: f64,
    ) -> Result<(), ContagionError> {
        check_exists(self, person_id)?;
        check_exists(self, neighbor)?;
        self.get_data_container_mut(NetworkPlugin)
            .add_neighbor(person_id, neighbor, distance)
    }

    fn add_neighbor_bidi(
        &mut self,
        person1: PersonId,
        person2: PersonId,
        distance: f64,
    ) -> Result<(), ContagionError> {
        self.add_neighbor(person1, person2, distance)?;
        self.add_neighbor(person2, person1, distance)
    }

    fn get_neighbors(&self, person_id: PersonId) -> &[Neighbor] {
        self.get_data_container(NetworkPlugin)
            .map(|data| data.get_neighbors(person_id))
            .unwrap_or(&[])
    }

    fn freeze_network(&mut self) {
        let data_container = self.get_data_container_mut(NetworkPlugin);
        data_container.frozen = true;
        debug!(
            "neighbor graph frozen with {} entries",
            data_container.neighbors.iter().map(Vec::len).sum::<usize>()
        );
    }

    fn is_network_frozen(&self) -> bool {
        self.get_data_container(NetworkPlugin)
            .is_some_and(|data| data.frozen)
    }

    fn neighbor_entry_count(&self) -> usize {
        self.get_data_container(NetworkPlugin)
            .map_or(0, |data| data.neighbors.iter().map(Vec::len).sum())
    }
}
