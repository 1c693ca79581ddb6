//! A priority queue of timed plans.
//!
//! `Queue<T, P>` holds payloads of type `T` ordered by `f64` time, then by a priority `P`, then
//! by insertion order. The `Context` stores day callbacks here with `ExecutionPhase` as the
//! priority, which is what lets the transition, vaccination and statistics steps scheduled for
//! the same day run in a fixed order.
use std::cmp::Ordering;
use std::collections::BinaryHeap;

pub struct Queue<T, P: Ord> {
    queue: BinaryHeap<Entry<T, P>>,
    plan_counter: u64,
}

impl<T, P: Ord> Queue<T, P> {
    #[must_use]
    pub fn new() -> Queue<T, P> {
        Queue {
            queue: BinaryHeap::new(),
            plan_counter: 0,
        }
    }

    /// Adds a plan at `time` with the given priority. *O*(log(*n*)).
    pub fn add_plan(&mut self, time: f64, data: T, priority: P) {
        self.queue.push(Entry {
            time,
            priority,
            id: self.plan_counter,
            data,
        });
        self.plan_counter += 1;
    }

    /// Removes and returns the earliest plan, if any.
    pub fn get_next_plan(&mut self) -> Option<Plan<T>> {
        self.queue.pop().map(|entry| Plan {
            time: entry.time,
            data: entry.data,
        })
    }
}

impl<T, P: Ord> Default for Queue<T, P> {
    fn default() -> Self {
        Self::new()
    }
}

struct Entry<T, P: Ord> {
    time: f64,
    priority: P,
    id: u64,
    data: T,
}

// Ids are unique, so two entries are equal only when they are the same entry.
impl<T, P: Ord> PartialEq for Entry<T, P> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T, P: Ord> Eq for Entry<T, P> {}

impl<T, P: Ord> PartialOrd for Entry<T, P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// `BinaryHeap` is a max-heap, so every comparison is reversed.
impl<T, P: Ord> Ord for Entry<T, P> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.priority.cmp(&self.priority))
            .then_with(|| other.id.cmp(&self.id))
    }
}

pub struct Plan<T> {
    pub time: f64,
    pub data: T,
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::Queue;

    #[test]
    fn empty_queue() {
        let mut plan_queue = Queue::<(), ()>::new();
        assert!(plan_queue.get_next_plan().is_none());
    }

    #[test]
    fn plans_come_out_in_time_order() {
        let mut plan_queue = Queue::new();
        plan_queue.add_plan(3.0, "day three", ());
        plan_queue.add_plan(1.0, "day one", ());
        plan_queue.add_plan(2.0, "day two", ());

        let order: Vec<_> = std::iter::from_fn(|| plan_queue.get_next_plan())
            .map(|plan| (plan.time, plan.data))
            .collect();
        assert_eq!(
            order,
            vec![(1.0, "day one"), (2.0, "day two"), (3.0, "day three")]
        );
    }

    #[test]
    fn priority_breaks_time_ties() {
        let mut plan_queue = Queue::new();
        plan_queue.add_plan(1.0, "statistics", 2);
        plan_queue.add_plan(1.0, "vaccination", 1);
        plan_queue.add_plan(1.0, "transition", 0);

        assert_eq!(plan_queue.get_next_plan().unwrap().data, "transition");
        assert_eq!(plan_queue.get_next_plan().unwrap().data, "vaccination");
        assert_eq!(plan_queue.get_next_plan().unwrap().data, "statistics");
    }

    #[test]
    fn insertion_order_breaks_full_ties() {
        let mut plan_queue = Queue::new();
        plan_queue.add_plan(1.0, 1, ());
        plan_queue.add_plan(1.0, 2, ());

        assert_eq!(plan_queue.get_next_plan().unwrap().data, 1);
        assert_eq!(plan_queue.get_next_plan().unwrap().data, 2);
    }
}
