use log::trace;
use std::fmt::{Debug, Formatter};

/// Number of steps between two consecutive snapshots.
const SNAPSHOT_INTERVAL: usize = 256;

/// Trait for types that can be simulated by [`Simulator`].
pub trait Simulatable: Debug {
    /// Everything needed to restore the simulatable's state later on.
    type Snapshot: Clone + Debug;
    /// What a single tick reports back.
    type Outcome;

    /// Advance the simulation one tick. This operation should be deterministic.
    ///
    /// The `tick` operation is deterministic if the state after calling `tick` only depends on the
    /// state before calling `tick`.
    fn tick(&mut self) -> Self::Outcome;

    fn snapshot(&self) -> Self::Snapshot;

    /// Reverts the state to that captured by `snapshot`.
    fn restore(&mut self, snapshot: &Self::Snapshot);
}

/// A simulator can simulate any `Simulatable`.
/// It provides a full linear simulation history with undo and redo capabilities.
///
/// Past states aren't stored one by one. Instead, a snapshot is taken every
/// [`SNAPSHOT_INTERVAL`] steps, and any state in between is reconstructed by replaying the steps
/// following the closest snapshot before it.
#[derive(Debug)]
pub struct Simulator<S: Simulatable> {
    simulatable: S,
    /// Ordered timeline of `(steps, snapshot)` pairs, where `snapshot` was taken after `steps`
    /// steps. A snapshot is made on construction, so this is never empty.
    snapshots: Vec<(usize, S::Snapshot)>,
    /// Ordered timeline of `(step_index, custom_tick)` pairs, where `custom_tick` is the tick that
    /// was passed to [`step_with`](Self::step_with) to be used instead of [`Simulatable::tick`] at
    /// step `step_index`.
    custom_ticks: Vec<(usize, Tick<S>)>,
    /// Number of steps from the start of history to the current state.
    current: usize,
    /// Number of steps from the start of history to the last stored state.
    end: usize,
}

impl<S: Simulatable> Simulator<S> {
    /// Create a new `Simulator` with a clear history, starting from the current state of
    /// `simulatable`.
    pub fn new(simulatable: S) -> Self {
        let snapshot = simulatable.snapshot();
        Self {
            simulatable,
            snapshots: vec![(0, snapshot)],
            custom_ticks: Vec::new(),
            current: 0,
            end: 0,
        }
    }

    /// Provides immutable access to the simulatable.
    ///
    /// Prefer this over [`inspect`](Self::inspect) if all you need is access to the simulatable's
    /// configuration, and not to its state.
    pub fn simulatable(&self) -> &S {
        &self.simulatable
    }

    /// Returns the simulatable, to immutably inspect its state.
    ///
    /// If you need to mutate the simulatable's state (such as to write registers), then you should
    /// use [`step_with`](Self::step_with), so the change becomes part of the history.
    pub fn inspect(&self) -> &S {
        trace!("Inspecting simulatable");
        &self.simulatable
    }

    /// Returns the number of steps from the start of history to the current state.
    pub fn current_steps(&self) -> usize {
        self.current
    }

    /// Returns the total number of steps from the start of history to the last stored state.
    pub fn available_steps(&self) -> usize {
        self.end
    }

    /// Advance the simulation forward by one tick.
    ///
    /// This will erase the forward history, i.e. all future undone steps can no longer be redone
    /// hereafter.
    pub fn step(&mut self) -> S::Outcome {
        trace!("Stepping simulator once");

        if self.is_head_detached() {
            trace!("Simulator HEAD is detached");
            self.clear_forward_history();
        }

        let outcome = self.simulatable.tick();
        self.advance();
        outcome
    }

    /// Advance the simulation forward by one tick, but use a custom `tick` function instead of
    /// [`Simulatable::tick`].
    ///
    /// Note that this will erase the forward history, i.e. all future undone steps can no longer be
    /// redone hereafter.
    ///
    /// The custom tick is stored, since it has to be called again whenever this step is replayed.
    /// Therefore it must be deterministic as well.
    pub fn step_with<F, R>(&mut self, name: &'static str, custom_tick: F) -> R
    where
        F: 'static + Send + Fn(&mut S) -> R,
    {
        trace!("Stepping simulator once with custom step \"{name}\"");

        if self.is_head_detached() {
            trace!("Simulator HEAD is detached");
            self.clear_forward_history();
        }

        let res = custom_tick(&mut self.simulatable);

        let tick = Tick {
            name,
            tick: Box::new(move |simulatable| {
                custom_tick(simulatable);
            }),
        };
        self.custom_ticks.push((self.current, tick));

        self.advance();
        res
    }

    /// Revert the simulation by one step. Returns `false` if there was nothing to undo.
    pub fn undo_step(&mut self) -> bool {
        if self.current == 0 {
            trace!("Undoing step in simulator while at the start of history; doing nothing");
            return false;
        }

        trace!("Undoing step in simulator");
        self.go_to(self.current - 1);
        true
    }

    /// Redo the last undone step, reporting what replaying it did. Returns `None` if there was
    /// nothing to redo.
    pub fn redo_step(&mut self) -> Option<Replayed<S::Outcome>> {
        if !self.is_head_detached() {
            trace!("Redoing step in simulator while at the end of history; doing nothing");
            return None;
        }

        trace!("Redoing step in simulator");
        Some(self.replay_step())
    }

    /// Jump to the state resulting from applying `steps` steps from the start of history.
    ///
    /// States beyond the end of history don't exist yet, so `steps` is clamped to
    /// [`available_steps`](Self::available_steps).
    pub fn go_to(&mut self, steps: usize) {
        let target = steps.min(self.end);
        trace!("Reverting to state after {target} steps");

        if target == self.current {
            return;
        }

        let base_snapshot_index = self.find_base_snapshot(target);
        let base_steps = self.snapshots[base_snapshot_index].0;
        if target < self.current || base_steps > self.current {
            trace!("Reverting to snapshot with index {base_snapshot_index}");
            self.simulatable
                .restore(&self.snapshots[base_snapshot_index].1);
            self.current = base_steps;
        }

        while self.current != target {
            self.replay_step();
        }
    }

    /// Forget all steps after the current one.
    pub fn clear_forward_history(&mut self) {
        trace!("Clearing forward history of simulator");
        let current = self.current;
        self.snapshots.retain(|(steps, _)| *steps <= current);
        self.custom_ticks.retain(|(step, _)| *step < current);
        self.end = current;
    }

    /// Returns `true` if the current state is not the most recent one (i.e. if there is any
    /// forward history).
    fn is_head_detached(&self) -> bool {
        self.current != self.end
    }

    /// Moves HEAD past a step that was just executed at the end of history.
    fn advance(&mut self) {
        self.current += 1;
        self.end = self.current;

        if self.current % SNAPSHOT_INTERVAL == 0 {
            trace!("Making snapshot of simulator state");
            self.snapshots
                .push((self.current, self.simulatable.snapshot()));
        }
    }

    /// Replay a previously undone step, using its custom tick if it had one.
    fn replay_step(&mut self) -> Replayed<S::Outcome> {
        let replayed = match self
            .custom_ticks
            .binary_search_by_key(&self.current, |(step, _)| *step)
        {
            Ok(index) => {
                let (_, custom_tick) = &self.custom_ticks[index];
                trace!("Step to replay used custom tick \"{}\"", custom_tick.name);
                (custom_tick.tick)(&mut self.simulatable);
                Replayed::Custom(custom_tick.name)
            }
            Err(_) => Replayed::Tick(self.simulatable.tick()),
        };
        self.current += 1;
        replayed
    }

    /// Returns the index in `snapshots` of the last snapshot taken on or before `steps`.
    fn find_base_snapshot(&self, steps: usize) -> usize {
        // The initial snapshot is never removed, so the partition point is at least 1
        self.snapshots.partition_point(|(s, _)| *s <= steps) - 1
    }
}

/// What replaying a single step of history did.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Replayed<O> {
    /// A regular [`Simulatable::tick`], with its outcome.
    Tick(O),
    /// A custom tick passed to [`Simulator::step_with`], by name.
    Custom(&'static str),
}

struct Tick<S: Simulatable> {
    name: &'static str,
    #[allow(clippy::type_complexity)]
    tick: Box<dyn Fn(&mut S) + Send + 'static>,
}

impl<S: Simulatable> Debug for Tick<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tick")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm;
    use crate::core::{Config, Core};
    use crate::imem::InstructionMemory;
    use crate::registers::Specifier;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Counts its own ticks, and remembers how often it was ticked in total.
    #[derive(Debug, Default)]
    struct Counter {
        value: u64,
        ticks: Rc<Cell<usize>>,
    }

    impl Simulatable for Counter {
        type Snapshot = u64;
        type Outcome = u64;

        fn tick(&mut self) -> u64 {
            self.ticks.set(self.ticks.get() + 1);
            self.value += 1;
            self.value
        }

        fn snapshot(&self) -> u64 {
            self.value
        }

        fn restore(&mut self, snapshot: &u64) {
            self.value = *snapshot;
        }
    }

    #[test]
    fn test_undo_redo() {
        let mut simulator = Simulator::new(Counter::default());
        assert!(!simulator.undo_step());
        assert_eq!(None, simulator.redo_step());

        for i in 1..=10 {
            assert_eq!(i, simulator.step());
        }
        assert!(simulator.undo_step());
        assert_eq!(9, simulator.inspect().value);
        assert_eq!(9, simulator.current_steps());
        assert_eq!(10, simulator.available_steps());

        assert_eq!(Some(Replayed::Tick(10)), simulator.redo_step());
        assert_eq!(10, simulator.inspect().value);
        assert_eq!(None, simulator.redo_step());
    }

    #[test]
    fn test_step_after_undo_erases_forward_history() {
        let mut simulator = Simulator::new(Counter::default());
        for _ in 0..5 {
            simulator.step();
        }
        simulator.go_to(2);
        simulator.step_with("add ten", |counter| counter.value += 10);
        assert_eq!(3, simulator.current_steps());
        assert_eq!(3, simulator.available_steps());
        assert_eq!(12, simulator.inspect().value);
        assert_eq!(None, simulator.redo_step());
    }

    #[test]
    fn test_custom_ticks_are_replayed() {
        let mut simulator = Simulator::new(Counter::default());
        simulator.step();
        let value = simulator.step_with("double", |counter| {
            counter.value *= 2;
            counter.value
        });
        assert_eq!(2, value);
        simulator.step();
        assert_eq!(3, simulator.inspect().value);

        simulator.go_to(0);
        assert_eq!(0, simulator.inspect().value);
        simulator.go_to(3);
        assert_eq!(3, simulator.inspect().value);
        simulator.go_to(2);
        assert_eq!(2, simulator.inspect().value);

        simulator.go_to(1);
        assert_eq!(Some(Replayed::Custom("double")), simulator.redo_step());
        assert_eq!(Some(Replayed::Tick(3)), simulator.redo_step());
    }

    #[test]
    fn test_go_to_uses_snapshots() {
        let ticks = Rc::new(Cell::new(0));
        let counter = Counter {
            value: 0,
            ticks: ticks.clone(),
        };
        let mut simulator = Simulator::new(counter);
        for _ in 0..1000 {
            simulator.step();
        }
        assert_eq!(1000, ticks.get());

        simulator.go_to(600);
        assert_eq!(600, simulator.inspect().value);
        // Replayed from the snapshot at 512
        assert_eq!(1000 + 88, ticks.get());

        simulator.go_to(610);
        assert_eq!(610, simulator.inspect().value);
        assert_eq!(1000 + 98, ticks.get());

        simulator.go_to(5000);
        assert_eq!(1000, simulator.current_steps());
        assert_eq!(1000, simulator.inspect().value);
    }

    #[test]
    fn test_core_history() {
        let program = [asm::addi(1, 0, 1), asm::add(1, 1, 1), asm::jal(0, -4)];
        let memory = InstructionMemory::from_words(&program).unwrap();
        let mut simulator = Simulator::new(Core::new(memory, Config::default()));
        let x1 = Specifier::from_u5(1);

        let mut values = vec![0];
        for _ in 0..600 {
            simulator.step();
            values.push(simulator.inspect().registers().x(x1));
        }

        for steps in [599, 300, 256, 3, 0, 513] {
            simulator.go_to(steps);
            assert_eq!(values[steps], simulator.inspect().registers().x(x1));
        }

        simulator.go_to(1);
        simulator.step_with("write x1", move |core| {
            core.registers_mut().set_x(x1, 100);
        });
        let last = simulator.step();
        assert_eq!(200, simulator.inspect().registers().x(x1));
        assert_eq!(8, last.next_pc);
        simulator.undo_step();
        simulator.undo_step();
        assert_eq!(Some(Replayed::Custom("write x1")), simulator.redo_step());
        assert_eq!(100, simulator.inspect().registers().x(x1));
        match simulator.redo_step() {
            Some(Replayed::Tick(retired)) => assert_eq!(retired, last),
            other => panic!("expected an instruction to be replayed, got {other:?}"),
        }
        assert_eq!(200, simulator.inspect().registers().x(x1));
    }
}
