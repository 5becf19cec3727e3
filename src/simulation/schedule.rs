use crate::modeling::Atomic;
use crate::time::Time;
use crate::Shared;
use std::cmp::Ordering;

/// Strict order on time values. Simulation times are never NaN, so a
/// missing ordering is a kernel bug.
fn before<T: Time>(a: &T, b: &T) -> bool {
    matches!(a.partial_cmp(b), Some(Ordering::Less))
}

struct Slot<X: 'static, T: Time> {
    t: T,
    model: Shared<dyn Atomic<X, T>>,
}

/// Event schedule: a binary heap of `(t_next, model)` entries keyed in
/// place. Each queued model stores its 1-based heap position in its
/// component, so re-keying after a transition is O(log N) without a lookup
/// table. Models whose next event is at infinity are not queued.
pub(crate) struct Schedule<X: 'static, T: Time> {
    heap: Vec<Slot<X, T>>,
}

impl<X: 'static, T: Time> Schedule<X, T> {
    pub(crate) fn new() -> Self {
        Self { heap: Vec::new() }
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    /// The minimum next-event time, or infinity if the schedule is empty.
    pub(crate) fn min_time(&self) -> T {
        match self.heap.first() {
            Some(slot) => slot.t,
            None => T::infinity(),
        }
    }

    /// Inserts, re-keys, or removes `model` so that its queue entry matches
    /// `t_next`. An infinite `t_next` removes the entry.
    pub(crate) fn schedule(&mut self, model: &Shared<dyn Atomic<X, T>>, t_next: T) {
        let pos = model.borrow().component().slot();
        if t_next.is_infinite() {
            if pos != 0 {
                self.remove_at(pos);
            }
            return;
        }
        if pos == 0 {
            self.heap.push(Slot {
                t: t_next,
                model: model.clone(),
            });
            let pos = self.heap.len();
            model.borrow_mut().component_mut().set_slot(pos);
            self.sift_up(pos);
        } else {
            self.heap[pos - 1].t = t_next;
            let pos = self.sift_up(pos);
            self.sift_down(pos);
        }
    }

    /// Removes `model` from the schedule if it is queued.
    pub(crate) fn remove(&mut self, model: &Shared<dyn Atomic<X, T>>) {
        let pos = model.borrow().component().slot();
        if pos != 0 {
            self.remove_at(pos);
        }
    }

    /// Appends every model whose entry equals `t` to `out`. The heap
    /// property prunes the descent, so only imminent entries and their
    /// direct children are visited. Entries stay queued; the step re-keys
    /// them after the transitions run.
    pub(crate) fn collect_imminent(&self, t: T, out: &mut Vec<Shared<dyn Atomic<X, T>>>) {
        if !self.heap.is_empty() {
            self.collect(1, t, out);
        }
    }

    fn collect(&self, pos: usize, t: T, out: &mut Vec<Shared<dyn Atomic<X, T>>>) {
        let slot = &self.heap[pos - 1];
        if slot.t == t {
            out.push(slot.model.clone());
            if 2 * pos <= self.heap.len() {
                self.collect(2 * pos, t, out);
            }
            if 2 * pos + 1 <= self.heap.len() {
                self.collect(2 * pos + 1, t, out);
            }
        }
    }

    fn remove_at(&mut self, pos: usize) {
        let slot = self.heap.swap_remove(pos - 1);
        slot.model.borrow_mut().component_mut().set_slot(0);
        if pos <= self.heap.len() {
            self.heap[pos - 1]
                .model
                .borrow_mut()
                .component_mut()
                .set_slot(pos);
            let pos = self.sift_up(pos);
            self.sift_down(pos);
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a - 1, b - 1);
        self.heap[a - 1].model.borrow_mut().component_mut().set_slot(a);
        self.heap[b - 1].model.borrow_mut().component_mut().set_slot(b);
    }

    fn sift_up(&mut self, mut pos: usize) -> usize {
        while pos > 1 && before(&self.heap[pos - 1].t, &self.heap[pos / 2 - 1].t) {
            self.swap(pos, pos / 2);
            pos /= 2;
        }
        pos
    }

    fn sift_down(&mut self, mut pos: usize) {
        loop {
            let mut least = pos;
            for child in [2 * pos, 2 * pos + 1] {
                if child <= self.heap.len() && before(&self.heap[child - 1].t, &self.heap[least - 1].t)
                {
                    least = child;
                }
            }
            if least == pos {
                return;
            }
            self.swap(pos, least);
            pos = least;
        }
    }
}
