use foundation::math::precision::stable_total_cmp_f64;
use foundation::time::Time;

/// Cancellable one-shot timers driven by caller-supplied time.
///
/// Key properties:
/// - Total ordering on `(due, id)`; timers due at the same instant fire in
///   scheduling order.
/// - Cancellation removes the timer immediately and hands its payload back.
/// - Nothing fires unless the host advances time via `pop_due`/`drain_due`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(pub u64);

#[derive(Debug)]
struct Entry<T> {
    due: Time,
    id: TimerId,
    payload: T,
}

impl<T> Entry<T> {
    fn fires_before(&self, other: &Entry<T>) -> bool {
        stable_total_cmp_f64(self.due.0, other.due.0)
            .then_with(|| self.id.cmp(&other.id))
            .is_lt()
    }
}

#[derive(Debug)]
pub struct TimerQueue<T> {
    next_id: u64,
    entries: Vec<Entry<T>>,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn schedule(&mut self, due: Time, payload: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.entries.push(Entry { due, id, payload });
        id
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// Cancels `id`, returning its payload if it had not fired yet.
    pub fn cancel(&mut self, id: TimerId) -> Option<T> {
        let idx = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.swap_remove(idx).payload)
    }

    /// Earliest pending due time.
    pub fn next_due(&self) -> Option<Time> {
        self.earliest().map(|idx| self.entries[idx].due)
    }

    /// Pops the earliest timer whose due time is `<= now`.
    pub fn pop_due(&mut self, now: Time) -> Option<(TimerId, T)> {
        let idx = self.earliest()?;
        if stable_total_cmp_f64(self.entries[idx].due.0, now.0).is_gt() {
            return None;
        }
        let entry = self.entries.swap_remove(idx);
        Some((entry.id, entry.payload))
    }

    /// Pops every timer due at `now`, in firing order.
    pub fn drain_due(&mut self, now: Time) -> Vec<(TimerId, T)> {
        let mut out = Vec::new();
        while let Some(fired) = self.pop_due(now) {
            out.push(fired);
        }
        out
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn earliest(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (idx, entry) in self.entries.iter().enumerate() {
            match best {
                None => best = Some(idx),
                Some(b) if entry.fires_before(&self.entries[b]) => best = Some(idx),
                Some(_) => {}
            }
        }
        best
    }
}
