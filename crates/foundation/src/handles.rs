/// Generational handle for objects owned by an external host.
///
/// A handle is only meaningful to the allocator that produced it; a stale
/// handle (same index, older generation) never aliases a live one.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(u32, u32); // (index, generation)

impl Handle {
    pub fn new(index: u32, generation: u32) -> Self {
        Handle(index, generation)
    }

    pub fn index(&self) -> u32 {
        self.0
    }

    pub fn generation(&self) -> u32 {
        self.1
    }
}

/// Slot allocator handing out generational handles.
///
/// Freed slots are reused lowest-index first with a bumped generation.
#[derive(Debug, Default, Clone)]
pub struct HandleAllocator {
    generations: Vec<u32>,
    live: Vec<bool>,
    free: Vec<u32>,
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self) -> Handle {
        if let Some(index) = self.free.pop() {
            let slot = index as usize;
            self.generations[slot] = self.generations[slot].wrapping_add(1);
            self.live[slot] = true;
            return Handle::new(index, self.generations[slot]);
        }
        let index = self.generations.len() as u32;
        self.generations.push(0);
        self.live.push(true);
        Handle::new(index, 0)
    }

    /// Releases `handle`. Returns `false` if it was already stale.
    pub fn free(&mut self, handle: Handle) -> bool {
        if !self.is_live(handle) {
            return false;
        }
        let slot = handle.index() as usize;
        self.live[slot] = false;
        self.free.push(handle.index());
        // Keep reuse deterministic: lowest index is popped first.
        self.free.sort_unstable_by(|a, b| b.cmp(a));
        true
    }

    pub fn is_live(&self, handle: Handle) -> bool {
        let slot = handle.index() as usize;
        self.live.get(slot).copied().unwrap_or(false)
            && self.generations[slot] == handle.generation()
    }

    pub fn live_count(&self) -> usize {
        self.live.iter().filter(|l| **l).count()
    }
}

#[cfg(test)]
mod tests {
    use super::HandleAllocator;

    #[test]
    fn freed_handles_go_stale() {
        let mut a = HandleAllocator::new();
        let h0 = a.alloc();
        assert!(a.is_live(h0));
        assert!(a.free(h0));
        assert!(!a.is_live(h0));
        assert!(!a.free(h0));

        let h1 = a.alloc();
        assert_eq!(h1.index(), h0.index());
        assert_ne!(h1.generation(), h0.generation());
        assert!(!a.is_live(h0));
        assert!(a.is_live(h1));
    }

    #[test]
    fn reuses_lowest_index_first() {
        let mut a = HandleAllocator::new();
        let h: Vec<_> = (0..4).map(|_| a.alloc()).collect();
        a.free(h[3]);
        a.free(h[1]);
        assert_eq!(a.alloc().index(), 1);
        assert_eq!(a.alloc().index(), 3);
        assert_eq!(a.live_count(), 4);
    }
}
