/// Optional host performance capability.
///
/// Some render hosts can report decoded/dropped frame counters; others can't.
/// The engine samples whatever probe it was given and records nothing when
/// the probe has no answer.
pub trait PerformanceProbe {
    /// Cumulative dropped frames, if the host exposes them.
    fn dropped_frames(&self) -> Option<u64>;
}

#[derive(Debug, Default, Copy, Clone)]
pub struct NoopProbe;

impl PerformanceProbe for NoopProbe {
    fn dropped_frames(&self) -> Option<u64> {
        None
    }
}
