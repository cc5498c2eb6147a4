use foundation::time::Time;

/// One animation step.
///
/// Frames are derived from caller-supplied host time, never from the wall
/// clock, so an animation can be replayed from a recorded tick sequence.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Frame {
    /// 0-based frame index.
    pub index: u64,
    /// Seconds since the previous frame (0 for the first frame).
    pub dt_s: f64,
    /// Host time at this frame.
    pub time: Time,
}

impl Frame {
    pub fn new(index: u64, dt_s: f64, time: Time) -> Self {
        Self { index, dt_s, time }
    }
}

/// Turns a sequence of host ticks into frames.
///
/// Large gaps (tab hidden, debugger pause) are clamped to `max_dt_s` so a
/// resumed animation doesn't jump.
#[derive(Debug, Clone)]
pub struct AnimationClock {
    next_index: u64,
    last: Option<Time>,
    max_dt_s: f64,
}

impl AnimationClock {
    pub fn new(max_dt_s: f64) -> Self {
        Self {
            next_index: 0,
            last: None,
            max_dt_s,
        }
    }

    pub fn advance(&mut self, now: Time) -> Frame {
        let dt_s = match self.last {
            Some(last) => now.since(last).min(self.max_dt_s),
            None => 0.0,
        };
        let frame = Frame::new(self.next_index, dt_s, now);
        self.next_index += 1;
        self.last = Some(now);
        frame
    }

    pub fn reset(&mut self) {
        self.next_index = 0;
        self.last = None;
    }
}

impl Default for AnimationClock {
    fn default() -> Self {
        Self::new(0.1)
    }
}

#[cfg(test)]
mod tests {
    use super::AnimationClock;
    use foundation::time::Time;

    #[test]
    fn first_frame_has_zero_dt() {
        let mut clock = AnimationClock::default();
        let f = clock.advance(Time(3.0));
        assert_eq!(f.index, 0);
        assert_eq!(f.dt_s, 0.0);
    }

    #[test]
    fn clamps_large_gaps_and_resets() {
        let mut clock = AnimationClock::new(0.1);
        clock.advance(Time(0.0));
        let f = clock.advance(Time(0.05));
        assert!((f.dt_s - 0.05).abs() < 1e-12);
        let f = clock.advance(Time(10.0));
        assert_eq!(f.dt_s, 0.1);
        assert_eq!(f.index, 2);

        clock.reset();
        assert_eq!(clock.advance(Time(11.0)).index, 0);
    }
}
