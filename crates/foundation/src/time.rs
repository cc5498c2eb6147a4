/// Host event-loop time in seconds.
///
/// Callers supply the clock; nothing in the core reads wall-clock time, so
/// timer and animation behavior can be replayed deterministically.
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Default)]
pub struct Time(pub f64);

impl Time {
    pub const ZERO: Time = Time(0.0);

    pub fn from_millis(ms: u64) -> Self {
        Time(ms as f64 / 1000.0)
    }

    pub fn after_millis(self, ms: u64) -> Self {
        Time(self.0 + ms as f64 / 1000.0)
    }

    /// Seconds elapsed since `earlier`, never negative.
    pub fn since(self, earlier: Time) -> f64 {
        (self.0 - earlier.0).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::Time;

    #[test]
    fn millis_arithmetic() {
        let t = Time::from_millis(1_500);
        assert_eq!(t, Time(1.5));
        assert_eq!(t.after_millis(500), Time(2.0));
        assert_eq!(Time(1.0).since(Time(3.0)), 0.0);
    }
}
