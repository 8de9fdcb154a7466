use std::num::NonZeroU32;

/// Outcome of feeding one load sample to the [`OverloadDecider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Sample was under the threshold; any streak is forgiven.
    Healthy,
    /// Sample was at or over the threshold; `remaining` more in a row fire.
    Overloaded { remaining: u32 },
    /// The streak is complete. The decider has already re-armed.
    Fire,
}

/// Countdown hysteresis over consecutive load samples.
///
/// Every sample at or above the threshold counts the countdown down by one;
/// a single sample below it resets the countdown to the full count. There
/// is no partial decay. Reaching zero fires and re-arms immediately, so the
/// countdown always stays within `1..=required` between observations.
#[derive(Debug, Clone)]
pub struct OverloadDecider {
    threshold: f64,
    required: u32,
    countdown: u32,
}

impl OverloadDecider {
    pub fn new(threshold: f64, required: NonZeroU32) -> Self {
        Self {
            threshold,
            required: required.get(),
            countdown: required.get(),
        }
    }

    /// Feed one load sample and report what it means.
    pub fn observe(&mut self, load: f64) -> Verdict {
        if load >= self.threshold {
            self.countdown -= 1;
            if self.countdown == 0 {
                self.reset();
                return Verdict::Fire;
            }
            Verdict::Overloaded {
                remaining: self.countdown,
            }
        } else {
            self.reset();
            Verdict::Healthy
        }
    }

    /// Re-arm with a full countdown.
    pub fn reset(&mut self) {
        self.countdown = self.required;
    }

    #[cfg(test)]
    pub fn countdown(&self) -> u32 {
        self.countdown
    }

    #[cfg(test)]
    pub fn required(&self) -> u32 {
        self.required
    }
}
