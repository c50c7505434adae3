//! Haptic and audible confirmation on an accepted scan.

use std::time::Duration;

/// Alternating vibrate/pause durations in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HapticPattern(pub &'static [u64]);

impl HapticPattern {
    pub const CONFIRM: Self = Self(&[70, 40, 70]);

    #[must_use]
    pub fn total(&self) -> Duration {
        Duration::from_millis(self.0.iter().sum())
    }
}

/// A short sine tone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tone {
    pub frequency_hz: u32,
    pub duration: Duration,
}

impl Tone {
    pub const CONFIRM: Self = Self {
        frequency_hz: 1450,
        duration: Duration::from_millis(150),
    };
}

/// Output device for confirmation feedback. Implementations must not block.
pub trait FeedbackSink: Send + Sync {
    fn haptic_pulse(&self, pattern: HapticPattern);

    fn tone(&self, tone: Tone);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackConfig {
    pub haptics: bool,
    pub sound: bool,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            haptics: true,
            sound: true,
        }
    }
}

impl FeedbackConfig {
    pub(crate) fn confirm(self, sink: &dyn FeedbackSink) {
        if self.haptics {
            sink.haptic_pulse(HapticPattern::CONFIRM);
        }
        if self.sound {
            sink.tone(Tone::CONFIRM);
        }
    }
}

/// Silent sink for headless use.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFeedback;

impl FeedbackSink for NoFeedback {
    fn haptic_pulse(&self, _pattern: HapticPattern) {}

    fn tone(&self, _tone: Tone) {}
}
