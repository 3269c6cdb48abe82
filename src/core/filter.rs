use crate::error::{ErbError, Result};

/// Largest warmup the tuner and the live filter accept.
pub const MAX_WARMUP: u32 = 10;

/// Warmup a freshly initialized [`TrsFilter`] starts with.
pub const DEFAULT_WARMUP: u32 = 5;

const DEFAULT_ALPHA: f32 = 0.3;

/// Smoothed outputs of one filter step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FilterStep {
    pub influence: f32,
    pub harmony: f32,
    pub consent: f32,
    /// Largest absolute gap between a smoothed output and its raw input.
    pub delta: f32,
}

/// The smoothing filter whose parameters the tuner searches over.
///
/// `init` must build a fresh instance (no carried-over state) so that
/// replaying the same ticks with the same parameters is reproducible.
pub trait SmoothingFilter {
    fn init(alpha: f32, warmup: u32) -> Self
    where
        Self: Sized;

    fn step(&mut self, influence: f32, harmony: f32, consent: f32) -> FilterStep;

    /// Change the live parameters, or refuse them.
    fn reconfigure(&mut self, alpha: f32, warmup: u32) -> Result<()>;

    fn alpha(&self) -> f32;
}

/// Exponential moving average over (influence, harmony, consent) with a
/// warmup count during which raw inputs pass straight through.
#[derive(Debug, Clone, PartialEq)]
pub struct TrsFilter {
    alpha: f32,
    warmup: u32,
    influence: f32,
    harmony: f32,
    consent: f32,
}

impl Default for TrsFilter {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA)
    }
}

fn clamp_alpha(alpha: f32) -> f32 {
    if alpha.is_finite() {
        alpha.clamp(0.0, 1.0)
    } else {
        DEFAULT_ALPHA
    }
}

fn finite_or_zero(v: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

impl TrsFilter {
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: clamp_alpha(alpha),
            warmup: DEFAULT_WARMUP,
            influence: 0.0,
            harmony: 0.0,
            consent: 0.0,
        }
    }

    pub fn warmup(&self) -> u32 {
        self.warmup
    }

    /// Forget smoothed state and restart the default warmup.
    pub fn reset(&mut self) {
        self.influence = 0.0;
        self.harmony = 0.0;
        self.consent = 0.0;
        self.warmup = DEFAULT_WARMUP;
    }
}

impl SmoothingFilter for TrsFilter {
    fn init(alpha: f32, warmup: u32) -> Self {
        let mut f = Self::new(alpha);
        f.warmup = warmup.min(MAX_WARMUP);
        f
    }

    fn step(&mut self, influence: f32, harmony: f32, consent: f32) -> FilterStep {
        let influence = finite_or_zero(influence);
        let harmony = finite_or_zero(harmony);
        let consent = finite_or_zero(consent);
        let alpha = clamp_alpha(self.alpha);

        if self.warmup > 0 || alpha == 0.0 {
            self.influence = influence;
            self.harmony = harmony;
            self.consent = consent;
            self.warmup = self.warmup.saturating_sub(1);
        } else {
            let keep = 1.0 - alpha;
            self.influence = alpha * influence + keep * self.influence;
            self.harmony = alpha * harmony + keep * self.harmony;
            self.consent = alpha * consent + keep * self.consent;
        }

        let delta = (self.influence - influence)
            .abs()
            .max((self.harmony - harmony).abs())
            .max((self.consent - consent).abs());
        FilterStep {
            influence: self.influence,
            harmony: self.harmony,
            consent: self.consent,
            delta,
        }
    }

    fn reconfigure(&mut self, alpha: f32, warmup: u32) -> Result<()> {
        if !alpha.is_finite() || !(0.0..=1.0).contains(&alpha) || warmup > MAX_WARMUP {
            return Err(ErbError::FilterRejected { alpha, warmup });
        }
        self.alpha = alpha;
        self.warmup = warmup;
        Ok(())
    }

    fn alpha(&self) -> f32 {
        self.alpha
    }
}
