//! Seeded search over smoothing-filter parameters.
//!
//! A search replays recorded episodes through a fresh filter per candidate
//! configuration and ranks configurations by
//! `0.7 * delta_mean + 0.2 * (1 - harmony_mean) + 0.1 * misalign_rate`.
//! Sampling draws from an explicit [`Prng`] seeded per call, so the same
//! inputs always yield the same ranked list, bit for bit.

use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::TuneSettings;
use crate::episode::Episode;
use crate::error::{ErbError, Result};
use crate::filter::{SmoothingFilter, TrsFilter, MAX_WARMUP};
use crate::prng::Prng;
use crate::select;
use crate::store::EpisodeStore;

/// Number of results the ranked list keeps.
pub const RANKED_CAPACITY: usize = 16;

/// Trials used when a search asks for zero.
pub const DEFAULT_TRIALS: usize = 50;

/// allow_align in effect before any tune result is applied.
pub const DEFAULT_ALLOW_ALIGN: f32 = 0.2;

const WEIGHT_DELTA: f32 = 0.7;
const WEIGHT_HARMONY: f32 = 0.2;
const WEIGHT_ALIGN: f32 = 0.1;

/// Best-ranked configurations the refinement phase perturbs.
const REFINE_BASES: usize = 3;

/// Fraction of a dimension's range used as refinement jitter.
const REFINE_STEP: f32 = 0.1;
const MIN_REFINE_STEP: f32 = 0.02;

fn clamp_or_min(v: f32, min: f32, max: f32) -> f32 {
    if v.is_finite() {
        v.clamp(min, max)
    } else {
        min
    }
}

fn clamp_unit(v: f32) -> f32 {
    clamp_or_min(v, 0.0, 1.0)
}

fn finite_or(v: f32, fallback: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        fallback
    }
}

/// Bounds of the search, per dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuneSpace {
    pub alpha_min: f32,
    pub alpha_max: f32,
    pub warmup_min: u32,
    pub warmup_max: u32,
    pub align_min: f32,
    pub align_max: f32,
}

impl Default for TuneSpace {
    fn default() -> Self {
        Self {
            alpha_min: 0.1,
            alpha_max: 0.6,
            warmup_min: 0,
            warmup_max: 6,
            align_min: 0.4,
            align_max: 0.8,
        }
    }
}

impl TuneSpace {
    /// Order each (min, max) pair and clamp it into the valid domain
    /// (`[0, 1]` for alpha and allow_align, `[0, MAX_WARMUP]` for warmup).
    pub fn normalized(&self) -> Self {
        fn unit_range(a: f32, b: f32) -> (f32, f32) {
            let (a, b) = (clamp_unit(a), clamp_unit(b));
            (a.min(b), a.max(b))
        }
        let (alpha_min, alpha_max) = unit_range(self.alpha_min, self.alpha_max);
        let (align_min, align_max) = unit_range(self.align_min, self.align_max);
        let (w0, w1) = (self.warmup_min.min(MAX_WARMUP), self.warmup_max.min(MAX_WARMUP));
        Self {
            alpha_min,
            alpha_max,
            warmup_min: w0.min(w1),
            warmup_max: w0.max(w1),
            align_min,
            align_max,
        }
    }

    /// Independent uniform draw per dimension. Expects a normalized space.
    fn sample(&self, rng: &mut Prng) -> TuneConfig {
        let alpha_u = rng.next_f32_01();
        let align_u = rng.next_f32_01();
        let warm_u = rng.next_f32_01();

        let alpha = self.alpha_min + (self.alpha_max - self.alpha_min) * alpha_u;
        let align = self.align_min + (self.align_max - self.align_min) * align_u;
        let warm_span = (self.warmup_max - self.warmup_min) as f32;
        let warmup = self.warmup_min + (warm_u * warm_span).round() as u32;

        TuneConfig {
            filter_alpha: clamp_or_min(alpha, self.alpha_min, self.alpha_max),
            warmup_cycles: warmup.clamp(self.warmup_min, self.warmup_max),
            allow_align: clamp_or_min(align, self.align_min, self.align_max),
        }
    }

    /// Jitter `base` by up to a tenth of each dimension's range.
    fn perturb(&self, base: &TuneConfig, rng: &mut Prng) -> TuneConfig {
        let step = |span: f32| {
            let s = span * REFINE_STEP;
            if s > 0.0 {
                s
            } else {
                MIN_REFINE_STEP
            }
        };
        let alpha_step = step(self.alpha_max - self.alpha_min);
        let align_step = step(self.align_max - self.align_min);

        let alpha = base.filter_alpha + rng.next_signed() * alpha_step;
        let align = base.allow_align + rng.next_signed() * align_step;

        let warm_step = ((self.warmup_max - self.warmup_min) / 10).max(1) as f32;
        let warm_jitter = (rng.next_signed() * warm_step).round() as i64;
        let warmup = (i64::from(base.warmup_cycles) + warm_jitter)
            .clamp(i64::from(self.warmup_min), i64::from(self.warmup_max)) as u32;

        TuneConfig {
            filter_alpha: clamp_or_min(alpha, self.alpha_min, self.alpha_max),
            warmup_cycles: warmup,
            allow_align: clamp_or_min(align, self.align_min, self.align_max),
        }
    }
}

/// One point in the search space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TuneConfig {
    pub filter_alpha: f32,
    pub warmup_cycles: u32,
    pub allow_align: f32,
}

impl Default for TuneConfig {
    fn default() -> Self {
        Self {
            filter_alpha: 0.3,
            warmup_cycles: 5,
            allow_align: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TuneResult {
    pub config: TuneConfig,
    pub loss: f32,
    pub delta_mean: f32,
    pub harmony_mean: f32,
    pub consent_mean: f32,
    pub misalign_rate: f32,
}

impl TuneResult {
    /// A result for a configuration that saw no ticks. Its loss is infinite,
    /// so it never enters a ranked list.
    pub fn unevaluated(config: TuneConfig) -> Self {
        Self {
            config,
            loss: f32::INFINITY,
            delta_mean: 0.0,
            harmony_mean: 0.0,
            consent_mean: 0.0,
            misalign_rate: 0.0,
        }
    }

    pub fn is_evaluated(&self) -> bool {
        self.loss.is_finite()
    }
}

/// Results sorted ascending by loss, at most `capacity` of them.
#[derive(Debug, Clone)]
pub struct RankedResults {
    items: Vec<TuneResult>,
    capacity: usize,
}

impl Default for RankedResults {
    fn default() -> Self {
        Self::with_capacity(RANKED_CAPACITY)
    }
}

impl RankedResults {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert `candidate` in loss order. A full list only admits candidates
    /// that beat its current worst, which is dropped. Ties keep the earlier
    /// entry first. Non-finite losses are refused.
    pub fn insert(&mut self, candidate: TuneResult) -> bool {
        if !candidate.loss.is_finite() {
            return false;
        }
        if self.items.len() == self.capacity {
            let beats_worst = self.items.last().is_some_and(|w| candidate.loss < w.loss);
            if !beats_worst {
                return false;
            }
            self.items.pop();
        }
        let pos = self.items.partition_point(|r| r.loss <= candidate.loss);
        self.items.insert(pos, candidate);
        true
    }

    pub fn as_slice(&self) -> &[TuneResult] {
        &self.items
    }

    pub fn best(&self) -> Option<&TuneResult> {
        self.items.first()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// Replay `episodes` through a fresh `F` configured from `config` and score it.
///
/// Pure: no randomness, no shared state. Inputs are sanitized (non-finite
/// influence and consent become 0, non-finite harmony falls back to the
/// tick's influence) and clamped to `[0, 1]`.
pub fn evaluate<F, E>(episodes: &[E], config: &TuneConfig) -> TuneResult
where
    F: SmoothingFilter,
    E: AsRef<Episode>,
{
    let alpha = clamp_unit(config.filter_alpha);
    let warmup = config.warmup_cycles.min(MAX_WARMUP);

    let mut total_delta = 0.0f64;
    let mut total_harmony = 0.0f64;
    let mut total_consent = 0.0f64;
    let mut misaligned = 0u64;
    let mut ticks = 0u64;

    for episode in episodes {
        let episode = episode.as_ref();
        if episode.is_empty() {
            continue;
        }
        let mut filter = F::init(alpha, warmup);
        for snap in episode.ticks() {
            let influence = clamp_unit(finite_or(snap.influence, 0.0));
            let harmony = clamp_unit(finite_or(snap.harmony, influence));
            let consent = clamp_unit(finite_or(snap.consent, 0.0));

            let out = filter.step(influence, harmony, consent);
            let out_influence = clamp_unit(out.influence);
            let out_harmony = clamp_unit(out.harmony);
            let out_consent = clamp_unit(out.consent);

            total_delta += f64::from(finite_or(out.delta, 0.0));
            total_harmony += f64::from(out_harmony);
            total_consent += f64::from(out_consent);
            if (out_consent - out_influence).abs() > config.allow_align {
                misaligned += 1;
            }
            ticks += 1;
        }
    }

    if ticks == 0 {
        return TuneResult::unevaluated(*config);
    }

    let n = ticks as f64;
    let mean = |total: f64, fallback: f32| clamp_unit(finite_or((total / n) as f32, fallback));
    let delta_mean = mean(total_delta, 1.0);
    let harmony_mean = mean(total_harmony, 0.0);
    let consent_mean = mean(total_consent, 0.0);
    let misalign_rate = mean(misaligned as f64, 1.0);

    TuneResult {
        config: *config,
        loss: WEIGHT_DELTA * delta_mean
            + WEIGHT_HARMONY * (1.0 - harmony_mean)
            + WEIGHT_ALIGN * misalign_rate,
        delta_mean,
        harmony_mean,
        consent_mean,
        misalign_rate,
    }
}

/// Search driver. Holds the ranked list of the last search and the
/// allow_align of the last applied result.
#[derive(Debug, Clone)]
pub struct AutoTuner<F: SmoothingFilter = TrsFilter> {
    ranked: RankedResults,
    allow_align: f32,
    _filter: PhantomData<fn() -> F>,
}

impl<F: SmoothingFilter> Default for AutoTuner<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: SmoothingFilter> AutoTuner<F> {
    pub fn new() -> Self {
        Self {
            ranked: RankedResults::default(),
            allow_align: DEFAULT_ALLOW_ALIGN,
            _filter: PhantomData,
        }
    }

    pub fn evaluate<E: AsRef<Episode>>(&self, episodes: &[E], config: &TuneConfig) -> TuneResult {
        evaluate::<F, E>(episodes, config)
    }

    /// Global sampling followed by local refinement around the top results.
    ///
    /// `trials == 0` falls back to [`DEFAULT_TRIALS`]. `local_refine`
    /// candidates are split over the (up to three) best configurations of
    /// the global phase, in rank order. Returns the lowest-loss result seen;
    /// with no episodes (or no ticks) the result is
    /// [`TuneResult::unevaluated`] and the ranked list stays empty.
    pub fn search<E: AsRef<Episode>>(
        &mut self,
        episodes: &[E],
        space: &TuneSpace,
        trials: usize,
        local_refine: usize,
        seed: u64,
    ) -> TuneResult {
        self.ranked.clear();
        let mut best = TuneResult::unevaluated(TuneConfig::default());
        if episodes.is_empty() {
            return best;
        }

        let space = space.normalized();
        let trials = if trials == 0 { DEFAULT_TRIALS } else { trials };
        let mut rng = Prng::new(seed);

        for _ in 0..trials {
            let cfg = space.sample(&mut rng);
            self.consider(episodes, &cfg, &mut best);
        }

        let bases: Vec<TuneConfig> = self
            .ranked
            .as_slice()
            .iter()
            .take(REFINE_BASES)
            .map(|r| r.config)
            .collect();
        if !bases.is_empty() && local_refine > 0 {
            let per_base = local_refine.div_ceil(bases.len());
            let mut generated = 0;
            'bases: for base in &bases {
                for _ in 0..per_base {
                    if generated == local_refine {
                        break 'bases;
                    }
                    let cfg = space.perturb(base, &mut rng);
                    self.consider(episodes, &cfg, &mut best);
                    generated += 1;
                }
            }
        }

        if best.is_evaluated() {
            info!(
                "tune search done: loss={:.6} alpha={:.4} warmup={} allow_align={:.4} ({} trials, {} refine, seed {})",
                best.loss,
                best.config.filter_alpha,
                best.config.warmup_cycles,
                best.config.allow_align,
                trials,
                local_refine,
                seed
            );
        }
        best
    }

    /// Search over the `select_n` newest cached episodes (`0` = all).
    pub fn search_store<const N: usize>(
        &mut self,
        store: &EpisodeStore<N>,
        select_n: usize,
        space: &TuneSpace,
        trials: usize,
        local_refine: usize,
        seed: u64,
    ) -> TuneResult {
        let episodes = store.recent_episodes(select_n);
        self.search(&episodes, space, trials, local_refine, seed)
    }

    /// Search over the episodes `settings.source` picks from the store's
    /// index, loading evicted ones from their files. Trials and refinement
    /// are capped by `settings.max_runs`.
    pub fn tune_from_index<const N: usize>(
        &mut self,
        store: &EpisodeStore<N>,
        settings: &TuneSettings,
    ) -> Result<TuneResult> {
        let records = select::load_for_tuning(store, settings.source, settings.select_n);
        if records.is_empty() {
            return Err(ErbError::NoEpisodes);
        }
        let (trials, local_refine) = settings.budget();
        info!(
            "tuning on {} episode(s) selected by {}",
            records.len(),
            settings.source
        );
        Ok(self.search(&records, &settings.space, trials, local_refine, settings.seed))
    }

    fn consider<E: AsRef<Episode>>(&mut self, episodes: &[E], cfg: &TuneConfig, best: &mut TuneResult) {
        let candidate = self.evaluate(episodes, cfg);
        self.ranked.insert(candidate);
        if candidate.loss < best.loss {
            *best = candidate;
        }
    }

    /// Ranked results of the last search, best first.
    pub fn ranked(&self) -> &[TuneResult] {
        self.ranked.as_slice()
    }

    /// Push `result`'s alpha and warmup into the live filter and keep its
    /// allow_align for [`AutoTuner::is_misaligned`]. Fails only when the
    /// filter rejects the configuration, in which case nothing changes.
    pub fn apply(&mut self, result: &TuneResult, filter: &mut impl SmoothingFilter) -> Result<()> {
        let cfg = &result.config;
        filter.reconfigure(cfg.filter_alpha, cfg.warmup_cycles)?;
        self.allow_align = clamp_unit(cfg.allow_align);
        Ok(())
    }

    pub fn allow_align(&self) -> f32 {
        self.allow_align
    }

    pub fn is_misaligned(&self, consent: f32, influence: f32) -> bool {
        (consent - influence).abs() > self.allow_align
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{TagMask, TickSnapshot};

    fn synthetic_episodes(seed: u64, count: usize, len: usize) -> Vec<Episode> {
        let mut rng = Prng::new(seed);
        (0..count)
            .map(|_| {
                let mut ep = Episode::new(TagMask::SPIKE);
                for _ in 0..len {
                    ep.push(TickSnapshot {
                        influence: rng.next_f32_01(),
                        harmony: rng.gen_range_f32(0.3, 0.9),
                        consent: rng.next_f32_01(),
                        ..TickSnapshot::default()
                    });
                }
                ep
            })
            .collect()
    }

    fn result_with_loss(loss: f32) -> TuneResult {
        TuneResult {
            loss,
            ..TuneResult::unevaluated(TuneConfig::default())
        }
    }

    #[test]
    fn evaluate_is_deterministic_and_bounded() {
        let eps = synthetic_episodes(1, 3, 40);
        let cfg = TuneConfig {
            filter_alpha: 0.4,
            warmup_cycles: 2,
            allow_align: 0.5,
        };
        let a = evaluate::<TrsFilter, _>(&eps, &cfg);
        let b = evaluate::<TrsFilter, _>(&eps, &cfg);
        assert_eq!(a, b);
        assert!(a.is_evaluated());
        for v in [a.delta_mean, a.harmony_mean, a.consent_mean, a.misalign_rate] {
            assert!((0.0..=1.0).contains(&v));
        }
        let expected = 0.7 * a.delta_mean + 0.2 * (1.0 - a.harmony_mean) + 0.1 * a.misalign_rate;
        assert_eq!(a.loss, expected);
    }

    #[test]
    fn evaluate_constant_signal() {
        let mut ep = Episode::new(TagMask::ALIGN);
        for _ in 0..10 {
            ep.push(TickSnapshot {
                influence: 0.2,
                harmony: 0.8,
                consent: 0.9,
                ..TickSnapshot::default()
            });
        }
        let cfg = TuneConfig {
            filter_alpha: 0.5,
            warmup_cycles: 0,
            allow_align: 0.5,
        };
        let r = evaluate::<TrsFilter, _>(&[ep], &cfg);
        // EMA starts from zero, so early ticks lag the raw signal.
        assert!(r.delta_mean > 0.0);
        assert!(r.misalign_rate > 0.0 && r.misalign_rate < 1.0);

        let passthrough = TuneConfig {
            warmup_cycles: MAX_WARMUP,
            ..cfg
        };
        let mut ep = Episode::new(TagMask::ALIGN);
        for _ in 0..10 {
            ep.push(TickSnapshot {
                influence: 0.2,
                harmony: 0.8,
                consent: 0.9,
                ..TickSnapshot::default()
            });
        }
        let r = evaluate::<TrsFilter, _>(&[ep], &passthrough);
        assert_eq!(r.delta_mean, 0.0);
        assert_eq!(r.misalign_rate, 1.0);
        assert!((r.harmony_mean - 0.8).abs() < 1e-6);
    }

    #[test]
    fn evaluate_without_ticks_is_unevaluated() {
        let eps: Vec<Episode> = vec![Episode::new(TagMask::SPIKE)];
        let r = evaluate::<TrsFilter, _>(&eps, &TuneConfig::default());
        assert!(!r.is_evaluated());
    }

    #[test]
    fn evaluate_sanitizes_non_finite_ticks() {
        let mut ep = Episode::new(TagMask::SPIKE);
        ep.push(TickSnapshot {
            influence: f32::NAN,
            harmony: f32::INFINITY,
            consent: f32::NEG_INFINITY,
            ..TickSnapshot::default()
        });
        let r = evaluate::<TrsFilter, _>(&[ep], &TuneConfig::default());
        assert!(r.loss.is_finite());
    }

    #[test]
    fn ranked_results_stay_sorted_and_bounded() {
        let mut ranked = RankedResults::with_capacity(4);
        let mut rng = Prng::new(9);
        for _ in 0..50 {
            ranked.insert(result_with_loss(rng.next_f32_01()));
            assert!(ranked.len() <= 4);
            assert!(ranked.as_slice().windows(2).all(|w| w[0].loss <= w[1].loss));
        }
        assert_eq!(ranked.len(), 4);
    }

    #[test]
    fn ranked_results_admit_only_improvements_when_full() {
        let mut ranked = RankedResults::with_capacity(2);
        assert!(ranked.insert(result_with_loss(0.5)));
        assert!(ranked.insert(result_with_loss(0.3)));
        assert!(!ranked.insert(result_with_loss(0.5)));
        assert!(!ranked.insert(result_with_loss(f32::NAN)));
        assert!(ranked.insert(result_with_loss(0.1)));
        let losses: Vec<f32> = ranked.as_slice().iter().map(|r| r.loss).collect();
        assert_eq!(losses, vec![0.1, 0.3]);
    }

    #[test]
    fn search_is_reproducible() {
        let eps = synthetic_episodes(3, 4, 32);
        let space = TuneSpace::default();

        let mut t1: AutoTuner = AutoTuner::new();
        let mut t2: AutoTuner = AutoTuner::new();
        let a = t1.search(&eps, &space, 20, 0, 42);
        let b = t2.search(&eps, &space, 20, 0, 42);

        assert_eq!(a.config, b.config);
        assert_eq!(a.loss.to_bits(), b.loss.to_bits());
        assert_eq!(t1.ranked(), t2.ranked());

        let c = t1.search(&eps, &space, 20, 10, 42);
        let d = t2.search(&eps, &space, 20, 10, 42);
        assert_eq!(c, d);
        assert_eq!(t1.ranked(), t2.ranked());
    }

    #[test]
    fn search_results_respect_space_and_ranking() {
        let eps = synthetic_episodes(5, 2, 24);
        let space = TuneSpace::default();
        let mut tuner: AutoTuner = AutoTuner::new();
        let best = tuner.search(&eps, &space, 40, 12, 7);

        let ranked = tuner.ranked();
        assert!(!ranked.is_empty() && ranked.len() <= RANKED_CAPACITY);
        assert!(ranked.windows(2).all(|w| w[0].loss <= w[1].loss));
        assert_eq!(ranked[0].loss, best.loss);
        for r in ranked {
            let c = r.config;
            assert!((space.alpha_min..=space.alpha_max).contains(&c.filter_alpha));
            assert!((space.warmup_min..=space.warmup_max).contains(&c.warmup_cycles));
            assert!((space.align_min..=space.align_max).contains(&c.allow_align));
        }
    }

    #[test]
    fn refinement_never_worsens_best() {
        let eps = synthetic_episodes(11, 3, 30);
        let space = TuneSpace::default();
        let mut tuner: AutoTuner = AutoTuner::new();
        let global = tuner.search(&eps, &space, 15, 0, 99);
        let refined = tuner.search(&eps, &space, 15, 9, 99);
        assert!(refined.loss <= global.loss);
    }

    #[test]
    fn search_without_episodes() {
        let eps: Vec<Episode> = Vec::new();
        let mut tuner: AutoTuner = AutoTuner::new();
        let r = tuner.search(&eps, &TuneSpace::default(), 10, 5, 1);
        assert!(!r.is_evaluated());
        assert!(tuner.ranked().is_empty());
    }

    #[test]
    fn normalized_space_orders_and_clamps() {
        let space = TuneSpace {
            alpha_min: 0.9,
            alpha_max: -1.0,
            warmup_min: 20,
            warmup_max: 3,
            align_min: f32::NAN,
            align_max: 0.5,
        }
        .normalized();
        assert_eq!((space.alpha_min, space.alpha_max), (0.0, 0.9));
        assert_eq!((space.warmup_min, space.warmup_max), (3, MAX_WARMUP));
        assert_eq!((space.align_min, space.align_max), (0.0, 0.5));
    }

    #[test]
    fn degenerate_space_pins_every_candidate() {
        let eps = synthetic_episodes(2, 1, 16);
        let space = TuneSpace {
            alpha_min: 0.25,
            alpha_max: 0.25,
            warmup_min: 2,
            warmup_max: 2,
            align_min: 0.5,
            align_max: 0.5,
        };
        let mut tuner: AutoTuner = AutoTuner::new();
        let best = tuner.search(&eps, &space, 5, 6, 3);
        assert_eq!(best.config.filter_alpha, 0.25);
        assert_eq!(best.config.warmup_cycles, 2);
        assert_eq!(best.config.allow_align, 0.5);
    }

    #[test]
    fn apply_updates_filter_and_allow_align() {
        let mut tuner: AutoTuner = AutoTuner::new();
        let mut filter = TrsFilter::default();
        assert_eq!(tuner.allow_align(), DEFAULT_ALLOW_ALIGN);

        let good = TuneResult {
            config: TuneConfig {
                filter_alpha: 0.45,
                warmup_cycles: 3,
                allow_align: 0.6,
            },
            ..result_with_loss(0.1)
        };
        tuner.apply(&good, &mut filter).unwrap();
        assert_eq!(filter.alpha(), 0.45);
        assert_eq!(filter.warmup(), 3);
        assert_eq!(tuner.allow_align(), 0.6);
        assert!(tuner.is_misaligned(0.9, 0.2));
        assert!(!tuner.is_misaligned(0.5, 0.2));

        let bad = TuneResult {
            config: TuneConfig {
                filter_alpha: 0.5,
                warmup_cycles: MAX_WARMUP + 5,
                allow_align: 0.1,
            },
            ..good
        };
        assert!(tuner.apply(&bad, &mut filter).is_err());
        assert_eq!(tuner.allow_align(), 0.6);
        assert_eq!(filter.alpha(), 0.45);
    }

    #[test]
    fn search_store_uses_recent_episodes() {
        let mut store: EpisodeStore<4> = EpisodeStore::in_memory();
        for ep in synthetic_episodes(8, 3, 20) {
            store.finalize(ep);
        }
        let space = TuneSpace::default();
        let mut tuner: AutoTuner = AutoTuner::new();
        let from_store = tuner.search_store(&store, 2, &space, 10, 3, 5);

        let newest: Vec<&Episode> = store.recent_episodes(2);
        let mut direct: AutoTuner = AutoTuner::new();
        assert_eq!(direct.search(&newest, &space, 10, 3, 5), from_store);
    }

    #[test]
    fn tune_from_index_follows_selector_and_budget() {
        let dir = tempfile::tempdir().unwrap();
        let mut store: EpisodeStore<2> = EpisodeStore::open(dir.path());
        let mut eps = synthetic_episodes(21, 4, 16);
        eps[1].set_tag(TagMask::ALIGN);
        for ep in eps {
            store.finalize(ep);
        }

        let settings = TuneSettings {
            source: "tag:ALIGN".parse().unwrap(),
            trials: 8,
            local_refine: 50,
            max_runs: 12,
            seed: 4,
            ..TuneSettings::default()
        };
        let mut tuner: AutoTuner = AutoTuner::new();
        let got = tuner.tune_from_index(&store, &settings).unwrap();

        // Episode 1 was evicted from the cache and comes back from disk.
        let reloaded = store.get_by_id(1).unwrap();
        let mut direct: AutoTuner = AutoTuner::new();
        let expected = direct.search(&[reloaded], &settings.space, 8, 4, 4);
        assert_eq!(got, expected);

        let empty: EpisodeStore<2> = EpisodeStore::in_memory();
        assert!(matches!(
            tuner.tune_from_index(&empty, &settings),
            Err(ErbError::NoEpisodes)
        ));
    }
}
