use liminal::autotune::{AutoTuner, TuneResult};
use liminal::config::{AppPaths, ErbConfig};
use liminal::erb::ReplayBuffer;
use liminal::error::{ErbError, Result};
use liminal::filter::{SmoothingFilter, TrsFilter};
use liminal::observer::StoreAdapter;
use liminal::prng::Prng;
use liminal::profile::{self, TuneProfile};
use liminal::replay::{self, ReplayLog};
use liminal::select::EpisodeSelector;
use liminal::store::EpisodeStore;
use liminal::telemetry::{TagMask, TickSnapshot};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let cmd = args.get(1).map(String::as_str).unwrap_or("demo");
    if matches!(cmd, "--help" | "-h" | "help") {
        print_help();
        return Ok(());
    }

    let paths = AppPaths::new()?;
    let cfg = ErbConfig::new_from_env(&paths)?;
    info!("data directory: {:?}", paths.data_dir());

    match cmd {
        "demo" => {
            let cycles = args.get(2).and_then(|v| v.parse().ok()).unwrap_or(600);
            run_demo(&paths, &cfg, cycles)
        }
        "tune" => run_tune(&paths, &cfg).map(|_| ()),
        "replay" => {
            let selector = match args.get(2) {
                Some(s) => s.parse()?,
                None => EpisodeSelector::Latest,
            };
            run_replay(&paths, selector)
        }
        "status" => {
            print_status(&paths);
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_help();
            std::process::exit(2);
        }
    }
}

fn print_help() {
    println!("liminal (episodic replay buffer + filter auto-tuner)");
    println!("usage:");
    println!("  cargo run                       capture episodes from synthetic telemetry, then tune");
    println!("  cargo run -- demo [cycles]");
    println!("  cargo run -- tune               tune on stored episodes (LIMINAL_TUNE_SOURCE selects)");
    println!("  cargo run -- replay [selector]  latest | all | idx:N | tag:SPIKE|ALIGN|LOW_HARM");
    println!("  cargo run -- status");
    println!("  cargo run -- --help");
    println!("data lives under the platform data dir (override with LIMINAL_DATA_DIR)");
}

/// Synthetic telemetry with occasional bursts, run through the live filter.
/// Tags come from a few fixed thresholds standing in for the upstream
/// detectors.
fn run_demo(paths: &AppPaths, cfg: &ErbConfig, cycles: usize) -> Result<()> {
    let store: EpisodeStore = EpisodeStore::open(paths.logs_dir());
    let mut erb: ReplayBuffer = ReplayBuffer::from_settings(&cfg.capture, store);
    let mut filter = load_live_filter(paths);
    let mut rng = Prng::new(cfg.tune.seed);

    let mut captured = Vec::new();
    for t in 0..cycles {
        let burst = (t / 80) % 3 == 2 && t % 80 < 12;
        let phase = t as f32 * 0.05;
        let noise = if burst { 0.45 } else { 0.05 };
        let influence = (0.5 + 0.3 * phase.sin() + noise * rng.next_signed()).clamp(0.0, 1.0);
        let consent = (0.55 + 0.25 * (phase * 0.7).cos() + noise * rng.next_signed()).clamp(0.0, 1.0);
        let harmony = (0.7 - if burst { 0.5 } else { 0.0 } + 0.05 * rng.next_signed()).clamp(0.0, 1.0);

        let out = filter.step(influence, harmony, consent);
        erb.push_tick(TickSnapshot {
            amp: 0.5 + 0.5 * phase.sin(),
            tempo: 1.0 + 0.1 * rng.next_signed(),
            consent,
            influence,
            harmony,
            dream: 0.0,
            filter_delta: out.delta,
            filter_alpha: filter.alpha(),
        });

        let mut tag = TagMask::NONE;
        if out.delta > 0.3 {
            tag |= TagMask::SPIKE;
        }
        if (out.consent - out.influence).abs() > 0.5 {
            tag |= TagMask::ALIGN;
        }
        if out.harmony < 0.3 {
            tag |= TagMask::LOW_HARM;
        }
        if let Some(id) = erb.maybe_capture(tag) {
            captured.push(id);
        }
    }
    println!("captured {} episode(s) over {cycles} cycles: {captured:?}", captured.len());

    let store = erb.into_store();
    if store.is_empty() {
        println!("nothing to tune on");
        return Ok(());
    }
    let best = run_tune_on(paths, cfg, &store)?;
    let mut tuner: AutoTuner = AutoTuner::new();
    tuner.apply(&best, &mut filter)?;
    println!(
        "live filter now alpha={:.4} warmup={} (allow_align={:.4})",
        filter.alpha(),
        filter.warmup(),
        tuner.allow_align()
    );
    Ok(())
}

fn run_tune(paths: &AppPaths, cfg: &ErbConfig) -> Result<TuneResult> {
    let store: EpisodeStore = EpisodeStore::open(paths.logs_dir());
    run_tune_on(paths, cfg, &store)
}

fn run_tune_on<const N: usize>(
    paths: &AppPaths,
    cfg: &ErbConfig,
    store: &EpisodeStore<N>,
) -> Result<TuneResult> {
    let mut tuner: AutoTuner = AutoTuner::new();
    let best = tuner.tune_from_index(store, &cfg.tune)?;
    if !best.is_evaluated() {
        eprintln!("[tune] tuning search did not converge.");
        return Err(ErbError::NoEpisodes);
    }

    println!("[tune] top {} configs:", tuner.ranked().len().min(profile::REPORT_TOP));
    for (i, r) in tuner.ranked().iter().take(profile::REPORT_TOP).enumerate() {
        println!(
            "  #{} loss={:.6} delta={:.6} harm={:.6} consent={:.6} misalign={:.6} alpha={:.4} warm={} align={:.4}",
            i + 1,
            r.loss,
            r.delta_mean,
            r.harmony_mean,
            r.consent_mean,
            r.misalign_rate,
            r.config.filter_alpha,
            r.config.warmup_cycles,
            r.config.allow_align
        );
    }

    if let Err(e) = profile::write_tune_report(&paths.logs_dir(), tuner.ranked()) {
        warn!("failed to write tune report: {e}");
    }
    profile::save_profile(&paths.profile_file(), &TuneProfile::from_result(&best))?;
    Ok(best)
}

fn run_replay(paths: &AppPaths, selector: EpisodeSelector) -> Result<()> {
    let store: EpisodeStore = EpisodeStore::open(paths.logs_dir());
    let mut filter = load_live_filter(paths);
    let log = ReplayLog::new(&paths.logs_dir());
    let n = replay::replay_selected(&store, selector, &mut filter, Some(&log))?;
    println!("replayed {n} episode(s) into {:?}", log.path());
    Ok(())
}

fn print_status(paths: &AppPaths) {
    let store: EpisodeStore = EpisodeStore::open(paths.logs_dir());
    let snap = StoreAdapter::new(&store).snapshot();
    println!(
        "store: persistent={} next_id={:?} cached={}/{}",
        snap.persistent, snap.next_id, snap.cached, snap.capacity
    );
    for rec in snap.episodes.iter().rev().take(10) {
        println!(
            "  #{:06} len={:3} tag={:<20} delta_max={:.4} alpha_mean={:.4}",
            rec.idx, rec.len, rec.tag, rec.delta_max, rec.alpha_mean
        );
    }
}

/// Default filter, reconfigured from the saved profile when one loads.
fn load_live_filter(paths: &AppPaths) -> TrsFilter {
    let mut filter = TrsFilter::default();
    let path = paths.profile_file();
    if !path.exists() {
        return filter;
    }
    match profile::load_profile(&path) {
        Ok(p) => {
            let cfg = p.config();
            if let Err(e) = filter.reconfigure(cfg.filter_alpha, cfg.warmup_cycles) {
                warn!("ignoring saved profile: {e}");
            }
        }
        Err(e) => warn!("ignoring saved profile: {e}"),
    }
    filter
}
