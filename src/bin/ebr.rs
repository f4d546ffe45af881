use crossbeam_ebr::LocalHandle;
use crossbeam_utils::thread::scope;
use std::path::Path;
use std::process::ExitCode;
use std::sync::mpsc;
use std::sync::Barrier;
use std::thread::{available_parallelism, sleep};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use typenum::{Unsigned, U1, U4};

use efrb_tree::config::set::{setup, Config, OpsPerPin, Report, SetOp, Stall, DS};
use efrb_tree::config::MemSampler;
use efrb_tree::{ConcurrentSet, EFRBTree, LockedSet};

#[cfg(target_os = "linux")]
#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// Polling period of the auxiliary thread.
const AUX_TICK: Duration = Duration::from_millis(1);

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mm = Path::new(file!())
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("ebr")
        .to_string();
    let (config, output) = match setup(mm) {
        Ok(Some(setup)) => setup,
        Ok(None) => return ExitCode::SUCCESS,
        Err(e) => {
            error!(%e, "failed to set up the benchmark");
            return ExitCode::FAILURE;
        }
    };

    println!("{}", config);
    let report = match config.ops_per_pin {
        OpsPerPin::One => bench::<U1>(&config),
        OpsPerPin::Four => bench::<U4>(&config),
    };
    println!("{}", report);
    if let Err(e) = output.write(&config, &report) {
        error!(%e, "failed to write the result");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn bench<N: Unsigned>(config: &Config) -> Report {
    match config.ds {
        DS::EFRBTree => bench_set::<EFRBTree<usize>, N>(config),
        DS::Locked => bench_set::<LockedSet<usize>, N>(config),
    }
}

/// Inserts `config.prefill` random keys from all cores. Returns the
/// resulting size.
fn prefill<S: ConcurrentSet<usize> + Send + Sync>(config: &Config, set: &S) -> usize {
    let threads = available_parallelism().map(|v| v.get()).unwrap_or(1);
    info!(threads, attempts = config.prefill, "prefilling");
    scope(|s| {
        for t in 0..threads {
            s.spawn(move |_| {
                let rng = &mut rand::thread_rng();
                let share = config.prefill / threads + usize::from(t < config.prefill % threads);
                for _ in 0..share {
                    let _ = set.insert(config.workload.key(rng), &crossbeam_ebr::pin());
                }
            });
        }
    })
    .expect("prefill thread panicked");
    let len = set.len();
    info!(len, "prefilled");
    len
}

fn bench_set<S: ConcurrentSet<usize> + Send + Sync, N: Unsigned>(config: &Config) -> Report {
    let (min, max) = config.bounds();
    let set = &match S::with_bounds(min, max) {
        Ok(set) => set,
        Err(e) => unreachable!("benchmark bounds are valid: {}", e),
    };
    let prefilled_len = prefill(config, set);

    let sampler = config.sampling_period.and_then(|_| match MemSampler::new() {
        Ok(sampler) => Some(sampler),
        Err(e) => {
            warn!(%e, "memory sampling disabled");
            None
        }
    });
    let sampler = sampler.as_ref();

    // Retirement re-pins the guard's collector; the default one does that
    // through the thread-local handle.
    let collector = crossbeam_ebr::default_collector();
    let aux = usize::from(config.needs_aux_thread());
    let barrier = &Barrier::new(config.threads + aux);
    let (ops_sender, ops_receiver) = mpsc::channel();

    let (peak_mem, avg_mem) = scope(|s| {
        let aux_thread = (aux > 0).then(|| {
            s.spawn(move |_| run_aux(config, sampler, &collector.register(), barrier))
        });

        for _ in 0..config.threads {
            let ops_sender = ops_sender.clone();
            s.spawn(move |_| {
                let ops = run_worker::<S, N>(config, set, &collector.register(), barrier);
                let _ = ops_sender.send(ops);
            });
        }

        aux_thread
            .map(|h| h.join().expect("auxiliary thread panicked"))
            .unwrap_or((0, 0))
    })
    .expect("benchmark thread panicked");
    info!("end");

    let ops: u64 = ops_receiver.iter().take(config.threads).sum();
    Report {
        ops_per_sec: ops / config.duration.as_secs().max(1),
        peak_mem,
        avg_mem,
        prefilled_len,
        final_len: set.len(),
    }
}

/// Runs random operations until the configured duration has passed,
/// repinning every `N` operations. Returns the number of operations.
fn run_worker<S: ConcurrentSet<usize>, N: Unsigned>(
    config: &Config,
    set: &S,
    handle: &LocalHandle,
    barrier: &Barrier,
) -> u64 {
    let rng = &mut rand::thread_rng();
    let mut ops: u64 = 0;
    barrier.wait();
    let start = Instant::now();

    let mut guard = handle.pin();
    while start.elapsed() < config.duration {
        let (op, key) = config.workload.next(rng);
        match op {
            SetOp::Contains => {
                let _ = set.contains(&key, &guard);
            }
            SetOp::Insert => {
                let _ = set.insert(key, &guard);
            }
            SetOp::Remove => {
                let _ = set.remove(&key, &guard);
            }
        }
        ops += 1;
        if ops % N::to_u64() == 0 {
            guard.repin();
        }
    }
    ops
}

/// Samples memory and, if configured, holds a pin that delays reclamation.
/// Returns the peak and average of the samples.
fn run_aux(
    config: &Config,
    sampler: Option<&MemSampler>,
    handle: &LocalHandle,
    barrier: &Barrier,
) -> (usize, usize) {
    let mut samples = 0usize;
    let mut total = 0usize;
    let mut peak = 0usize;
    barrier.wait();
    let start = Instant::now();

    let mut stall = match config.stall {
        Stall::Off => None,
        _ => Some(handle.pin()),
    };
    let mut next_sample = start;
    let mut next_repin = start;

    while start.elapsed() < config.duration {
        let now = Instant::now();
        if let (Some(sampler), Some(period)) = (sampler, config.sampling_period) {
            if now >= next_sample {
                match sampler.sample() {
                    Ok(allocated) => {
                        samples += 1;
                        total += allocated;
                        peak = peak.max(allocated);
                    }
                    Err(e) => warn!(%e, "memory sample failed"),
                }
                next_sample = now + period;
            }
        }
        if let (Stall::Repin(period), Some(guard)) = (config.stall, stall.as_mut()) {
            if now >= next_repin {
                guard.repin();
                next_repin = now + period;
            }
        }
        sleep(AUX_TICK);
    }

    drop(stall);
    (peak, if samples > 0 { total / samples } else { 0 })
}
