use anyhow::{anyhow, Result};
use clap::Parser;
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use GenCache::metrics::MetricsSnapshot;
use GenCache::{ContentStore, Scavenger, StoreBuilder, StoreStats};

/// Value stored by the bench: who wrote it and for which key.
#[derive(Debug)]
struct Stamp {
    gen: i64,
    key: u64,
}

/// Простой прогресс‑репорт на ~10 шагов.
struct Progress<'a> {
    name: &'a str,
    total: usize,
    step: usize,
    next: usize,
    start: Instant,
    enabled: bool,
}
impl<'a> Progress<'a> {
    fn new(name: &'a str, total: usize, enabled: bool) -> Self {
        let step = std::cmp::max(1, total / 10);
        Self {
            name,
            total,
            step,
            next: step,
            start: Instant::now(),
            enabled,
        }
    }
    fn bump(&mut self, cur: usize) {
        if !self.enabled {
            return;
        }
        if cur >= self.next || cur == self.total {
            let pct = (cur as f64 / self.total.max(1) as f64) * 100.0;
            let elapsed = self.start.elapsed().as_secs_f64();
            let tput = if elapsed > 0.0 { cur as f64 / elapsed } else { 0.0 };
            println!(
                "[{:>10}] {:>7} / {:<7} ({:>5.1}%) elapsed={:.2}s, tput={:.0} ops/s",
                self.name, cur, self.total, pct, elapsed, tput
            );
            self.next = cur.saturating_add(self.step);
        }
    }
}

/// GenCache micro-benchmark CLI
///
/// Примеры:
///   gencache_bench --keys 100000 --batch-size 512 --json
///   gencache_bench --readers 8 --mixed-ms 5000 --scavenger-ms 50
#[derive(Parser, Debug)]
#[command(name = "gencache_bench", version, about = "GenCache micro-bench CLI")]
struct Opt {
    /// Distinct keys loaded before the read phases
    #[arg(long, default_value_t = 100_000)]
    keys: u64,

    /// Writes per write session (one generation per session)
    #[arg(long, default_value_t = 1024)]
    batch_size: usize,

    /// Point reads in the get_hits phase
    #[arg(long, default_value_t = 200_000)]
    reads: u64,

    /// Reader threads in the mixed phase
    #[arg(long, default_value_t = 4)]
    readers: usize,

    /// Duration of the mixed phase (ms)
    #[arg(long, default_value_t = 2_000)]
    mixed_ms: u64,

    /// Reads per pinned snapshot in the mixed phase
    #[arg(long, default_value_t = 64)]
    reads_per_pin: usize,

    /// Attach a background scavenger with this period (0 = one-shot collect threads)
    #[arg(long, default_value_t = 0)]
    scavenger_ms: u64,

    /// Per-key version cap (0 = unlimited)
    #[arg(long, default_value_t = 64)]
    max_chain_depth: usize,

    /// Random seed (default: random)
    #[arg(long)]
    seed: Option<u64>,

    /// JSON output
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Show progress for each phase
    #[arg(long, default_value_t = true)]
    progress: bool,
}

#[derive(Debug, Clone, Serialize)]
struct PhaseStats {
    name: String,
    ops: u64,
    elapsed_sec: f64,
    p50_ms: f64,
    p90_ms: f64,
    p99_ms: f64,
    tput_ops: f64,
}

#[derive(Debug, Clone, Serialize)]
struct BenchReport {
    seed: u64,
    phases: Vec<PhaseStats>,
    // isolation violations seen by readers (must be 0)
    violations: u64,
    store: StoreStats,
    metrics: MetricsSnapshot,
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("bench error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let opt = Opt::parse();
    if opt.keys == 0 {
        return Err(anyhow!("--keys must be > 0"));
    }
    let seed = opt.seed.unwrap_or_else(|| rand::thread_rng().gen());

    // Сброс метрик перед запуском: чтобы отчёт был только про текущий прогон.
    GenCache::metrics::reset();

    let store: ContentStore<u64, Stamp> = StoreBuilder::new()
        .max_chain_depth(opt.max_chain_depth)
        .build();
    info!("bench: seed={} config: {}", seed, store.config());

    let scavenger = if opt.scavenger_ms > 0 {
        Some(Scavenger::start(&store, Duration::from_millis(opt.scavenger_ms))?)
    } else {
        None
    };

    let mut phases: Vec<PhaseStats> = Vec::new();

    println!("==> Phase: load ({} keys, batch={})", opt.keys, opt.batch_size);
    phases.push(phase_load(&opt, &store)?);

    println!("==> Phase: get_hits ({} reads, one pinned snapshot)", opt.reads);
    phases.push(phase_get_hits(&opt, &store, seed)?);

    println!(
        "==> Phase: mixed ({} readers + 1 writer, {} ms)",
        opt.readers, opt.mixed_ms
    );
    let (mixed, violations) = phase_mixed(&opt, &store, seed)?;
    phases.extend(mixed);

    if let Some(s) = scavenger {
        s.stop()?;
    }
    println!("==> Phase: collect");
    phases.push(phase_collect(&store));

    let report = BenchReport {
        seed,
        phases,
        violations,
        store: store.stats(),
        metrics: GenCache::metrics::snapshot(),
    };

    if opt.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report_human(&report);
    }

    if report.violations > 0 {
        return Err(anyhow!("{} snapshot isolation violation(s)", report.violations));
    }
    Ok(())
}

// ---------- phases ----------

fn phase_load(opt: &Opt, store: &ContentStore<u64, Stamp>) -> Result<PhaseStats> {
    let bs = opt.batch_size.max(1) as u64;
    let mut lat = Vec::new();
    let mut prog = Progress::new("load", opt.keys as usize, opt.progress);
    let start = Instant::now();
    let mut k = 0u64;
    while k < opt.keys {
        let t0 = Instant::now();
        let mut w = store.write();
        let gen = w.gen();
        let end = (k + bs).min(opt.keys);
        for key in k..end {
            w.set(key, Stamp { gen, key });
        }
        w.commit();
        lat.push(t0.elapsed());
        k = end;
        prog.bump(k as usize);
    }
    let st = stats("load", opt.keys, start.elapsed(), &mut lat);
    print_phase_summary(&st);
    Ok(st)
}

fn phase_get_hits(opt: &Opt, store: &ContentStore<u64, Stamp>, seed: u64) -> Result<PhaseStats> {
    let mut rng = StdRng::seed_from_u64(seed ^ 0xDEAD_BEEF_CAFE_BABE);
    let snap = store.pin();
    let mut lat = Vec::with_capacity(opt.reads as usize);
    let mut prog = Progress::new("get_hits", opt.reads as usize, opt.progress);
    let start = Instant::now();
    for n in 0..opt.reads {
        let key = rng.gen_range(0..opt.keys);
        let t0 = Instant::now();
        let got = snap.get(&key);
        lat.push(t0.elapsed());
        match got {
            Some(v) if v.key == key => {}
            _ => return Err(anyhow!("get_hits: missing or foreign value for key {}", key)),
        }
        prog.bump(n as usize + 1);
    }
    let st = stats("get_hits", opt.reads, start.elapsed(), &mut lat);
    print_phase_summary(&st);
    Ok(st)
}

/// Readers pin, read a few random keys twice, and check that each value was
/// written at or before their generation and does not change under them.
fn phase_mixed(
    opt: &Opt,
    store: &ContentStore<u64, Stamp>,
    seed: u64,
) -> Result<(Vec<PhaseStats>, u64)> {
    let stop = Arc::new(AtomicBool::new(false));
    let violations = Arc::new(AtomicU64::new(0));
    let barrier = Arc::new(Barrier::new(opt.readers + 2));
    let deadline = Duration::from_millis(opt.mixed_ms);

    let mut readers = Vec::with_capacity(opt.readers);
    for r in 0..opt.readers {
        let store = store.clone();
        let stop = stop.clone();
        let violations = violations.clone();
        let barrier = barrier.clone();
        let keys = opt.keys;
        let per_pin = opt.reads_per_pin.max(1);
        let reader_seed = seed.wrapping_add(r as u64 + 1);
        readers.push(thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(reader_seed);
            let mut lat = Vec::new();
            let mut ops = 0u64;
            barrier.wait();
            while !stop.load(Ordering::Relaxed) {
                let t0 = Instant::now();
                let snap = store.pin();
                for _ in 0..per_pin {
                    let key = rng.gen_range(0..keys);
                    let a = snap.get(&key);
                    let b = snap.get(&key);
                    let ok = match (&a, &b) {
                        (Some(a), Some(b)) => {
                            Arc::ptr_eq(a, b) && a.key == key && a.gen <= snap.gen()
                        }
                        (None, None) => true,
                        _ => false,
                    };
                    if !ok {
                        violations.fetch_add(1, Ordering::Relaxed);
                    }
                    ops += 2;
                }
                drop(snap);
                lat.push(t0.elapsed());
            }
            (ops, lat)
        }));
    }

    let writer = {
        let store = store.clone();
        let stop = stop.clone();
        let barrier = barrier.clone();
        let keys = opt.keys;
        let bs = opt.batch_size.max(1);
        thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(seed ^ 0x5EED);
            let mut lat = Vec::new();
            let mut ops = 0u64;
            barrier.wait();
            while !stop.load(Ordering::Relaxed) {
                let t0 = Instant::now();
                let mut w = store.write();
                let gen = w.gen();
                for _ in 0..bs {
                    let key = rng.gen_range(0..keys);
                    // ~1/16 deletes
                    if rng.gen_ratio(1, 16) {
                        w.delete(key);
                    } else {
                        w.set(key, Stamp { gen, key });
                    }
                }
                w.commit();
                ops += bs as u64;
                lat.push(t0.elapsed());
            }
            (ops, lat)
        })
    };

    barrier.wait();
    let start = Instant::now();
    thread::sleep(deadline);
    stop.store(true, Ordering::Relaxed);

    let mut read_ops = 0u64;
    let mut read_lat = Vec::new();
    for h in readers {
        let (ops, lat) = h.join().map_err(|_| anyhow!("reader thread panicked"))?;
        read_ops += ops;
        read_lat.extend(lat);
    }
    let (write_ops, mut write_lat) = writer
        .join()
        .map_err(|_| anyhow!("writer thread panicked"))?;
    let elapsed = start.elapsed();

    let r = stats("mixed_read", read_ops, elapsed, &mut read_lat);
    let w = stats("mixed_write", write_ops, elapsed, &mut write_lat);
    print_phase_summary(&r);
    print_phase_summary(&w);
    Ok((vec![r, w], violations.load(Ordering::Relaxed)))
}

fn phase_collect(store: &ContentStore<u64, Stamp>) -> PhaseStats {
    let rep = store.collect();
    println!(
        "    [collect] floor_gen={} removed_keys={} trimmed_nodes={}",
        rep.floor_gen, rep.keys_removed, rep.nodes_trimmed
    );
    let mut lat = vec![rep.elapsed];
    let st = stats("collect", rep.keys_scanned as u64, rep.elapsed, &mut lat);
    print_phase_summary(&st);
    st
}

// ---------- helpers ----------

fn print_phase_summary(p: &PhaseStats) {
    println!(
        "    {}: ops={} elapsed={:.3}s tput={:.0} ops/s p50={:.3}ms p90={:.3}ms p99={:.3}ms",
        p.name, p.ops, p.elapsed_sec, p.tput_ops, p.p50_ms, p.p90_ms, p.p99_ms
    );
}

fn stats(name: &str, ops: u64, elapsed: Duration, lat: &mut [Duration]) -> PhaseStats {
    lat.sort_unstable();
    let to_ms = |d: Duration| d.as_secs_f64() * 1000.0;
    let p = |q: f64| -> f64 {
        if lat.is_empty() {
            return 0.0;
        }
        let idx = ((lat.len() as f64 - 1.0) * q).round() as usize;
        to_ms(lat[idx])
    };
    let tput = if elapsed.as_secs_f64() > 0.0 {
        ops as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };
    PhaseStats {
        name: name.to_string(),
        ops,
        elapsed_sec: elapsed.as_secs_f64(),
        p50_ms: p(0.50),
        p90_ms: p(0.90),
        p99_ms: p(0.99),
        tput_ops: tput,
    }
}

fn print_report_human(r: &BenchReport) {
    println!("GenCache bench report:");
    println!("  seed          = {}", r.seed);
    println!("  violations    = {}", r.violations);
    println!("Phases:");
    for p in &r.phases {
        println!(
            "  {:>12}: ops={} elapsed={:.3}s tput={:.0} ops/s p50={:.3}ms p90={:.3}ms p99={:.3}ms",
            p.name, p.ops, p.elapsed_sec, p.tput_ops, p.p50_ms, p.p90_ms, p.p99_ms
        );
    }
    let s = &r.store;
    println!("Store:");
    println!(
        "  gens live/committed/floor = {}/{}/{}",
        s.live_gen, s.committed_gen, s.floor_gen
    );
    println!("  gen_records   = {}", s.gen_count);
    println!("  snapshots     = {}", s.snap_count);
    println!("  keys          = {}", s.keys);
    println!("  nodes         = {}", s.nodes);
    println!("  max_depth     = {}", s.max_depth);
    let m = &r.metrics;
    println!("Metrics snapshot:");
    println!("  generations_created     = {}", m.generations_created);
    println!("  write_sessions/rollback = {}/{}", m.write_sessions, m.rollbacks);
    println!("  reads/writes            = {}/{}", m.reads, m.writes);
    println!("  pins                    = {}", m.pins);
    println!("  pins_per_handle         = {:.2}", m.pins_per_handle());
    println!("  collect_runs            = {}", m.collect_runs);
    println!("  nodes_trimmed           = {}", m.nodes_trimmed);
    println!("  keys_removed            = {}", m.keys_removed);
    println!("  avg_trimmed/collect     = {:.2}", m.avg_trimmed_per_collect());
    println!(
        "  depth_valve trims/nodes = {}/{}",
        m.depth_valve_trims, m.depth_valve_nodes
    );
}
