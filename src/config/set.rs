//! Benchmark settings for the set implementations, and the CSV report.

use std::fmt;
use std::fs::{create_dir_all, File, OpenOptions};
use std::path::Path;
use std::time::Duration;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command, ValueEnum};
use csv::Writer;
use rand::distributions::{Distribution, Uniform, WeightedIndex};
use rand::Rng;

use super::ConfigError;

#[derive(PartialEq, Debug, ValueEnum, Clone, Copy)]
pub enum DS {
    /// The lock-free tree.
    #[value(name = "efrb-tree")]
    EFRBTree,
    /// `RwLock<BTreeSet>` baseline.
    #[value(name = "locked")]
    Locked,
}

impl DS {
    pub fn name(self) -> &'static str {
        match self {
            DS::EFRBTree => "efrb-tree",
            DS::Locked => "locked",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum SetOp {
    Contains,
    Insert,
    Remove,
}

/// Share of `contains` among the operations. Inserts and removes split the
/// rest evenly, so the set size hovers around its prefilled value.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum ReadRatio {
    Never = 0,
    Half = 1,
    Mostly = 2,
    Always = 3,
}

impl ReadRatio {
    fn from_level(level: u8) -> Self {
        match level {
            1 => ReadRatio::Half,
            2 => ReadRatio::Mostly,
            3 => ReadRatio::Always,
            _ => ReadRatio::Never,
        }
    }

    /// Weights of `[contains, insert, remove]`.
    fn weights(self) -> [u32; 3] {
        match self {
            ReadRatio::Never => [0, 1, 1],
            ReadRatio::Half => [2, 1, 1],
            ReadRatio::Mostly => [18, 1, 1],
            ReadRatio::Always => [1, 0, 0],
        }
    }
}

/// What the worker threads draw from: an operation and a key in
/// `1..=key_range`.
pub struct Workload {
    pub read_ratio: ReadRatio,
    ops: WeightedIndex<u32>,
    keys: Uniform<usize>,
}

impl Workload {
    pub fn new(read_ratio: ReadRatio, key_range: usize) -> Self {
        let ops = match WeightedIndex::new(read_ratio.weights()) {
            Ok(ops) => ops,
            Err(e) => unreachable!("operation weights are constant and valid: {}", e),
        };
        Self {
            read_ratio,
            ops,
            keys: Uniform::from(1..=key_range),
        }
    }

    pub fn key<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        self.keys.sample(rng)
    }

    pub fn next<R: Rng + ?Sized>(&self, rng: &mut R) -> (SetOp, usize) {
        let op = match self.ops.sample(rng) {
            0 => SetOp::Contains,
            1 => SetOp::Insert,
            _ => SetOp::Remove,
        };
        (op, self.key(rng))
    }
}

/// How many operations a worker runs under one pin.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum OpsPerPin {
    One,
    Four,
}

/// Behaviour of the auxiliary thread that holds a pin to delay reclamation.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Stall {
    Off,
    /// Stays pinned and repins once per period.
    Repin(Duration),
    /// Stays pinned for the whole run.
    Forever,
}

impl Stall {
    fn from_level(level: u8) -> Self {
        match level {
            1 => Stall::Repin(Duration::from_millis(1)),
            2 => Stall::Repin(Duration::from_millis(10)),
            3 => Stall::Forever,
            _ => Stall::Off,
        }
    }

    fn level(self) -> u8 {
        match self {
            Stall::Off => 0,
            Stall::Repin(period) if period <= Duration::from_millis(1) => 1,
            Stall::Repin(_) => 2,
            Stall::Forever => 3,
        }
    }
}

pub struct Config {
    pub ds: DS,
    pub mm: String,
    pub threads: usize,
    pub workload: Workload,
    pub key_range: usize,
    /// Insert attempts made before the timed run.
    pub prefill: usize,
    pub duration: Duration,
    pub ops_per_pin: OpsPerPin,
    pub stall: Stall,
    /// `None` disables memory sampling.
    pub sampling_period: Option<Duration>,
}

impl Config {
    /// Bounds of the benchmarked set. Every drawn key lies strictly inside.
    pub fn bounds(&self) -> (usize, usize) {
        (0, self.key_range + 1)
    }

    /// Whether the auxiliary sampling/stalling thread is needed.
    pub fn needs_aux_thread(&self) -> bool {
        self.sampling_period.is_some() || self.stall != Stall::Off
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): {} threads, keys 1..={}, g{}, n{}, {} op(s)/pin",
            self.ds.name(),
            self.mm,
            self.threads,
            self.key_range,
            self.workload.read_ratio as u8,
            self.stall.level(),
            ops_per_pin(self.ops_per_pin),
        )
    }
}

fn ops_per_pin(ops: OpsPerPin) -> u8 {
    match ops {
        OpsPerPin::One => 1,
        OpsPerPin::Four => 4,
    }
}

/// Outcome of one run.
#[derive(Clone, Debug, Default)]
pub struct Report {
    pub ops_per_sec: u64,
    pub peak_mem: usize,
    pub avg_mem: usize,
    /// Members right after the prefill.
    pub prefilled_len: usize,
    /// Members when the last worker stopped.
    pub final_len: usize,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ops/s: {}, peak mem: {}, avg mem: {}, len: {} -> {}",
            self.ops_per_sec,
            human_bytes(self.peak_mem),
            human_bytes(self.avg_mem),
            self.prefilled_len,
            self.final_len,
        )
    }
}

fn human_bytes(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.3} {}", value, UNITS[unit])
}

const HEADER: [&str; 12] = [
    "ds",
    "mm",
    "threads",
    "key_range",
    "get_rate",
    "non_coop",
    "ops_per_pin",
    "throughput",
    "peak_mem",
    "avg_mem",
    "prefilled_len",
    "final_len",
];

/// Appends one CSV row per run, if an output file was requested.
pub struct ReportWriter {
    output: Option<Writer<File>>,
}

impl ReportWriter {
    pub fn write(self, config: &Config, report: &Report) -> Result<(), ConfigError> {
        let mut output = match self.output {
            Some(output) => output,
            None => return Ok(()),
        };
        output.write_record(&[
            config.ds.name().to_string(),
            config.mm.clone(),
            config.threads.to_string(),
            config.key_range.to_string(),
            (config.workload.read_ratio as u8).to_string(),
            config.stall.level().to_string(),
            ops_per_pin(config.ops_per_pin).to_string(),
            report.ops_per_sec.to_string(),
            report.peak_mem.to_string(),
            report.avg_mem.to_string(),
            report.prefilled_len.to_string(),
            report.final_len.to_string(),
        ])?;
        output.flush()?;
        Ok(())
    }
}

/// Opens `path` for appending. A new file starts with the header row.
fn open_output(path: &Path) -> Result<Writer<File>, ConfigError> {
    if let Some(dir) = path.parent() {
        create_dir_all(dir)?;
    }
    let is_new = !path.exists();
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut output = Writer::from_writer(file);
    if is_new {
        output.write_record(HEADER)?;
        output.flush()?;
    }
    Ok(output)
}

pub fn command(mm: String) -> Command {
    Command::new(mm)
        .about("Throughput of concurrent ordered sets under epoch-based reclamation")
        .arg(
            Arg::new("ds")
                .short('d')
                .value_parser(value_parser!(DS))
                .required(true)
                .ignore_case(true)
                .help("Set implementation"),
        )
        .arg(
            Arg::new("threads")
                .short('t')
                .value_parser(value_parser!(usize))
                .required(true)
                .help("Worker threads"),
        )
        .arg(
            Arg::new("stall")
                .short('n')
                .value_parser(value_parser!(u8).range(0..4))
                .default_value("0")
                .help("Pinned auxiliary thread: 0 none, 1 repins every 1ms, 2 every 10ms, 3 never"),
        )
        .arg(
            Arg::new("read ratio")
                .short('g')
                .value_parser(value_parser!(u8).range(0..4))
                .default_value("0")
                .help("Share of contains: 0 0%, 1 50%, 2 90%, 3 100%"),
        )
        .arg(
            Arg::new("range")
                .short('r')
                .value_parser(value_parser!(u64).range(1..))
                .default_value("100000")
                .help("Keys are drawn from 1..=RANGE"),
        )
        .arg(
            Arg::new("interval")
                .short('i')
                .value_parser(value_parser!(u64).range(1..))
                .default_value("10")
                .help("Length of the timed run in seconds"),
        )
        .arg(
            Arg::new("sampling period")
                .short('s')
                .value_parser(value_parser!(u64))
                .default_value("1")
                .help("Period of jemalloc stats.allocated samples in ms, 0 to disable (linux only)"),
        )
        .arg(
            Arg::new("ops per pin")
                .short('c')
                .value_parser(["1", "4"])
                .default_value("1")
                .help("Operations run under one pin"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .help("CSV file to append the result to"),
        )
        .arg(
            Arg::new("dry run")
                .long("dry-run")
                .action(ArgAction::SetTrue)
                .help("Only validate the arguments"),
        )
}

/// Builds the configuration from parsed arguments. Returns `None` for a dry run.
pub fn from_matches(
    mm: String,
    m: &ArgMatches,
) -> Result<Option<(Config, ReportWriter)>, ConfigError> {
    // Required or defaulted arguments are always present after parsing.
    let ds = m.get_one::<DS>("ds").copied().unwrap_or(DS::EFRBTree);
    let threads = m.get_one::<usize>("threads").copied().unwrap_or(1);
    let stall = Stall::from_level(m.get_one::<u8>("stall").copied().unwrap_or(0));
    let read_ratio = ReadRatio::from_level(m.get_one::<u8>("read ratio").copied().unwrap_or(0));
    let key_range = m.get_one::<u64>("range").copied().unwrap_or(100000) as usize;
    let interval = m.get_one::<u64>("interval").copied().unwrap_or(10);
    let sampling_ms = m.get_one::<u64>("sampling period").copied().unwrap_or(1);
    let ops_per_pin = match m.get_one::<String>("ops per pin").map(String::as_str) {
        Some("4") => OpsPerPin::Four,
        _ => OpsPerPin::One,
    };

    if m.get_flag("dry run") {
        return Ok(None);
    }

    let output = m
        .get_one::<String>("output")
        .map(|name| open_output(Path::new(name)))
        .transpose()?;

    let config = Config {
        ds,
        mm,
        threads,
        workload: Workload::new(read_ratio, key_range),
        key_range,
        prefill: key_range / 2,
        duration: Duration::from_secs(interval),
        ops_per_pin,
        stall,
        sampling_period: if sampling_ms > 0 && cfg!(target_os = "linux") {
            Some(Duration::from_millis(sampling_ms))
        } else {
            None
        },
    };

    Ok(Some((config, ReportWriter { output })))
}

pub fn setup(mm: String) -> Result<Option<(Config, ReportWriter)>, ConfigError> {
    let matches = command(mm.clone()).get_matches();
    from_matches(mm, &matches)
}
