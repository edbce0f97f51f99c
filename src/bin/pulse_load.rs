use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::info;
use pulse::{CoalescingWriter, FileSink, SinkOptions, WriterConfig};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const DEFAULT_LOG_FILTER: &str = "info,pulse=info";

/// Hammers a coalescing writer from many threads and reports throughput.
#[derive(Parser, Debug, Clone)]
struct Cli {
    /// Target file (created and truncated for every run)
    #[arg(long, conflicts_with = "config")]
    path: Option<PathBuf>,

    /// Writer configuration YAML; its path, latency and open flags are used for every run
    #[arg(long)]
    config: Option<PathBuf>,

    /// Parallelism levels to run, one run per value
    #[arg(long = "threads", value_delimiter = ',', default_values_t = vec![1, 4, 16, 32, 64, 128, 256])]
    threads: Vec<usize>,

    /// Appends issued by each thread
    #[arg(long, default_value_t = 100)]
    writes_per_thread: usize,

    /// Size of each appended packet
    #[arg(long, default_value_t = 4096)]
    packet_bytes: usize,

    /// Latency window in microseconds (ignored with --config)
    #[arg(long, default_value_t = 100)]
    latency_us: u64,

    /// env_logger-style filter string (e.g. "info,pulse=debug"); overrides RUST_LOG/defaults
    #[arg(long)]
    log_filter: Option<String>,
}

fn init_logging(cli_filter: Option<&str>) {
    let env = Env::default().default_filter_or(DEFAULT_LOG_FILTER);
    let mut builder = env_logger::Builder::from_env(env);
    if let Some(filter) = cli_filter {
        builder.parse_filters(filter);
    }
    builder.format(|buf, record| {
        let ts = buf.timestamp();
        writeln!(
            buf,
            "[{} {:<5} {}] {}",
            ts,
            record.level(),
            record.target(),
            record.args()
        )
    });
    builder.init();
}

/// Sink location, latency window and open flags for every run.
struct Target {
    path: PathBuf,
    latency: Duration,
    options: SinkOptions,
}

fn target(cli: &Cli) -> Result<Target> {
    match (&cli.config, &cli.path) {
        (Some(config_path), _) => {
            let config = WriterConfig::load(config_path)
                .with_context(|| format!("loading {}", config_path.display()))?;
            Ok(Target {
                options: config.sink_options(),
                latency: config.latency(),
                path: config.path,
            })
        }
        (None, Some(path)) => Ok(Target {
            path: path.clone(),
            latency: Duration::from_micros(cli.latency_us),
            options: SinkOptions::create_truncate(),
        }),
        (None, None) => anyhow::bail!("either --path or --config is required"),
    }
}

fn packet(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 255) as u8).collect()
}

fn run(
    target: &Target,
    parallelism: usize,
    writes_per_thread: usize,
    packet: &Arc<Vec<u8>>,
) -> Result<()> {
    let writer: Arc<CoalescingWriter<FileSink>> = Arc::new(
        CoalescingWriter::open(&target.path, target.options, target.latency)
            .with_context(|| format!("opening {}", target.path.display()))?,
    );
    let started = Instant::now();
    let workers: Vec<_> = (0..parallelism)
        .map(|_| {
            let writer = writer.clone();
            let packet = packet.clone();
            thread::spawn(move || {
                let mut failed = 0usize;
                for _ in 0..writes_per_thread {
                    if writer.append(&packet).is_err() {
                        failed += 1;
                    }
                }
                failed
            })
        })
        .collect();
    let mut failed = 0;
    for worker in workers {
        failed += worker
            .join()
            .map_err(|_| anyhow::anyhow!("load worker panicked"))?;
    }
    let elapsed = started.elapsed();
    let writes = parallelism * writes_per_thread;
    let telemetry = writer.telemetry();
    println!(
        "> total concurrency: {}, {:.2} writes/routine, {:.2} writes/sec, {} flushes, {:.2} appends/flush, {} failed",
        parallelism,
        writes as f64 / parallelism as f64,
        writes as f64 / elapsed.as_secs_f64(),
        telemetry.flushes,
        telemetry.mean_batch(),
        failed
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_filter.as_deref());
    let target = target(&cli)?;
    let packet = Arc::new(packet(cli.packet_bytes));
    info!(
        "event=pulse_load_start path={} latency_us={} packet_bytes={}",
        target.path.display(),
        target.latency.as_micros(),
        cli.packet_bytes
    );
    for &parallelism in &cli.threads {
        if parallelism == 0 {
            continue;
        }
        run(&target, parallelism, cli.writes_per_thread, &packet)?;
    }
    Ok(())
}
