//! tcpdp CLI entry point.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tcpdp::cli::{Args, Command, DumpArgs, OutputFormatter, ReadArgs};
use tcpdp_core::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Set up logging; stdout is reserved for records
    let filter = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(std::io::stderr)
        .init();

    let stats = match args.command {
        Command::Read(read) => read_file(read).await?,
        #[cfg(feature = "live")]
        Command::Probe(probe) => probe_interface(probe).await?,
    };

    if stats.stream.sink_errors > 0 {
        warn!(errors = stats.stream.sink_errors, "some records could not be written");
    }
    Ok(())
}

async fn read_file(args: ReadArgs) -> Result<PipelineStats> {
    let source = PcapFileSource::open(&args.file)
        .with_context(|| format!("Failed to open capture file: {}", args.file.display()))?;

    let config = pipeline_config(&args.dump)?
        .with_extra_value(DumpValue::new("pcap_file", args.file.display().to_string()));

    run(args.dump.dumper, source, &args.dump, config, || {}).await
}

#[cfg(feature = "live")]
async fn probe_interface(args: tcpdp::cli::ProbeArgs) -> Result<PipelineStats> {
    let config = pipeline_config(&args.dump)?
        .with_extra_value(DumpValue::new("interface", args.interface.as_str()))
        .with_extra_value(DumpValue::new("probe_target", args.dump.target.as_str()));

    let filter = bpf_filter(&config.target);
    let source = tcpdp_core::LiveSource::open(&args.interface, &filter)
        .with_context(|| format!("Failed to open interface: {}", args.interface))?;
    let stop = source.stop_handle();

    run(args.dump.dumper, source, &args.dump, config, move || stop.stop()).await
}

fn pipeline_config(args: &DumpArgs) -> Result<PipelineConfig> {
    let target = parse_target(&args.target)
        .with_context(|| format!("Invalid target: {:?}", args.target))?;

    let mut config = PipelineConfig::default()
        .with_target(target)
        .with_buffer_capacity(args.buffer_size);
    for (key, value) in &args.append {
        config = config.with_extra_value(DumpValue::new(key, value.as_str()));
    }
    Ok(config)
}

/// Select the decoder and run the pipeline to completion.
async fn run<S: CaptureSource>(
    kind: DumperKind,
    source: S,
    args: &DumpArgs,
    config: PipelineConfig,
    on_interrupt: impl FnOnce() + Send + 'static,
) -> Result<PipelineStats> {
    let sink = OutputFormatter::open(args.format, args.output.as_deref()).with_context(|| {
        match &args.output {
            Some(path) => format!("Failed to create output file: {}", path.display()),
            None => "Failed to open stdout".to_string(),
        }
    })?;

    info!(dumper = %kind, target = %config.target, "starting packet reader");
    match kind {
        DumperKind::Hex => dump(HexDumper, source, sink, config, on_interrupt).await,
        DumperKind::Mysql => dump(MysqlDumper, source, sink, config, on_interrupt).await,
        DumperKind::Pg => dump(PgDumper, source, sink, config, on_interrupt).await,
    }
}

async fn dump<D: Dumper, S: CaptureSource, K: RecordSink>(
    dumper: D,
    source: S,
    sink: K,
    config: PipelineConfig,
    on_interrupt: impl FnOnce() + Send + 'static,
) -> Result<PipelineStats> {
    let reader = PacketReader::new(dumper, sink, config);
    let shutdown = reader.shutdown();

    // Ctrl-C cancels; the source is told to stop so its blocking read returns
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted");
            on_interrupt();
            shutdown.cancel();
        }
    });

    let stats = reader.read_and_dump(source).await?;
    Ok(stats)
}
