mod cli;

use transforge::{
    config::{self, Config, EngineBackend},
    sink::{ArtifactSink, DirectorySink},
    transcode::{self, Preset, TranscodeRequest},
};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use transforge_common::paths::change_extension;
use transforge_common::{Event, EventPayload};

/// Options for `convert`.
struct ConvertOptions {
    inputs: Vec<PathBuf>,
    preset: Option<Preset>,
    output_name: Option<String>,
    output_ext: Option<String>,
    mime: Option<String>,
    output_dir: Option<PathBuf>,
    engine: Option<EngineBackend>,
    timeout: Option<u64>,
    json: bool,
    args: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "transforge=trace,transforge_engine=trace,transforge_common=debug".to_string()
        } else {
            "transforge=debug,transforge_engine=debug,transforge_common=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Convert {
            inputs,
            preset,
            output_name,
            output_ext,
            mime,
            output_dir,
            engine,
            timeout,
            json,
            args,
        } => {
            let options = ConvertOptions {
                inputs,
                preset,
                output_name,
                output_ext,
                mime,
                output_dir,
                engine,
                timeout,
                json,
                args,
            };
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(convert(options, cli.config.as_deref(), cli.verbose))
        }
        Commands::Presets => list_presets(),
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("transforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Build one request per input, in order.
fn build_requests(options: &ConvertOptions) -> Result<Vec<TranscodeRequest>> {
    if options.preset.is_none() && options.args.is_empty() {
        anyhow::bail!("Either --preset or raw engine arguments after `--` are required");
    }
    if options.output_name.is_some() && options.inputs.len() > 1 {
        anyhow::bail!("--output-name can only be used with a single input");
    }

    let mut requests = Vec::with_capacity(options.inputs.len());
    for input in &options.inputs {
        if !input.is_file() {
            anyhow::bail!("Input file does not exist: {:?}", input);
        }
        let bytes = std::fs::read(input)
            .with_context(|| format!("Failed to read input file: {:?}", input))?;
        let input_name = input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| input.to_string_lossy().to_string());

        let mut request = match &options.preset {
            Some(preset) => preset.request(bytes, &input_name),
            None => {
                let output_name = match (&options.output_name, &options.output_ext) {
                    (Some(name), _) => name.clone(),
                    (None, Some(ext)) => change_extension(&input_name, ext.trim_start_matches('.')),
                    (None, None) => {
                        anyhow::bail!("Raw arguments need --output-name or --output-ext")
                    }
                };
                TranscodeRequest::new(bytes, input_name, output_name, options.args.clone())
                    .with_default_io()
            }
        };

        if let Some(mime) = &options.mime {
            request = request.with_mime_type(mime.clone());
        }
        if let Some(secs) = options.timeout {
            request = request.with_timeout(Duration::from_secs(secs));
        }
        requests.push(request);
    }
    Ok(requests)
}

/// Log progress events until `stop` fires, then drain what is buffered.
async fn log_progress(
    mut events: broadcast::Receiver<Event>,
    stop: CancellationToken,
) {
    let log = |event: Event| {
        if let EventPayload::JobProgress { job_id, stage, step } = event.payload {
            tracing::debug!(job_id = %job_id, stage = ?stage, step = %step, "Job progress");
        }
    };

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => log(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Progress log lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            },
            _ = stop.cancelled() => break,
        }
    }
    while let Ok(event) = events.try_recv() {
        log(event);
    }
}

async fn convert(options: ConvertOptions, config_path: Option<&Path>, verbose: bool) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;
    if let Some(backend) = options.engine {
        config.engine.backend = backend;
    }
    // Passthrough copies bytes, so codec requirements only bind ffmpeg.
    if let (Some(preset), EngineBackend::Ffmpeg) = (&options.preset, config.engine.backend) {
        config.engine.require_encoders(preset.encoders());
    }
    let output_dir = options
        .output_dir
        .clone()
        .unwrap_or_else(|| config.output.dir.clone());

    let requests = build_requests(&options)?;

    tracing::info!(
        backend = %config.engine.backend,
        jobs = requests.len(),
        output_dir = %output_dir.display(),
        "Starting conversion"
    );

    let queue = transcode::build_queue(&config);
    let sink = DirectorySink::new(output_dir);

    let stop_progress = CancellationToken::new();
    let progress = verbose.then(|| {
        tokio::spawn(log_progress(
            queue.events().subscribe(),
            stop_progress.clone(),
        ))
    });

    let inputs: Vec<String> = requests.iter().map(|r| r.input_name.clone()).collect();
    let tickets: Vec<_> = requests.into_iter().map(|r| queue.submit(r)).collect();
    let outcomes = futures::future::join_all(tickets.into_iter().map(|t| t.wait())).await;

    let mut failures = 0usize;
    let mut delivered = HashSet::new();
    for (input, outcome) in inputs.iter().zip(outcomes) {
        let delivery = match outcome {
            Ok(artifact) if !delivered.insert(artifact.name.clone()) => Err(anyhow::anyhow!(
                "{} was already written by an earlier input",
                artifact.name
            )),
            Ok(artifact) => sink
                .deliver(&artifact)
                .await
                .map(|path| (artifact, path)),
            Err(e) => {
                failures += 1;
                if options.json {
                    let line = serde_json::json!({
                        "input": input,
                        "status": "failed",
                        "kind": e.kind(),
                        "error": e.detail(),
                    });
                    println!("{}", line);
                } else {
                    println!("✗ {}: {}", input, e);
                }
                continue;
            }
        };

        match delivery {
            Ok((artifact, path)) => {
                if options.json {
                    let line = serde_json::json!({
                        "input": input,
                        "status": "completed",
                        "output": path,
                        "name": artifact.name,
                        "mime_type": artifact.mime_type,
                        "size_bytes": artifact.size_bytes(),
                    });
                    println!("{}", line);
                } else {
                    println!(
                        "✓ {} -> {} ({}, {} bytes)",
                        input,
                        path.display(),
                        artifact.mime_type,
                        artifact.size_bytes()
                    );
                }
            }
            Err(e) => {
                failures += 1;
                tracing::warn!(input = %input, error = %e, "Delivery failed");
                if options.json {
                    let line = serde_json::json!({
                        "input": input,
                        "status": "failed",
                        "kind": "delivery",
                        "error": format!("{:#}", e),
                    });
                    println!("{}", line);
                } else {
                    println!("✗ {}: {:#}", input, e);
                }
            }
        }
    }

    queue.shutdown().await;
    stop_progress.cancel();
    if let Some(progress) = progress {
        let _ = progress.await;
    }

    if failures > 0 {
        anyhow::bail!("{} of {} jobs failed", failures, inputs.len());
    }
    Ok(())
}

fn list_presets() -> Result<()> {
    println!("Available presets:\n");
    for (name, summary) in transcode::presets::CATALOGUE {
        println!("  {:<16} {}", name, summary);
    }
    println!("\nParameters: --preset name:key=value,key=value");
    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    println!("Checking external tools...\n");

    let tools = transforge_engine::check_tools(config.engine.ffmpeg_path.as_deref());
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);
        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }
        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }
        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. The passthrough engine still works without them.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            config::load_config(p)?
        }
        None => {
            println!("No config file specified, checking default locations...");
            config::load_config_or_default(None)?
        }
    };

    println!("✓ Configuration is valid");
    print_config_summary(&config);
    Ok(())
}

fn print_config_summary(config: &Config) {
    println!("  Engine backend: {}", config.engine.backend);
    if let Some(ref path) = config.engine.ffmpeg_path {
        println!("  ffmpeg path: {}", path.display());
    }
    if !config.engine.required_encoders.is_empty() {
        println!(
            "  Required encoders: {}",
            config.engine.required_encoders.join(", ")
        );
    }
    match config.queue.default_timeout() {
        Some(t) => println!("  Default timeout: {}s", t.as_secs()),
        None => println!("  Default timeout: none"),
    }
    println!("  History limit: {}", config.queue.history_limit);
    println!("  Output dir: {}", config.output.dir.display());
}
