use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use kiln_session::GenerationSession;
use kiln_sim::{Caller, SimHost};
use kiln_sizer::{MarkdownReport, MemoryBreakdown, ModelConfig, MIB};
use kiln_upload::Deployer;

mod config;

use config::DeployConfig;

const BANNER: &str = r#"
 _  __ _  _
| |/ /(_)| | _ __
| ' / | || || '_ \
| . \ | || || | | |
|_|\_\|_||_||_| |_|"#;

#[derive(Parser)]
#[command(
    name = "kiln",
    about = "Size, deploy and run llama2 models on a memory-bounded host",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Show version and crate overview
    Info,
    /// Estimate host memory for one or more model files
    Size {
        /// Model files (llama2.c format)
        #[arg(long = "model", required = true)]
        models: Vec<PathBuf>,
        /// Concurrent callers the host must serve
        #[arg(long, default_value = "1")]
        callers: u64,
        /// Host memory budget in MiB
        #[arg(long, default_value = "4096")]
        budget_mib: u64,
        /// Write a markdown report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Upload a model into a host and generate one story
    Deploy {
        /// JSON deployment config
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Info => {
            cmd_info();
            Ok(())
        }
        Commands::Size { models, callers, budget_mib, report } => {
            cmd_size(&models, callers, budget_mib, report.as_deref())
        }
        Commands::Deploy { config } => cmd_deploy(&config),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn cmd_info() {
    println!("{}", BANNER);
    println!("  v{}  -  llama2 deployment toolkit\n", env!("CARGO_PKG_VERSION"));

    println!("Crates");
    let crates = [
        ("core", "Host API, generation parameters, host errors"),
        ("sizer", "Header decoding, memory estimate, capacity"),
        ("upload", "Chunked upload with lifecycle checks"),
        ("session", "Resumable start/continue generation"),
        ("sim", "In-process simulated host"),
        ("cli", "This CLI"),
    ];
    for (name, desc) in crates {
        println!("  kiln-{:<9} {}", name, desc);
    }
}

fn mib(bytes: u64) -> f64 {
    bytes as f64 / MIB as f64
}

fn cmd_size(models: &[PathBuf], callers: u64, budget_mib: u64, report_path: Option<&Path>) -> anyhow::Result<()> {
    let budget = budget_mib.saturating_mul(MIB);
    let mut report = MarkdownReport::new("Host resource requirements", budget);

    for path in models {
        let config = ModelConfig::from_file(path)?;
        let breakdown = MemoryBreakdown::estimate(&config);

        println!("=== {} ===", path.display());
        println!(
            "dim={} hidden_dim={} n_layers={} n_heads={} n_kv_heads={} vocab={}{} seq_len={}",
            config.dim,
            config.hidden_dim,
            config.n_layers,
            config.n_heads,
            config.n_kv_heads,
            config.vocab_size(),
            if config.vocab.flag { " (unshared classifier)" } else { "" },
            config.seq_len,
        );
        for group in breakdown.groups() {
            println!("  {:<40} {:>10.2} MiB", group.group.label(), mib(group.total()));
        }
        println!("  {:<40} {:>10.2} MiB", "KV cache (per caller)", mib(breakdown.kv_cache_bytes()));
        println!(
            "  {:<40} {:>10.2} MiB",
            format!("Total for {} caller(s)", callers),
            mib(breakdown.total_bytes(callers))
        );
        println!(
            "  Fits in {} MiB: {}   max concurrent callers: {}\n",
            budget_mib,
            if breakdown.fits(budget, callers) { "yes" } else { "no" },
            breakdown.max_callers(budget)
        );

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        report.add_model(name, breakdown);
    }

    if let Some(out) = report_path {
        std::fs::write(out, report.render()).with_context(|| format!("writing report {}", out.display()))?;
        println!("Report written to {}", out.display());
    }
    Ok(())
}

fn cmd_deploy(config_path: &Path) -> anyhow::Result<()> {
    init_tracing();
    let config = DeployConfig::load(config_path)?;
    if config.network != "local" {
        anyhow::bail!("network `{}` has no transport; only `local` is available", config.network);
    }

    let rt = tokio::runtime::Runtime::new().context("creating tokio runtime")?;
    rt.block_on(async {
        let host = SimHost::new(config.sim.clone());

        let mut deployer = Deployer::new(host.owner(), config.upload.clone());
        let report = deployer
            .deploy_files(&config.tokenizer_path, &config.model_path)
            .await?;
        println!(
            "Deployed: tokenizer {} bytes in {} chunks, model {} bytes in {} chunks",
            report.tokenizer.bytes, report.tokenizer.chunks, report.model.bytes, report.model.chunks
        );

        let client = host.client(Caller::User(config.caller.clone()));
        let mut session = GenerationSession::new(
            client,
            config.target.clone(),
            config.prompt.clone(),
            config.generation.clone(),
        )?;
        let story = session.run_to_end(config.max_continues).await?;

        println!("\nStory for {} ({} tokens, {} calls):\n", story.target, story.tokens, story.calls);
        println!("{}", story.text);
        Ok::<(), anyhow::Error>(())
    })
}
