use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use insight_core::config::{key_fingerprint, AppConfig, Provider};
use insight_core::dataset::FileFormat;
use insight_core::llm::HttpLlmClient;
use insight_core::render::{ArtifactSurface, TerminalSurface};
use insight_core::runs::{create_new_run, default_runs_root, list_runs, read_manifest, TurnCard};
use insight_core::session::Session;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(version, about = "Insight — chat with an uploaded file, charts included")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Environment checks: provider, key, runs directory
    Doctor,
    /// Parse a file and print the model's overview of it
    Overview {
        #[arg(long)]
        file: PathBuf,
    },
    /// Ask one question about a file; charts land in the run directory
    Ask {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        question: String,
    },
    /// Inspect past runs
    Runs {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, default_value_t = false)]
        details: bool,
    },
    /// Search past turn cards for a substring
    CardsSearch {
        #[arg(long)]
        query: String,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    install_tracing();
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Doctor => cmd_doctor(),
        Commands::Overview { file } => cmd_overview(&file).await,
        Commands::Ask { file, question } => cmd_ask(&file, &question).await,
        Commands::Runs { limit, details } => cmd_runs(limit, details),
        Commands::CardsSearch { query, limit } => cmd_cards_search(&query, limit),
    }
}

fn install_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();
}

fn cmd_doctor() -> Result<()> {
    println!("Insight doctor:");
    let provider = match std::env::var("INSIGHT_PROVIDER") {
        Ok(v) => Provider::parse(&v)?,
        Err(_) => Provider::Gemini,
    };
    println!(" - provider: {}", provider.label());
    println!(
        " - model: {}",
        std::env::var("INSIGHT_MODEL").unwrap_or_else(|_| provider.default_model().to_string())
    );
    match std::env::var(provider.key_env()) {
        Ok(key) if !key.is_empty() => {
            println!(" - {}: set ({})", provider.key_env(), key_fingerprint(&key))
        }
        _ => println!(" - {}: NOT SET", provider.key_env()),
    }
    match default_runs_root() {
        Ok(root) => println!(" - runs dir: {}", root.display()),
        Err(e) => println!(" - runs dir: error: {}", e),
    }
    Ok(())
}

fn load_file(path: &Path) -> Result<(Vec<u8>, FileFormat)> {
    let name = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("invalid file path"))?
        .to_string_lossy()
        .to_string();
    let format = FileFormat::from_name(&name)?;
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok((bytes, format))
}

async fn cmd_overview(file: &Path) -> Result<()> {
    let cfg = AppConfig::from_env()?;
    let transport = HttpLlmClient::new(cfg.provider);
    let (bytes, format) = load_file(file)?;

    let mut session = Session::new(cfg.pipeline);
    let surface = TerminalSurface::default();
    if session.upload(&bytes, format, &surface).is_err() {
        std::process::exit(1);
    }
    session.overview(&transport, &surface).await;
    Ok(())
}

async fn cmd_ask(file: &Path, question: &str) -> Result<()> {
    let cfg = AppConfig::from_env()?;
    let transport = HttpLlmClient::new(cfg.provider);
    let (bytes, format) = load_file(file)?;

    let mut session = Session::new(cfg.pipeline);
    let run = create_new_run(None)?;
    let surface = ArtifactSurface::new(run.dir.clone(), TerminalSurface::default());
    if session.upload(&bytes, format, &surface).is_err() {
        std::process::exit(1);
    }

    let outcome = session.ask(question, &transport, &surface).await;
    let card = TurnCard {
        ts_utc: chrono::Utc::now(),
        run_id: run.id.clone(),
        question: question.to_string(),
        answer: outcome.answer().map(|s| s.to_string()),
        code: outcome.code().map(|s| s.to_string()),
        outcome: outcome.label().to_string(),
    };
    card.save(&run.dir)?;
    println!("\nrun {} -> {} [{}]", run.id, run.dir.display(), outcome.label());
    Ok(())
}

fn cmd_runs(limit: usize, details: bool) -> Result<()> {
    let root = default_runs_root()?;
    let runs = list_runs(&root, limit)?;
    println!("Last {} run(s) under {}", runs.len(), root.display());
    for r in runs {
        let artifacts = read_manifest(&r.dir).map(|m| m.artifacts.len()).unwrap_or(0);
        let cards = fs::read_dir(r.dir.join("cards")).map(|it| it.count()).unwrap_or(0);
        println!("- {}  [{} artifact(s), {} card(s)]", r.id, artifacts, cards);
        if details {
            if let Ok(manifest) = read_manifest(&r.dir) {
                for entry in manifest.artifacts {
                    println!("    {} ({})", entry.path, entry.r#type);
                }
            }
        }
    }
    Ok(())
}

fn cmd_cards_search(query: &str, limit: usize) -> Result<()> {
    let root = default_runs_root()?;
    let needle = query.to_lowercase();
    let mut count = 0usize;
    for entry in walkdir::WalkDir::new(&root).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file()
            && entry.path().extension().map(|e| e == "json").unwrap_or(false)
            && entry.path().parent().map(|p| p.ends_with("cards")).unwrap_or(false)
        {
            let s = fs::read_to_string(entry.path())?;
            if s.to_lowercase().contains(&needle) {
                println!("{}", entry.path().display());
                count += 1;
                if count >= limit {
                    break;
                }
            }
        }
    }
    println!("Matched {} card(s).", count);
    Ok(())
}
