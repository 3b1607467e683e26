//! Thin binary wiring configuration, tracing, and a line-oriented front
//! end around [`pentest_commands::Orchestrator`]. Contains no
//! command-grammar logic of its own — that lives in `pentest-commands`.

use clap::Parser;
use pentest_commands::{
    InformationGatheringCommandProcessor, Orchestrator, ProjectCommandProcessor,
    UnavailableBinaryAnalyzer, UnavailableEmbedding, UnavailableLlm, UnavailableVectorDb,
};
use pentest_common::Config;
use pentest_ingest::InformationGatherer;
use pentest_model::persistence;
use pentest_model::ProjectManager;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// A natural-language command shell for tracking penetration-testing
/// findings and gathering host information.
#[derive(clap::Parser, Debug)]
#[command(name = "pentest-assistant")]
struct Cli {
    /// Run a single command and exit, instead of starting the REPL.
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Path to a `key = value` configuration file.
    #[arg(long, env = "PENTEST_ASSISTANT_CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref());

    let manager = Arc::new(ProjectManager::new());
    if config.project_data_file.exists() {
        match persistence::load_all(&manager, &config.project_data_file) {
            Ok(warnings) => {
                for warning in warnings {
                    tracing::warn!("{warning}");
                }
            }
            Err(e) => tracing::warn!("failed to load {:?}: {e}", config.project_data_file),
        }
    }

    let gatherer = Arc::new(InformationGatherer::new(manager.clone()));
    let orchestrator = Orchestrator::new(
        ProjectCommandProcessor::new(manager.clone()),
        InformationGatheringCommandProcessor::new(gatherer, config.scope.clone()),
        Arc::new(UnavailableLlm),
        Arc::new(UnavailableEmbedding),
        Arc::new(UnavailableVectorDb),
        Arc::new(UnavailableBinaryAnalyzer),
        config.llm.prompt_prefix.clone(),
        config.vector_db.top_k,
    );

    if let Some(line) = cli.command {
        println!("{}", orchestrator.process(&line));
        return persist(&manager, &config.project_data_file);
    }

    run_repl(&orchestrator)?;
    persist(&manager, &config.project_data_file)
}

fn run_repl(orchestrator: &Orchestrator) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("pentest> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            println!();
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }
        println!("{}", orchestrator.process(line));
    }
    Ok(())
}

fn persist(manager: &ProjectManager, path: &std::path::Path) -> anyhow::Result<()> {
    persistence::persist_all(manager, path)?;
    Ok(())
}
