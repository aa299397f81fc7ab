use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use nacre::config::CONFIG_FILE;
use nacre::plan::build_plans;
use nacre::{nlog, nlog_error, Config, Orchestrator, Result};

/// nacre - build task orchestrator and dev server
#[derive(Parser, Debug)]
#[command(name = "nacre")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    NACRE_DEBUG=1     Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short = 'c', long, default_value = CONFIG_FILE)]
    pub config: PathBuf,

    /// Enable debug logging (writes to ~/.nacre/nacre.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Execute one alias to completion
    Run {
        /// Alias name, e.g. "buildtest"
        alias: String,
    },

    /// Run the default alias: serve, build, test, then watch for changes
    Dev,

    /// List configured tasks, aliases, and watch rules
    Tasks {
        /// Emit the listing as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    nacre::log::init_with_debug(cli.debug);
    nlog!("nacre starting");

    if let Err(e) = run(cli) {
        nlog_error!("fatal: {}", e);
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(&cli.config)?;

    // Listing needs no external tools, so it skips orchestrator construction.
    if let Some(Command::Tasks { json }) = cli.command {
        return print_tasks(&config, json);
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let shutdown = CancellationToken::new();
        let signal_token = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                nlog!("received ctrl-c, shutting down");
                signal_token.cancel();
            }
        });

        let orchestrator = Orchestrator::new(config, shutdown)?;
        match cli.command {
            Some(Command::Run { alias }) => orchestrator.run_alias(&alias).await,
            // Bare `nacre` behaves like the default alias, same as `dev`.
            Some(Command::Dev) | None => orchestrator.run_alias("default").await,
            Some(Command::Tasks { .. }) => unreachable!("handled before runtime start"),
        }
    })
}

fn print_tasks(config: &Config, json: bool) -> Result<()> {
    let plans = build_plans(config)?;

    if json {
        let aliases: serde_json::Map<String, serde_json::Value> = plans
            .iter()
            .map(|(name, plan)| {
                let steps: Vec<String> = plan.steps.iter().map(|s| s.to_string()).collect();
                (name.clone(), serde_json::json!(steps))
            })
            .collect();
        let output = serde_json::json!({
            "compile_targets": config.compile.targets.keys().collect::<Vec<_>>(),
            "aliases": aliases,
            "watch_rules": config.watch.rules.iter().map(|r| {
                serde_json::json!({ "files": r.files, "alias": r.alias })
            }).collect::<Vec<_>>(),
            "server": { "port": config.server.port, "livereload": config.server.livereload },
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Compile targets:");
    for (name, target) in &config.compile.targets {
        println!(
            "  compile:{:<12} {} -> {}",
            name,
            target.src.join(", "),
            target.out.display()
        );
    }

    println!("\nAliases:");
    for (name, plan) in &plans {
        let steps: Vec<String> = plan.steps.iter().map(|s| s.to_string()).collect();
        println!("  {:<12} {}", name, steps.join(" -> "));
    }

    if !config.watch.rules.is_empty() {
        println!("\nWatch rules (debounce {}ms):", config.watch.debounce_ms);
        for rule in &config.watch.rules {
            println!("  {} -> {}", rule.files.join(", "), rule.alias);
        }
    }

    println!(
        "\nServer: port {}, livereload {}",
        config.server.port,
        if config.server.livereload { "on" } else { "off" }
    );
    Ok(())
}
