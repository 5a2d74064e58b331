//! computer-use-cli: Command-line tool for desktop automation debugging
//!
//! Runs platform detection, display management and safety checks without
//! the MCP protocol overhead. Every tool is reachable through `call`.

use std::{fs, path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use computer_use_core::{
    ActionDispatcher, DesktopContext, dispatch::DisplayParams, model::ActionResult, safety::SafetyConfig,
};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "computer-use-cli")]
#[command(about = "CLI tool for desktop automation debugging and testing")]
struct Cli {
    /// Text that always passes the safety check (repeatable)
    #[arg(long, global = true)]
    whitelist: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect the platform and print capabilities and recommended methods
    Platform,
    /// Show managed X servers and whether a display is reachable
    Status {
        /// Display to probe (default: current DISPLAY)
        #[arg(long)]
        display: Option<String>,
    },
    /// Find a working display: existing, WSL forwarding, Xvfb, then :0
    BestDisplay,
    /// Run text (or a key combination) through the safety validator
    Validate {
        /// Text to check
        text: String,
        /// Treat the input as a key combination instead of text
        #[arg(long)]
        key: bool,
    },
    /// Call a tool by name, e.g. `call screenshot --out shot.png`
    Call {
        /// Tool name (screenshot, click, type, start_xserver, ...)
        tool: String,
        /// Tool arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
        /// Where to write a returned image
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("computer_use_cli=info".parse()?)
                .add_directive("computer_use_core=warn".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let safety = SafetyConfig {
        whitelist: cli.whitelist,
        ..Default::default()
    };
    let dispatcher = ActionDispatcher::new(Arc::new(DesktopContext::system(safety)));

    match cli.command {
        Commands::Platform => {
            print_json(&dispatcher.get_platform_info().await?)?;
        }
        Commands::Status { display } => {
            let status = dispatcher.xserver_status()?;
            let check = dispatcher.check_display_available(DisplayParams { display }).await?;
            print_json(&serde_json::json!({ "xserver": status, "display": check }))?;
        }
        Commands::BestDisplay => {
            let best = dispatcher.context().displays().get_best_display().await;
            print_json(&serde_json::to_value(&best)?)?;
            if !best.found() {
                return Ok(ExitCode::FAILURE);
            }
            let report = dispatcher.context().displays().cleanup_all().await;
            if report.stopped_servers > 0 {
                eprintln!("Stopped {} X server(s) started for the probe", report.stopped_servers);
            }
        }
        Commands::Validate { text, key } => {
            let validator = dispatcher.context().validator();
            let verdict = if key {
                match validator.check_key(&text) {
                    Ok(normalized) => serde_json::json!({ "safe": true, "normalized": normalized }),
                    Err(e) => serde_json::json!({ "safe": false, "reason": e.to_string() }),
                }
            } else {
                serde_json::to_value(validator.validate_text(&text))?
            };
            let safe = verdict["safe"].as_bool().unwrap_or(false);
            print_json(&verdict)?;
            if !safe {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Call { tool, args, out } => {
            let args: Value = serde_json::from_str(&args).context("--args must be a JSON object")?;
            match dispatcher.dispatch(&tool, args).await {
                Ok(output) => {
                    if let (Some(image), Some(path)) = (&output.image, &out) {
                        fs::write(path, image).with_context(|| format!("writing {}", path.display()))?;
                        eprintln!("Wrote {} bytes to {}", image.len(), path.display());
                    }
                    print_json(&output.data)?;
                }
                Err(e) => {
                    print_json(&serde_json::to_value(ActionResult::failed(&e))?)?;
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
