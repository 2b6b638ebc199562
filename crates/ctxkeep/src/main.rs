//! Inspect and truncate conversation files from the command line.
//!
//! A conversation file is a JSON array of turns, each turn a JSON array of
//! content blocks (`{"type": "text_prompt", "text": "..."}` and so on).
//! Pass `-` to read it from stdin.
//!
//! # Examples
//!
//! ```sh
//! # Turn and token counts
//! ctxkeep count session.json
//!
//! # Forget the middle once the conversation passes 40 turns
//! ctxkeep truncate session.json --max-size 40 --keep-first 2
//!
//! # Summarize the middle with a local model
//! ctxkeep truncate session.json --strategy summarizing \
//!   --summary-command "ollama run llama3" --report
//!
//! # Any strategy, pipelines included, from a config file
//! cat session.json | ctxkeep truncate - --config strategy.json
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use ctxkeep::context::config::{AmortizedConfig, SummarizingConfig};
use ctxkeep::context::window::{DEFAULT_KEEP_FIRST, DEFAULT_MAX_SIZE};
use ctxkeep::context::{DEFAULT_TOKEN_BUDGET, StrategyConfig, TokenAccounting};
use ctxkeep::logging::init_cli_logging;
use ctxkeep::model::{CommandModelCaller, ModelCaller};
use ctxkeep::tokens::{CharRatioCounter, TokenCounter};
use ctxkeep::{Conversation, MessageHistory};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing::debug;

#[derive(Parser)]
#[command(name = "ctxkeep", version)]
struct Cli {
    /// More log output on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Characters per token for the built-in estimator
    #[arg(long, global = true)]
    chars_per_token: Option<f64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the turn and estimated token counts of a conversation
    Count {
        /// Conversation JSON file, or - for stdin
        input: String,
    },

    /// Truncate a conversation and print the result as JSON
    Truncate(TruncateArgs),
}

#[derive(clap::Args)]
struct TruncateArgs {
    /// Conversation JSON file, or - for stdin
    input: String,

    /// Strategy config file (overrides the strategy flags below)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Strategy to use when no config file is given
    #[arg(long, value_enum, default_value_t = StrategyKind::Amortized)]
    strategy: StrategyKind,

    /// Token budget
    #[arg(long, default_value_t = DEFAULT_TOKEN_BUDGET)]
    budget: usize,

    /// Turn count that triggers truncation
    #[arg(long, default_value_t = DEFAULT_MAX_SIZE)]
    max_size: usize,

    /// Leading turns that are always kept
    #[arg(long, default_value_t = DEFAULT_KEEP_FIRST)]
    keep_first: usize,

    /// Shell command that reads a prompt on stdin and prints a summary
    #[arg(long)]
    summary_command: Option<String>,

    /// Print what the strategy did to stderr
    #[arg(long)]
    report: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyKind {
    Amortized,
    Summarizing,
}

// ── Helpers ────────────────────────────────────────────────────────

fn read_input(input: &str) -> Result<String, String> {
    if input == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| format!("failed to read stdin: {e}"))?;
        Ok(buf)
    } else {
        std::fs::read_to_string(Path::new(input))
            .map_err(|e| format!("failed to read '{input}': {e}"))
    }
}

fn load_conversation(input: &str) -> Result<Conversation, String> {
    let data = read_input(input)?;
    let turns: Conversation = serde_json::from_str(&data)
        .map_err(|e| format!("failed to parse conversation '{input}': {e}"))?;
    debug!("Loaded {} turns from '{input}'", turns.len());
    Ok(turns)
}

fn strategy_config(args: &TruncateArgs) -> Result<StrategyConfig, String> {
    if let Some(path) = &args.config {
        return StrategyConfig::load(path).map_err(|e| e.to_string());
    }
    Ok(match args.strategy {
        StrategyKind::Amortized => StrategyConfig::AmortizedForgetting(AmortizedConfig {
            token_budget: args.budget,
            max_size: args.max_size,
            keep_first: args.keep_first,
        }),
        StrategyKind::Summarizing => StrategyConfig::LlmSummarizing(SummarizingConfig {
            token_budget: args.budget,
            max_size: args.max_size,
            keep_first: args.keep_first,
            ..SummarizingConfig::default()
        }),
    })
}

// ── Commands ───────────────────────────────────────────────────────

fn count(input: &str, counter: Arc<dyn TokenCounter>) -> Result<String, String> {
    let turns = load_conversation(input)?;
    let tokens = TokenAccounting::new(counter).count_tokens(&turns);
    Ok(format!("turns: {}\ntokens: {tokens}\n", turns.len()))
}

fn truncate(args: &TruncateArgs, counter: Arc<dyn TokenCounter>) -> Result<String, String> {
    let turns = load_conversation(&args.input)?;
    let config = strategy_config(args)?;

    let model: Option<Arc<dyn ModelCaller>> = match &args.summary_command {
        Some(command) => Some(Arc::new(CommandModelCaller::new(command.clone()))),
        None if config.needs_model() => {
            return Err(format!(
                "strategy '{}' needs --summary-command",
                config.name()
            ));
        }
        None => None,
    };
    let manager = config.build(counter, model).map_err(|e| e.to_string())?;

    let mut history = MessageHistory::new(manager);
    history.set_turns(turns);
    let (turns_before, tokens_before) = (history.len(), history.count_tokens());
    history.truncate();

    if args.report {
        eprintln!(
            "{}: {turns_before} -> {} turns, {tokens_before} -> {} tokens",
            config.name(),
            history.len(),
            history.count_tokens()
        );
    }

    let mut out = history.to_string();
    out.push('\n');
    Ok(out)
}

fn main() {
    let cli = Cli::parse();
    let report = matches!(&cli.command, Command::Truncate(args) if args.report);
    let logs = init_cli_logging(cli.verbose, report);
    let counter: Arc<dyn TokenCounter> =
        Arc::new(CharRatioCounter::with_calibration(cli.chars_per_token));

    let result = match &cli.command {
        Command::Count { input } => count(input, counter),
        Command::Truncate(args) => truncate(args, counter),
    };

    if let Some(logs) = logs {
        for line in logs.drain() {
            eprintln!("  {line}");
        }
    }

    match result {
        Ok(output) => print!("{output}"),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
