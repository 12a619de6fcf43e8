//! Chorus CLI - Ask Several Providers at Once
//!
//! Command-line front end for `chorus-core`. Each question goes to every
//! enabled provider; the turn is committed to the transcript once all of them
//! have answered.
//!
//! # Usage
//!
//! ```bash
//! # Ask every enabled provider
//! chorus ask "What is a monad?"
//!
//! # Only some providers
//! chorus --providers ollama,echo ask "Hi"
//!
//! # Re-run one provider on the last turn
//! chorus retry ollama
//!
//! # Show and export the transcript
//! chorus history -n 5
//! chorus export chat.md --title "Monads"
//!
//! # Name the chat (defaults to the first question)
//! chorus title "Monads explained"
//!
//! # Masks: saved system prompts, picked per run
//! chorus mask add Reviewer "Review the code you are shown."
//! chorus mask list
//! chorus --mask reviewer ask "fn main() {}"
//!
//! # Verbose logging
//! RUST_LOG=debug chorus ask "..."
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tracing::{info, warn};

use chorus_core::{
    chat_title, export_markdown, load_config_from_path, BlockParser, BlockType, ChorusConfig,
    CommitEvent, ConfigOverrides, JsonFileStore, Mask, MaskStore, Message, MessageId,
    ProviderId, RetryCoordinator, TranscriptStore, TurnOrchestrator,
};

/// Chorus - one question, many providers
#[derive(Parser, Debug)]
#[command(name = "chorus")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "CHORUS_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Transcript file path
    #[arg(short = 's', long, value_name = "PATH")]
    store: Option<PathBuf>,

    /// Comma separated list of providers to enable
    #[arg(short = 'p', long, value_name = "IDS")]
    providers: Option<String>,

    /// Mask (saved system prompt) to use, by ID or name
    #[arg(short = 'm', long, value_name = "MASK")]
    mask: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "CHORUS_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ask every enabled provider a question
    Ask {
        /// The question
        question: String,

        /// Print the committed turn as JSON
        #[arg(long)]
        json: bool,
    },
    /// Re-run one provider for the most recent turn
    Retry {
        /// Provider ID
        provider: String,
    },
    /// Replace an earlier question and everything after it
    Edit {
        /// Message ID of the question to replace
        message_id: String,

        /// New question text
        question: String,
    },
    /// Print recent turns
    History {
        /// Number of turns
        #[arg(short = 'n', long, default_value_t = 10)]
        turns: usize,
    },
    /// Write the transcript as Markdown
    Export {
        /// Output file
        file: PathBuf,

        /// Title used in the heading; defaults to the chat title
        #[arg(short = 't', long)]
        title: Option<String>,
    },
    /// Print the chat title, or set it
    Title {
        /// New title; an empty string restores the generated one
        title: Option<String>,
    },
    /// Manage masks
    Mask {
        #[command(subcommand)]
        action: MaskAction,
    },
}

#[derive(Subcommand, Debug)]
enum MaskAction {
    /// List masks, most recently used first
    List {
        /// Maximum number of masks
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Create a mask, or replace one by ID
    Add {
        /// Display name
        name: String,

        /// System prompt
        prompt: String,

        /// Replace the mask with this ID
        #[arg(long)]
        id: Option<u32>,
    },
    /// Delete a mask
    Remove {
        /// Mask ID
        id: u32,
    },
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("chorus={level},chorus_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config(args: &Args) -> Result<ChorusConfig> {
    let path = args.config.clone().or_else(chorus_core::default_config_path);
    let mut config = load_config_from_path(path).context("Failed to load configuration")?;

    let mut overrides = ConfigOverrides::new();
    if let Some(ref store) = args.store {
        overrides = overrides.with_store_path(store.clone());
    }
    if let Some(ref providers) = args.providers {
        overrides = overrides.with_providers(providers);
    }
    if let Some(ref mask) = args.mask {
        overrides = overrides.with_mask(mask);
    }
    overrides
        .apply(&mut config)
        .context("Invalid command-line overrides")?;

    info!(source = %config.source(), store = %config.store_path.display(), "Configuration resolved");
    Ok(config)
}

async fn build_orchestrator(config: &ChorusConfig) -> Result<TurnOrchestrator<JsonFileStore>> {
    let store = Arc::new(JsonFileStore::new(config.store_path.clone()));
    let providers = config.build_providers()?;
    let orchestrator = TurnOrchestrator::new(providers, store, config.orchestrator_config())?;
    if let Some(ref key) = config.mask {
        let mask = select_mask(config, key).await?;
        orchestrator.apply_mask(&mask);
    }
    orchestrator
        .load_history(config.history_turns)
        .await
        .context("Failed to load transcript")?;
    Ok(orchestrator)
}

/// Look up the configured mask and stamp it as used
async fn select_mask(config: &ChorusConfig, key: &str) -> Result<Mask> {
    let masks = MaskStore::new(config.masks_path.clone());
    let mask = masks
        .resolve(key)
        .await?
        .with_context(|| format!("No mask named {key} in {}", masks.path().display()))?;
    masks.touch(mask.id).await?;
    info!(mask_id = mask.id, name = %mask.name, "Using mask");
    Ok(mask)
}

/// Wait for the barrier to fire, or for Ctrl-C
async fn wait_for_commit(commits: &mut broadcast::Receiver<CommitEvent>) -> Result<MessageId> {
    tokio::select! {
        event = commits.recv() => match event.context("Commit channel closed")? {
            CommitEvent::Committed { turn_id, question_id } => {
                info!(turn_id = %turn_id, "Turn committed");
                Ok(question_id)
            }
            CommitEvent::Failed { error } => anyhow::bail!("Failed to save turn: {error}"),
        },
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted before all providers finished");
            anyhow::bail!("Interrupted")
        }
    }
}

/// Messages of the committed turn whose question has `question_id`
fn committed_turn(history: &[Message], question_id: &MessageId) -> Vec<Message> {
    let Some(start) = history.iter().position(|m| m.id == *question_id) else {
        return Vec::new();
    };
    let end = history[start + 1..]
        .iter()
        .position(Message::is_question)
        .map_or(history.len(), |i| start + 1 + i);
    history[start..end].to_vec()
}

fn block_summary(text: &str) -> String {
    let mut parser = BlockParser::new();
    parser.append(text);
    let blocks = parser.finish();
    let count = |kind: BlockType| blocks.iter().filter(|b| b.kind == kind).count();
    format!(
        "{} blocks: {} paragraph, {} heading, {} code, {} list",
        blocks.len(),
        count(BlockType::Paragraph),
        count(BlockType::Heading),
        count(BlockType::CodeBlock),
        count(BlockType::ListItem),
    )
}

fn print_turn(messages: &[Message]) {
    for message in messages {
        match message.provider {
            None => println!("## {}\n", message.content.trim_end()),
            Some(ref provider) => {
                println!("### {provider}  ({})\n", block_summary(&message.content));
                println!("{}\n", message.content.trim_end());
            }
        }
    }
}

async fn run_ask(config: &ChorusConfig, question: &str, json: bool) -> Result<()> {
    let orchestrator = build_orchestrator(config).await?;
    let mut commits = orchestrator.subscribe_commits();

    if !orchestrator.submit(question) {
        anyhow::bail!("Question rejected (blank, or a previous turn is still held)");
    }
    let question_id = wait_for_commit(&mut commits).await?;
    let turn = committed_turn(&orchestrator.history(), &question_id);

    if json {
        println!("{}", serde_json::to_string_pretty(&turn)?);
    } else {
        print_turn(&turn);
    }
    Ok(())
}

async fn run_retry(config: &ChorusConfig, provider: &str) -> Result<()> {
    let orchestrator = build_orchestrator(config).await?;
    let mut commits = orchestrator.subscribe_commits();
    let coordinator = RetryCoordinator::new(orchestrator);

    if !coordinator.retry(&ProviderId::from(provider)) {
        anyhow::bail!("Nothing to retry for provider {provider}");
    }
    let question_id = wait_for_commit(&mut commits).await?;
    print_turn(&committed_turn(
        &coordinator.orchestrator().history(),
        &question_id,
    ));
    Ok(())
}

async fn run_edit(config: &ChorusConfig, message_id: &str, question: &str) -> Result<()> {
    let orchestrator = build_orchestrator(config).await?;
    let mut commits = orchestrator.subscribe_commits();
    let coordinator = RetryCoordinator::new(orchestrator);

    if !coordinator
        .edit_question(&MessageId(message_id.to_string()), question)
        .await?
    {
        anyhow::bail!("Cannot edit message {message_id}");
    }
    let question_id = wait_for_commit(&mut commits).await?;
    print_turn(&committed_turn(
        &coordinator.orchestrator().history(),
        &question_id,
    ));
    Ok(())
}

async fn run_history(config: &ChorusConfig, turns: usize) -> Result<()> {
    let store = JsonFileStore::new(config.store_path.clone());
    for turn in store.load_recent(turns).await? {
        println!("# {}  (question {})\n", turn.id, turn.question.id);
        let messages: Vec<Message> = turn.messages().cloned().collect();
        print_turn(&messages);
    }
    Ok(())
}

async fn all_messages(store: &JsonFileStore) -> Result<Vec<Message>> {
    Ok(store
        .load_recent(usize::MAX)
        .await?
        .iter()
        .flat_map(|t| t.messages().cloned())
        .collect())
}

async fn run_export(config: &ChorusConfig, file: &Path, title: Option<&str>) -> Result<()> {
    let store = JsonFileStore::new(config.store_path.clone());
    let messages = all_messages(&store).await?;
    let title = match title {
        Some(title) => title.to_string(),
        None => chat_title(store.title().await?.as_deref(), &messages),
    };

    let export = export_markdown(&title, &messages);
    tokio::fs::write(file, export.markdown)
        .await
        .with_context(|| format!("Failed to write {}", file.display()))?;
    println!("Exported {} messages to {}", messages.len(), file.display());
    Ok(())
}

async fn run_title(config: &ChorusConfig, title: Option<&str>) -> Result<()> {
    let store = JsonFileStore::new(config.store_path.clone());
    if let Some(title) = title {
        store.set_title(title).await?;
    }
    let messages = all_messages(&store).await?;
    println!("{}", chat_title(store.title().await?.as_deref(), &messages));
    Ok(())
}

fn print_mask(mask: &Mask) {
    println!("[{}] {}", mask.id, mask.name);
    println!("    {}", mask.system_prompt.replace('\n', "\n    "));
}

async fn run_mask(config: &ChorusConfig, action: &MaskAction) -> Result<()> {
    let masks = MaskStore::new(config.masks_path.clone());
    match *action {
        MaskAction::List { limit } => {
            let listed = match limit {
                Some(limit) => masks.fetch_recent(limit).await?,
                None => masks.fetch_all().await?,
            };
            if listed.is_empty() {
                println!("No masks in {}", masks.path().display());
            }
            for mask in &listed {
                print_mask(mask);
            }
        }
        MaskAction::Add {
            ref name,
            ref prompt,
            id,
        } => {
            let mask = masks.upsert(name, prompt, id).await?;
            print_mask(&mask);
        }
        MaskAction::Remove { id } => {
            if !masks.delete(id).await? {
                anyhow::bail!("No mask with ID {id}");
            }
            println!("Deleted mask {id}");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config = resolve_config(&args)?;

    match args.command {
        Command::Ask { ref question, json } => run_ask(&config, question, json).await,
        Command::Retry { ref provider } => run_retry(&config, provider).await,
        Command::Edit {
            ref message_id,
            ref question,
        } => run_edit(&config, message_id, question).await,
        Command::History { turns } => run_history(&config, turns).await,
        Command::Export {
            ref file,
            ref title,
        } => run_export(&config, file, title.as_deref()).await,
        Command::Title { ref title } => run_title(&config, title.as_deref()).await,
        Command::Mask { ref action } => run_mask(&config, action).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from(["chorus", "--providers", "a,b", "ask", "hello", "--json"]);
        assert_eq!(args.providers.as_deref(), Some("a,b"));
        match args.command {
            Command::Ask { question, json } => {
                assert_eq!(question, "hello");
                assert!(json);
            }
            other => panic!("Expected ask, got {other:?}"),
        }
    }

    #[test]
    fn test_mask_args_parse() {
        let args = Args::parse_from(["chorus", "-m", "reviewer", "ask", "hi"]);
        assert_eq!(args.mask.as_deref(), Some("reviewer"));

        let args = Args::parse_from([
            "chorus",
            "mask",
            "add",
            "Poet",
            "Answer in verse.",
            "--id",
            "3",
        ]);
        match args.command {
            Command::Mask {
                action: MaskAction::Add { name, prompt, id },
            } => {
                assert_eq!(name, "Poet");
                assert_eq!(prompt, "Answer in verse.");
                assert_eq!(id, Some(3));
            }
            other => panic!("Expected mask add, got {other:?}"),
        }
    }

    #[test]
    fn test_export_title_is_optional() {
        let args = Args::parse_from(["chorus", "export", "chat.md"]);
        match args.command {
            Command::Export { title, .. } => assert_eq!(title, None),
            other => panic!("Expected export, got {other:?}"),
        }
    }

    #[test]
    fn test_committed_turn_slices_one_turn() {
        let q1 = Message::question("one");
        let a1 = Message::answer(ProviderId::from("a"));
        let q2 = Message::question("two");
        let history = vec![q1.clone(), a1.clone(), q2.clone()];

        assert_eq!(committed_turn(&history, &q1.id), vec![q1, a1]);
        assert_eq!(committed_turn(&history, &q2.id), vec![q2]);
        assert!(committed_turn(&history, &MessageId::new()).is_empty());
    }

    #[test]
    fn test_block_summary() {
        let summary = block_summary("# Title\n\ntext\n\n```\ncode\n```\n");
        assert_eq!(summary, "3 blocks: 1 paragraph, 1 heading, 1 code, 0 list");
    }
}
