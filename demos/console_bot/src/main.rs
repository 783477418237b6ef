//! Console Bot Example
//!
//! Chat with a Hexabot flow from the terminal, over the console channel.
//!
//! # Input
//!
//! ```text
//! hello            a text message
//! !SKIP_NAME       a postback with payload SKIP_NAME
//! /quit            leave
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --package console-bot -- --flow demos/console_bot/flow.json
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use clap::Parser;
use hexabot::channel_web::Delivery;
use hexabot::prelude::*;
use hexabot::runtime::shutdown_signal;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "console-bot", about = "Chat with a Hexabot flow from the terminal")]
struct Args {
    /// Flow file: a JSON array of blocks.
    #[arg(short, long, default_value = "demos/console_bot/flow.json")]
    flow: PathBuf,

    /// Configuration file; the default locations are searched when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Foreign id of the simulated visitor.
    #[arg(long, default_value = "console-visitor")]
    visitor: String,
}

// ============================================================================
// Plugin
// ============================================================================

/// Lists the variables captured so far.
struct Summary;

#[async_trait]
impl BlockExecutor for Summary {
    fn name(&self) -> &str {
        "summary"
    }

    async fn process(
        &self,
        _block: &Block,
        context: &Context,
        _conversation_id: Option<&str>,
    ) -> MessageResult<Envelope> {
        if context.vars.is_empty() {
            return Ok(Envelope::text("I don't know anything about you yet."));
        }
        let lines: Vec<String> = context
            .vars
            .iter()
            .map(|(name, value)| match value {
                Value::String(s) => format!("- {name}: {s}"),
                other => format!("- {name}: {other}"),
            })
            .collect();
        Ok(Envelope::text(format!("Here is what I know:\n{}", lines.join("\n"))))
    }
}

// ============================================================================
// Terminal I/O
// ============================================================================

fn to_payload(line: &str, visitor: &str) -> Value {
    match line.strip_prefix('!') {
        Some(payload) => json!({
            "type": "postback",
            "data": { "text": payload, "payload": payload },
            "author": visitor
        }),
        None => json!({
            "type": "text",
            "data": { "text": line },
            "author": visitor
        }),
    }
}

fn print_delivery(delivery: &Delivery) {
    let data = &delivery.message.data;
    if let Some(text) = data.get("text").and_then(Value::as_str) {
        println!("bot> {text}");
    }
    for reply in data
        .get("quick_replies")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        println!(
            "     [{}] !{}",
            reply["title"].as_str().unwrap_or_default(),
            reply["payload"].as_str().unwrap_or_default()
        );
    }
    for button in data
        .get("buttons")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        match button.get("payload").and_then(Value::as_str) {
            Some(payload) => println!(
                "     ({}) !{payload}",
                button["title"].as_str().unwrap_or_default()
            ),
            None => println!(
                "     ({}) {}",
                button["title"].as_str().unwrap_or_default(),
                button["url"].as_str().unwrap_or_default()
            ),
        }
    }
    if delivery.message.handover {
        println!("     (handed over to a human agent)");
    }
}

async fn load_flow(path: &Path) -> Result<Vec<Block>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading flow file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing flow file {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let blocks = load_flow(&args.flow).await?;
    let executors = ExecutorRegistry::new().with(Summary);
    executors.validate(&blocks)?;

    let mut builder = HexabotRuntime::builder()
        .blocks(Arc::new(MemoryBlockStore::with_blocks(blocks)))
        .executors(executors);
    if let Some(path) = &args.config {
        builder = builder.config_file(path);
    } else {
        // Demo defaults; pass --config to use a configuration file instead.
        let mut config = HexabotConfig::default();
        config.chatbot.contact = BTreeMap::from([(
            "company_name".to_string(),
            "Hexabot Pizza".to_string(),
        )]);
        config.logging.output = hexabot::runtime::config::LogOutput::Stderr;
        builder = builder.config(config);
    }
    let runtime = builder.build()?;

    let console = runtime
        .widget(CONSOLE_CHANNEL_NAME)
        .context("console channel is not registered")?;

    info!(visitor = %args.visitor, "Say hello! (/quit to leave)");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = &mut shutdown => None,
        };
        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }

        match runtime
            .handle_raw(CONSOLE_CHANNEL_NAME, &to_payload(line, &args.visitor))
            .await
        {
            Ok(Some(outcome)) if !outcome.is_handled() => println!("bot> ..."),
            Ok(_) => {}
            Err(err) => warn!(error = %err, "Turn failed"),
        }
        for delivery in console.drain_for(&args.visitor) {
            print_delivery(&delivery);
        }
    }

    let stats = runtime.shutdown().await;
    println!("{stats}");
    Ok(())
}
