//! assist-cli: 终端对话客户端，演示工具调用与信息补全往返
//!
//! Usage:
//!   assist-cli [--config <path>] [--tools <a,b,...>]
//!
//! Uses the OpenAI-compatible model when the configured API key variable is
//! set, otherwise the offline rule-based model.

use ai_assist_rust::config::split_list;
use ai_assist_rust::{
    builtin_registry, CompletionRequest, Error, LanguageModel, Message, OpenAiCompatModel,
    Orchestrator, OutboundEvent, RuleBasedModel, RuntimeConfig, ToolResult, Transcript,
};
use anyhow::{bail, Context};
use futures::StreamExt;
use serde_json::{Map, Value};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::EnvFilter;

type Input = Lines<BufReader<Stdin>>;

struct Options {
    config: Option<String>,
    tools: Option<Vec<String>>,
}

fn print_usage() {
    println!(
        r#"assist-cli: 工具调用对话客户端

USAGE:
    assist-cli [OPTIONS]

OPTIONS:
    --config <path>     YAML runtime configuration
    --tools <a,b,...>   Allow-list for every turn (default: from config)
    -h, --help          Show this help message

ENVIRONMENT:
    ASSIST_CONFIG, ASSIST_TURN_TIMEOUT_MS, ASSIST_MAX_MODEL_STEPS,
    ASSIST_ALLOWED_TOOLS, DEEPSEEK_API_BASE_URL, ASSIST_MODEL, DEEPSEEK_API_KEY,
    RUST_LOG"#
    );
}

fn parse_args(args: &[String]) -> anyhow::Result<Option<Options>> {
    let mut options = Options {
        config: None,
        tools: None,
    };
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => options.config = Some(iter.next().context("--config needs a path")?.clone()),
            "--tools" => {
                options.tools = Some(split_list(iter.next().context("--tools needs a list")?))
            }
            "-h" | "--help" => return Ok(None),
            other => bail!("unknown argument: {other}"),
        }
    }
    Ok(Some(options))
}

fn load_config(options: &Options) -> anyhow::Result<RuntimeConfig> {
    let mut config = match &options.config {
        Some(path) => RuntimeConfig::from_file(path)?.apply_env_with(|k| std::env::var(k).ok())?,
        None => RuntimeConfig::load()?,
    };
    if let Some(tools) = &options.tools {
        config.allowed_tools = tools.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(options) = parse_args(&args)? else {
        print_usage();
        return Ok(());
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&options)?;
    let registry = Arc::new(builtin_registry()?);
    let model: Arc<dyn LanguageModel> = if config.model.api_key().is_some() {
        Arc::new(OpenAiCompatModel::from_config(&config.model)?)
    } else {
        Arc::new(RuleBasedModel::new())
    };
    println!("model: {} | tools: {}", model.name(), config.allowed_tools.join(", "));

    let orchestrator = Orchestrator::builder()
        .shared_registry(Arc::clone(&registry))
        .shared_model(model)
        .config(config.turn_config())
        .build()?;
    let mut transcript = Transcript::new().with_registry(registry);
    let mut input: Input = BufReader::new(tokio::io::stdin()).lines();

    loop {
        prompt("> ")?;
        let Some(line) = input.next_line().await? else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }

        let mut next = Some(Message::user(line));
        while let Some(message) = next.take() {
            run_turn(&orchestrator, &mut transcript, message, &config.allowed_tools).await?;
            if let Some(request) = transcript.completions().first().cloned() {
                next = collect_completion(&transcript, &request, &mut input).await?;
            }
        }
    }
    Ok(())
}

async fn run_turn(
    orchestrator: &Orchestrator,
    transcript: &mut Transcript,
    message: Message,
    allowed: &[String],
) -> anyhow::Result<()> {
    let history = transcript.begin_turn(message);
    let mut events = orchestrator.submit_turn(history, allowed)?;
    while let Some(event) = events.next().await {
        print_event(&event)?;
        transcript.apply(&event);
    }
    Ok(())
}

fn print_event(event: &OutboundEvent) -> std::io::Result<()> {
    match event {
        OutboundEvent::TextDelta { content } => prompt(content)?,
        OutboundEvent::ToolCallStarted { name, input, .. } => println!("\n[{name}] {input}"),
        OutboundEvent::ToolCallResolved { result, .. } => match result {
            ToolResult::Complete { payload } => println!("  ✓ {payload}"),
            ToolResult::Incomplete { message, .. } => println!("  ? {message}"),
        },
        OutboundEvent::ToolCallFailed { kind, detail, .. } => println!("  ✗ {kind}: {detail}"),
        OutboundEvent::TurnError { kind, detail } => println!("\n[turn error: {kind}] {detail}"),
        OutboundEvent::TurnDone { .. } => println!(),
    }
    Ok(())
}

fn prompt(text: &str) -> std::io::Result<()> {
    let mut out = std::io::stdout();
    write!(out, "{text}")?;
    out.flush()
}

/// Ask for every missing field; `None` when the user abandons the form.
async fn collect_completion(
    transcript: &Transcript,
    request: &CompletionRequest,
    input: &mut Input,
) -> anyhow::Result<Option<Message>> {
    println!("{} ({})", request.message, request.affordance);
    let mut values = Map::new();
    for field in &request.missing_fields {
        let choices: &[Value] = if request.affordance.is_selector() {
            request.choices_for(field).unwrap_or(&[])
        } else {
            &[]
        };
        for (i, choice) in choices.iter().enumerate() {
            println!("  {}. {}", i + 1, choice.as_str().unwrap_or(&choice.to_string()));
        }
        prompt(&format!("{field}> "))?;
        let Some(answer) = input.next_line().await? else { return Ok(None) };
        let answer = answer.trim();
        if answer.is_empty() {
            return Ok(None);
        }
        let value = answer
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| choices.get(i).cloned())
            .unwrap_or_else(|| Value::String(answer.to_string()));
        values.insert(field.clone(), value);
    }

    match transcript.complete(&request.call_id, values) {
        Ok(message) => {
            println!("> {}", message.text());
            Ok(Some(message))
        }
        Err(Error::Completion(e)) => {
            println!("{e}");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}
