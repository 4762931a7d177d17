//! `ragent ask`: answer one question.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ragent_agent::{AgentLoop, AgentRequest, AgentStreamEvent, RunOutcome};
use ragent_config::{AppConfig, ToolsConfig};
use ragent_providers::{ConcurrencyGate, GatedProvider, OpenAiCompatProvider};
use ragent_tools::{Collaborators, DispatchConfig, InMemoryCorpus, ToolDispatcher, default_registry};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct AskOptions {
    pub query: String,
    pub corpus: Option<PathBuf>,
    pub document_context: Option<String>,
    pub collection_context: Option<String>,
    pub stream: bool,
}

pub async fn run(options: AskOptions) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if let Some(path) = options.corpus {
        config.retrieval.corpus_path = Some(path);
    }

    // Check for API key early to give a clear error
    if !config.has_api_key() && !is_local(&config.api_url) {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    RAGENT_API_KEY=...   (generic)");
        eprintln!("    OPENAI_API_KEY=...   (for OpenAI direct)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        eprintln!("  A local endpoint (RAGENT_API_URL=http://localhost:11434/v1) needs no key.");
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let agent = build_agent(&config)?;

    let mut request = AgentRequest::new(options.query)
        .with_document_context(config.retrieval.document_context.clone())
        .with_collection_context(config.retrieval.collection_context.clone());
    if let Some(context) = options.document_context {
        request = request.with_document_context(context);
    }
    if let Some(context) = options.collection_context {
        request = request.with_collection_context(context);
    }

    // Ctrl+C cancels the conversation instead of killing the process
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let run = if options.stream {
        let (tx, rx) = mpsc::channel(64);
        let printer = tokio::spawn(print_events(rx));
        let run = agent.run_streaming(request, &cancel, tx).await?;
        printer.await?;
        run
    } else {
        eprint!("  Thinking...");
        let run = agent.run(request, &cancel).await?;
        eprint!("\r              \r");
        if let RunOutcome::Done { answer } = &run.outcome {
            println!("{answer}");
        }
        run
    };

    match run.outcome {
        RunOutcome::Done { .. } => Ok(()),
        RunOutcome::Failed {
            reason,
            partial_answer,
        } => {
            eprintln!("  [Failed] {reason}");
            if let Some(partial) = partial_answer {
                println!("{partial}");
            }
            Err(reason.into())
        }
    }
}

/// Wire provider, tools and loop together from configuration.
fn build_agent(config: &AppConfig) -> Result<AgentLoop, Box<dyn std::error::Error>> {
    let provider = OpenAiCompatProvider::new(
        "openai_compat",
        config.api_url.clone(),
        config.api_key.clone().unwrap_or_default(),
        Duration::from_secs(config.agent_loop.request_timeout_secs),
    )?;
    let gate = ConcurrencyGate::new(config.agent_loop.provider_concurrency);
    let provider = Arc::new(GatedProvider::new(provider, gate));

    let corpus = match &config.retrieval.corpus_path {
        Some(path) => {
            debug!(path = %path.display(), "Loading corpus");
            InMemoryCorpus::from_json_file(path)?
        }
        None => InMemoryCorpus::new(),
    };
    let registry = default_registry(Collaborators::from_corpus(corpus));
    let dispatcher = ToolDispatcher::new(registry).with_config(dispatch_config(&config.tools));

    Ok(AgentLoop::from_config(config, provider, dispatcher))
}

fn dispatch_config(tools: &ToolsConfig) -> DispatchConfig {
    DispatchConfig {
        max_concurrency: tools.max_concurrency,
        timeout: Duration::from_millis(tools.timeout_ms),
        max_tool_context_length: tools.max_tool_context_length,
        enabled: tools
            .enabled
            .as_ref()
            .map(|names| names.iter().cloned().collect()),
    }
}

fn is_local(url: &str) -> bool {
    url.contains("://localhost") || url.contains("://127.0.0.1")
}

async fn print_events(mut rx: mpsc::Receiver<AgentStreamEvent>) {
    let mut stdout = std::io::stdout();
    while let Some(event) = rx.recv().await {
        match event {
            AgentStreamEvent::Thought { content } => eprintln!("  Thought > {content}"),
            AgentStreamEvent::ToolCall { name, input, .. } => eprintln!("  Tool    > {name} {input}"),
            AgentStreamEvent::ToolResult { name, success, .. } => {
                let status = if success { "ok" } else { "failed" };
                eprintln!("  Result  > {name}: {status}");
            }
            AgentStreamEvent::Chunk { content } => {
                print!("{content}");
                let _ = stdout.flush();
            }
            AgentStreamEvent::Done { .. } => println!(),
            AgentStreamEvent::StateChanged { .. } | AgentStreamEvent::Failed { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_config_follows_tools_section() {
        let tools = ToolsConfig {
            max_concurrency: 2,
            timeout_ms: 1_500,
            max_tool_context_length: 100,
            enabled: Some(vec!["local_search".into(), "result".into()]),
        };
        let config = dispatch_config(&tools);
        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.timeout, Duration::from_millis(1_500));
        assert_eq!(config.max_tool_context_length, 100);
        let enabled = config.enabled.unwrap();
        assert!(enabled.contains("local_search"));
        assert!(!enabled.contains("content"));
    }

    #[test]
    fn local_endpoints_need_no_key() {
        assert!(is_local("http://localhost:11434/v1"));
        assert!(is_local("http://127.0.0.1:8000/v1"));
        assert!(!is_local("https://api.openai.com/v1"));
    }

    #[test]
    fn agent_builds_from_default_config() {
        let mut config = AppConfig::default();
        config.api_key = Some("sk-test".into());
        let agent = build_agent(&config).unwrap();
        assert_eq!(agent.limits().max_iterations, 10);
    }

    #[test]
    fn missing_corpus_file_is_an_error() {
        let mut config = AppConfig::default();
        config.retrieval.corpus_path = Some(PathBuf::from("/nonexistent/corpus.json"));
        assert!(build_agent(&config).is_err());
    }
}
