use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use support_triage::adapters::{KnowledgeBase, OpenAiClient, OpenAiEmbedder, SqliteTicketStore};
use support_triage::api::{serve, AppState};
use support_triage::config::LogFormat;
use support_triage::core::eval::{evaluate, load_dataset};
use support_triage::core::pii::redact_pii;
use support_triage::domain::model::TicketInput;
use support_triage::domain::ports::Retriever;
use support_triage::utils::error::ErrorSeverity;
use support_triage::utils::{logger, validation::Validate};
use support_triage::{AppConfig, Cli, Commands, TriageAgent, TriageError};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            logger::init_cli_logger(cli.verbose);
            exit_with(&anyhow::Error::new(e));
        }
    };

    // 初始化日誌
    match config.logging.format {
        LogFormat::Pretty => logger::init_cli_logger(cli.verbose),
        LogFormat::Json => logger::init_json_logger(cli.verbose),
    }
    tracing::debug!("Loaded config: {:?}", config);

    if let Err(e) = run(cli.command, config).await {
        exit_with(&e);
    }
}

fn load_config(cli: &Cli) -> support_triage::Result<AppConfig> {
    let config = AppConfig::load(cli.config.as_deref())?;
    config.validate()?;
    Ok(config)
}

/// 根據錯誤嚴重程度決定退出碼
fn exit_with(err: &anyhow::Error) -> ! {
    let exit_code = match err.downcast_ref::<TriageError>() {
        Some(e) => {
            tracing::error!(
                "❌ Command failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());

            match e.severity() {
                ErrorSeverity::Low => 0,
                ErrorSeverity::Medium => 2,
                ErrorSeverity::High => 1,
                ErrorSeverity::Critical => 3,
            }
        }
        None => {
            tracing::error!("❌ Command failed: {:#}", err);
            eprintln!("❌ {:#}", err);
            1
        }
    };
    std::process::exit(exit_code);
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render JSON output")?;
    println!("{}", rendered);
    Ok(())
}

fn knowledge_base(config: &AppConfig) -> support_triage::Result<KnowledgeBase> {
    let client = OpenAiClient::from_config(config)?;
    let embedder = Arc::new(OpenAiEmbedder::new(client, &config.embeddings));
    Ok(KnowledgeBase::from_config(embedder, &config.kb, &config.embeddings))
}

async fn run(command: Commands, mut config: AppConfig) -> anyhow::Result<()> {
    match command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            let agent = TriageAgent::from_config(&config)?;
            let store = Arc::new(SqliteTicketStore::from_config(&config.database)?);
            let state = Arc::new(AppState::new(agent, store));
            serve(&config, state).await?;
        }
        Commands::Ingest { kb_dir } => {
            let docs_dir = kb_dir.unwrap_or_else(|| PathBuf::from(&config.kb.docs_dir));
            let kb = knowledge_base(&config)?;
            let report = kb.ingest(&docs_dir).await?;
            println!(
                "✅ Ingested {} chunks from {} documents into collection '{}'",
                report.chunks, report.documents, config.kb.collection
            );
        }
        Commands::Retrieve { query, top_k } => {
            let kb = knowledge_base(&config)?;
            let hits = kb.retrieve(&query, top_k.unwrap_or(config.kb.top_k)).await?;
            if hits.is_empty() {
                tracing::warn!("⚠️ No KB hits, run `support-triage ingest` first");
            }
            print_json(&hits)?;
        }
        Commands::Triage {
            subject,
            body,
            customer_email,
            channel,
        } => {
            let input = TicketInput {
                subject,
                body,
                customer_email,
                channel,
            };
            input.validate()?;

            let agent = TriageAgent::from_config(&config)?;
            let output = agent.run(input).await?;
            print_json(&output)?;
        }
        Commands::Redact { text, keep_values } => {
            let (redacted_text, findings) = redact_pii(&text, keep_values);
            print_json(&serde_json::json!({
                "redacted_text": redacted_text,
                "findings": findings,
            }))?;
        }
        Commands::Eval { dataset } => {
            let cases = load_dataset(&dataset)?;
            let agent = TriageAgent::from_config(&config)?;
            let report = evaluate(&agent, &cases).await;

            println!("📊 Evaluated {} cases ({} failed)", report.total, report.failed);
            println!("   intent accuracy:   {:.1}%", report.intent_accuracy() * 100.0);
            println!("   priority accuracy: {:.1}%", report.priority_accuracy() * 100.0);
            for (decision, count) in &report.decisions {
                println!("   {}: {}", decision, count);
            }
            print_json(&report)?;
        }
    }
    Ok(())
}
