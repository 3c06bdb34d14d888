//! Command handlers. Each one builds what it needs from [`AppConfig`].

use std::io::Write as _;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, bail};
use lawmate_ai::{BootstrapRegistry, LlmError, ProgressFn, PullProgress, RiskClassifier, RiskRules};
use lawmate_core::{ConversationId, LegalDomain, Turn};
use lawmate_dispatch::{DispatchError, DispatchOptions, Dispatcher, ProviderSlot};
use lawmate_justice::{CaseSearch, JusticeClient, NoSearch};
use lawmate_store::{HistoryStore, JsonlStore, MemoryStore, title_from_message};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{AppConfig, StoreKind};
use crate::display;

// ── Wiring ──

async fn open_history(config: &AppConfig) -> anyhow::Result<Arc<dyn HistoryStore>> {
    Ok(match config.store {
        StoreKind::Memory => Arc::new(MemoryStore::new()),
        StoreKind::Jsonl => {
            let dir = config.data_dir.join("history");
            let store = JsonlStore::open(&dir)
                .await
                .with_context(|| format!("opening history in {}", dir.display()))?;
            Arc::new(store)
        }
        StoreKind::Duckdb => open_duckdb(config)?,
    })
}

#[cfg(feature = "duckdb")]
fn open_duckdb(config: &AppConfig) -> anyhow::Result<Arc<dyn HistoryStore>> {
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating {}", config.data_dir.display()))?;
    let path = config.data_dir.join("history.duckdb");
    let store = lawmate_store::DuckStore::open_persistent(&path)
        .with_context(|| format!("opening {}", path.display()))?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "duckdb"))]
fn open_duckdb(_: &AppConfig) -> anyhow::Result<Arc<dyn HistoryStore>> {
    bail!("this build has no DuckDB support; rebuild with `--features duckdb` or use LAWMATE_STORE=jsonl")
}

fn search(config: &AppConfig) -> anyhow::Result<Arc<dyn CaseSearch>> {
    if config.justice.lookback_days == 0 {
        return Ok(Arc::new(NoSearch));
    }
    let client = JusticeClient::new(config.justice_base_url.as_str())
        .context("building judicature client")?
        .with_max_items_per_day(config.justice.max_items_per_day);
    Ok(Arc::new(client))
}

fn classifier(config: &AppConfig) -> anyhow::Result<RiskClassifier> {
    let rules = match &config.risk_rules {
        Some(path) => RiskRules::from_json_file(path)
            .with_context(|| format!("loading risk rules from {}", path.display()))?,
        None => RiskRules::default(),
    };
    Ok(RiskClassifier::new(rules))
}

/// Model download progress on stderr, one line per status or percent change.
fn progress_printer() -> Arc<ProgressFn<'static>> {
    let last = Mutex::new(None::<(String, Option<u8>)>);
    Arc::new(move |p: PullProgress| {
        let current = (p.status.clone(), p.percent());
        let mut last = last.lock().unwrap_or_else(PoisonError::into_inner);
        if last.as_ref() != Some(&current) {
            eprintln!("  {p}");
            *last = Some(current);
        }
    })
}

pub async fn build_dispatcher(config: &AppConfig) -> anyhow::Result<Dispatcher> {
    for cfg in std::iter::once(&config.provider).chain(&config.fallbacks) {
        if cfg.provider.is_paid() && !cfg.has_api_key() {
            warn!(provider = %cfg.provider, "no API key configured, answers will come from a fallback");
        }
    }

    let primary = ProviderSlot::from_config(&config.provider)
        .with_context(|| format!("configuring {}", config.provider.provider))?;
    let fallbacks = config
        .fallbacks
        .iter()
        .map(|cfg| {
            ProviderSlot::from_config(cfg).with_context(|| format!("configuring {}", cfg.provider))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let dispatcher = Dispatcher::new(primary, open_history(config).await?)
        .with_fallbacks(fallbacks)
        .with_registry(Arc::new(BootstrapRegistry::new(config.bootstrap_timeout)))
        .with_classifier(Arc::new(classifier(config)?))
        .with_search(search(config)?)
        .with_progress(progress_printer())
        .with_options(DispatchOptions {
            context: config.context,
            retry: config.retry,
            lookback_days: config.justice.lookback_days,
        });

    info!(
        provider = %config.provider.provider,
        model = %config.provider.model_name,
        fallbacks = config.fallbacks.len(),
        "lawmate ready"
    );
    Ok(dispatcher)
}

/// A token cancelled by the first Ctrl-C; the watcher dies with the guard.
struct CtrlC {
    token: CancellationToken,
    watcher: tokio::task::JoinHandle<()>,
}

impl CtrlC {
    fn watch() -> Self {
        let token = CancellationToken::new();
        let watcher = tokio::spawn({
            let token = token.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    token.cancel();
                }
            }
        });
        Self { token, watcher }
    }
}

impl Drop for CtrlC {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

/// Dispatch `question`, starting a new conversation when `conversation` is
/// `None`. A new conversation whose first question fails is removed again.
async fn answer(
    dispatcher: &Dispatcher,
    conversation: Option<ConversationId>,
    domain: Option<LegalDomain>,
    question: &str,
    cancel: &CancellationToken,
) -> Result<(ConversationId, Turn), DispatchError> {
    if let Some(id) = conversation {
        return Ok((id, dispatcher.dispatch(id, domain, question, cancel).await?));
    }
    if question.trim().is_empty() {
        return Err(DispatchError::EmptyMessage);
    }

    let title_domain = domain.unwrap_or_else(|| lawmate_core::infer_domain(question));
    let created = dispatcher
        .history()
        .create_conversation(&title_from_message(question), title_domain)
        .await?;
    match dispatcher.dispatch(created.id, domain, question, cancel).await {
        Ok(turn) => Ok((created.id, turn)),
        Err(err) => {
            if let Err(e) = dispatcher.history().delete_conversation(created.id).await {
                warn!(conversation = %created.id, error = %e, "could not remove empty conversation");
            }
            Err(err)
        }
    }
}

/// Print one line per bootstrapped backend and return how many failed.
fn report_bootstrap(results: &[(ProviderSlot, Result<(), LlmError>)]) -> usize {
    let mut failed = 0;
    for (slot, result) in results {
        match result {
            Ok(()) => println!("{} {}: ready", slot.kind(), slot.model()),
            Err(e) => {
                failed += 1;
                println!("{} {}: {e}", slot.kind(), slot.model());
            }
        }
    }
    failed
}

// ── Commands ──

pub async fn ask(
    config: &AppConfig,
    question: &str,
    domain: Option<LegalDomain>,
    conversation: Option<ConversationId>,
) -> anyhow::Result<()> {
    if question.trim().is_empty() {
        bail!("the question is empty");
    }
    let dispatcher = build_dispatcher(config).await?;
    let ctrl_c = CtrlC::watch();
    let (id, turn) = answer(&dispatcher, conversation, domain, question, &ctrl_c.token)
        .await
        .context("answering the question")?;
    display::print_turn(&turn);
    eprintln!("konverzace: {id}");
    Ok(())
}

/// Interactive session: one line per question, `/new` starts over, `/setup`
/// retries local backends, `/quit`, EOF or Ctrl-C at the prompt ends it.
pub async fn chat(
    config: &AppConfig,
    domain: Option<LegalDomain>,
    conversation: Option<ConversationId>,
) -> anyhow::Result<()> {
    let dispatcher = build_dispatcher(config).await?;
    let mut current = conversation;
    if let Some(id) = current {
        let existing = dispatcher.history().get_conversation(id).await?;
        eprintln!("pokračuji v konverzaci: {}", existing.title);
    }

    eprintln!("Lawmate: pište dotaz, Ctrl-C zruší rozpracovanou odpověď, /quit ukončí.");
    eprintln!("Nejde o právní službu. {}", display::LAWYER_SEARCH_URL);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        let _ = std::io::stderr().flush();
        // Ctrl-C at the prompt ends the session.
        let line = tokio::select! {
            line = lines.next_line() => line.context("reading stdin")?,
            _ = tokio::signal::ctrl_c() => {
                eprintln!();
                break;
            }
        };
        let Some(line) = line else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/konec" => break,
            "/new" | "/nova" => {
                current = None;
                eprintln!("nová konverzace");
                continue;
            }
            "/setup" => {
                let ctrl_c = CtrlC::watch();
                report_bootstrap(&dispatcher.rebootstrap(&ctrl_c.token).await);
                continue;
            }
            _ => {}
        }

        let ctrl_c = CtrlC::watch();
        match answer(&dispatcher, current, domain, line, &ctrl_c.token).await {
            Ok((id, turn)) => {
                current = Some(id);
                println!();
                display::print_turn(&turn);
                println!();
            }
            Err(DispatchError::Cancelled) => eprintln!("\nzrušeno"),
            Err(e) => eprintln!("chyba: {e}"),
        }
    }
    Ok(())
}

pub async fn history_list(config: &AppConfig) -> anyhow::Result<()> {
    let store = open_history(config).await?;
    display::print_conversations(&store.list_conversations().await?);
    Ok(())
}

pub async fn history_show(config: &AppConfig, id: ConversationId) -> anyhow::Result<()> {
    let store = open_history(config).await?;
    let conversation = store.get_conversation(id).await?;
    let turns = store.read_turns(id).await?;
    display::print_transcript(&conversation, &turns);
    Ok(())
}

pub async fn history_delete(config: &AppConfig, id: ConversationId) -> anyhow::Result<()> {
    let store = open_history(config).await?;
    store.delete_conversation(id).await?;
    eprintln!("smazáno: {id}");
    Ok(())
}

/// Bootstrap every configured local backend now instead of on the first question.
pub async fn setup(config: &AppConfig) -> anyhow::Result<()> {
    let dispatcher = build_dispatcher(config).await?;
    let ctrl_c = CtrlC::watch();
    let results = dispatcher.prepare(&ctrl_c.token).await;
    if results.is_empty() {
        println!("nothing to set up: no configured provider needs a local model");
        return Ok(());
    }

    let failed = report_bootstrap(&results);
    if failed > 0 {
        bail!("{failed} of {} backends are not ready", results.len());
    }
    Ok(())
}

pub fn lawyer() {
    println!("{}", display::LAWYER_SEARCH_URL);
}
