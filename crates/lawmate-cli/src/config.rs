//! Startup configuration: `.env`, environment variables and flags, resolved
//! once into an [`AppConfig`] that the library crates receive as typed values.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Args, ValueEnum};
use lawmate_ai::{ContextWindow, RetryPolicy, bootstrap::DEFAULT_ACQUIRE_TIMEOUT};
use lawmate_core::config::{
    DEFAULT_OLLAMA_BASE_URL, DEFAULT_OLLAMA_MODEL, DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL,
};
use lawmate_core::domain::ParseDomainError;
use lawmate_core::{LegalDomain, ProviderConfig};
use lawmate_justice::{DEFAULT_LOOKBACK_DAYS, DEFAULT_MAX_ITEMS_PER_DAY, JusticeConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderChoice {
    #[value(name = "openai")]
    OpenAi,
    Ollama,
    Mock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// JSON-lines files under the data directory.
    Jsonl,
    /// Nothing survives the process.
    Memory,
    /// A DuckDB file under the data directory (needs the `duckdb` feature).
    Duckdb,
}

/// `auto` or a fixed legal domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DomainChoice(pub Option<LegalDomain>);

impl FromStr for DomainChoice {
    type Err = ParseDomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" | "automaticky" => Ok(Self(None)),
            other => other.parse().map(|d| Self(Some(d))),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    /// Backend that answers questions
    #[arg(long = "provider", env = "LLM_PROVIDER", value_enum, ignore_case = true,
          default_value_t = ProviderChoice::Mock, global = true)]
    pub provider: ProviderChoice,

    /// Providers tried after the primary one fails, comma separated
    #[arg(long = "fallback", env = "LAWMATE_FALLBACK_PROVIDERS", value_enum, ignore_case = true,
          value_delimiter = ',', global = true)]
    pub fallbacks: Vec<ProviderChoice>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "OPENAI_MODEL", default_value = DEFAULT_OPENAI_MODEL, global = true)]
    pub openai_model: String,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_OPENAI_BASE_URL, global = true)]
    pub openai_base_url: String,

    /// Only needed for Ollama Cloud (https://ollama.com)
    #[arg(long, env = "OLLAMA_API_KEY", hide_env_values = true, global = true)]
    pub ollama_api_key: Option<String>,

    #[arg(long, env = "OLLAMA_BASE_URL", default_value = DEFAULT_OLLAMA_BASE_URL, global = true)]
    pub ollama_base_url: String,

    #[arg(long, env = "OLLAMA_MODEL", default_value = DEFAULT_OLLAMA_MODEL, global = true)]
    pub ollama_model: String,

    /// Days of court decisions to search; 0 disables the search
    #[arg(long, env = "JUSTICE_LOOKBACK_DAYS", default_value_t = DEFAULT_LOOKBACK_DAYS, global = true)]
    pub justice_lookback_days: u32,

    #[arg(long, env = "JUSTICE_MAX_ITEMS_PER_DAY", default_value_t = DEFAULT_MAX_ITEMS_PER_DAY,
          global = true)]
    pub justice_max_items_per_day: usize,

    #[arg(long, env = "JUSTICE_BASE_URL", default_value = lawmate_justice::client::DEFAULT_BASE_URL,
          global = true)]
    pub justice_base_url: String,

    /// Where conversations are kept (default: ~/.lawmate)
    #[arg(long, env = "LAWMATE_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    #[arg(long, env = "LAWMATE_STORE", value_enum, ignore_case = true,
          default_value_t = StoreKind::Jsonl, global = true)]
    pub store: StoreKind,

    /// JSON file overriding the built-in risk keywords and advice
    #[arg(long, env = "LAWMATE_RISK_RULES", global = true)]
    pub risk_rules: Option<PathBuf>,

    /// Attempts per provider before falling back
    #[arg(long, env = "LAWMATE_MAX_ATTEMPTS", default_value_t = 3, global = true)]
    pub max_attempts: u32,

    /// Upper bound on a model download, in seconds
    #[arg(long, env = "LAWMATE_BOOTSTRAP_TIMEOUT_SECS",
          default_value_t = DEFAULT_ACQUIRE_TIMEOUT.as_secs(), global = true)]
    pub bootstrap_timeout_secs: u64,
}

/// Everything the binary needs, resolved and validated.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub fallbacks: Vec<ProviderConfig>,
    pub justice: JusticeConfig,
    pub justice_base_url: String,
    pub context: ContextWindow,
    pub retry: RetryPolicy,
    pub bootstrap_timeout: Duration,
    pub data_dir: PathBuf,
    pub store: StoreKind,
    pub risk_rules: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_args(args: &ConfigArgs) -> anyhow::Result<Self> {
        if args.max_attempts == 0 {
            bail!("LAWMATE_MAX_ATTEMPTS must be at least 1");
        }

        let data_dir = match &args.data_dir {
            Some(dir) => dir.clone(),
            None => default_data_dir().context("cannot locate a home directory; set LAWMATE_DATA_DIR")?,
        };

        // The primary is never repeated and Mock always closes the chain anyway.
        let mut seen = vec![args.provider];
        let mut fallbacks = Vec::new();
        for &choice in &args.fallbacks {
            if choice == ProviderChoice::Mock || seen.contains(&choice) {
                continue;
            }
            seen.push(choice);
            fallbacks.push(provider_config(args, choice));
        }

        Ok(Self {
            provider: provider_config(args, args.provider),
            fallbacks,
            justice: JusticeConfig {
                lookback_days: args.justice_lookback_days,
                max_items_per_day: args.justice_max_items_per_day,
            },
            justice_base_url: args.justice_base_url.clone(),
            context: ContextWindow::default(),
            retry: RetryPolicy {
                max_attempts: args.max_attempts,
                ..RetryPolicy::default()
            },
            bootstrap_timeout: Duration::from_secs(args.bootstrap_timeout_secs),
            data_dir,
            store: args.store,
            risk_rules: args.risk_rules.clone(),
        })
    }
}

fn provider_config(args: &ConfigArgs, choice: ProviderChoice) -> ProviderConfig {
    match choice {
        ProviderChoice::Mock => ProviderConfig::mock(),
        ProviderChoice::OpenAi => {
            ProviderConfig::openai(args.openai_api_key.clone(), args.openai_model.trim())
                .with_base_url(args.openai_base_url.trim())
        }
        ProviderChoice::Ollama => ProviderConfig::ollama(
            args.ollama_base_url.trim(),
            args.ollama_model.trim(),
            args.ollama_api_key.clone(),
        ),
    }
}

fn default_data_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(|home| PathBuf::from(home).join(".lawmate"))
}
