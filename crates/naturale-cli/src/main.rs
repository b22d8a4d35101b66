//! `naturale` command line: translate requests and manage the metadata cache.
//!
//! ```sh
//! naturale translate "my active bugs" --org acme --project web
//! naturale translate "tasks created this week" --page-url https://acme.visualstudio.com/web/_workitems --json
//! naturale cache status
//! naturale cache refresh --org acme --project web
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use naturale_core::{HostShape, NaturaleConfig, TranslationContext, Translator};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "naturale", version, about = "Natural-language work-item queries")]
struct Cli {
    /// TOML config file. `NATURALE_*` variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Translate a request into a query URL.
    Translate(TranslateArgs),

    /// Inspect or manage cached project metadata.
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

#[derive(Debug, Args)]
struct TargetArgs {
    #[arg(long)]
    org: Option<String>,

    #[arg(long)]
    project: Option<String>,

    /// path-embedded (dev.azure.com) or subdomain (visualstudio.com).
    #[arg(long)]
    shape: Option<HostShape>,

    /// Page the request came from; fills in anything not given explicitly.
    #[arg(long)]
    page_url: Option<String>,
}

impl TargetArgs {
    fn context(&self) -> TranslationContext {
        TranslationContext {
            organization: self.org.clone(),
            project: self.project.clone(),
            host_shape: self.shape,
            page_url: self.page_url.clone(),
            ..TranslationContext::default()
        }
    }

    fn is_given(&self) -> bool {
        self.org.is_some() || self.project.is_some() || self.page_url.is_some()
    }
}

#[derive(Debug, Args)]
struct TranslateArgs {
    text: String,

    #[command(flatten)]
    target: TargetArgs,

    /// Display name or unique name of the requesting user.
    #[arg(long)]
    user: Option<String>,

    /// Print the full result as JSON.
    #[arg(long)]
    json: bool,

    /// Run the compiled query and list matching work-item ids.
    #[arg(long)]
    execute: bool,
}

#[derive(Debug, Subcommand)]
enum CacheCommand {
    /// Show cached entries, or one project's entry.
    Status(TargetArgs),
    /// Fetch a project's metadata now.
    Refresh(TargetArgs),
    /// Drop one project's metadata, or everything.
    Clear(TargetArgs),
    /// Copy the persisted cache database.
    Backup { destination: PathBuf },
}

fn init_logging() {
    let default_level = "warn";
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(default_level))
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = NaturaleConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let translator = Translator::from_config(&config).context("failed to initialise translator")?;

    match cli.command {
        Command::Translate(args) => translate(&translator, args).await,
        Command::Cache { command } => cache(&translator, command).await,
    }
}

async fn translate(translator: &Translator, args: TranslateArgs) -> Result<()> {
    let mut context = args.target.context();
    context.current_user = args.user;
    let result = translator.translate(&args.text, &context).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if result.success {
        println!("{}", result.url.as_deref().unwrap_or_default());
        eprintln!(
            "method: {}  confidence: {:.2}  ({} ms)",
            result.method, result.confidence, result.processing_time_ms
        );
        eprintln!("reasoning: {}", result.reasoning);
        for hint in &result.suggestions {
            eprintln!("hint: {hint}");
        }
    }
    if !result.success {
        bail!(result.error.unwrap_or_else(|| "translation failed".to_string()));
    }

    if args.execute {
        let wiql = result
            .query_string
            .context("result carries no query string to execute")?;
        let items = translator.execute(&context, &wiql).await?;
        println!("{} work item(s)", items.len());
        for item in items {
            println!("#{}  {}", item.id, item.url);
        }
    }
    Ok(())
}

async fn cache(translator: &Translator, command: CacheCommand) -> Result<()> {
    match command {
        CacheCommand::Status(target) => {
            let statuses = if target.is_given() {
                translator.cache_status(&target.context()).await?.into_iter().collect()
            } else {
                translator.cache_status_all().await?
            };
            println!("{}", serde_json::to_string_pretty(&statuses)?);
        }
        CacheCommand::Refresh(target) => {
            let status = translator.refresh_metadata(&target.context()).await?;
            match status {
                Some(status) => println!("{}", serde_json::to_string_pretty(&status)?),
                None => bail!("metadata could not be fetched"),
            }
        }
        CacheCommand::Clear(target) => {
            let removed = if target.is_given() {
                translator.clear_cache(Some(&target.context())).await?
            } else {
                translator.clear_cache(None).await?
            };
            println!("removed {removed} cache entr{}", if removed == 1 { "y" } else { "ies" });
        }
        CacheCommand::Backup { destination } => {
            let Some(db) = translator.store().database() else {
                bail!("no cache database configured (set cache.db_path or NATURALE_CACHE_DB)");
            };
            let copied = db.backup_to(&destination)?;
            println!("{}", copied.display());
        }
    }
    Ok(())
}
