//! # sitechat CLI Application
//!
//! Command-line access to the indexing and retrieval pipeline.
//!
//! ## Key Components
//!
//! - CLI argument parsing with clap
//! - Subcommands:
//!   - `sitemap`: discover or crawl a site's URL list and link tallies
//!   - `crawl`: store page HTML, ranked text and the domain record
//!   - `build`: build or load the vector index of a site or document
//!   - `query`: two-stage retrieval and answer over one index
//!   - `ask`: chat turn with subject classification over a catalog
//!   - `list`: stored domains and their text coverage
//!   - `batch`: index many sites, each under a timeout

mod telemetry;

use anyhow::{Context, bail};
use clap::{ArgGroup, Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rig::embeddings::EmbeddingModel;
use sitechat::batch::{BatchStatus, read_site_list, run_batch};
use sitechat::catalog::Catalog;
use sitechat::chat::ChatService;
use sitechat::crawler::{
    CrawlerConfig, DomainLocks, DomainRefreshPolicy, PageFetcher, PageIndexer, SiteRoot,
    SitemapBuilder,
};
use sitechat::index::{IndexBuilder, IndexConfig, IndexKey};
use sitechat::model::{GeminiClient, Provider};
use sitechat::processor::{ChunkOptions, ProcessorConfig};
use sitechat::search::{Retriever, RetrieverConfig};
use sitechat::store::Database;
use std::path::{Path, PathBuf};
use std::time::Duration;
use telemetry::TelemetryConfig;
use tracing::instrument;

#[derive(Parser)]
#[command(author, version, about = "Index websites and documents and chat about them with two-stage retrieval", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(Args, Debug, Clone)]
struct GlobalArgs {
    /// Record store path
    #[arg(long, global = true, default_value = "data/sitechat.db")]
    database: PathBuf,

    /// Directory holding one persisted index per site or document
    #[arg(long, global = true, default_value = "data/rag-index")]
    index_root: PathBuf,

    /// Directory documents are read from
    #[arg(long, global = true, default_value = "data")]
    documents_dir: PathBuf,

    /// Model provider
    #[arg(long, global = true, value_enum, default_value = "gemini")]
    provider: Provider,

    /// Export traces and metrics over OTLP
    #[arg(long, global = true)]
    otel: bool,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the URL list and link tallies of a site
    Sitemap(SitemapArgs),

    /// Store page HTML, ranked text and the domain record of a site
    Crawl(CrawlArgs),

    /// Build or load the vector index of a site or document
    Build(BuildArgs),

    /// Answer a question from one index
    Query(QueryArgs),

    /// Ask a question about any subject in a catalog
    Ask(AskArgs),

    /// List stored domains
    List(ListArgs),

    /// Index every site listed in a file
    Batch(BatchArgs),
}

#[derive(Args, Debug, Clone)]
struct CrawlOptions {
    /// Maximum number of crawl rounds
    #[arg(long, default_value = "3")]
    depth: u32,

    /// Maximum pages visited, and the declared sitemap size limit
    #[arg(long, default_value = "100")]
    ceiling: u64,

    /// Drop text fragments seen more often than this across the site
    #[arg(long, default_value = "4")]
    text_freq_limit: u64,

    /// Delay between requests in milliseconds
    #[arg(long, default_value = "0")]
    rate: u64,

    /// Overwrite an existing domain record when re-indexing
    #[arg(long)]
    refresh: bool,
}

impl CrawlOptions {
    fn config(&self) -> CrawlerConfig {
        CrawlerConfig::builder()
            .recursion_depth_cutoff(self.depth)
            .pagerank_ceiling(self.ceiling)
            .text_freq_limit(self.text_freq_limit)
            .rate_limit_ms(self.rate)
            .domain_refresh(if self.refresh {
                DomainRefreshPolicy::Refresh
            } else {
                DomainRefreshPolicy::KeepExisting
            })
            .build()
    }
}

#[derive(Args, Debug, Clone)]
#[command(group(ArgGroup::new("source").required(true).args(["site", "document"])))]
struct SourceArgs {
    /// Site root URL or host
    #[arg(long)]
    site: Option<String>,

    /// Paginated text file in the documents directory
    #[arg(long)]
    document: Option<String>,

    /// Leading document pages to skip
    #[arg(long, default_value = "0")]
    start_skip: usize,

    /// Trailing document pages to skip
    #[arg(long, default_value = "0")]
    end_skip: usize,
}

impl SourceArgs {
    fn key(&self) -> anyhow::Result<IndexKey> {
        match (&self.site, &self.document) {
            (Some(site), _) => Ok(IndexKey::Domain(SiteRoot::parse(site)?)),
            (None, Some(filename)) => Ok(IndexKey::Document {
                filename: filename.clone(),
                start_skip: self.start_skip,
                end_skip: self.end_skip,
            }),
            (None, None) => bail!("either --site or --document is required"),
        }
    }
}

#[derive(Args, Debug, Clone)]
struct ChunkArgs {
    /// Target chunk size in words
    #[arg(long, default_value = "512")]
    chunk_size: usize,

    /// Words shared by consecutive chunks
    #[arg(long, default_value = "20")]
    overlap: usize,
}

impl ChunkArgs {
    fn config(&self) -> ProcessorConfig {
        ProcessorConfig::builder()
            .chunk_options(ChunkOptions {
                target_chunk_size: self.chunk_size,
                overlap_size: self.overlap,
            })
            .build()
    }
}

#[derive(Args, Debug, Clone)]
struct RetrievalArgs {
    /// Nodes kept by the first retrieval stage
    #[arg(long, default_value = "10")]
    broad_k: usize,

    /// Nodes kept by the second retrieval stage
    #[arg(long, default_value = "2")]
    narrow_k: usize,

    /// Minimum first stage similarity
    #[arg(long, default_value = "0.7")]
    cutoff: f64,

    /// Keep first stage nodes regardless of similarity
    #[arg(long)]
    no_cutoff: bool,
}

impl RetrievalArgs {
    fn config(&self) -> RetrieverConfig {
        RetrieverConfig::builder()
            .broad_top_k(self.broad_k)
            .narrow_top_k(self.narrow_k)
            .similarity_cutoff((!self.no_cutoff).then_some(self.cutoff))
            .build()
    }
}

#[derive(Args, Debug)]
struct SitemapArgs {
    /// Site root URL or host
    #[arg(required = true)]
    site: String,

    #[command(flatten)]
    crawl: CrawlOptions,

    /// Output format (text|json)
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,
}

#[derive(Args, Debug)]
struct CrawlArgs {
    /// Site root URL or host
    #[arg(required = true)]
    site: String,

    #[command(flatten)]
    crawl: CrawlOptions,
}

#[derive(Args, Debug)]
struct BuildArgs {
    #[command(flatten)]
    source: SourceArgs,

    #[command(flatten)]
    chunks: ChunkArgs,

    #[command(flatten)]
    crawl: CrawlOptions,
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// Question to answer
    #[arg(required = true)]
    query: String,

    #[command(flatten)]
    source: SourceArgs,

    #[command(flatten)]
    retrieval: RetrievalArgs,

    #[command(flatten)]
    chunks: ChunkArgs,

    /// Output format (text|json)
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,
}

#[derive(Args, Debug)]
struct AskArgs {
    /// Question to ask
    #[arg(required = true)]
    query: String,

    /// Subject catalog (JSON)
    #[arg(long, default_value = "data/catalog.json")]
    catalog: PathBuf,

    /// Continue an existing conversation
    #[arg(long)]
    conversation: Option<i64>,

    #[command(flatten)]
    retrieval: RetrievalArgs,

    /// Output format (text|json)
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,
}

#[derive(Args, Debug)]
struct ListArgs {
    /// Show detailed information
    #[arg(short, long)]
    details: bool,
}

#[derive(Args, Debug)]
struct BatchArgs {
    /// File with one site root per line
    #[arg(required = true)]
    sites: PathBuf,

    /// Per-site timeout in seconds
    #[arg(long, default_value = "1200")]
    timeout: u64,

    /// Report written after each site, and read to skip indexed sites
    #[arg(long, default_value = "data/batch-report.json")]
    report: PathBuf,

    #[command(flatten)]
    crawl: CrawlOptions,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _otel = telemetry::init_tracing_subscriber(TelemetryConfig {
        otel: cli.global.otel,
        log_dir: cli.global.log_file.clone(),
    })?;

    let global = cli.global;
    match cli.command {
        Some(Commands::Sitemap(args)) => sitemap_command(&global, args).await?,
        Some(Commands::Crawl(args)) => crawl_command(&global, args).await?,
        Some(Commands::Build(args)) => build_command(&global, args).await?,
        Some(Commands::Query(args)) => query_command(&global, args).await?,
        Some(Commands::Ask(args)) => ask_command(&global, args).await?,
        Some(Commands::List(args)) => list_command(&global, args).await?,
        Some(Commands::Batch(args)) => batch_command(&global, args).await?,
        None => {
            // If no command is provided, show help
            let _ = Cli::parse_from(["sitechat", "--help"]);
        }
    }

    Ok(())
}

async fn open_database(path: &Path) -> anyhow::Result<Database> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let path = path
        .to_str()
        .context("Database path must be valid UTF-8")?;
    Ok(Database::new_from_path(path).await?)
}

fn page_indexer(db: &Database, config: CrawlerConfig) -> anyhow::Result<PageIndexer> {
    let fetcher = PageFetcher::new(db.clone(), config)?;
    Ok(PageIndexer::new(fetcher, DomainLocks::new()))
}

fn index_builder<E: EmbeddingModel>(
    global: &GlobalArgs,
    db: &Database,
    model: E,
    crawl: CrawlerConfig,
    processor: ProcessorConfig,
) -> anyhow::Result<IndexBuilder<E>> {
    Ok(
        IndexBuilder::new(model, page_indexer(db, crawl)?, db.clone())
            .with_config(IndexConfig {
                root: global.index_root.clone(),
                documents_dir: global.documents_dir.clone(),
                ..IndexConfig::default()
            })
            .with_processor_config(processor),
    )
}

#[instrument(skip(global))]
async fn sitemap_command(global: &GlobalArgs, args: SitemapArgs) -> anyhow::Result<()> {
    let db = open_database(&global.database).await?;
    let root = SiteRoot::parse(&args.site)?;
    let fetcher = PageFetcher::new(db, args.crawl.config())?;
    let sitemap = SitemapBuilder::new(fetcher).build(&root).await?;

    if args.format == "json" {
        let pages: Vec<_> = sitemap
            .urls
            .iter()
            .map(|url| serde_json::json!({ "url": url, "pagerank": sitemap.pagerank.get(url) }))
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "site": root.url(),
                "source": format!("{:?}", sitemap.source),
                "pages": pages,
            }))?
        );
    } else {
        println!("{} pages ({:?})", sitemap.urls.len(), sitemap.source);
        for url in &sitemap.urls {
            println!("{:>5}  {}", sitemap.pagerank.get(url), url);
        }
    }
    Ok(())
}

#[instrument(skip(global))]
async fn crawl_command(global: &GlobalArgs, args: CrawlArgs) -> anyhow::Result<()> {
    let db = open_database(&global.database).await?;
    let root = SiteRoot::parse(&args.site)?;
    println!("Indexing pages of {}...", root);

    let domain = page_indexer(&db, args.crawl.config())?.index(&root).await?;
    let (total, missing) = db.text_coverage(&domain.domain).await?;

    println!("Domain: {}", domain.domain);
    println!("Pages: {} ({} without text)", total, missing);
    println!("Distinct text fragments: {}", domain.textrank.len());
    println!("Time to index: {:.2}s", domain.time_to_index);
    Ok(())
}

#[instrument(skip(global))]
async fn build_command(global: &GlobalArgs, args: BuildArgs) -> anyhow::Result<()> {
    let db = open_database(&global.database).await?;
    let client = GeminiClient::from_env(global.provider)?;
    let key = args.source.key()?;
    let builder = index_builder(
        global,
        &db,
        client.embedding().clone(),
        args.crawl.config(),
        args.chunks.config(),
    )?;

    let index = builder.build_or_load(&key).await?;
    println!(
        "Index for {} has {} nodes at {}",
        key,
        index.len(),
        builder.index_dir(&key)?.display()
    );
    Ok(())
}

#[instrument(skip(global))]
async fn query_command(global: &GlobalArgs, args: QueryArgs) -> anyhow::Result<()> {
    let db = open_database(&global.database).await?;
    let client = GeminiClient::from_env(global.provider)?;
    let key = args.source.key()?;
    let builder = index_builder(
        global,
        &db,
        client.embedding().clone(),
        CrawlerConfig::default(),
        args.chunks.config(),
    )?;
    let index = builder.build_or_load(&key).await?;

    let retriever = Retriever::new(client, args.retrieval.config());
    let answer = retriever.query(&index, &args.query).await?;
    let sources: Vec<String> = answer.sources.iter().map(|s| s.to_string()).collect();

    if args.format == "json" {
        let nodes: Vec<_> = answer
            .nodes
            .iter()
            .map(|hit| serde_json::json!({ "id": hit.node.id, "score": hit.score }))
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "answer": answer.text,
                "sources": sources,
                "nodes": nodes,
            }))?
        );
    } else {
        sitechat::format_markdown(&answer.text)?;
        if !sources.is_empty() {
            println!("\nSources: {}", sources.join(", "));
        }
    }
    Ok(())
}

#[instrument(skip(global))]
async fn ask_command(global: &GlobalArgs, args: AskArgs) -> anyhow::Result<()> {
    let db = open_database(&global.database).await?;
    let client = GeminiClient::from_env(global.provider)?;
    let catalog = Catalog::load(&args.catalog).await?;
    let builder = index_builder(
        global,
        &db,
        client.embedding().clone(),
        CrawlerConfig::default(),
        ProcessorConfig::default(),
    )?;
    let service = ChatService::new(
        db,
        catalog,
        builder,
        Retriever::new(client, args.retrieval.config()),
    );

    let response = service.ask(args.conversation, &args.query).await?;
    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        sitechat::format_markdown(&response.response)?;
        if let Some(sources) = response.sources.as_deref().filter(|s| !s.is_empty()) {
            println!("\nSources: {}", sources);
        }
        println!(
            "\nConversation {} ({:.2}s)",
            response.conversation_id, response.response_time
        );
    }
    Ok(())
}

#[instrument(skip(global))]
async fn list_command(global: &GlobalArgs, args: ListArgs) -> anyhow::Result<()> {
    let db = open_database(&global.database).await?;
    let domains = db.list_domains().await?;
    if domains.is_empty() {
        println!("No domains indexed yet");
        return Ok(());
    }

    for domain in domains {
        let (total, missing) = db.text_coverage(&domain.domain).await?;
        println!("{} ({} pages, {} without text)", domain.domain, total, missing);
        if args.details {
            println!("  Sitemap entries: {}", domain.sitemap.len());
            println!("  Time to index: {:.2}s", domain.time_to_index);
            if let Some(created) = chrono::DateTime::from_timestamp(domain.ts_created, 0) {
                println!("  First indexed: {}", created.format("%Y-%m-%d %H:%M:%S"));
            }
            let mut top: Vec<(&str, u64)> = domain.pagerank.iter().collect();
            top.sort_by(|a, b| b.1.cmp(&a.1));
            for (url, count) in top.into_iter().take(5) {
                println!("  {:>5}  {}", count, url);
            }
        }
    }
    Ok(())
}

#[instrument(skip(global))]
async fn batch_command(global: &GlobalArgs, args: BatchArgs) -> anyhow::Result<()> {
    let db = open_database(&global.database).await?;
    let client = GeminiClient::from_env(global.provider)?;
    let sites = read_site_list(&args.sites).await?;
    let builder = index_builder(
        global,
        &db,
        client.embedding().clone(),
        args.crawl.config(),
        ProcessorConfig::default(),
    )?;

    let progress_bar = ProgressBar::new(sites.len() as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("##-"),
    );

    let report = run_batch(
        &builder,
        &sites,
        Duration::from_secs(args.timeout),
        &args.report,
        |entry| {
            progress_bar.inc(1);
            progress_bar.set_message(format!("{}: {:?}", entry.site, entry.status));
        },
    )
    .await?;
    progress_bar.finish_with_message("Batch finished");

    let count = |wanted: fn(&BatchStatus) -> bool| {
        report.entries.iter().filter(|e| wanted(&e.status)).count()
    };
    println!(
        "Indexed: {}, timed out: {}, failed: {}",
        count(|s| matches!(s, BatchStatus::Indexed)),
        count(|s| matches!(s, BatchStatus::Timeout)),
        count(|s| matches!(s, BatchStatus::Failed(_))),
    );
    println!("Report written to {}", args.report.display());
    Ok(())
}
