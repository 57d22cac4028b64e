//! Sitemark CLI: convert single pages or run batch crawl jobs.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use sitemark::browser::ChromeBrowser;
use sitemark::cache::ConversionCache;
use sitemark::config::{init_tracing, Config};
use sitemark::jobs::{JobManager, SitemapFetcher};
use sitemark::metrics::PipelineMetrics;
use sitemark::pipeline::{rules, ConversionPipeline};
use sitemark::types::{ConversionOptions, JobSource, WebhookSpec};
use tracing::info;

#[derive(Parser)]
#[command(name = "sitemark")]
#[command(about = "Convert web pages into clean Markdown for LLM ingestion")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a single URL and print its Markdown document
    Convert {
        url: String,

        /// CSS selector isolating the content area (repeatable)
        #[arg(long = "select")]
        target_selectors: Vec<String>,

        /// CSS selector to remove from the page (repeatable)
        #[arg(long = "remove")]
        remove_selectors: Vec<String>,

        /// Skip the DOM cleaning pipeline
        #[arg(long)]
        raw: bool,

        /// Drop images from the output
        #[arg(long)]
        remove_images: bool,

        /// Bypass the cache for this request
        #[arg(long)]
        no_cache: bool,
    },

    /// Run a batch job over a sitemap or a list of URLs
    Crawl {
        /// Sitemap URL to enumerate
        #[arg(long, conflicts_with = "urls")]
        sitemap: Option<String>,

        /// URLs to convert
        urls: Vec<String>,

        /// Batch size override
        #[arg(long)]
        batch_size: Option<usize>,

        /// Concurrent conversions override
        #[arg(long)]
        max_concurrent: Option<usize>,

        /// Webhook URL receiving progress and completion payloads
        #[arg(long)]
        webhook: Option<String>,

        /// Send a progress webhook after every batch
        #[arg(long)]
        progress_updates: bool,
    },

    /// List the URLs a sitemap resolves to
    Sitemap { url: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config.logging);

    let cli = Cli::parse();
    match cli.command {
        Commands::Convert {
            url,
            target_selectors,
            remove_selectors,
            raw,
            remove_images,
            no_cache,
        } => {
            let pipeline = build_pipeline(&config).await?;
            let options = ConversionOptions {
                target_selectors,
                remove_selectors,
                aggressive_cleaning: !raw && config.pipeline.aggressive_cleaning,
                remove_images: remove_images || config.pipeline.remove_images,
                no_cache,
                ..pipeline.default_options()
            };

            let artifact = pipeline.convert(&url, &options).await?;
            println!("{}", artifact.document());
        }

        Commands::Crawl {
            sitemap,
            urls,
            batch_size,
            max_concurrent,
            webhook,
            progress_updates,
        } => {
            let source = match sitemap {
                Some(url) => JobSource::Sitemap { url },
                None => {
                    if urls.is_empty() {
                        anyhow::bail!("provide either --sitemap or at least one URL");
                    }
                    JobSource::Urls { urls }
                }
            };

            let pipeline = build_pipeline(&config).await?;
            let manager = JobManager::new(
                Arc::new(pipeline),
                config.jobs.clone(),
                &config.pipeline.user_agent,
            );

            let webhook_spec = webhook.map(|url| {
                let mut spec = WebhookSpec::new(url);
                spec.progress_updates = progress_updates;
                spec
            });
            let mut job_config =
                manager.build_config(source, default_job_options(&config), webhook_spec);
            if let Some(batch_size) = batch_size {
                job_config.batch_size = batch_size;
            }
            if let Some(max_concurrent) = max_concurrent {
                job_config.max_concurrent = max_concurrent;
            }

            let job_id = manager.create_job(job_config);
            println!("Job {} started", job_id);

            // Poll until the driver reaches a terminal state
            loop {
                tokio::time::sleep(Duration::from_millis(500)).await;
                let Some(snapshot) = manager.job_status(job_id) else {
                    anyhow::bail!("job disappeared from the table");
                };
                if snapshot.status.is_terminal() {
                    println!(
                        "Job {}: {} ({} ok, {} failed of {})",
                        job_id,
                        snapshot.status,
                        snapshot.counts.success,
                        snapshot.counts.failed,
                        snapshot.counts.total
                    );
                    if let Some(error) = snapshot.error {
                        println!("Error: {}", error);
                    }
                    break;
                }
                info!(
                    processed = snapshot.counts.processed,
                    total = snapshot.counts.total,
                    batch = snapshot.counts.current_batch,
                    "job progress"
                );
            }
        }

        Commands::Sitemap { url } => {
            let fetcher = SitemapFetcher::new(&config.pipeline.user_agent);
            let urls = fetcher.enumerate(&url).await?;
            for url in &urls {
                println!("{}", url);
            }
            info!(count = urls.len(), "sitemap enumerated");
        }
    }

    Ok(())
}

async fn build_pipeline(config: &Config) -> Result<ConversionPipeline> {
    let browser = ChromeBrowser::launch(&config.pipeline.user_agent).await?;
    let cache = ConversionCache::from_config(&config.cache).await;
    let rules = Arc::new(rules::RulesStore::load(
        config.pipeline.rules_path.as_deref(),
    ));
    Ok(ConversionPipeline::new(
        Arc::new(browser),
        Arc::new(cache),
        PipelineMetrics::shared(),
        config.pipeline.clone(),
        rules,
    ))
}

fn default_job_options(config: &Config) -> ConversionOptions {
    ConversionOptions {
        aggressive_cleaning: config.pipeline.aggressive_cleaning,
        remove_images: config.pipeline.remove_images,
        min_content_length: config.pipeline.min_content_length,
        scroll_wait_ms: config.pipeline.scroll_wait_ms,
        ..ConversionOptions::default()
    }
}
