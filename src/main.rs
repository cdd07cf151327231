use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use trawler::crawler::Crawler;
use trawler::settings::Settings;
use trawler_core::spider::BasicSpider;

#[derive(Parser)]
#[command(
    name = "trawler",
    about = "A cooperative web crawler",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl one or more start URLs
    #[command(name = "crawl")]
    Crawl {
        /// URLs to start crawling from
        #[arg(required = true)]
        urls: Vec<String>,

        /// Name for the spider
        #[arg(short, long, default_value = "trawler")]
        name: String,

        /// Restrict the crawl to these domains
        #[arg(short, long)]
        allowed_domains: Vec<String>,

        /// Settings file to use (TOML or JSON)
        #[arg(short, long)]
        settings: Option<String>,
    },

    /// Show version information
    #[command(name = "version")]
    Version,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Crawl {
            urls,
            name,
            allowed_domains,
            settings,
        } => {
            crawl(urls, &name, allowed_domains, settings.as_deref()).await;
        }
        Commands::Version => {
            println!("trawler {}", env!("CARGO_PKG_VERSION"));
        }
    }
}

async fn crawl(urls: Vec<String>, name: &str, allowed_domains: Vec<String>, settings: Option<&str>) {
    let settings = match settings {
        Some(path) => match Settings::from_file(path) {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("Error loading settings from {}: {}", path, e);
                process::exit(1);
            }
        },
        None => Settings::default(),
    };

    let crawler = match Crawler::from_settings(&settings) {
        Ok(crawler) => crawler,
        Err(e) => {
            eprintln!("Error creating crawler: {}", e);
            process::exit(1);
        }
    };

    let spider = Arc::new(BasicSpider::new(name, urls).with_allowed_domains(allowed_domains));

    match crawler.run(spider).await {
        Ok(stats) => {
            println!("\nCrawl completed!");
            println!("Requests scheduled: {}", stats.request_scheduled_count);
            println!("Responses: {}", stats.response_count);
            println!("Items: {}", stats.item_count);
            println!("Errors: {}", stats.error_count);
            if let Some(duration) = stats.duration() {
                println!("Duration: {:.2} seconds", duration.as_secs_f64());
            }
            println!("Requests per second: {:.2}", stats.requests_per_second());
        }
        Err(e) => {
            eprintln!("Error running crawler: {}", e);
            process::exit(1);
        }
    }
}
