use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use section_scraper::api::{self, AppState};
use section_scraper::{AdaptiveScraper, HttpFetcher, ScraperConfig, WebDriverLauncher};

#[derive(Parser)]
#[command(name = "section-scraper")]
#[command(about = "Turn any web page into a normalized, section-aware document")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service
    Serve {
        /// Bind address (falls back to $HOST, then 127.0.0.1)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (falls back to $PORT, then 8080)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Scrape one URL and print the JSON response
    Scrape {
        url: String,

        /// Write the response to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        pretty: bool,
    },
}

#[actix_web::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = Cli::parse();
    let config = Arc::new(load_config(cli.config.as_deref())?);

    match cli.command {
        Command::Serve { host, port } => serve(config, host, port).await,
        Command::Scrape {
            url,
            output,
            pretty,
        } => scrape_once(config, &url, output.as_deref(), pretty).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<ScraperConfig> {
    let config = match path {
        Some(path) => ScraperConfig::from_file(path)?,
        None => ScraperConfig::default(),
    };
    Ok(config.with_env_overrides())
}

fn build_scraper(
    config: Arc<ScraperConfig>,
) -> Result<AdaptiveScraper<HttpFetcher, WebDriverLauncher>> {
    AdaptiveScraper::from_config(config).context("Failed to create scraper")
}

async fn serve(config: Arc<ScraperConfig>, host: Option<String>, port: Option<u16>) -> Result<()> {
    let host = host
        .or_else(|| std::env::var("HOST").ok())
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let port = match port {
        Some(port) => port,
        None => std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?,
    };

    let state = web::Data::new(AppState {
        scraper: build_scraper(config.clone())?,
    });

    log::info!("Starting section scraper");
    log::info!("Server running at http://{}:{}", host, port);
    log::info!("Dynamic sessions via WebDriver at {}", config.webdriver_url);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .wrap(cors)
            .configure(api::configure::<HttpFetcher, WebDriverLauncher>)
    })
    .bind((host.as_str(), port))
    .with_context(|| format!("Failed to bind {}:{}", host, port))?
    .run()
    .await
    .context("Server error")
}

async fn scrape_once(
    config: Arc<ScraperConfig>,
    url: &str,
    output: Option<&Path>,
    pretty: bool,
) -> Result<()> {
    let scraper = build_scraper(config)?;
    let response = scraper
        .scrape(url)
        .await
        .with_context(|| format!("Failed to scrape {}", url))?;

    let json = if pretty {
        serde_json::to_string_pretty(&response)?
    } else {
        serde_json::to_string(&response)?
    };

    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            log::info!(
                "Wrote {} section(s) to {}",
                response.result.sections.len(),
                path.display()
            );
        }
        None => println!("{}", json),
    }
    Ok(())
}
