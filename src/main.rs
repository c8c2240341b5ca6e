use clap::Parser;
use property_insights::config::Args;
use property_insights::espc::ListingPaginator;
use property_insights::simd::{ChromiumBrowser, IndexQueryClient, LaunchOptions};
use property_insights::{
    setup_or_checkpoint, CsvStore, HttpFetcher, Outputs, PipelineDriver, SqliteData,
};
use tracing::{info, warn};
use tracing_error::ErrorLayer;
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| {
                "debug,html5ever=error,selectors=error,hyper=warn,reqwest=info,sqlx=warn,chromiumoxide=warn".into()
            }),
        )
        .with(ErrorLayer::default())
        .init();

    let args = Args::parse();

    let mut outputs = Outputs::new().with(CsvStore::new(&args.output_dir)?);
    if let Some(name) = &args.sqlite {
        let sqlite = setup_or_checkpoint(SqliteData::new(name).await, &outputs).await?;
        outputs = outputs.with(sqlite);
    }

    let fetcher = setup_or_checkpoint(HttpFetcher::new(), &outputs).await?;
    let mut paginator =
        ListingPaginator::new(fetcher, args.constraints()).with_max_pages(args.max_pages);
    if let Some(workers) = args.workers {
        paginator = paginator.with_workers(workers);
    }

    let launch = ChromiumBrowser::launch(&LaunchOptions {
        window_size: args.window,
        headed: args.headed,
        executable: args.chrome.clone(),
    })
    .await;
    let browser = setup_or_checkpoint(launch, &outputs).await?;
    let client = IndexQueryClient::new(browser, args.query_config());

    let mut driver = PipelineDriver::new(paginator, client, outputs);
    let summary = driver.run().await;

    if let Err(e) = driver.into_client().into_browser().close().await {
        warn!("Unable to shut the browser down: {}", e);
    }

    let summary = summary?;
    match &summary.aborted {
        Some(reason) => warn!("Partial results written, run stopped early: {}", reason),
        None => info!("Results written to {}", args.output_dir.display()),
    }
    Ok(())
}
