use crate::cli::{FetchArgs, GalleryArgs};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thumbfetch::config::Config;
use thumbfetch::decode::{DecodedImage, ImageCrateDecoder};
use thumbfetch::fetch::HttpFetcher;
use thumbfetch::gallery::{FlickrClient, SearchService};
use thumbfetch::observability::Metrics;
use thumbfetch::worker::{DownloadFailure, DownloadWorker};
use tokio::sync::mpsc;
use tracing::{info, warn};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub async fn gallery(config: &Config, args: GalleryArgs) -> Result<(), AnyError> {
    let search = FlickrClient::new(&config.gallery, &config.fetch)?;

    let items: Vec<_> = search
        .items_for(args.query.as_deref())
        .await?
        .into_iter()
        .take(args.limit)
        .collect();

    if items.is_empty() {
        info!(query = ?args.query, "No photos found");
        return Ok(());
    }

    let urls = items.iter().map(|item| item.url.clone()).collect();
    download_rows(config, urls, Duration::from_secs(args.wait_secs), |row, image| {
        let (width, height) = image.dimensions();
        println!("row {row}: {width}x{height} {}", items[row].caption);
    })
    .await
}

pub async fn fetch(config: &Config, args: FetchArgs) -> Result<(), AnyError> {
    download_rows(config, args.urls, Duration::from_secs(args.wait_secs), |row, image| {
        let (width, height) = image.dimensions();
        println!("row {row}: {width}x{height}");
    })
    .await
}

pub fn print_config(config: &Config) -> Result<(), AnyError> {
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

/// Submit one request per row and show each image as it is delivered.
///
/// Returns once every row was delivered or failed, the wait elapses, or a shutdown signal
/// arrives.
async fn download_rows<F>(
    config: &Config,
    urls: Vec<String>,
    wait: Duration,
    mut show: F,
) -> Result<(), AnyError>
where
    F: FnMut(usize, &DecodedImage),
{
    let metrics = Arc::new(Metrics::new());
    let (failed_tx, mut failed_rx) = mpsc::unbounded_channel();

    let (worker, mut dispatcher) = DownloadWorker::<usize>::builder()
        .fetcher(Arc::new(HttpFetcher::from_config(&config.fetch)?))
        .decoder(Arc::new(ImageCrateDecoder))
        .metrics(Arc::clone(&metrics))
        .on_error(Arc::new(move |failure: DownloadFailure<usize>| {
            let _ = failed_tx.send(failure.key);
        }))
        .build();

    worker.start()?;

    let rows = urls.len();
    for (row, url) in urls.into_iter().enumerate() {
        worker.submit(row, url)?;
    }

    let mut outstanding: HashSet<usize> = (0..rows).filter(|row| worker.is_pending(row)).collect();
    let deadline = tokio::time::sleep(wait);
    let shutdown = shutdown_signal();
    tokio::pin!(deadline, shutdown);

    while !outstanding.is_empty() {
        tokio::select! {
            Some(result) = dispatcher.recv() => {
                dispatcher.deliver(result, |row, image| {
                    outstanding.remove(&row);
                    show(row, &image);
                });
            }
            Some(row) = failed_rx.recv() => {
                outstanding.remove(&row);
            }
            _ = &mut deadline => {
                warn!(outstanding = outstanding.len(), "Timed out waiting for images");
                break;
            }
            _ = &mut shutdown => break,
        }
    }

    worker.clear_all();
    worker.stop();
    worker.join().await;

    let snapshot = metrics.snapshot();
    info!(
        delivered = snapshot.delivered,
        fetch_failed = snapshot.fetch_failed,
        decode_failed = snapshot.decode_failed,
        discarded = snapshot.discarded_stale + snapshot.discarded_stopped,
        "Download run finished"
    );

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
