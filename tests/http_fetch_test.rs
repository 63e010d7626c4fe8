//! HttpFetcher against an embedded axum server
//!
//! Run via: `cargo test --test http_fetch_test`

use axum::{Router, http::StatusCode, routing::get};
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;
use thumbfetch::decode::ImageCrateDecoder;
use thumbfetch::fetch::{FetchError, HttpFetcher, ImageFetcher, http::HttpConfig};
use thumbfetch::worker::{DeliveryOutcome, DownloadError, DownloadFailure, DownloadWorker};
use tokio::time::{Duration, timeout};

const SMALL_LIMIT: u64 = 1024;

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = DynamicImage::ImageRgba8(RgbaImage::new(width, height));
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Start the mock server and return its base url
async fn start_mock_server() -> String {
    let thumbnail = png_bytes(75, 50);

    let app = Router::new()
        .route("/hello.txt", get(|| async { "hello thumbnails" }))
        .route("/thumb.png", get(move || async move { thumbnail }))
        .route("/large.bin", get(|| async { vec![0u8; 4 * SMALL_LIMIT as usize] }))
        .route(
            "/garbage.png",
            get(|| async { "definitely not an image" }),
        )
        .route(
            "/broken.jpg",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );

    let addr = SocketAddr::from(([127, 0, 0, 1], 0));
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    let local = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", local)
}

fn fetcher(max_body_bytes: u64) -> HttpFetcher {
    HttpFetcher::new(HttpConfig {
        max_body_bytes,
        request_timeout: Duration::from_secs(5),
        ..HttpConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_fetch_body() {
    let base = start_mock_server().await;

    let bytes = fetcher(SMALL_LIMIT)
        .fetch_bytes(&format!("{base}/hello.txt"))
        .await
        .unwrap();

    assert_eq!(&bytes[..], b"hello thumbnails");
}

#[tokio::test]
async fn test_missing_resource_maps_to_status() {
    let base = start_mock_server().await;

    let err = fetcher(SMALL_LIMIT)
        .fetch_bytes(&format!("{base}/nope.jpg"))
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Status { code: 404, .. }));
}

#[tokio::test]
async fn test_server_error_maps_to_status() {
    let base = start_mock_server().await;

    let err = fetcher(SMALL_LIMIT)
        .fetch_bytes(&format!("{base}/broken.jpg"))
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Status { code: 500, .. }));
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let base = start_mock_server().await;

    let err = fetcher(SMALL_LIMIT)
        .fetch_bytes(&format!("{base}/large.bin"))
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::TooLarge { limit: SMALL_LIMIT }));
}

#[tokio::test]
async fn test_worker_downloads_real_thumbnail() {
    let base = start_mock_server().await;

    let (worker, mut dispatcher) = DownloadWorker::<usize>::builder()
        .fetcher(Arc::new(fetcher(1024 * 1024)))
        .decoder(Arc::new(ImageCrateDecoder))
        .build();
    worker.start().unwrap();

    worker.submit(0, format!("{base}/thumb.png")).unwrap();

    let result = timeout(Duration::from_secs(10), dispatcher.recv())
        .await
        .expect("no result arrived")
        .expect("worker exited");

    let mut dimensions = None;
    let outcome = dispatcher.deliver(result, |row, image| {
        dimensions = Some((row, image.dimensions()));
    });

    assert_eq!(outcome, DeliveryOutcome::Delivered);
    assert_eq!(dimensions, Some((0, (75, 50))));

    worker.stop();
    worker.join().await;
}

#[tokio::test]
async fn test_worker_reports_undecodable_body() {
    let base = start_mock_server().await;
    let (failed_tx, mut failed_rx) = tokio::sync::mpsc::unbounded_channel();

    let (worker, _dispatcher) = DownloadWorker::<usize>::builder()
        .fetcher(Arc::new(fetcher(SMALL_LIMIT)))
        .decoder(Arc::new(ImageCrateDecoder))
        .on_error(Arc::new(move |failure: DownloadFailure<usize>| {
            let _ = failed_tx.send(failure);
        }))
        .build();
    worker.start().unwrap();

    let url = format!("{base}/garbage.png");
    worker.submit(3, url.clone()).unwrap();

    let failure = timeout(Duration::from_secs(10), failed_rx.recv())
        .await
        .expect("no failure reported")
        .unwrap();

    assert_eq!(failure.key, 3);
    assert_eq!(failure.url, url);
    assert!(matches!(failure.error, DownloadError::Decode(_)));
    assert_eq!(worker.pending_url(&3), Some(url));
}
