pub mod config;
pub mod decode;
pub mod fetch;
pub mod gallery;
pub mod humanize;
pub mod observability;
pub mod worker;

pub use decode::{DecodedImage, ImageDecoder};
pub use fetch::ImageFetcher;
pub use worker::{DownloadWorker, ResultDispatcher, WorkerState};
