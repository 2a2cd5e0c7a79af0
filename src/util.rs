pub mod retry;
pub mod validating_http_downloader;
