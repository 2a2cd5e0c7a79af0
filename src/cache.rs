pub mod fetcher;
pub mod local_cache;
