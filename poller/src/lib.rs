pub mod config;
pub mod db;
pub mod errors;
pub mod fetcher;
pub mod metrics;
pub mod model;
pub mod notifier;
pub mod poll;
pub mod rest;
pub mod retry;
pub mod token;
pub mod validate;
pub mod writer;

#[cfg(test)]
pub(crate) mod test_support;
