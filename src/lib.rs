//! linkmapper - resumable, polite web crawler that maps site link graphs.
//!
//! Pages discovered from a set of seed URLs are fetched, parsed, and
//! recorded in a single SQLite database that serves as both the work
//! queue and the results store, so an interrupted crawl resumes by
//! simply reopening the database.

pub mod cli;
pub mod config;
pub mod engine;
pub mod fetcher;
pub mod models;
pub mod parser;
pub mod processor;
pub mod rate_limit;
pub mod repository;
pub mod robots;
