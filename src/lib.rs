//! Marigold - A date-archived blogging engine
//!
//! This library provides the core functionality of the Marigold blog:
//! hierarchical categories, entries published on dates and sites, archive
//! navigation, themed HTML views and the administration of both.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod theme;
