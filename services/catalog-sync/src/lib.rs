//! catalog-sync - Katana 到 Luca/Koza 的只追加产品同步引擎

pub mod api;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod metrics;
pub mod service;
