//! Katana 上游客户端

mod client;
mod dto;

pub use client::{KatanaClient, KatanaSettings, products_from_katana};
