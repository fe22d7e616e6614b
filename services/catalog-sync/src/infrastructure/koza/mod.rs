//! Luca / Koza 下游客户端

mod client;
mod dto;
mod response;

pub use client::{KozaClient, KozaSettings};
pub use response::ResponseClassifier;
