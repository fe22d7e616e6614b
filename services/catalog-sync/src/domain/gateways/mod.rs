//! 外部系统网关接口

mod downstream;
mod source;
mod stock_card;

pub use downstream::{
    DownstreamError, DownstreamGateway, DownstreamRecord, DownstreamResult, DownstreamSession,
};
pub use source::SourceGateway;
pub use stock_card::{PayloadDefaults, StockCardPayload};
