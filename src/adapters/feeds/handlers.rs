//! Market Data Handlers - Payload Decode and Persist
//!
//! One handler per stream type. Each decodes its payload into the typed
//! record and hands it to the [`MarketRepository`], which owns the key
//! layout and retention rules.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use super::registry::{FrameHandler, HandlerError, HandlerRegistry};
use crate::adapters::persistence::MarketRepository;
use crate::domain::market_data::{AggTrade, BookTicker, DepthEvent, Kline, OrderBook};
use crate::domain::topic::{StreamKind, StreamType};

/// Event name carried by direct-format candle frames.
pub const DIRECT_KLINE_EVENT: &str = "kline";

/// Event name carried by direct-format depth frames.
pub const DIRECT_DEPTH_EVENT: &str = "depthUpdate";

/// Persists 1-minute candles into the bounded kline list.
pub struct KlineHandler {
    repo: Arc<MarketRepository>,
}

impl KlineHandler {
    pub const fn new(repo: Arc<MarketRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl FrameHandler for KlineHandler {
    async fn handle(&self, payload: &[u8]) -> Result<(), HandlerError> {
        let kline: Kline = serde_json::from_slice(payload)?;
        trace!(
            symbol = %kline.symbol,
            interval = %kline.bar.interval,
            closed = kline.bar.is_closed,
            "Kline received"
        );
        self.repo.store_kline(&kline).await?;
        Ok(())
    }
}

/// Persists aggregated trades into the bounded trade list.
pub struct AggTradeHandler {
    repo: Arc<MarketRepository>,
}

impl AggTradeHandler {
    pub const fn new(repo: Arc<MarketRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl FrameHandler for AggTradeHandler {
    async fn handle(&self, payload: &[u8]) -> Result<(), HandlerError> {
        let trade: AggTrade = serde_json::from_slice(payload)?;
        trace!(symbol = %trade.symbol, id = trade.agg_trade_id, price = %trade.price, "Trade received");
        self.repo.store_trade(&trade).await?;
        Ok(())
    }
}

/// Overwrites the short-lived best bid/ask value.
pub struct BookTickerHandler {
    repo: Arc<MarketRepository>,
}

impl BookTickerHandler {
    pub const fn new(repo: Arc<MarketRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl FrameHandler for BookTickerHandler {
    async fn handle(&self, payload: &[u8]) -> Result<(), HandlerError> {
        let ticker: BookTicker = serde_json::from_slice(payload)?;
        self.repo.store_book_ticker(&ticker).await?;
        Ok(())
    }
}

/// Converts partial depth pushes into the stored order book snapshot.
pub struct DepthHandler {
    repo: Arc<MarketRepository>,
}

impl DepthHandler {
    pub const fn new(repo: Arc<MarketRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl FrameHandler for DepthHandler {
    async fn handle(&self, payload: &[u8]) -> Result<(), HandlerError> {
        let event: DepthEvent = serde_json::from_slice(payload)?;
        let book = OrderBook::from_depth(event, self.repo.order_book_levels());
        trace!(
            symbol = %book.symbol,
            bids = book.bids.len(),
            asks = book.asks.len(),
            "Order book received"
        );
        self.repo.store_order_book(&book).await?;
        Ok(())
    }
}

/// Register the four market handlers.
///
/// Each handler is keyed by the stream type of its subscribed kind. Candle
/// and depth handlers are additionally keyed by their direct-format event
/// names, which differ from the topic-derived stream types.
pub fn register_market_handlers(registry: &mut HandlerRegistry, repo: Arc<MarketRepository>) {
    let kline: Arc<dyn FrameHandler> = Arc::new(KlineHandler::new(Arc::clone(&repo)));
    let depth: Arc<dyn FrameHandler> = Arc::new(DepthHandler::new(Arc::clone(&repo)));

    registry.register(StreamKind::Kline1m, Arc::clone(&kline));
    registry.register(StreamType::new(DIRECT_KLINE_EVENT), kline);
    registry.register(
        StreamKind::AggTrade,
        Arc::new(AggTradeHandler::new(Arc::clone(&repo))),
    );
    registry.register(StreamKind::BookTicker, Arc::new(BookTickerHandler::new(repo)));
    registry.register(StreamKind::Depth20At100ms, Arc::clone(&depth));
    registry.register(StreamType::new(DIRECT_DEPTH_EVENT), depth);
}
