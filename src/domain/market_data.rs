//! Market data records decoded from the stream and persisted as JSON.
//!
//! Wire field names are kept on both sides of serde so a stored record
//! reads the same as the frame it came from. Prices and quantities are
//! exact decimals (strings on the wire), timestamps are epoch millis.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Candlestick event (`<symbol>@kline_<interval>`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E", with = "chrono::serde::ts_milliseconds")]
    pub event_time: DateTime<Utc>,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "k")]
    pub bar: KlineBar,
}

/// The candle carried inside a [`Kline`] event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KlineBar {
    #[serde(rename = "t", with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,
    #[serde(rename = "T", with = "chrono::serde::ts_milliseconds")]
    pub close_time: DateTime<Utc>,
    #[serde(rename = "s")]
    pub symbol: String,
    /// Interval label, e.g. `1m`. Part of the storage key.
    #[serde(rename = "i")]
    pub interval: String,
    #[serde(rename = "f")]
    pub first_trade_id: i64,
    #[serde(rename = "L")]
    pub last_trade_id: i64,
    #[serde(rename = "o")]
    pub open: Decimal,
    #[serde(rename = "c")]
    pub close: Decimal,
    #[serde(rename = "h")]
    pub high: Decimal,
    #[serde(rename = "l")]
    pub low: Decimal,
    #[serde(rename = "v")]
    pub volume: Decimal,
    #[serde(rename = "n")]
    pub trade_count: u64,
    /// Whether this bar is final.
    #[serde(rename = "x")]
    pub is_closed: bool,
    #[serde(rename = "q")]
    pub quote_volume: Decimal,
    #[serde(rename = "V")]
    pub taker_buy_volume: Decimal,
    #[serde(rename = "Q")]
    pub taker_buy_quote_volume: Decimal,
}

/// Aggregated trade (`<symbol>@aggTrade`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggTrade {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E", with = "chrono::serde::ts_milliseconds")]
    pub event_time: DateTime<Utc>,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "a")]
    pub agg_trade_id: u64,
    #[serde(rename = "p")]
    pub price: Decimal,
    #[serde(rename = "q")]
    pub quantity: Decimal,
    #[serde(rename = "f")]
    pub first_trade_id: u64,
    #[serde(rename = "l")]
    pub last_trade_id: u64,
    #[serde(rename = "T", with = "chrono::serde::ts_milliseconds")]
    pub trade_time: DateTime<Utc>,
    /// Buyer was the maker.
    #[serde(rename = "m")]
    pub is_buyer_maker: bool,
}

/// Best bid/ask quote (`<symbol>@bookTicker`).
///
/// Futures tickers carry event metadata; spot tickers do not, so those
/// fields are optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookTicker {
    #[serde(rename = "e", default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(rename = "u")]
    pub update_id: u64,
    #[serde(
        rename = "E",
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub event_time: Option<DateTime<Utc>>,
    #[serde(
        rename = "T",
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub transaction_time: Option<DateTime<Utc>>,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "b")]
    pub best_bid_price: Decimal,
    #[serde(rename = "B")]
    pub best_bid_qty: Decimal,
    #[serde(rename = "a")]
    pub best_ask_price: Decimal,
    #[serde(rename = "A")]
    pub best_ask_qty: Decimal,
}

/// `[price, quantity]` pair as sent on the depth stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct WireLevel(pub Decimal, pub Decimal);

/// Partial depth push (`<symbol>@depth20@100ms`) in wire form.
///
/// Futures wire form only. The symbol is required because it addresses
/// the stored book, and spot partial-depth payloads do not carry one.
#[derive(Debug, Clone, Deserialize)]
pub struct DepthEvent {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "E", default, with = "chrono::serde::ts_milliseconds_option")]
    pub event_time: Option<DateTime<Utc>>,
    #[serde(rename = "T", default, with = "chrono::serde::ts_milliseconds_option")]
    pub transaction_time: Option<DateTime<Utc>>,
    #[serde(rename = "u")]
    pub last_update_id: u64,
    #[serde(rename = "b")]
    pub bids: Vec<WireLevel>,
    #[serde(rename = "a")]
    pub asks: Vec<WireLevel>,
}

/// A single price level in a stored order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl From<WireLevel> for OrderBookLevel {
    fn from(level: WireLevel) -> Self {
        Self {
            price: level.0,
            quantity: level.1,
        }
    }
}

/// Latest order book snapshot for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    pub symbol: String,
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: u64,
    pub bids: Vec<OrderBookLevel>,
    pub asks: Vec<OrderBookLevel>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl OrderBook {
    /// Convert a depth push, keeping at most `max_levels` per side.
    ///
    /// The timestamp prefers the event time, then the transaction time,
    /// and falls back to the local clock when the push carries neither.
    pub fn from_depth(event: DepthEvent, max_levels: usize) -> Self {
        let timestamp = event
            .event_time
            .or(event.transaction_time)
            .unwrap_or_else(Utc::now);

        Self {
            symbol: event.symbol,
            last_update_id: event.last_update_id,
            bids: event
                .bids
                .into_iter()
                .take(max_levels)
                .map(OrderBookLevel::from)
                .collect(),
            asks: event
                .asks
                .into_iter()
                .take(max_levels)
                .map(OrderBookLevel::from)
                .collect(),
            timestamp,
        }
    }
}
