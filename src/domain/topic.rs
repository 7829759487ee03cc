//! Subscription topics and stream types.
//!
//! A topic names one symbol/kind pair on the multiplexed stream
//! (`btcusdt@depth20@100ms`). The stream type is the dispatch key a
//! topic resolves to once the symbol and any cadence parameter are
//! stripped (`depth20`).

use std::collections::HashSet;
use std::fmt;

/// Delimiter between the symbol, the kind and any parameter segment.
pub const TOPIC_DELIMITER: char = '@';

/// Delimiter used to join topics into a combined-stream request.
pub const STREAM_JOIN_DELIMITER: &str = "/";

/// The fixed set of kinds subscribed for every configured symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// 1-minute candles.
    Kline1m,
    /// Aggregated trades.
    AggTrade,
    /// Best bid/ask quote.
    BookTicker,
    /// 20-level partial depth pushed every 100ms.
    Depth20At100ms,
}

impl StreamKind {
    /// Every kind, in the order topics are emitted per symbol.
    pub const ALL: [Self; 4] = [
        Self::Kline1m,
        Self::AggTrade,
        Self::BookTicker,
        Self::Depth20At100ms,
    ];

    /// Topic suffix including any parameter segment.
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Kline1m => "kline_1m",
            Self::AggTrade => "aggTrade",
            Self::BookTicker => "bookTicker",
            Self::Depth20At100ms => "depth20@100ms",
        }
    }

    /// Stream type frames of this kind are dispatched under.
    pub fn stream_type(self) -> StreamType {
        let suffix = self.suffix();
        let name = suffix
            .split(TOPIC_DELIMITER)
            .next()
            .unwrap_or(suffix);
        StreamType::new(name)
    }
}

/// Dispatch key for the handler registry (e.g. `aggTrade`, `depth20`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamType(String);

impl StreamType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Resolve the stream type of an envelope's `stream` value.
    ///
    /// Takes the second `@`-delimited segment, so the symbol prefix and
    /// any trailing parameter (`@100ms`) are dropped. Returns `None` when
    /// there is no second segment or it is empty.
    pub fn from_stream_name(stream: &str) -> Option<Self> {
        let mut parts = stream.split(TOPIC_DELIMITER);
        parts.next()?;
        let kind = parts.next()?;
        if kind.is_empty() {
            return None;
        }
        Some(Self::new(kind))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StreamType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<StreamKind> for StreamType {
    fn from(kind: StreamKind) -> Self {
        kind.stream_type()
    }
}

/// One symbol/kind subscription unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionTopic {
    /// Lowercased symbol.
    pub symbol: String,
    pub kind: StreamKind,
}

impl SubscriptionTopic {
    pub fn new(symbol: &str, kind: StreamKind) -> Self {
        Self {
            symbol: symbol.to_lowercase(),
            kind,
        }
    }
}

impl fmt::Display for SubscriptionTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.symbol, TOPIC_DELIMITER, self.kind.suffix())
    }
}

/// Build the ordered topic list for the configured symbols.
///
/// Symbol-major: all kinds of the first symbol, then the next symbol.
/// Symbols repeated case-insensitively keep only their first occurrence.
pub fn build_topics<S: AsRef<str>>(symbols: &[S]) -> Vec<SubscriptionTopic> {
    let mut seen = HashSet::with_capacity(symbols.len());
    let mut topics = Vec::with_capacity(symbols.len() * StreamKind::ALL.len());

    for symbol in symbols {
        let symbol = symbol.as_ref().trim().to_lowercase();
        if symbol.is_empty() || !seen.insert(symbol.clone()) {
            continue;
        }
        topics.extend(
            StreamKind::ALL
                .iter()
                .map(|kind| SubscriptionTopic::new(&symbol, *kind)),
        );
    }

    topics
}

/// Combined-stream URL: `<base>/stream?streams=<t1>/<t2>/...`.
pub fn subscription_url(base: &str, topics: &[SubscriptionTopic]) -> String {
    let streams = topics
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(STREAM_JOIN_DELIMITER);
    format!("{}/stream?streams={streams}", base.trim_end_matches('/'))
}
