//! Wire types for private account feeds, including paginated snapshots.

use crate::domain::Extra;
use crate::shared::serde_util::{timestamp_ms, timestamp_ms_opt};
use crate::shared::{Side, Topic};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ─── Incremental updates ─────────────────────────────────────────────────────

/// WS order update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WsOrder {
    #[serde(alias = "ordId")]
    pub order_id: String,
    #[serde(default, alias = "clOrdId")]
    pub client_order_id: Option<String>,
    #[serde(alias = "instId")]
    pub symbol: String,
    pub side: Side,
    #[serde(default, alias = "px")]
    pub price: Option<Decimal>,
    #[serde(alias = "sz")]
    pub size: Decimal,
    #[serde(default, alias = "accFillSz")]
    pub filled: Decimal,
    #[serde(alias = "state")]
    pub status: String,
    #[serde(with = "timestamp_ms", alias = "uTime")]
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// WS balance of one asset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WsBalance {
    #[serde(alias = "ccy")]
    pub asset: String,
    #[serde(alias = "eq")]
    pub total: Decimal,
    #[serde(alias = "availBal")]
    pub available: Decimal,
    #[serde(default, alias = "frozenBal")]
    pub locked: Decimal,
    #[serde(flatten)]
    pub extra: Extra,
}

/// WS position in one instrument.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WsPosition {
    #[serde(alias = "instId")]
    pub symbol: String,
    #[serde(default)]
    pub side: Option<Side>,
    #[serde(alias = "pos")]
    pub size: Decimal,
    #[serde(default, alias = "avgPx")]
    pub entry_price: Option<Decimal>,
    #[serde(default, alias = "upl")]
    pub unrealized_pnl: Option<Decimal>,
    #[serde(default, alias = "lever")]
    pub leverage: Option<Decimal>,
    #[serde(flatten)]
    pub extra: Extra,
}

// ─── Paginated snapshots ─────────────────────────────────────────────────────

/// One page of an account snapshot, as sent by the venue.
///
/// A page carries exactly one entity list. The summary fields are only
/// authoritative on the last page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WsSnapshotPage {
    #[serde(alias = "page_number", alias = "pageNum")]
    pub page: u32,
    #[serde(default, alias = "is_last_page", alias = "lastPage")]
    pub last: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balances: Option<Vec<WsBalance>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub positions: Option<Vec<WsPosition>>,
    #[serde(default, alias = "totalEq")]
    pub total_equity: Option<Decimal>,
    #[serde(default, alias = "availMargin")]
    pub available_margin: Option<Decimal>,
    #[serde(default, with = "timestamp_ms_opt", alias = "uTime")]
    pub update_time: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Entity list carried by a snapshot page. All pages of one sequence must agree.
#[derive(Debug, Clone, PartialEq)]
pub enum Entities {
    Balances(Vec<WsBalance>),
    Positions(Vec<WsPosition>),
}

impl Entities {
    pub fn kind(&self) -> &'static str {
        match self {
            Entities::Balances(_) => "balances",
            Entities::Positions(_) => "positions",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Entities::Balances(v) => v.len(),
            Entities::Positions(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn same_kind(&self, other: &Entities) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Append `other` to `self`. Returns `other` back when the kinds differ.
    pub fn extend(&mut self, other: Entities) -> Result<(), Entities> {
        match (self, other) {
            (Entities::Balances(a), Entities::Balances(b)) => {
                a.extend(b);
                Ok(())
            }
            (Entities::Positions(a), Entities::Positions(b)) => {
                a.extend(b);
                Ok(())
            }
            (_, other) => Err(other),
        }
    }
}

/// Account summary fields of a snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotSummary {
    pub total_equity: Option<Decimal>,
    pub available_margin: Option<Decimal>,
    pub update_time: Option<DateTime<Utc>>,
    pub extra: Extra,
}

/// A decoded snapshot page, ready for reassembly.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialUpdate {
    /// 1-based position of this page in its sequence.
    pub page_number: u32,
    pub is_last_page: bool,
    pub entities: Entities,
    pub summary: SnapshotSummary,
}

/// A complete snapshot: all pages' entities in ascending page order, with the
/// summary of the last page.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedUpdate {
    pub topic: Topic,
    pub page_count: u32,
    pub entities: Entities,
    pub summary: SnapshotSummary,
}

impl MergedUpdate {
    /// Treat a lone page as a complete snapshot (unpaginated subscriptions).
    pub fn single(topic: Topic, page: PartialUpdate) -> Self {
        Self {
            topic,
            page_count: 1,
            entities: page.entities,
            summary: page.summary,
        }
    }
}

impl TryFrom<WsSnapshotPage> for PartialUpdate {
    type Error = String;

    fn try_from(page: WsSnapshotPage) -> Result<Self, Self::Error> {
        if page.page == 0 {
            return Err("page numbers start at 1".to_string());
        }

        let entities = match (page.balances, page.positions) {
            (Some(b), None) => Entities::Balances(b),
            (None, Some(p)) => Entities::Positions(p),
            (Some(_), Some(_)) => {
                return Err(format!("page {} carries both balances and positions", page.page))
            }
            (None, None) => return Err(format!("page {} carries no entity list", page.page)),
        };

        Ok(PartialUpdate {
            page_number: page.page,
            is_last_page: page.last,
            entities,
            summary: SnapshotSummary {
                total_equity: page.total_equity,
                available_margin: page.available_margin,
                update_time: page.update_time,
                extra: page.extra,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_snapshot_page_balances() {
        let json = r#"{
            "page": 2,
            "last": true,
            "balances": [{"asset": "USDT", "total": "100", "available": "80"}],
            "total_equity": "1000.5",
            "update_time": 1700000000000,
            "accountLevel": 3
        }"#;
        let wire: WsSnapshotPage = serde_json::from_str(json).unwrap();
        let page = PartialUpdate::try_from(wire).unwrap();
        assert_eq!(page.page_number, 2);
        assert!(page.is_last_page);
        assert_eq!(page.entities.kind(), "balances");
        assert_eq!(page.entities.len(), 1);
        assert_eq!(page.summary.total_equity, Some(Decimal::from_str("1000.5").unwrap()));
        assert!(page.summary.update_time.is_some());
        assert!(page.summary.extra.contains_key("accountLevel"));
    }

    #[test]
    fn test_snapshot_page_string_update_time() {
        let json = r#"{"page":1,"last":true,"balances":[],"uTime":"1700000000000"}"#;
        let wire: WsSnapshotPage = serde_json::from_str(json).unwrap();
        let page = PartialUpdate::try_from(wire).unwrap();
        assert_eq!(
            page.summary.update_time.map(|t| t.timestamp_millis()),
            Some(1_700_000_000_000)
        );

        let numeric: WsSnapshotPage =
            serde_json::from_str(r#"{"page":1,"last":true,"balances":[],"uTime":1700000000000}"#)
                .unwrap();
        assert_eq!(numeric.update_time, page.summary.update_time);
    }

    #[test]
    fn test_snapshot_page_rejects_zero_and_mixed() {
        let zero: WsSnapshotPage =
            serde_json::from_str(r#"{"page":0,"positions":[]}"#).unwrap();
        assert!(PartialUpdate::try_from(zero).is_err());

        let mixed: WsSnapshotPage =
            serde_json::from_str(r#"{"page":1,"positions":[],"balances":[]}"#).unwrap();
        assert!(PartialUpdate::try_from(mixed).is_err());

        let empty: WsSnapshotPage = serde_json::from_str(r#"{"page":1}"#).unwrap();
        assert!(PartialUpdate::try_from(empty).is_err());
    }

    #[test]
    fn test_entities_extend_same_kind_only() {
        let mut a = Entities::Positions(vec![]);
        assert!(a.extend(Entities::Positions(vec![])).is_ok());
        let err = a.extend(Entities::Balances(vec![]));
        assert!(matches!(err, Err(Entities::Balances(_))));
    }
}
