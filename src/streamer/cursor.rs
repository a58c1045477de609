//! Traversal position over the origin store's change listing

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Oldest change first, used by the live tail
    Ascending,
    /// Newest change first, used by partition backfill
    Descending,
}

impl SortOrder {
    /// Value of the `order` query parameter
    pub fn as_query(&self) -> &'static str {
        match self {
            Self::Ascending => "asc:lastChanged",
            Self::Descending => "desc:lastChanged",
        }
    }
}

/// Watermark plus direction. Only ever moves in the direction of traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    order: SortOrder,
    /// Exclusive lower bound (ascending)
    from: Option<DateTime<Utc>>,
    /// Inclusive upper bound (descending)
    to: Option<DateTime<Utc>>,
    /// Inclusive lower bound (descending)
    floor: Option<DateTime<Utc>>,
}

impl Cursor {
    pub fn ascending(from: Option<DateTime<Utc>>) -> Self {
        Self {
            order: SortOrder::Ascending,
            from,
            to: None,
            floor: None,
        }
    }

    pub fn descending(to: Option<DateTime<Utc>>, floor: Option<DateTime<Utc>>) -> Self {
        Self {
            order: SortOrder::Descending,
            from: None,
            to,
            floor,
        }
    }

    pub fn order(&self) -> SortOrder {
        self.order
    }

    /// The moving watermark: `from` when ascending, `to` when descending
    pub fn position(&self) -> Option<DateTime<Utc>> {
        match self.order {
            SortOrder::Ascending => self.from,
            SortOrder::Descending => self.to,
        }
    }

    /// Fold one observed change into the cursor
    pub fn advance(&mut self, last_changed: DateTime<Utc>) {
        match self.order {
            SortOrder::Ascending => {
                self.from = Some(self.from.map_or(last_changed, |f| f.max(last_changed)));
            }
            SortOrder::Descending => {
                self.to = Some(self.to.map_or(last_changed, |t| t.min(last_changed)));
            }
        }
    }

    /// Whether a change at `ts` is still ahead of the cursor
    pub fn admits(&self, ts: DateTime<Utc>) -> bool {
        match self.order {
            SortOrder::Ascending => self.from.map_or(true, |from| ts > from),
            SortOrder::Descending => {
                self.to.map_or(true, |to| ts <= to) && self.floor.map_or(true, |floor| ts >= floor)
            }
        }
    }

    /// `lastChanged` filter values for a listing query
    pub fn filters(&self) -> Vec<String> {
        let mut filters = Vec::with_capacity(2);
        match self.order {
            SortOrder::Ascending => {
                if let Some(from) = self.from {
                    filters.push(format!("gt:{}", format_ts(from)));
                }
            }
            SortOrder::Descending => {
                if let Some(to) = self.to {
                    filters.push(format!("lte:{}", format_ts(to)));
                }
                if let Some(floor) = self.floor {
                    filters.push(format!("gte:{}", format_ts(floor)));
                }
            }
        }
        filters
    }
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
