use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Marketplace order identifier carried by webhook notifications.
///
/// This is a strongly-typed wrapper to avoid accidental mixing
/// of order ids with other string identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

/// Marketplace seller identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SellerId(pub String);

/// A buffered order notification.
///
/// Only `orders_v2` notifications that carry both identifiers are ever
/// stored, so both ids are mandatory here. Events are immutable once
/// buffered; they leave the buffer through eviction, consume, or clear.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub ts: DateTime<Utc>,
    pub topic: String,
    pub seller_id: SellerId,
    pub order_id: OrderId,
}

impl WebhookEvent {
    pub fn new(order_id: impl Into<String>, seller_id: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            topic: "orders_v2".to_string(),
            seller_id: SellerId(seller_id.into()),
            order_id: OrderId(order_id.into()),
        }
    }

    /// Projection returned by the listing and consume endpoints.
    pub fn row(&self) -> EventRow {
        EventRow {
            order_id: self.order_id.clone(),
            seller_id: self.seller_id.clone(),
            ts: self.ts,
        }
    }
}

/// Wire shape of a buffered event: `{order_id, seller_id, ts}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRow {
    pub order_id: OrderId,
    pub seller_id: SellerId,
    pub ts: DateTime<Utc>,
}

/// Report window, resolved once per report request.
///
/// Invariant: `from <= to`. Both bounds are kept in UTC; the configured
/// service timezone only matters while parsing the caller-supplied strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl FetchWindow {
    /// Resolve the window from optional `from`/`to` query strings.
    ///
    /// Missing bounds are filled from `lookback_hours`: no bounds means
    /// `[now - lookback, now]`, a lone `from` extends forward, a lone `to`
    /// extends backward. An inverted range is an error.
    pub fn resolve(
        from: Option<&str>,
        to: Option<&str>,
        tz: Tz,
        lookback_hours: i64,
    ) -> Result<Self, String> {
        let lookback = chrono::Duration::hours(lookback_hours);

        let from_date = from
            .map(|raw| parse_in_tz(raw, tz).ok_or_else(|| "Invalid from parameter".to_string()))
            .transpose()?;
        let to_date = to
            .map(|raw| parse_in_tz(raw, tz).ok_or_else(|| "Invalid to parameter".to_string()))
            .transpose()?;

        let (from, to) = match (from_date, to_date) {
            (Some(f), Some(t)) => (f, t),
            (Some(f), None) => (f, f + lookback),
            (None, Some(t)) => (t - lookback, t),
            (None, None) => {
                let now = Utc::now();
                (now - lookback, now)
            }
        };

        if from > to {
            return Err("`from` must be earlier than `to`".to_string());
        }

        Ok(Self { from, to })
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.from && instant <= self.to
    }
}

/// Parse an ISO-ish date string in the service timezone.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM[:SS]` (with space or `T`), and a
/// bare `YYYY-MM-DD` taken as midnight.
fn parse_in_tz(raw: &str, tz: Tz) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    const FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    for format in FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return tz
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let naive = date.and_hms_opt(0, 0, 0)?;
        return tz
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc));
    }

    None
}

/// `/users/me` projection. Only the numeric seller id is needed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub id: Option<i64>,
}

/// One page of `/orders/search` results.
///
/// Every upstream field is optional: the response is untrusted, partially
/// typed input, and a missing nested path must default to `None` rather
/// than fail deserialization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrdersPage {
    #[serde(default)]
    pub results: Vec<OrderRecord>,
    #[serde(default)]
    pub paging: Option<Paging>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Paging {
    #[serde(default)]
    pub total: Option<u64>,
}

/// Read-only projection of an upstream order. Never mutated locally.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderRecord {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub date_created: Option<String>,
    #[serde(default)]
    pub buyer: Option<Buyer>,
    #[serde(default)]
    pub shipping: Option<ShippingRef>,
    #[serde(default)]
    pub order_items: Vec<OrderItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Buyer {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub nickname: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShippingRef {
    #[serde(default)]
    pub id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderItem {
    #[serde(default)]
    pub item: Option<ItemRef>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub unit_price: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemRef {
    #[serde(default)]
    pub title: Option<String>,
}

/// Read-only projection of an upstream shipment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShipmentRecord {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
}

/// One row of the unshipped-orders report. Request-scoped; absent
/// upstream fields surface as `null`, never as an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRow {
    pub order_id: Option<i64>,
    pub date_created: Option<String>,
    pub buyer: ReportBuyer,
    pub title: Option<String>,
    pub quantity: Option<i64>,
    pub unit_price: Option<f64>,
    pub shipment_id: Option<i64>,
    pub shipment_status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportBuyer {
    pub id: Option<i64>,
    pub nickname: Option<String>,
}

impl ReportRow {
    /// Project a report row from an order and its shipment, taking the
    /// first line item as representative.
    pub fn project(order: &OrderRecord, shipment: &ShipmentRecord, shipment_id: i64) -> Self {
        let primary_item = order.order_items.first();
        Self {
            order_id: order.id,
            date_created: order.date_created.clone(),
            buyer: ReportBuyer {
                id: order.buyer.as_ref().and_then(|b| b.id),
                nickname: order.buyer.as_ref().and_then(|b| b.nickname.clone()),
            },
            title: primary_item
                .and_then(|i| i.item.as_ref())
                .and_then(|i| i.title.clone()),
            quantity: primary_item.and_then(|i| i.quantity),
            unit_price: primary_item.and_then(|i| i.unit_price),
            shipment_id: shipment.id.or(Some(shipment_id)),
            shipment_status: shipment.status.clone(),
        }
    }
}
