use chrono::{DateTime, Utc};
use tracing::warn;

use crate::backoff::{with_backoff, RetryPolicy};
use crate::error::UpstreamError;
use crate::types::{FetchWindow, OrderRecord, SellerId};
use crate::upstream::{OrdersApi, OrdersQuery};

/// Requested page size for `/orders/search`.
pub const PAGE_SIZE: u32 = 50;

/// Hard cap on scanned items per report request. Hitting it stops
/// pagination with a warning, not an error.
pub const SCAN_CAP: u32 = 500;

/// Fetch all paid orders for `seller` inside `window`, newest first.
///
/// Each page request goes through the retry executor. Every returned
/// order is re-validated against the window locally; the upstream date
/// filter is not trusted on its own, and items with a missing or
/// unparsable creation date are dropped as out-of-window.
///
/// Pagination stops on an empty page, a short page, the upstream's
/// reported total, or the scan cap — whichever comes first. The offset
/// advances by the actual page length, never the requested size.
pub async fn fetch_paid_orders(
    api: &impl OrdersApi,
    seller: &SellerId,
    window: &FetchWindow,
    policy: RetryPolicy,
) -> Result<Vec<OrderRecord>, UpstreamError> {
    let mut offset = 0u32;
    let mut orders = Vec::new();

    loop {
        let query = OrdersQuery {
            seller: seller.clone(),
            status: "paid".to_string(),
            sort: "date_desc".to_string(),
            limit: PAGE_SIZE,
            offset,
            from: window.from.to_rfc3339(),
            to: window.to.to_rfc3339(),
        };

        let page = with_backoff(policy, |_attempt| api.search_orders(&query)).await?;

        let page_len = page.results.len() as u32;
        if page_len == 0 {
            break;
        }

        for order in page.results {
            if created_within(&order, window) {
                orders.push(order);
            }
        }

        if page_len < PAGE_SIZE {
            break;
        }

        offset += page_len;

        if let Some(total) = page.paging.as_ref().and_then(|paging| paging.total) {
            if u64::from(offset) >= total {
                break;
            }
        }

        if offset >= SCAN_CAP {
            warn!(offset, "stopping pagination after scanning {SCAN_CAP} orders");
            break;
        }
    }

    Ok(orders)
}

fn created_within(order: &OrderRecord, window: &FetchWindow) -> bool {
    let Some(raw) = order.date_created.as_deref() else {
        return false;
    };
    match DateTime::parse_from_rfc3339(raw) {
        Ok(created) => window.contains(created.with_timezone(&Utc)),
        Err(_) => false,
    }
}
