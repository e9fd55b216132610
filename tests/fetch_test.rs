use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use meli_proxy::{
    fetch_paid_orders, FetchWindow, OrderRecord, OrdersApi, OrdersPage, OrdersQuery, Paging,
    RetryPolicy, SellerId, ShipmentRecord, UpstreamError, PAGE_SIZE,
};

struct StubApi {
    pages: Mutex<Vec<OrdersPage>>,
    requests: AtomicU32,
    last_offset: AtomicU32,
}

impl StubApi {
    fn new(pages: Vec<OrdersPage>) -> Self {
        Self {
            pages: Mutex::new(pages),
            requests: AtomicU32::new(0),
            last_offset: AtomicU32::new(0),
        }
    }

    fn requests(&self) -> u32 {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrdersApi for StubApi {
    async fn search_orders(&self, query: &OrdersQuery) -> Result<OrdersPage, UpstreamError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.last_offset.store(query.offset, Ordering::SeqCst);
        let mut pages = self.pages.lock().unwrap();
        if pages.is_empty() {
            Ok(OrdersPage::default())
        } else {
            Ok(pages.remove(0))
        }
    }

    async fn get_shipment(&self, _shipment_id: i64) -> Result<ShipmentRecord, UpstreamError> {
        unimplemented!("not used by the fetcher")
    }
}

fn order(id: i64, date_created: Option<&str>) -> OrderRecord {
    OrderRecord {
        id: Some(id),
        date_created: date_created.map(str::to_string),
        ..OrderRecord::default()
    }
}

fn page_of(count: usize, date_created: &str) -> OrdersPage {
    OrdersPage {
        results: (0..count)
            .map(|i| order(i as i64, Some(date_created)))
            .collect(),
        paging: None,
    }
}

fn window() -> FetchWindow {
    FetchWindow {
        from: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        to: Utc.with_ymd_and_hms(2026, 1, 31, 0, 0, 0).unwrap(),
    }
}

fn seller() -> SellerId {
    SellerId("12345".to_string())
}

const IN_WINDOW: &str = "2026-01-15T12:00:00.000-04:00";

#[tokio::test]
async fn short_page_stops_without_extra_request() {
    let api = StubApi::new(vec![
        page_of(PAGE_SIZE as usize, IN_WINDOW),
        page_of(PAGE_SIZE as usize, IN_WINDOW),
        page_of(30, IN_WINDOW),
    ]);

    let orders = fetch_paid_orders(&api, &seller(), &window(), RetryPolicy::default())
        .await
        .unwrap();

    assert_eq!(orders.len(), 130);
    assert_eq!(api.requests(), 3);
    // The final request was issued at the sum of the previous page lengths.
    assert_eq!(api.last_offset.load(Ordering::SeqCst), 100);
}

#[tokio::test]
async fn empty_first_page_stops_immediately() {
    let api = StubApi::new(vec![OrdersPage::default()]);

    let orders = fetch_paid_orders(&api, &seller(), &window(), RetryPolicy::default())
        .await
        .unwrap();

    assert!(orders.is_empty());
    assert_eq!(api.requests(), 1);
}

#[tokio::test]
async fn out_of_window_items_are_dropped() {
    let api = StubApi::new(vec![OrdersPage {
        results: vec![
            order(1, Some(IN_WINDOW)),
            order(2, Some("2025-12-01T00:00:00.000-04:00")),
            order(3, Some("2026-02-10T00:00:00.000-04:00")),
        ],
        paging: None,
    }]);

    let orders = fetch_paid_orders(&api, &seller(), &window(), RetryPolicy::default())
        .await
        .unwrap();

    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].id, Some(1));
}

#[tokio::test]
async fn unparsable_or_missing_dates_are_dropped_not_errors() {
    let api = StubApi::new(vec![OrdersPage {
        results: vec![
            order(1, Some("not-a-date")),
            order(2, None),
            order(3, Some(IN_WINDOW)),
        ],
        paging: None,
    }]);

    let orders = fetch_paid_orders(&api, &seller(), &window(), RetryPolicy::default())
        .await
        .unwrap();

    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].id, Some(3));
}

#[tokio::test]
async fn reported_total_stops_pagination() {
    let mut first = page_of(PAGE_SIZE as usize, IN_WINDOW);
    first.paging = Some(Paging { total: Some(50) });
    let api = StubApi::new(vec![first, page_of(PAGE_SIZE as usize, IN_WINDOW)]);

    let orders = fetch_paid_orders(&api, &seller(), &window(), RetryPolicy::default())
        .await
        .unwrap();

    assert_eq!(orders.len(), 50);
    assert_eq!(api.requests(), 1);
}

#[tokio::test]
async fn scan_cap_stops_after_500_items() {
    // Twelve full pages on offer; the cap fires once 500 items were scanned.
    let pages = (0..12).map(|_| page_of(PAGE_SIZE as usize, IN_WINDOW)).collect();
    let api = StubApi::new(pages);

    let orders = fetch_paid_orders(&api, &seller(), &window(), RetryPolicy::default())
        .await
        .unwrap();

    assert_eq!(orders.len(), 500);
    assert_eq!(api.requests(), 10);
}
