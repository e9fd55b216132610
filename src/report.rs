use tracing::warn;

use crate::backoff::{with_backoff, RetryPolicy};
use crate::error::UpstreamError;
use crate::types::{OrderRecord, ReportRow};
use crate::upstream::OrdersApi;

/// Join each order with its shipment and keep the unshipped ones.
///
/// Per order: no shipment reference means skip; a shipment lookup that
/// fails with 404 is logged and skipped without failing the batch; any
/// other failure aborts the whole report. The shipment status is matched
/// case-insensitively against `allowed_statuses`.
pub async fn build_report(
    api: &impl OrdersApi,
    orders: &[OrderRecord],
    allowed_statuses: &[String],
    policy: RetryPolicy,
) -> Result<Vec<ReportRow>, UpstreamError> {
    let allowed: Vec<String> = allowed_statuses
        .iter()
        .map(|status| status.to_lowercase())
        .collect();

    let mut rows = Vec::new();
    for order in orders {
        let Some(shipment_id) = order.shipping.as_ref().and_then(|shipping| shipping.id) else {
            continue;
        };

        let shipment = match with_backoff(policy, |_attempt| api.get_shipment(shipment_id)).await {
            Ok(shipment) => shipment,
            Err(err) if err.is_not_found() => {
                warn!(shipment_id, "shipment not found");
                continue;
            }
            Err(err) => return Err(err),
        };

        if !is_unshipped(shipment.status.as_deref(), &allowed) {
            continue;
        }

        rows.push(ReportRow::project(order, &shipment, shipment_id));
    }

    Ok(rows)
}

/// Case-insensitive membership check. A missing status, or an empty
/// allow-list, never matches.
fn is_unshipped(status: Option<&str>, allowed_lowercase: &[String]) -> bool {
    match status {
        Some(status) => allowed_lowercase
            .iter()
            .any(|allowed| allowed == &status.to_lowercase()),
        None => false,
    }
}
