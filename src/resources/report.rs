// Yearly ticket report

use crate::api::Gateway;
use crate::error::ClientError;
use crate::models::report::{tickets_per_month, MonthlyTickets};

/// Tickets per month for `year`, one entry per calendar month
pub async fn fetch_yearly(gateway: &Gateway, year: i32) -> Result<Vec<MonthlyTickets>, ClientError> {
    let url = gateway.endpoints().report_queues(year);
    let body = gateway.get(&url).await?.into_result()?;
    let reported: Vec<MonthlyTickets> = serde_json::from_value(body)?;
    tracing::debug!(year, months = reported.len(), "Report fetched");
    Ok(tickets_per_month(&reported))
}
