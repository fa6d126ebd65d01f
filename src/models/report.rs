// Yearly ticket report

use serde::{Deserialize, Serialize};

pub const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Tickets issued in one month
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyTickets {
    pub month: String,
    pub tickets: u64,
}

/// One entry per calendar month, zero-filled where the server sent nothing
pub fn tickets_per_month(report: &[MonthlyTickets]) -> Vec<MonthlyTickets> {
    MONTHS
        .iter()
        .map(|month| {
            report
                .iter()
                .find(|m| m.month == *month)
                .cloned()
                .unwrap_or_else(|| MonthlyTickets {
                    month: month.to_string(),
                    tickets: 0,
                })
        })
        .collect()
}
