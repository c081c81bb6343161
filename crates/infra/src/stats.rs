use serde::{Deserialize, Serialize};

use atelier_core::Money;

/// Back-office dashboard figures for one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub year: i32,
    pub month: u32,
    /// Grand totals of paid, shipped and delivered orders created in the month.
    pub monthly_revenue: Money,
    pub settled_orders: usize,
    /// Products at or below their low-stock threshold.
    pub products_to_reorder: usize,
    /// Orders still awaiting payment, any month.
    pub draft_orders: usize,
}

impl DashboardStats {
    pub fn new(year: i32, month: u32) -> Self {
        Self {
            year,
            month,
            monthly_revenue: Money::ZERO,
            settled_orders: 0,
            products_to_reorder: 0,
            draft_orders: 0,
        }
    }

    pub(crate) fn record_sale(&mut self, grand_total: Money) {
        self.monthly_revenue += grand_total;
        self.settled_orders += 1;
    }
}
