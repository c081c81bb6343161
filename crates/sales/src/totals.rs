//! Order totals: line sums, shipping, discounts and tax.
//!
//! Pure function of the order and the pricing facts handed in. Nothing here
//! mutates state, so totals can be recomputed for display as often as needed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_catalog::incl_from_excl;
use atelier_core::{Money, Percentage};

use crate::credit_note::CreditNote;
use crate::line::OrderLine;
use crate::order::{Order, SettledDiscounts};
use crate::promotion::{LineDiscount, Promotion, automatic_line_discounts, coded_discount};

/// Facts needed to price an order that the order itself only references.
#[derive(Debug, Clone, Copy)]
pub struct PricingContext<'a> {
    /// Every known promotion. Automatic ones apply per line; the coded one is
    /// picked by the id the order carries. Unused once the order is settled.
    pub promotions: &'a [Promotion],
    /// Ignored unless it is the note attached to the order and not yet spent.
    pub credit_note: Option<&'a CreditNote>,
    pub now: DateTime<Utc>,
    pub default_shipping_tax_rate: Percentage,
}

/// How the grand total was reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalsBreakdown {
    pub lines_excl_tax: Money,
    pub lines_incl_tax: Money,
    pub shipping_excl_tax: Money,
    pub shipping_incl_tax: Money,
    pub line_discounts: Vec<LineDiscount>,
    pub automatic_discount: Money,
    pub coded_discount: Money,
    pub credit_note_discount: Money,
}

impl TotalsBreakdown {
    pub fn promotion_discount(&self) -> Money {
        self.automatic_discount + self.coded_discount
    }

    pub fn total_discount(&self) -> Money {
        self.promotion_discount() + self.credit_note_discount
    }
}

/// Totals as consumed by invoice rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub total_excl_tax: Money,
    pub total_tax: Money,
    pub grand_total_incl_tax: Money,
    pub breakdown: TotalsBreakdown,
}

impl OrderTotals {
    pub fn discount_amount(&self) -> Money {
        self.breakdown.total_discount()
    }

    /// Promotion discounts as they stand, for freezing at settlement.
    pub fn settled_discounts(&self) -> SettledDiscounts {
        SettledDiscounts {
            line_discounts: self.breakdown.line_discounts.clone(),
            automatic: self.breakdown.automatic_discount,
            coded: self.breakdown.coded_discount,
        }
    }
}

/// Compute the totals of `order`.
///
/// Each line is rounded before summation. Discounts apply in a fixed order
/// (automatic, coded, credit note) and never push the grand total below zero.
pub fn compute_totals(order: &Order, ctx: &PricingContext<'_>) -> OrderTotals {
    let lines = order.lines();
    let lines_incl_tax: Money = lines.iter().map(OrderLine::total_incl_tax).sum();
    let lines_excl_tax: Money = lines.iter().map(OrderLine::total_excl_tax).sum();

    let shipping = order.shipping();
    let shipping_rate = shipping.tax_rate.unwrap_or(ctx.default_shipping_tax_rate);
    let shipping_excl_tax = shipping.cost_for(lines_incl_tax);
    let shipping_incl_tax = incl_from_excl(shipping_excl_tax, shipping_rate);

    let payable = lines_incl_tax + shipping_incl_tax;

    // A settled order keeps the promotions it was sold with.
    let (line_discounts, automatic_raw, coded_raw) = match order.settled_discounts() {
        Some(settled) => (settled.line_discounts.clone(), settled.automatic, settled.coded),
        None => {
            let line_discounts = automatic_line_discounts(ctx.promotions, lines, ctx.now);
            let automatic: Money = line_discounts.iter().map(|d| d.amount).sum();
            let coded = order
                .applied_promotion()
                .and_then(|id| ctx.promotions.iter().find(|p| p.id == id))
                .map(|promotion| coded_discount(promotion, lines, ctx.now))
                .unwrap_or(Money::ZERO);
            (line_discounts, automatic, coded)
        }
    };
    let automatic_discount = automatic_raw.min(payable);
    let coded_discount = coded_raw.min(payable - automatic_discount);

    let remaining = payable - automatic_discount - coded_discount;
    // Once spent, the note is marked used; the order keeps what it drew.
    let credit_raw = match order.credit_note_spent() {
        Some(spent) => spent,
        None => ctx
            .credit_note
            .filter(|note| order.applied_credit_note() == Some(note.id))
            .map(|note| note.available_amount(ctx.now))
            .unwrap_or(Money::ZERO),
    };
    let credit_note_discount = credit_raw.min(remaining);

    let grand_total_incl_tax =
        (payable - automatic_discount - coded_discount - credit_note_discount)
            .non_negative()
            .round2();
    let total_excl_tax = (lines_excl_tax + shipping_excl_tax).round2();
    let total_tax = (grand_total_incl_tax - total_excl_tax).round2();

    tracing::debug!(
        order_id = %order.id_typed(),
        grand_total = %grand_total_incl_tax,
        automatic = %automatic_discount,
        coded = %coded_discount,
        credit = %credit_note_discount,
        "order totals computed"
    );

    OrderTotals {
        total_excl_tax,
        total_tax,
        grand_total_incl_tax,
        breakdown: TotalsBreakdown {
            lines_excl_tax,
            lines_incl_tax,
            shipping_excl_tax,
            shipping_incl_tax,
            line_discounts,
            automatic_discount,
            coded_discount,
            credit_note_discount,
        },
    }
}
