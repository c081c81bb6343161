//! Promotions: validity windows, product targeting and discount amounts.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::{AggregateId, DomainError, DomainResult, Entity, Money, Percentage, domain_id};

use crate::line::{OrderLine, ProductRef};

domain_id!(
    /// Promotion identifier. Ordering doubles as automatic-promotion precedence.
    PromotionId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromotionKind {
    /// Needs a customer-entered code.
    Code,
    BrandOffer,
    StoreWide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Discount {
    Percent(Percentage),
    /// Per unit on automatic promotions, once per order on coded ones.
    Fixed(Money),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Product,
    Brand,
    Category,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RuleTarget {
    pub kind: TargetKind,
    pub id: AggregateId,
}

impl RuleTarget {
    fn hits(&self, product: &ProductRef) -> bool {
        match self.kind {
            TargetKind::Product => product.product_id.0 == self.id,
            TargetKind::Category => product.category_id.0 == self.id,
            TargetKind::Brand => product.brand_id.is_some_and(|b| b.0 == self.id),
        }
    }
}

/// Targets and exclusions of a promotion. No targets means store-wide.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PromotionRule {
    pub targets: BTreeSet<RuleTarget>,
    pub exclusions: BTreeSet<RuleTarget>,
}

impl PromotionRule {
    pub fn target(mut self, kind: TargetKind, id: AggregateId) -> Self {
        self.targets.insert(RuleTarget { kind, id });
        self
    }

    pub fn exclude(mut self, kind: TargetKind, id: AggregateId) -> Self {
        self.exclusions.insert(RuleTarget { kind, id });
        self
    }

    pub fn matches(&self, product: &ProductRef) -> bool {
        if self.exclusions.iter().any(|t| t.hits(product)) {
            return false;
        }
        self.targets.is_empty() || self.targets.iter().any(|t| t.hits(product))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    pub id: PromotionId,
    pub name: String,
    pub kind: PromotionKind,
    pub code: Option<String>,
    pub discount: Discount,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub active: bool,
    pub rule: PromotionRule,
}

impl Promotion {
    /// Code-less promotion applied per line without customer action.
    pub fn automatic(
        name: impl Into<String>,
        kind: PromotionKind,
        discount: Discount,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if kind == PromotionKind::Code {
            return Err(DomainError::validation("code promotions need a code"));
        }
        Self::build(name.into(), kind, None, discount, starts_at, ends_at)
    }

    /// Promotion unlocked by a customer-entered code, applied once per order.
    pub fn coded(
        name: impl Into<String>,
        code: impl Into<String>,
        discount: Discount,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let code = normalize_code(&code.into());
        if code.is_empty() {
            return Err(DomainError::validation("promotion code cannot be empty"));
        }
        Self::build(name.into(), PromotionKind::Code, Some(code), discount, starts_at, ends_at)
    }

    fn build(
        name: String,
        kind: PromotionKind,
        code: Option<String>,
        discount: Discount,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if starts_at > ends_at {
            return Err(DomainError::validation("promotion ends before it starts"));
        }
        match discount {
            Discount::Percent(pct) if pct.value() > rust_decimal::Decimal::ONE_HUNDRED => {
                return Err(DomainError::validation("percent discount cannot exceed 100"));
            }
            Discount::Fixed(amount) => {
                amount.ensure_non_negative("fixed discount")?;
            }
            Discount::Percent(_) => {}
        }
        Ok(Self {
            id: PromotionId::generate(),
            name,
            kind,
            code,
            discount,
            starts_at,
            ends_at,
            active: true,
            rule: PromotionRule::default(),
        })
    }

    pub fn with_rule(mut self, rule: PromotionRule) -> Self {
        self.rule = rule;
        self
    }

    pub fn is_automatic(&self) -> bool {
        self.code.is_none()
    }

    /// Evaluated at use time, never at creation time.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.active && self.starts_at <= now && now <= self.ends_at
    }

    pub fn is_applicable(&self, product: &ProductRef) -> bool {
        self.rule.matches(product)
    }

    /// Discount on one line, never more than the line itself.
    pub fn discount_for_line(&self, line: &OrderLine) -> Money {
        let total = line.total_incl_tax();
        let raw = match self.discount {
            Discount::Percent(pct) => total.percent_of(pct),
            Discount::Fixed(per_unit) => per_unit.times(line.quantity).round2(),
        };
        raw.min(total)
    }

    /// Discount on a subtotal (coded promotions).
    pub fn discount_for_subtotal(&self, subtotal: Money) -> Money {
        let raw = match self.discount {
            Discount::Percent(pct) => subtotal.percent_of(pct),
            Discount::Fixed(amount) => amount.round2(),
        };
        raw.min(subtotal).non_negative()
    }
}

impl Entity for Promotion {
    type Id = PromotionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Discount granted to one line by an automatic promotion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDiscount {
    pub line_no: u32,
    pub promotion_id: PromotionId,
    pub amount: Money,
}

/// Apply automatic promotions: at most one per line, lowest promotion id first.
pub fn automatic_line_discounts(
    promotions: &[Promotion],
    lines: &[OrderLine],
    now: DateTime<Utc>,
) -> Vec<LineDiscount> {
    let mut eligible: Vec<&Promotion> = promotions
        .iter()
        .filter(|p| p.is_automatic() && p.is_valid(now))
        .collect();
    eligible.sort_by_key(|p| p.id);

    lines
        .iter()
        .filter_map(|line| {
            eligible
                .iter()
                .find(|p| p.is_applicable(&line.product))
                .map(|p| LineDiscount {
                    line_no: line.line_no,
                    promotion_id: p.id,
                    amount: p.discount_for_line(line),
                })
        })
        .collect()
}

/// Discount of a coded promotion over the lines it applies to; zero once expired.
pub fn coded_discount(promotion: &Promotion, lines: &[OrderLine], now: DateTime<Utc>) -> Money {
    if !promotion.is_valid(now) {
        tracing::debug!(promotion_id = %promotion.id, "coded promotion no longer valid");
        return Money::ZERO;
    }
    let subtotal: Money = lines
        .iter()
        .filter(|l| promotion.is_applicable(&l.product))
        .map(OrderLine::total_incl_tax)
        .sum();
    promotion.discount_for_subtotal(subtotal)
}

/// Promotions known to the store, unique by code.
#[derive(Debug, Clone, Default)]
pub struct PromotionBook {
    promotions: Vec<Promotion>,
}

impl PromotionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, promotion: Promotion) -> DomainResult<()> {
        if let Some(code) = &promotion.code {
            if self.find_by_code(code).is_some() {
                return Err(DomainError::conflict(format!("promotion code {code} already exists")));
            }
        }
        if self.get(promotion.id).is_some() {
            return Err(DomainError::conflict("promotion already exists"));
        }
        self.promotions.push(promotion);
        Ok(())
    }

    pub fn get(&self, id: PromotionId) -> Option<&Promotion> {
        self.promotions.iter().find(|p| p.id == id)
    }

    pub fn find_by_code(&self, code: &str) -> Option<&Promotion> {
        let wanted = normalize_code(code);
        self.promotions
            .iter()
            .find(|p| p.code.as_deref() == Some(wanted.as_str()))
    }

    pub fn deactivate(&mut self, id: PromotionId) -> DomainResult<()> {
        let promotion = self
            .promotions
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(DomainError::NotFound)?;
        promotion.active = false;
        Ok(())
    }

    pub fn all(&self) -> &[Promotion] {
        &self.promotions
    }
}
