//! # Settlement Arithmetic
//!
//! Pure computations behind every settled sale, and construction of the
//! ledger pair written in the settling transaction.
//!
//! ## Ledger Pair
//! ```text
//!   Product snapshot ─┐
//!   quantity          ├──► SaleTotals ──► SaleDraft ──┬──► SaleRecord
//!   SalePricing       ┘                               └──► CombinedSaleRecord
//!
//!   total_cost    = buying  × quantity
//!   total_selling = selling × quantity   (or the agreed total)
//!   profit        = total_selling − total_cost
//!   balance       = cash_received − total_selling
//! ```

use chrono::{DateTime, Utc};

use crate::money::Money;
use crate::types::{generate_sale_id, CombinedSaleRecord, PaymentMethod, Product, SaleRecord};

// =============================================================================
// Pricing
// =============================================================================

/// How the selling side of a sale is priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SalePricing {
    /// Product's current selling price; cash as counted at the till.
    Counter { cash_received: Money },
    /// Selling total fixed when payment was requested, and what was paid.
    Agreed { total_selling: Money, paid: Money },
}

// =============================================================================
// Sale Totals
// =============================================================================

/// Monetary outcome of selling `quantity` units of one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaleTotals {
    pub cash_received: Money,
    pub total_cost: Money,
    pub total_selling: Money,
    pub profit: Money,
    pub balance: Money,
}

impl SaleTotals {
    /// Computes totals from unit prices.
    pub fn compute(
        unit_buying: Money,
        unit_selling: Money,
        quantity: i64,
        cash_received: Money,
    ) -> Self {
        Self::with_total(
            unit_buying,
            unit_selling.multiply_quantity(quantity),
            quantity,
            cash_received,
        )
    }

    /// Computes totals against a selling total that is already known.
    pub fn with_total(
        unit_buying: Money,
        total_selling: Money,
        quantity: i64,
        cash_received: Money,
    ) -> Self {
        let total_cost = unit_buying.multiply_quantity(quantity);

        SaleTotals {
            cash_received,
            total_cost,
            total_selling,
            profit: total_selling - total_cost,
            balance: cash_received - total_selling,
        }
    }

    /// Totals for a product under the given pricing.
    pub fn for_product(product: &Product, quantity: i64, pricing: SalePricing) -> Self {
        match pricing {
            SalePricing::Counter { cash_received } => Self::compute(
                product.buying_price(),
                product.selling_price(),
                quantity,
                cash_received,
            ),
            SalePricing::Agreed {
                total_selling,
                paid,
            } => Self::with_total(product.buying_price(), total_selling, quantity, paid),
        }
    }
}

// =============================================================================
// Sale Draft
// =============================================================================

/// Everything needed to write one ledger pair.
#[derive(Debug, Clone)]
pub struct SaleDraft {
    pub sale_id: String,
    pub organization_id: String,
    pub user_id: String,
    pub product_name: String,
    pub product_id: String,
    pub category: String,
    pub unit_buying: Money,
    pub unit_selling: Money,
    pub quantity: i64,
    pub totals: SaleTotals,
    pub payment_method: PaymentMethod,
    pub external_transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SaleDraft {
    /// Snapshots `product` into a new draft with a fresh sale id.
    ///
    /// Under agreed pricing the unit selling price is the agreed total spread
    /// over the quantity, whatever the product row says now.
    pub fn from_product(
        product: &Product,
        user_id: &str,
        quantity: i64,
        pricing: SalePricing,
        payment_method: PaymentMethod,
        external_transaction_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let unit_selling = match pricing {
            SalePricing::Agreed { total_selling, .. } if quantity > 0 => {
                Money::from_cents(total_selling.cents() / quantity)
            }
            _ => product.selling_price(),
        };

        SaleDraft {
            sale_id: generate_sale_id(),
            organization_id: product.organization_id.clone(),
            user_id: user_id.to_string(),
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            category: product.category.clone(),
            unit_buying: product.buying_price(),
            unit_selling,
            quantity,
            totals: SaleTotals::for_product(product, quantity, pricing),
            payment_method,
            external_transaction_id,
            created_at: now,
        }
    }

    /// The per-method ledger entry.
    pub fn sale_record(&self) -> SaleRecord {
        SaleRecord {
            id: self.sale_id.clone(),
            organization_id: self.organization_id.clone(),
            user_id: self.user_id.clone(),
            product_id: self.product_id.clone(),
            product_name: self.product_name.clone(),
            category: self.category.clone(),
            unit_buying_price_cents: self.unit_buying.cents(),
            unit_selling_price_cents: self.unit_selling.cents(),
            quantity: self.quantity,
            total_buying_price_cents: self.totals.total_cost.cents(),
            total_selling_price_cents: self.totals.total_selling.cents(),
            profit_cents: self.totals.profit.cents(),
            cash_received_cents: self.totals.cash_received.cents(),
            balance_cents: self.totals.balance.cents(),
            payment_method: self.payment_method,
            external_transaction_id: self.external_transaction_id.clone(),
            created_at: self.created_at,
        }
    }

    /// The cross-method projection. Its `id` is derived from the sale id so
    /// one draft always yields the same pair.
    pub fn combined_record(&self) -> CombinedSaleRecord {
        CombinedSaleRecord {
            id: format!("cs-{}", self.sale_id),
            sale_id: self.sale_id.clone(),
            organization_id: self.organization_id.clone(),
            user_id: self.user_id.clone(),
            product_id: self.product_id.clone(),
            product_name: self.product_name.clone(),
            category: self.category.clone(),
            quantity: self.quantity,
            total_selling_price_cents: self.totals.total_selling.cents(),
            total_buying_price_cents: self.totals.total_cost.cents(),
            profit_cents: self.totals.profit.cents(),
            payment_method: self.payment_method,
            external_transaction_id: self.external_transaction_id.clone(),
            created_at: self.created_at,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn widget() -> Product {
        let now = Utc::now();
        Product {
            id: "p-1".to_string(),
            organization_id: "org-1".to_string(),
            name: "Widget".to_string(),
            category: "Hardware".to_string(),
            buying_price_cents: 5000,
            selling_price_cents: 8000,
            quantity: 10,
            reorder_level: 2,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn counter(cents: i64) -> SalePricing {
        SalePricing::Counter {
            cash_received: Money::from_cents(cents),
        }
    }

    #[test]
    fn test_cash_totals_with_change() {
        let t = SaleTotals::for_product(&widget(), 3, counter(30000));
        assert_eq!(t.total_cost.cents(), 15000);
        assert_eq!(t.total_selling.cents(), 24000);
        assert_eq!(t.profit.cents(), 9000);
        assert_eq!(t.balance.cents(), 6000);
    }

    #[test]
    fn test_underpayment_yields_negative_balance() {
        let t = SaleTotals::for_product(&widget(), 3, counter(20000));
        assert_eq!(t.balance.cents(), -4000);
        assert!(t.balance.is_negative());
    }

    #[test]
    fn test_agreed_total_ignores_current_price() {
        let mut product = widget();
        product.selling_price_cents = 10000;

        let pricing = SalePricing::Agreed {
            total_selling: Money::from_cents(16000),
            paid: Money::from_cents(16000),
        };
        let t = SaleTotals::for_product(&product, 2, pricing);
        assert_eq!(t.total_selling.cents(), 16000);
        assert_eq!(t.cash_received.cents(), 16000);
        assert_eq!(t.profit.cents(), 6000);
        assert!(t.balance.is_zero());
    }

    #[test]
    fn test_agreed_total_records_rounded_up_payment() {
        let mut product = widget();
        product.selling_price_cents = 8050;

        // 80.50 is prompted as 81 whole units.
        let pricing = SalePricing::Agreed {
            total_selling: Money::from_cents(8050),
            paid: Money::from_cents(8100),
        };
        let draft = SaleDraft::from_product(
            &product,
            "cashier-1",
            1,
            pricing,
            PaymentMethod::MobileMoney,
            Some("QK1".to_string()),
            Utc::now(),
        );

        let sale = draft.sale_record();
        assert_eq!(sale.unit_selling_price_cents, 8050);
        assert_eq!(sale.total_selling_price_cents, 8050);
        assert_eq!(sale.cash_received_cents, 8100);
        assert_eq!(sale.balance_cents, 50);
    }

    #[test]
    fn test_ledger_pair_agrees() {
        let pricing = SalePricing::Agreed {
            total_selling: Money::from_cents(24000),
            paid: Money::from_cents(24000),
        };
        let draft = SaleDraft::from_product(
            &widget(),
            "cashier-1",
            3,
            pricing,
            PaymentMethod::MobileMoney,
            Some("QK12ABC".to_string()),
            Utc::now(),
        );

        let sale = draft.sale_record();
        let combined = draft.combined_record();

        assert_eq!(combined.sale_id, sale.id);
        assert_eq!(combined.quantity, sale.quantity);
        assert_eq!(combined.total_selling_price_cents, sale.total_selling_price_cents);
        assert_eq!(combined.profit_cents, sale.profit_cents);
        assert_eq!(combined.payment_method, PaymentMethod::MobileMoney);
        assert_eq!(sale.unit_selling_price_cents, 8000);
        assert_eq!(sale.external_transaction_id.as_deref(), Some("QK12ABC"));
        assert_eq!(sale.product_name, "Widget");
        assert_eq!(sale.category, "Hardware");
    }
}
