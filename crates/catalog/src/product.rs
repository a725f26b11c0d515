use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use printforge_core::{Entity, PrintProviderId, ProductId, VariantId};

/// Product status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Draft,
    Active,
    Archived,
}

/// A sellable print-on-demand product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Product type as understood by providers (e.g. "t-shirt", "mug").
    pub product_type: String,
    /// Price in smallest currency unit (e.g., cents).
    pub base_price: u64,
    /// Provider that prints this product; `None` until one is assigned.
    pub print_provider_id: Option<PrintProviderId>,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn new(name: impl Into<String>, product_type: impl Into<String>, base_price: u64) -> Self {
        Self {
            id: ProductId::new(),
            name: name.into(),
            product_type: product_type.into(),
            base_price,
            print_provider_id: None,
            status: ProductStatus::Draft,
            created_at: Utc::now(),
        }
    }

    pub fn with_provider(mut self, provider_id: PrintProviderId) -> Self {
        self.print_provider_id = Some(provider_id);
        self
    }

    pub fn activated(mut self) -> Self {
        self.status = ProductStatus::Active;
        self
    }

    /// Check if product can be sold (must be Active, not Archived).
    pub fn can_be_sold(&self) -> bool {
        self.status == ProductStatus::Active
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// A concrete size/color combination of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: VariantId,
    pub product_id: ProductId,
    pub sku: String,
    pub size: String,
    pub color: String,
    /// Signed adjustment to the product base price, in cents.
    pub price_modifier: i64,
    pub in_stock: bool,
}

impl ProductVariant {
    pub fn new(
        product_id: ProductId,
        sku: impl Into<String>,
        size: impl Into<String>,
        color: impl Into<String>,
    ) -> Self {
        Self {
            id: VariantId::new(),
            product_id,
            sku: sku.into(),
            size: size.into(),
            color: color.into(),
            price_modifier: 0,
            in_stock: true,
        }
    }

    pub fn with_price_modifier(mut self, modifier: i64) -> Self {
        self.price_modifier = modifier;
        self
    }

    /// "M / Black" style label used by marketplaces.
    pub fn title(&self) -> String {
        format!("{} / {}", self.size, self.color)
    }

    /// Final unit price for this variant given its product; never negative.
    pub fn unit_price(&self, product: &Product) -> u64 {
        let price = product.base_price as i128 + self.price_modifier as i128;
        price.clamp(0, u64::MAX as i128) as u64
    }
}

impl Entity for ProductVariant {
    type Id = VariantId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_title_joins_size_and_color() {
        let product = Product::new("Classic T-Shirt", "t-shirt", 1999);
        let variant = ProductVariant::new(product.id, "TS-M-BLK", "M", "Black");
        assert_eq!(variant.title(), "M / Black");
    }

    #[test]
    fn product_is_sellable_only_when_active() {
        let product = Product::new("Mug", "mug", 1200);
        assert!(!product.can_be_sold());
        assert!(product.activated().can_be_sold());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: unit price is the base price plus modifier, floored at zero.
            #[test]
            fn unit_price_never_negative(base in 0u64..1_000_000, modifier in -2_000_000i64..2_000_000) {
                let product = Product::new("P", "t-shirt", base);
                let variant = ProductVariant::new(product.id, "SKU", "L", "White")
                    .with_price_modifier(modifier);
                let expected = (base as i64 + modifier).max(0) as u64;
                prop_assert_eq!(variant.unit_price(&product), expected);
            }
        }
    }
}
