use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::adapter::MarketplaceAdapter;
use crate::error::IntegrationError;
use crate::shopify::ShopifyAdapter;
use crate::woocommerce::WooCommerceAdapter;

/// Marketplace a merchant store is connected to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Shopify,
    Etsy,
    WooCommerce,
    BigCommerce,
    /// Orders submitted directly through the public API.
    Api,
}

impl Platform {
    pub const ALL: [Platform; 5] = [
        Platform::Shopify,
        Platform::Etsy,
        Platform::WooCommerce,
        Platform::BigCommerce,
        Platform::Api,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Shopify => "shopify",
            Platform::Etsy => "etsy",
            Platform::WooCommerce => "woocommerce",
            Platform::BigCommerce => "bigcommerce",
            Platform::Api => "api",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = IntegrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| IntegrationError::UnknownPlatform(s.to_string()))
    }
}

/// Connection settings for one merchant store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    /// Shop domain (Shopify) or site URL (WooCommerce).
    pub store_url: String,
    pub api_key: Option<String>,
    pub access_token: Option<String>,
    /// Shared secret used to sign webhook bodies.
    pub webhook_secret: Option<String>,
}

impl AdapterConfig {
    pub fn new(store_url: impl Into<String>) -> Self {
        Self {
            store_url: store_url.into(),
            api_key: None,
            access_token: None,
            webhook_secret: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook_secret = Some(secret.into());
        self
    }
}

/// Build the adapter for `platform`.
pub fn create_adapter(
    platform: Platform,
    config: AdapterConfig,
) -> Result<Box<dyn MarketplaceAdapter>, IntegrationError> {
    if config.store_url.trim().is_empty() {
        return Err(IntegrationError::Config("store_url is required".to_string()));
    }
    match platform {
        Platform::Shopify => Ok(Box::new(ShopifyAdapter::new(config))),
        Platform::WooCommerce => Ok(Box::new(WooCommerceAdapter::new(config))),
        Platform::Etsy | Platform::BigCommerce | Platform::Api => {
            Err(IntegrationError::Unsupported(platform))
        }
    }
}
