use serde::{Deserialize, Serialize};

use printforge_core::{Entity, PrintProviderId};

/// External vendor that physically produces and ships products.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintProvider {
    pub id: PrintProviderId,
    /// Display name; also used to derive mock provider order references.
    pub name: String,
    /// Product types the provider can print.
    pub supported_products: Vec<String>,
    pub active: bool,
}

impl PrintProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: PrintProviderId::new(),
            name: name.into(),
            supported_products: Vec::new(),
            active: true,
        }
    }

    pub fn supporting(mut self, product_type: impl Into<String>) -> Self {
        self.supported_products.push(product_type.into());
        self
    }

    pub fn supports(&self, product_type: &str) -> bool {
        self.supported_products.iter().any(|p| p == product_type)
    }
}

impl Entity for PrintProvider {
    type Id = PrintProviderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
