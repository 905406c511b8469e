use serde::{Deserialize, Serialize};

use crate::model::{ColumnDef, ColumnType, Entity, EntityModel};

/// Catalog product (table `Products`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Assigned by the database; 0 until the product is inserted
    pub id: i64,
    pub name: String,
    pub price: f64,
}

static PRODUCT_MODEL: EntityModel = EntityModel {
    table_name: "Products",
    columns: &[
        ColumnDef::key("id", ColumnType::Integer).generated_on_add(),
        ColumnDef::new("name", ColumnType::Text),
        ColumnDef::new("price", ColumnType::Real),
    ],
};

impl Entity for Product {
    fn model() -> &'static EntityModel {
        &PRODUCT_MODEL
    }
}

impl Product {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = price;
        self
    }
}
