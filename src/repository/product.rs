use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};

use crate::bus::Bus;
use crate::entities::product::{self, Entity};
use crate::errors::{BackendError, Result};
use crate::model::Product;
use crate::operations::product::{AddProduct, GetProduct};

impl TryFrom<product::Model> for Product {
    type Error = BackendError;

    fn try_from(model: product::Model) -> Result<Self> {
        let raw = model.raw.as_deref().map(serde_json::from_str).transpose()?;
        Ok(Self {
            code: model.code,
            name: model.name,
            price: model.price,
            image: model.image,
            ingredients: model.ingredients,
            brand: model.brand,
            nutri_score: model.nutri_score,
            raw,
        })
    }
}

/// Local product catalog, filled from barcode lookups.
#[derive(Clone)]
pub struct ProductRepository {
    db: DatabaseConnection,
}

impl ProductRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn get(&self, code: &str) -> Result<Option<Product>> {
        Entity::find_by_id(code)
            .one(&self.db)
            .await?
            .map(Product::try_from)
            .transpose()
    }

    /// Store `product`. A product already stored under the same code wins.
    pub async fn add(&self, product: Product) -> Result<Product> {
        let code = product.code.clone();
        let raw = product.raw.as_ref().map(serde_json::to_string).transpose()?;

        let inserted = product::ActiveModel {
            code: Set(product.code),
            name: Set(product.name),
            price: Set(product.price),
            image: Set(product.image),
            ingredients: Set(product.ingredients),
            brand: Set(product.brand),
            nutri_score: Set(product.nutri_score),
            raw: Set(raw),
            created_at: Set(Utc::now().timestamp()),
        }
        .insert(&self.db)
        .await;

        match inserted {
            Ok(model) => {
                tracing::debug!(code = %model.code, "Product added to catalog");
                Product::try_from(model)
            }
            // Lost a race with a concurrent lookup of the same code
            Err(e) => match self.get(&code).await? {
                Some(existing) => Ok(existing),
                None => {
                    tracing::error!(code = %code, error = %e, "Failed to store product");
                    Err(BackendError::ProductAddFailed(code))
                }
            },
        }
    }

    pub fn register(self, bus: &Bus) -> Result<()> {
        let repo = self.clone();
        bus.on_ask::<GetProduct, _, _>(move |code| {
            let repo = repo.clone();
            async move { repo.get(&code).await }
        })?;

        bus.on_ask::<AddProduct, _, _>(move |product| {
            let repo = self.clone();
            async move { repo.add(product).await }
        })?;
        Ok(())
    }
}
