use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    /// Barcode
    #[sea_orm(primary_key, auto_increment = false)]
    pub code: String,
    pub name: Option<String>,
    #[sea_orm(column_type = "Double")]
    pub price: f64,
    pub image: Option<String>,
    pub ingredients: Option<String>,
    pub brand: Option<String>,
    pub nutri_score: Option<String>,
    /// Upstream record as JSON text
    #[sea_orm(column_type = "Text", nullable)]
    pub raw: Option<String>,
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
