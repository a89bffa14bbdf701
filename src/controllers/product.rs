use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Method;
use serde_json::{json, Value};

use super::{Resource, RouteDecl};
use crate::bus::{Bus, Operation};
use crate::errors::{BackendError, Result};
use crate::model::Product;
use crate::operations::bank_account::{DebitBankAccount, GetBankAccount, VerifyBankAccount};
use crate::operations::product::{AddProduct, GetProduct, LookupProduct};
use crate::request::{Payload, Request};

actions!(Action {
    GetProductByCode => "getProductByCode",
    PayShoppingCart => "payShoppingCart",
});

/// One validated shopping cart line.
#[derive(Debug, Clone, PartialEq)]
struct CartLine {
    code: String,
    quantity: f64,
}

fn parse_cart(items: &[Value]) -> Result<Vec<CartLine>> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let code = match item.get("code") {
                Some(Value::String(code)) => code.clone(),
                Some(Value::Number(code)) => code.to_string(),
                Some(Value::Null) | None => {
                    return Err(BackendError::MissingArgument(format!("body.products[{i}].code")))
                }
                Some(_) => {
                    return Err(BackendError::InvalidType {
                        name: format!("body.products[{i}].code"),
                        expected: "string",
                    })
                }
            };
            let quantity = item
                .get("quantity")
                .and_then(Value::as_f64)
                .ok_or_else(|| BackendError::InvalidType {
                    name: format!("body.products[{i}].quantity"),
                    expected: "number",
                })?;
            if quantity <= 0.0 {
                return Err(BackendError::MissingArgument(format!(
                    "body.products[{i}].quantity"
                )));
            }
            Ok(CartLine { code, quantity })
        })
        .collect()
}

pub struct ProductController {
    bus: Arc<Bus>,
}

impl ProductController {
    pub fn new(bus: Arc<Bus>) -> Self {
        Self { bus }
    }

    /// Local catalog first, then the upstream barcode service. Upstream hits are cached.
    async fn fetch_product(&self, code: &str) -> Result<Product> {
        if let Some(product) = self.bus.ask::<GetProduct>(code.to_string()).await? {
            return Ok(product);
        }

        tracing::debug!(code, "Product not in catalog, querying lookup service");
        let product = self
            .bus
            .ask::<LookupProduct>(code.to_string())
            .await?
            .ok_or_else(|| BackendError::ProductNotFound(code.to_string()))?;

        self.bus.ask::<AddProduct>(product).await
    }

    async fn product_by_code(&self, req: &Request) -> Result<Payload> {
        let code = req.get_string("code")?;
        let with_raw = req.get_body_boolean("raw", false)?
            || req.raw().query.get("raw").is_some_and(|v| v == "true");

        let mut product = self.fetch_product(&code).await?;
        if !with_raw {
            product.raw = None;
        }
        Payload::json(product)
    }

    async fn pay(&self, req: &Request) -> Result<Payload> {
        let cart = parse_cart(req.get_body_array("products")?)?;
        let account_id = req.get_body_string("accountId")?;
        let vcc = req.get_body_string("vcc")?;

        let mut total = 0.0;
        for line in &cart {
            let product = self.fetch_product(&line.code).await?;
            total += product.price * line.quantity;
        }
        if total < 0.0 {
            return Err(BackendError::TransactionRejected("Price is negative".to_string()));
        }

        if !self
            .bus
            .ask::<VerifyBankAccount>((account_id.clone(), vcc))
            .await?
        {
            return Err(BackendError::BankAccountVerificationFailed);
        }
        let debited = self
            .bus
            .ask::<DebitBankAccount>((account_id.clone(), total))
            .await?;
        if debited.is_none() {
            return match self.bus.ask::<GetBankAccount>(account_id).await? {
                Some(_) => Err(BackendError::InsufficientFunds),
                None => Err(BackendError::BankAccountNotFound),
            };
        }

        tracing::info!(account_id = %account_id, total, lines = cart.len(), "Shopping cart paid");
        Ok(Payload::Json(json!(true)))
    }
}

#[async_trait]
impl Resource for ProductController {
    fn name(&self) -> &'static str {
        "product"
    }

    fn routes(&self) -> Vec<RouteDecl> {
        vec![
            RouteDecl::new(Method::GET, "/:code", "getProductByCode"),
            RouteDecl::new(Method::POST, "/pay", "payShoppingCart"),
        ]
    }

    fn handles(&self, action: &str) -> bool {
        Action::from_name(action).is_some()
    }

    async fn init(&self) -> Result<()> {
        self.bus.require(&[
            GetProduct::NAME,
            AddProduct::NAME,
            LookupProduct::NAME,
            VerifyBankAccount::NAME,
            GetBankAccount::NAME,
            DebitBankAccount::NAME,
        ])
    }

    async fn call(&self, action: &str, req: &Request) -> Result<Payload> {
        match Action::from_name(action) {
            Some(Action::GetProductByCode) => self.product_by_code(req).await,
            Some(Action::PayShoppingCart) => self.pay(req).await,
            None => Err(BackendError::MissingAction {
                path: req.raw().path.clone(),
                resource: self.name().to_string(),
                action: action.to_string(),
            }),
        }
    }
}
