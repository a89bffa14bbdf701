use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Method;
use serde_json::json;

use super::{Resource, RouteDecl};
use crate::bus::{Bus, Operation};
use crate::errors::{BackendError, Result};
use crate::model::BankAccount;
use crate::operations::bank_account::{GetBankAccountByUser, SetBalance};
use crate::operations::security::GetUser;
use crate::request::{Payload, Request};

actions!(Action {
    GetBalance => "getBalance",
    UpdateBalance => "updateBalance",
    GetMyBalance => "getMyBalance",
});

/// Balances addressed by user rather than by account.
pub struct BalanceController {
    bus: Arc<Bus>,
}

fn user_id(name: &str, value: i64) -> Result<i32> {
    i32::try_from(value).map_err(|_| BackendError::InvalidType {
        name: name.to_string(),
        expected: "integer",
    })
}

impl BalanceController {
    pub fn new(bus: Arc<Bus>) -> Self {
        Self { bus }
    }

    async fn account_of(&self, user_id: i32) -> Result<BankAccount> {
        self.bus
            .ask::<GetUser>(user_id)
            .await?
            .ok_or(BackendError::UserWithIdNotFound(user_id))?;
        self.bus
            .ask::<GetBankAccountByUser>(user_id)
            .await?
            .ok_or(BackendError::BankAccountNotFound)
    }

    async fn update_balance(&self, req: &Request) -> Result<Payload> {
        let id = user_id("userId", req.get_body_integer("userId")?)?;
        let balance = req.get_body_number("balance", None)?;

        let account = self.account_of(id).await?;
        let account = self
            .bus
            .ask::<SetBalance>((account.id, balance))
            .await?
            .ok_or(BackendError::BankAccountNotFound)?;
        Ok(Payload::Json(json!({ "balance": account.balance })))
    }
}

#[async_trait]
impl Resource for BalanceController {
    fn name(&self) -> &'static str {
        "balance"
    }

    fn routes(&self) -> Vec<RouteDecl> {
        vec![
            RouteDecl::new(Method::GET, "/", "getBalance"),
            RouteDecl::new(Method::POST, "/", "updateBalance"),
            RouteDecl::new(Method::GET, "/_me", "getMyBalance"),
        ]
    }

    fn handles(&self, action: &str) -> bool {
        Action::from_name(action).is_some()
    }

    async fn init(&self) -> Result<()> {
        self.bus
            .require(&[GetUser::NAME, GetBankAccountByUser::NAME, SetBalance::NAME])
    }

    async fn call(&self, action: &str, req: &Request) -> Result<Payload> {
        match Action::from_name(action) {
            Some(Action::GetBalance) => {
                let id = user_id("userId", req.get_integer("userId")?)?;
                let account = self.account_of(id).await?;
                Ok(Payload::Json(json!({ "balance": account.balance })))
            }
            Some(Action::UpdateBalance) => self.update_balance(req).await,
            Some(Action::GetMyBalance) => {
                let id = req.get_user()?.id;
                let account = self.account_of(id).await?;
                Ok(Payload::Json(json!({ "balance": account.balance })))
            }
            None => Err(BackendError::MissingAction {
                path: req.raw().path.clone(),
                resource: self.name().to_string(),
                action: action.to_string(),
            }),
        }
    }
}
