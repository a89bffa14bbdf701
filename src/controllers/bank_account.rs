use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Method;
use serde_json::json;

use super::{Resource, RouteDecl};
use crate::bus::{Bus, Operation};
use crate::errors::{BackendError, Result};
use crate::model::{BankAccount, NewBankAccount};
use crate::operations::bank_account::{
    CreateBankAccount, DeleteBankAccount, GetBankAccount, SetBalance, VerifyBankAccount,
};
use crate::request::{Payload, Request};

actions!(Action {
    AdminGetAccountInfo => "adminGetAccountInfo",
    AdminUpdateBalance => "adminUpdateBalance",
    AdminCreateAccount => "adminCreateAccount",
    AdminDeleteAccount => "adminDeleteAccount",
    GetAccountInfo => "getAccountInfo",
});

pub struct BankAccountController {
    bus: Arc<Bus>,
}

impl BankAccountController {
    pub fn new(bus: Arc<Bus>) -> Self {
        Self { bus }
    }

    async fn account(&self, account_id: String) -> Result<BankAccount> {
        self.bus
            .ask::<GetBankAccount>(account_id)
            .await?
            .ok_or(BackendError::BankAccountNotFound)
    }

    async fn update_balance(&self, req: &Request) -> Result<Payload> {
        let account_id = req.get_string("accountId")?;
        let balance = req.get_body_number("balance", None)?;

        let account = self
            .bus
            .ask::<SetBalance>((account_id, balance))
            .await?
            .ok_or(BackendError::BankAccountNotFound)?;
        Ok(Payload::Json(json!(account.balance)))
    }

    async fn create_account(&self, req: &Request) -> Result<Payload> {
        let balance = req.get_body_number("balance", Some(0.0))?;
        let account = self
            .bus
            .ask::<CreateBankAccount>(NewBankAccount {
                user_id: None,
                balance,
            })
            .await?;
        tracing::info!(account_id = %account.id, "Created bank account");
        Payload::json(account)
    }

    async fn delete_account(&self, req: &Request) -> Result<Payload> {
        let account_id = req.get_string("accountId")?;
        if !self.bus.ask::<DeleteBankAccount>(account_id.clone()).await? {
            return Err(BackendError::BankAccountNotFound);
        }
        tracing::info!(account_id = %account_id, "Deleted bank account");
        Ok(Payload::Json(json!(true)))
    }

    /// Balance lookup for card holders, gated by the account's vcc.
    async fn account_info(&self, req: &Request) -> Result<Payload> {
        let account_id = req.get_string("accountId")?;
        let vcc = req.get_string("vcc")?;

        if !self
            .bus
            .ask::<VerifyBankAccount>((account_id.clone(), vcc))
            .await?
        {
            return Err(BackendError::BankAccountVerificationFailed);
        }
        let account = self.account(account_id).await?;
        Ok(Payload::Json(json!({ "balance": account.balance })))
    }
}

#[async_trait]
impl Resource for BankAccountController {
    fn name(&self) -> &'static str {
        "bankaccount"
    }

    fn routes(&self) -> Vec<RouteDecl> {
        vec![
            RouteDecl::new(Method::GET, "/_admin/:accountId", "adminGetAccountInfo"),
            RouteDecl::new(Method::PUT, "/_admin/:accountId", "adminUpdateBalance"),
            RouteDecl::new(Method::POST, "/_admin/_create", "adminCreateAccount"),
            RouteDecl::new(Method::DELETE, "/_admin/:accountId", "adminDeleteAccount"),
            RouteDecl::new(Method::GET, "/:accountId/:vcc", "getAccountInfo"),
        ]
    }

    fn handles(&self, action: &str) -> bool {
        Action::from_name(action).is_some()
    }

    async fn init(&self) -> Result<()> {
        self.bus.require(&[
            GetBankAccount::NAME,
            SetBalance::NAME,
            CreateBankAccount::NAME,
            DeleteBankAccount::NAME,
            VerifyBankAccount::NAME,
        ])
    }

    async fn call(&self, action: &str, req: &Request) -> Result<Payload> {
        match Action::from_name(action) {
            Some(Action::AdminGetAccountInfo) => {
                Payload::json(self.account(req.get_string("accountId")?).await?)
            }
            Some(Action::AdminUpdateBalance) => self.update_balance(req).await,
            Some(Action::AdminCreateAccount) => self.create_account(req).await,
            Some(Action::AdminDeleteAccount) => self.delete_account(req).await,
            Some(Action::GetAccountInfo) => self.account_info(req).await,
            None => Err(BackendError::MissingAction {
                path: req.raw().path.clone(),
                resource: self.name().to_string(),
                action: action.to_string(),
            }),
        }
    }
}
