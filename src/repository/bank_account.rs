use chrono::Utc;
use rand::Rng;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set};

use super::random_id;
use crate::bus::Bus;
use crate::entities::bank_account::{self, Column, Entity};
use crate::errors::Result;
use crate::model::{BankAccount, NewBankAccount};
use crate::operations::bank_account::{
    CreateBankAccount, DebitBankAccount, DeleteBankAccount, GetBankAccount, GetBankAccountByUser,
    SetBalance, VerifyBankAccount,
};

impl From<bank_account::Model> for BankAccount {
    fn from(model: bank_account::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            vcc: model.vcc,
            balance: model.balance,
        }
    }
}

/// 4-digit visual cryptographic code, zero padded.
fn generate_vcc() -> String {
    format!("{:04}", rand::thread_rng().gen_range(0..10_000))
}

#[derive(Clone)]
pub struct BankAccountRepository {
    db: DatabaseConnection,
}

impl BankAccountRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn get(&self, id: &str) -> Result<Option<BankAccount>> {
        Ok(Entity::find_by_id(id).one(&self.db).await?.map(Into::into))
    }

    /// Oldest account owned by `user_id`.
    pub async fn get_by_user(&self, user_id: i32) -> Result<Option<BankAccount>> {
        Ok(Entity::find()
            .filter(Column::UserId.eq(user_id))
            .order_by_asc(Column::CreatedAt)
            .one(&self.db)
            .await?
            .map(Into::into))
    }

    pub async fn set_balance(&self, id: &str, balance: f64) -> Result<Option<BankAccount>> {
        let result = Entity::update_many()
            .col_expr(Column::Balance, Expr::value(balance))
            .filter(Column::Id.eq(id))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Ok(None);
        }
        self.get(id).await
    }

    /// Subtract `amount` when the stored balance covers it. The check and the
    /// write are one statement, so concurrent debits cannot overdraw.
    pub async fn debit(&self, id: &str, amount: f64) -> Result<Option<BankAccount>> {
        let result = Entity::update_many()
            .col_expr(Column::Balance, Expr::col(Column::Balance).sub(amount))
            .filter(Column::Id.eq(id))
            .filter(Column::Balance.gte(amount))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Ok(None);
        }
        self.get(id).await
    }

    pub async fn create(&self, new_account: NewBankAccount) -> Result<BankAccount> {
        let model = bank_account::ActiveModel {
            id: Set(random_id()),
            user_id: Set(new_account.user_id),
            vcc: Set(generate_vcc()),
            balance: Set(new_account.balance),
            created_at: Set(Utc::now().timestamp()),
        }
        .insert(&self.db)
        .await?;
        Ok(model.into())
    }

    /// Whether a row was deleted.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = Entity::delete_by_id(id).exec(&self.db).await?;
        Ok(result.rows_affected > 0)
    }

    pub async fn verify(&self, id: &str, vcc: &str) -> Result<bool> {
        Ok(self.get(id).await?.is_some_and(|account| account.vcc == vcc))
    }

    pub fn register(self, bus: &Bus) -> Result<()> {
        let repo = self.clone();
        bus.on_ask::<GetBankAccount, _, _>(move |id| {
            let repo = repo.clone();
            async move { repo.get(&id).await }
        })?;

        let repo = self.clone();
        bus.on_ask::<GetBankAccountByUser, _, _>(move |user_id| {
            let repo = repo.clone();
            async move { repo.get_by_user(user_id).await }
        })?;

        let repo = self.clone();
        bus.on_ask::<SetBalance, _, _>(move |(id, balance)| {
            let repo = repo.clone();
            async move { repo.set_balance(&id, balance).await }
        })?;

        let repo = self.clone();
        bus.on_ask::<DebitBankAccount, _, _>(move |(id, amount)| {
            let repo = repo.clone();
            async move { repo.debit(&id, amount).await }
        })?;

        let repo = self.clone();
        bus.on_ask::<CreateBankAccount, _, _>(move |new_account| {
            let repo = repo.clone();
            async move { repo.create(new_account).await }
        })?;

        let repo = self.clone();
        bus.on_ask::<DeleteBankAccount, _, _>(move |id| {
            let repo = repo.clone();
            async move { repo.delete(&id).await }
        })?;

        bus.on_ask::<VerifyBankAccount, _, _>(move |(id, vcc)| {
            let repo = self.clone();
            async move { repo.verify(&id, &vcc).await }
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_vcc() {
        for _ in 0..100 {
            let vcc = generate_vcc();
            assert_eq!(vcc.len(), 4);
            assert!(vcc.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
