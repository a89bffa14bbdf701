//! Every operation answered on the bus, grouped by the service that registers it.

use crate::bus::Operation;
use crate::model::{BankAccount, NewBankAccount, NewUser, Product, TokenClaims, UserInfo};

macro_rules! operation {
    ($(#[$meta:meta])* $ty:ident = $name:literal, $args:ty => $output:ty) => {
        $(#[$meta])*
        pub struct $ty;

        impl Operation for $ty {
            const NAME: &'static str = $name;
            type Args = $args;
            type Output = $output;
        }
    };
}

pub mod security {
    use super::*;

    operation!(
        /// Raw bearer token to its claims. `None` for missing, invalid or expired tokens.
        VerifyToken = "core:security:token:verify", Option<String> => Option<TokenClaims>
    );
    operation!(
        /// Signed token for a user id.
        CreateToken = "core:security:token:create", i32 => String
    );
    operation!(GetUser = "core:security:user:get", i32 => Option<UserInfo>);
    operation!(
        /// (username, password) to the matching user when the password verifies.
        VerifyCredentials = "core:security:user:verifyCredentials", (String, String) => Option<UserInfo>
    );
    operation!(CreateUser = "core:security:user:create", NewUser => UserInfo);
}

pub mod bank_account {
    use super::*;

    operation!(GetBankAccount = "core:bankAccount:get", String => Option<BankAccount>);
    operation!(GetBankAccountByUser = "core:bankAccount:getByUser", i32 => Option<BankAccount>);
    operation!(
        /// (account id, new balance). `None` when the account does not exist.
        SetBalance = "core:bankAccount:setBalance", (String, f64) => Option<BankAccount>
    );
    operation!(
        /// (account id, amount) withdrawn only if the balance covers it, in a
        /// single conditional update. `None` when nothing was debited.
        DebitBankAccount = "core:bankAccount:debit", (String, f64) => Option<BankAccount>
    );
    operation!(CreateBankAccount = "core:bankAccount:create", NewBankAccount => BankAccount);
    operation!(DeleteBankAccount = "core:bankAccount:delete", String => bool);
    operation!(
        /// (account id, vcc) to whether both match a stored account.
        VerifyBankAccount = "core:bankAccount:verify", (String, String) => bool
    );
}

pub mod product {
    use super::*;

    operation!(GetProduct = "core:product:get", String => Option<Product>);
    operation!(AddProduct = "core:product:add", Product => Product);
    operation!(
        /// Query the upstream barcode service. `None` when it does not know the code.
        LookupProduct = "core:product:lookup", String => Option<Product>
    );
}
