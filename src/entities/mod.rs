pub mod bank_account;
pub mod product;
pub mod user;

pub use bank_account::Entity as BankAccount;
pub use product::Entity as Product;
pub use user::Entity as User;
