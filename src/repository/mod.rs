//! Persistent services. Each repository answers its operations on the bus and
//! is reached only through it.

use base64ct::Encoding;
use rand::RngCore;
use sea_orm::DatabaseConnection;

use crate::bus::Bus;
use crate::errors::Result;

pub mod bank_account;
pub mod product;
pub mod product_lookup;
pub mod user;

pub use bank_account::BankAccountRepository;
pub use product::ProductRepository;
pub use user::UserRepository;

/// Register every database-backed operation on `bus`.
pub fn register_all(bus: &Bus, db: DatabaseConnection) -> Result<()> {
    UserRepository::new(db.clone()).register(bus)?;
    BankAccountRepository::new(db.clone()).register(bus)?;
    ProductRepository::new(db).register(bus)?;
    Ok(())
}

pub(crate) fn random_id() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64ct::Base64UrlUnpadded::encode_string(&bytes)
}
