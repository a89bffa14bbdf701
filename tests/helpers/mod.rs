#![allow(dead_code)]

pub mod builders;
pub mod db;

pub use builders::{stub_security, token_for, user, StubResource, UserBuilder};
pub use db::TestDb;
