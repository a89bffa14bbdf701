// Repository tests against a migrated SQLite database, both directly and
// through the operations they register on the bus.

mod helpers;

use helpers::{TestDb, UserBuilder};
use serde_json::json;
use tungsten::bus::Bus;
use tungsten::model::{NewBankAccount, Product};
use tungsten::operations::bank_account::{
    CreateBankAccount, DebitBankAccount, DeleteBankAccount, GetBankAccount, GetBankAccountByUser,
    SetBalance, VerifyBankAccount,
};
use tungsten::operations::product::{AddProduct, GetProduct};
use tungsten::operations::security::{GetUser, VerifyCredentials};
use tungsten::repository::{self, user::ensure_first_admin, UserRepository};
use tungsten::settings::FirstAdmin;

fn bus_for(db: &TestDb) -> Bus {
    let bus = Bus::new();
    repository::register_all(&bus, db.connection().clone()).expect("Failed to register repositories");
    bus
}

fn product(code: &str, price: f64) -> Product {
    Product {
        code: code.to_string(),
        name: Some("Sparkling water".to_string()),
        price,
        image: None,
        ingredients: None,
        brand: Some("Source".to_string()),
        nutri_score: Some("a".to_string()),
        raw: Some(json!({ "code": code, "brands": "Source" })),
    }
}

#[tokio::test]
async fn test_user_credentials() {
    let test_db = TestDb::new().await;
    let alice = UserBuilder::new("alice")
        .with_password("Secret123")
        .with_email("alice@tungsten.ovh")
        .create(test_db.connection())
        .await;
    let bus = bus_for(&test_db);

    let found = bus
        .ask::<VerifyCredentials>(("alice".into(), "Secret123".into()))
        .await
        .unwrap();
    assert_eq!(found, Some(alice.clone()));

    let wrong = bus
        .ask::<VerifyCredentials>(("alice".into(), "secret123".into()))
        .await
        .unwrap();
    assert_eq!(wrong, None);

    let unknown = bus
        .ask::<VerifyCredentials>(("nobody".into(), "Secret123".into()))
        .await
        .unwrap();
    assert_eq!(unknown, None);

    let by_id = bus.ask::<GetUser>(alice.id).await.unwrap().unwrap();
    assert_eq!(by_id.email.as_deref(), Some("alice@tungsten.ovh"));
    assert_eq!(by_id.role, "user");
    assert!(bus.ask::<GetUser>(alice.id + 100).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unique_username_and_email() {
    let test_db = TestDb::new().await;
    UserBuilder::new("alice")
        .with_email("alice@tungsten.ovh")
        .create(test_db.connection())
        .await;

    let repo = UserRepository::new(test_db.connection().clone());
    let err = repo
        .create(tungsten::model::NewUser {
            username: "alice".into(),
            email: None,
            password: "Password123".into(),
            role: "user".into(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "security:user:username_taken");

    let err = repo
        .create(tungsten::model::NewUser {
            username: "alicia".into(),
            email: Some("alice@tungsten.ovh".into()),
            password: "Password123".into(),
            role: "user".into(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "security:user:email_taken");
}

#[tokio::test]
async fn test_ensure_first_admin_is_idempotent() {
    let test_db = TestDb::new().await;
    let admin = FirstAdmin::default();

    ensure_first_admin(test_db.connection(), &admin).await.unwrap();
    ensure_first_admin(test_db.connection(), &admin).await.unwrap();

    let repo = UserRepository::new(test_db.connection().clone());
    let stored = repo
        .verify_credentials(&admin.username, &admin.password)
        .await
        .unwrap()
        .expect("Administrator should be able to log in");
    assert_eq!(stored.role, "super-manager");
}

#[tokio::test]
async fn test_bank_account_lifecycle() {
    let test_db = TestDb::new().await;
    let alice = UserBuilder::new("alice").create(test_db.connection()).await;
    let bus = bus_for(&test_db);

    let account = bus
        .ask::<CreateBankAccount>(NewBankAccount {
            user_id: Some(alice.id),
            balance: 20.0,
        })
        .await
        .unwrap();
    assert_eq!(account.vcc.len(), 4);
    assert_eq!(account.user_id, Some(alice.id));

    let by_user = bus.ask::<GetBankAccountByUser>(alice.id).await.unwrap();
    assert_eq!(by_user, Some(account.clone()));

    assert!(bus
        .ask::<VerifyBankAccount>((account.id.clone(), account.vcc.clone()))
        .await
        .unwrap());
    let wrong_vcc = if account.vcc == "0000" { "0001" } else { "0000" };
    assert!(!bus
        .ask::<VerifyBankAccount>((account.id.clone(), wrong_vcc.to_string()))
        .await
        .unwrap());
    assert!(!bus
        .ask::<VerifyBankAccount>(("missing".to_string(), account.vcc.clone()))
        .await
        .unwrap());

    let updated = bus
        .ask::<SetBalance>((account.id.clone(), 7.5))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.balance, 7.5);
    assert!(bus
        .ask::<SetBalance>(("missing".to_string(), 1.0))
        .await
        .unwrap()
        .is_none());

    assert!(bus.ask::<DeleteBankAccount>(account.id.clone()).await.unwrap());
    assert!(!bus.ask::<DeleteBankAccount>(account.id.clone()).await.unwrap());
    assert!(bus.ask::<GetBankAccount>(account.id).await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_debits_never_overdraw() {
    let test_db = TestDb::new().await;
    let bus = std::sync::Arc::new(bus_for(&test_db));

    let account = bus
        .ask::<CreateBankAccount>(NewBankAccount {
            user_id: None,
            balance: 10.0,
        })
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let bus = bus.clone();
        let id = account.id.clone();
        handles.push(tokio::spawn(async move {
            bus.ask::<DebitBankAccount>((id, 10.0)).await.unwrap()
        }));
    }

    let mut debited = 0;
    for handle in handles {
        if let Some(updated) = handle.await.unwrap() {
            assert_eq!(updated.balance, 0.0);
            debited += 1;
        }
    }
    assert_eq!(debited, 1);

    let stored = bus.ask::<GetBankAccount>(account.id.clone()).await.unwrap().unwrap();
    assert_eq!(stored.balance, 0.0);
    assert!(bus
        .ask::<DebitBankAccount>(("missing".to_string(), 1.0))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_unowned_account() {
    let test_db = TestDb::new().await;
    let bus = bus_for(&test_db);

    let account = bus
        .ask::<CreateBankAccount>(NewBankAccount::default())
        .await
        .unwrap();
    assert_eq!(account.user_id, None);
    assert_eq!(account.balance, 0.0);
}

#[tokio::test]
async fn test_product_catalog() {
    let test_db = TestDb::new().await;
    let bus = bus_for(&test_db);

    assert!(bus.ask::<GetProduct>("5449000000996".into()).await.unwrap().is_none());

    let stored = bus
        .ask::<AddProduct>(product("5449000000996", 1.2))
        .await
        .unwrap();
    assert_eq!(stored.raw.as_ref().unwrap()["brands"], "Source");

    let fetched = bus
        .ask::<GetProduct>("5449000000996".into())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched, stored);

    // A second add for the same code keeps the first row
    let again = bus
        .ask::<AddProduct>(product("5449000000996", 9.9))
        .await
        .unwrap();
    assert_eq!(again.price, 1.2);
}
