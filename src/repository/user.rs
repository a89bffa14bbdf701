use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::bus::Bus;
use crate::entities::user::{self, Column, Entity};
use crate::errors::{BackendError, Result};
use crate::model::{NewUser, UserInfo};
use crate::operations::security::{CreateUser, GetUser, VerifyCredentials};
use crate::settings::FirstAdmin;

impl From<user::Model> for UserInfo {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            role: model.role,
        }
    }
}

fn hash_password(password: &str) -> Result<String> {
    use argon2::password_hash::{rand_core::OsRng, SaltString};
    use argon2::{Argon2, PasswordHasher};

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| BackendError::Other(format!("Password hashing failed: {}", e)))
}

fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
    use argon2::{Argon2, PasswordHash, PasswordVerifier};

    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|e| BackendError::Other(format!("Invalid password hash: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[derive(Clone)]
pub struct UserRepository {
    db: DatabaseConnection,
}

impl UserRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn get(&self, id: i32) -> Result<Option<UserInfo>> {
        Ok(Entity::find_by_id(id).one(&self.db).await?.map(Into::into))
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<user::Model>> {
        Ok(Entity::find()
            .filter(Column::Username.eq(username))
            .one(&self.db)
            .await?)
    }

    pub async fn create(&self, new_user: NewUser) -> Result<UserInfo> {
        if self.get_by_username(&new_user.username).await?.is_some() {
            return Err(BackendError::UsernameTaken);
        }
        if let Some(email) = &new_user.email {
            let existing = Entity::find()
                .filter(Column::Email.eq(email.as_str()))
                .one(&self.db)
                .await?;
            if existing.is_some() {
                return Err(BackendError::EmailTaken);
            }
        }

        let model = user::ActiveModel {
            username: Set(new_user.username),
            email: Set(new_user.email),
            password_hash: Set(hash_password(&new_user.password)?),
            role: Set(new_user.role),
            created_at: Set(Utc::now().timestamp()),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        tracing::info!(user_id = model.id, username = %model.username, role = %model.role, "Created user");
        Ok(model.into())
    }

    /// The user when `password` matches, `None` for an unknown user or a wrong password.
    pub async fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<UserInfo>> {
        let Some(model) = self.get_by_username(username).await? else {
            return Ok(None);
        };
        if verify_password(password, &model.password_hash)? {
            Ok(Some(model.into()))
        } else {
            Ok(None)
        }
    }

    pub fn register(self, bus: &Bus) -> Result<()> {
        let repo = self.clone();
        bus.on_ask::<GetUser, _, _>(move |id| {
            let repo = repo.clone();
            async move { repo.get(id).await }
        })?;

        let repo = self.clone();
        bus.on_ask::<VerifyCredentials, _, _>(move |(username, password)| {
            let repo = repo.clone();
            async move { repo.verify_credentials(&username, &password).await }
        })?;

        bus.on_ask::<CreateUser, _, _>(move |new_user| {
            let repo = self.clone();
            async move { repo.create(new_user).await }
        })?;
        Ok(())
    }
}

/// Create the configured administrator unless a user with that name already exists.
pub async fn ensure_first_admin(db: &DatabaseConnection, admin: &FirstAdmin) -> Result<()> {
    let repo = UserRepository::new(db.clone());
    if repo.get_by_username(&admin.username).await?.is_some() {
        return Ok(());
    }

    repo.create(NewUser {
        username: admin.username.clone(),
        email: admin.email.clone(),
        password: admin.password.clone(),
        role: admin.role.clone(),
    })
    .await?;
    tracing::info!(username = %admin.username, role = %admin.role, "Created first administrator");
    Ok(())
}
