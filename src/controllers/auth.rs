use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Method;
use serde_json::json;

use super::{Resource, RouteDecl};
use crate::bus::{Bus, Operation};
use crate::errors::{BackendError, Result};
use crate::model::{NewBankAccount, NewUser};
use crate::operations::bank_account::CreateBankAccount;
use crate::operations::security::{CreateToken, CreateUser, VerifyCredentials, VerifyToken};
use crate::request::{Payload, Request};
use crate::settings::Auth as AuthCfg;

pub const DEFAULT_ROLE: &str = "user";

actions!(Action {
    Login => "login",
    Logout => "logout",
    Register => "register",
    CheckToken => "checkToken",
    GetMyUser => "getMyUser",
});

pub struct AuthController {
    bus: Arc<Bus>,
    cfg: AuthCfg,
}

impl AuthController {
    pub fn new(bus: Arc<Bus>, cfg: AuthCfg) -> Self {
        Self { bus, cfg }
    }

    async fn login(&self, req: &Request) -> Result<Payload> {
        let username = req.get_body_string("username")?;
        let password = req.get_body_string("password")?;

        let user = self
            .bus
            .ask::<VerifyCredentials>((username, password))
            .await?
            .ok_or(BackendError::InvalidCredentials)?;
        let jwt = self.bus.ask::<CreateToken>(user.id).await?;

        tracing::info!(user_id = user.id, "User logged in");
        Ok(Payload::Json(json!({ "jwt": jwt })))
    }

    async fn register(&self, req: &Request) -> Result<Payload> {
        let username = req.get_body_string("username")?;
        let password = req.get_body_string("password")?;
        let email = match req.get_body_string("email") {
            Ok(email) => Some(email),
            Err(BackendError::MissingArgument(_)) => None,
            Err(e) => return Err(e),
        };

        self.validate_username(&username)?;
        self.validate_password(&password)?;
        if let Some(email) = &email {
            validate_email(email)?;
        }

        let user = self
            .bus
            .ask::<CreateUser>(NewUser {
                username,
                email,
                password,
                role: DEFAULT_ROLE.to_string(),
            })
            .await?;
        let account = self
            .bus
            .ask::<CreateBankAccount>(NewBankAccount {
                user_id: Some(user.id),
                balance: 0.0,
            })
            .await?;
        let jwt = self.bus.ask::<CreateToken>(user.id).await?;

        tracing::info!(user_id = user.id, account_id = %account.id, "Registered user");
        Ok(Payload::Json(json!({ "user": user, "jwt": jwt })))
    }

    async fn check_token(&self, req: &Request) -> Result<Payload> {
        let token = match req.get_body_string("token") {
            Ok(token) => Some(token),
            Err(BackendError::MissingArgument(_)) => req.get_jwt().map(str::to_string),
            Err(e) => return Err(e),
        };
        let claims = self.bus.ask::<VerifyToken>(token).await?;
        Ok(Payload::Json(json!({ "valid": claims.is_some() })))
    }

    fn validate_username(&self, username: &str) -> Result<()> {
        if username.chars().count() < self.cfg.username_min_length {
            return Err(BackendError::UsernameTooShort(self.cfg.username_min_length));
        }
        Ok(())
    }

    fn validate_password(&self, password: &str) -> Result<()> {
        if password.chars().count() < self.cfg.password_min_length {
            return Err(BackendError::PasswordTooShort(self.cfg.password_min_length));
        }
        let has_upper = password.chars().any(char::is_uppercase);
        let has_digit = password.chars().any(|c| c.is_ascii_digit());
        if !has_upper || !has_digit {
            return Err(BackendError::PasswordTooWeak);
        }
        Ok(())
    }
}

fn validate_email(email: &str) -> Result<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.split('.').count() >= 2
                && domain.split('.').all(|part| !part.is_empty())
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(BackendError::InvalidEmailFormat)
    }
}

#[async_trait]
impl Resource for AuthController {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn routes(&self) -> Vec<RouteDecl> {
        vec![
            RouteDecl::new(Method::POST, "/login", "login"),
            RouteDecl::new(Method::POST, "/logout", "logout"),
            RouteDecl::new(Method::POST, "/register", "register"),
            RouteDecl::new(Method::GET, "/_checkToken", "checkToken"),
            RouteDecl::new(Method::GET, "/_me", "getMyUser"),
        ]
    }

    fn handles(&self, action: &str) -> bool {
        Action::from_name(action).is_some()
    }

    async fn init(&self) -> Result<()> {
        self.bus.require(&[
            VerifyToken::NAME,
            CreateToken::NAME,
            VerifyCredentials::NAME,
            CreateUser::NAME,
            CreateBankAccount::NAME,
        ])
    }

    async fn call(&self, action: &str, req: &Request) -> Result<Payload> {
        match Action::from_name(action) {
            Some(Action::Login) => self.login(req).await,
            // Tokens are stateless; clients drop theirs.
            Some(Action::Logout) => Ok(Payload::Json(json!(true))),
            Some(Action::Register) => self.register(req).await,
            Some(Action::CheckToken) => self.check_token(req).await,
            Some(Action::GetMyUser) => Payload::json(req.get_user()?),
            None => Err(BackendError::MissingAction {
                path: req.raw().path.clone(),
                resource: self.name().to_string(),
                action: action.to_string(),
            }),
        }
    }
}
