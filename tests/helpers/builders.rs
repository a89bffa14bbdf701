use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Method;
use sea_orm::DatabaseConnection;
use serde_json::json;
use tungsten::bus::Bus;
use tungsten::controllers::{Resource, RouteDecl};
use tungsten::errors::{BackendError, Result};
use tungsten::model::{NewUser, TokenClaims, UserInfo};
use tungsten::operations::security::{GetUser, VerifyToken};
use tungsten::repository::UserRepository;
use tungsten::request::{Payload, Request};

/// Builder for creating test users
pub struct UserBuilder {
    username: String,
    password: String,
    email: Option<String>,
    role: String,
}

impl UserBuilder {
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            password: "Password123".to_string(),
            email: None,
            role: "user".to_string(),
        }
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = password.to_string();
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn with_role(mut self, role: &str) -> Self {
        self.role = role.to_string();
        self
    }

    pub async fn create(self, db: &DatabaseConnection) -> UserInfo {
        UserRepository::new(db.clone())
            .create(NewUser {
                username: self.username,
                email: self.email,
                password: self.password,
                role: self.role,
            })
            .await
            .expect("Failed to create test user")
    }
}

/// Token accepted by [`stub_security`] for `user_id`.
pub fn token_for(user_id: i32) -> String {
    format!("token-{user_id}")
}

/// Register token verification and user lookup answering for `users` only.
/// Tokens are `token-<id>`; anything else verifies to no identity.
pub fn stub_security(bus: &Bus, users: Vec<UserInfo>) {
    bus.on_ask::<VerifyToken, _, _>(|token| async move {
        Ok(token
            .as_deref()
            .and_then(|t| t.strip_prefix("token-"))
            .and_then(|id| id.parse().ok())
            .map(|user_id| TokenClaims { user_id }))
    })
    .expect("Failed to register token stub");

    let users: Arc<HashMap<i32, UserInfo>> =
        Arc::new(users.into_iter().map(|u| (u.id, u)).collect());
    bus.on_ask::<GetUser, _, _>(move |id| {
        let users = users.clone();
        async move { Ok(users.get(&id).cloned()) }
    })
    .expect("Failed to register user stub");
}

pub fn user(id: i32, username: &str, role: &str) -> UserInfo {
    UserInfo {
        id,
        username: username.to_string(),
        email: None,
        role: role.to_string(),
    }
}

/// Resource answering every declared action with a JSON echo of the request.
pub struct StubResource {
    name: &'static str,
    routes: Vec<RouteDecl>,
    missing: Vec<&'static str>,
    required: Vec<&'static str>,
    bus: Option<Arc<Bus>>,
    calls: Arc<AtomicUsize>,
}

impl StubResource {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            routes: Vec::new(),
            missing: Vec::new(),
            required: Vec::new(),
            bus: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn route(mut self, verb: Method, path: &'static str, action: &'static str) -> Self {
        self.routes.push(RouteDecl::new(verb, path, action));
        self
    }

    /// Declare a route whose action `call` does not answer.
    pub fn unhandled_route(mut self, verb: Method, path: &'static str, action: &'static str) -> Self {
        self.missing.push(action);
        self.route(verb, path, action)
    }

    /// Fail `init` unless `operations` are registered on `bus`.
    pub fn requires(mut self, bus: Arc<Bus>, operations: &[&'static str]) -> Self {
        self.bus = Some(bus);
        self.required = operations.to_vec();
        self
    }

    /// Counter of dispatched calls, shared with the resource.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    pub fn into_resource(self) -> Arc<dyn Resource> {
        Arc::new(self)
    }
}

#[async_trait]
impl Resource for StubResource {
    fn name(&self) -> &'static str {
        self.name
    }

    fn routes(&self) -> Vec<RouteDecl> {
        self.routes.clone()
    }

    fn handles(&self, action: &str) -> bool {
        self.routes.iter().any(|r| r.action == action) && !self.missing.contains(&action)
    }

    async fn init(&self) -> Result<()> {
        match &self.bus {
            Some(bus) => bus.require(&self.required),
            None => Ok(()),
        }
    }

    async fn call(&self, action: &str, req: &Request) -> Result<Payload> {
        if !self.handles(action) {
            return Err(BackendError::MissingAction {
                path: req.raw().path.clone(),
                resource: self.name.to_string(),
                action: action.to_string(),
            });
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Payload::Json(json!({
            "controller": req.get_controller(),
            "action": action,
            "params": req.params(),
            "userId": req.user_id(),
        })))
    }
}
