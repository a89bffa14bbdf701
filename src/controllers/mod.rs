//! Dispatchable resources.
//!
//! A resource declares its routes, answers the actions those routes name, and
//! checks in `init` that the bus operations it relies on are registered. The
//! funnel composes resources; they never reference each other.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Method;

use crate::bus::Bus;
use crate::errors::Result;
use crate::request::{Payload, Request};
use crate::settings::Settings;

/// Declares a private action enum with a lookup from its wire name.
macro_rules! actions {
    ($name:ident { $($variant:ident => $action:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        enum $name {
            $($variant),+
        }

        impl $name {
            fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($action => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

pub mod auth;
pub mod balance;
pub mod bank_account;
pub mod download;
pub mod product;

pub use auth::AuthController;
pub use balance::BalanceController;
pub use bank_account::BankAccountController;
pub use download::DownloadController;
pub use product::ProductController;

/// One route a resource exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecl {
    pub verb: Method,
    pub path: &'static str,
    pub action: &'static str,
    /// Mounted at `path` itself instead of under `/api/<resource>`
    pub root_path: bool,
}

impl RouteDecl {
    pub fn new(verb: Method, path: &'static str, action: &'static str) -> Self {
        Self {
            verb,
            path,
            action,
            root_path: false,
        }
    }

    pub fn root(mut self) -> Self {
        self.root_path = true;
        self
    }

    /// Full mount path for a resource named `resource`.
    pub fn mount_path(&self, resource: &str) -> String {
        let path = self.path.trim_start_matches('/');
        match (self.root_path, path.is_empty()) {
            (true, _) => format!("/{path}"),
            (false, true) => format!("/api/{resource}"),
            (false, false) => format!("/api/{resource}/{path}"),
        }
    }
}

#[async_trait]
pub trait Resource: Send + Sync {
    /// Resource name, used as the permission table's second key and the URL prefix.
    fn name(&self) -> &'static str;

    fn routes(&self) -> Vec<RouteDecl>;

    /// Whether `call` answers `action`.
    fn handles(&self, action: &str) -> bool;

    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn call(&self, action: &str, req: &Request) -> Result<Payload>;
}

/// Every resource the backend serves, wired to `bus`.
pub fn all(bus: Arc<Bus>, settings: &Settings) -> Vec<Arc<dyn Resource>> {
    vec![
        Arc::new(AuthController::new(bus.clone(), settings.auth.clone())),
        Arc::new(BankAccountController::new(bus.clone())),
        Arc::new(BalanceController::new(bus.clone())),
        Arc::new(ProductController::new(bus)),
        Arc::new(DownloadController::new(settings.download.apk_path.clone())),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_path() {
        let route = RouteDecl::new(Method::GET, "/_admin/:accountId", "adminGetAccountInfo");
        assert_eq!(route.mount_path("bankaccount"), "/api/bankaccount/_admin/:accountId");

        let route = RouteDecl::new(Method::GET, "/", "getBalance");
        assert_eq!(route.mount_path("balance"), "/api/balance");

        let route = RouteDecl::new(Method::POST, "login", "login");
        assert_eq!(route.mount_path("auth"), "/api/auth/login");

        let route = RouteDecl::new(Method::GET, "/client.apk", "downloadAPK").root();
        assert_eq!(route.mount_path("download"), "/client.apk");
    }
}
