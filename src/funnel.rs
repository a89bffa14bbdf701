//! Request admission and dispatch.
//!
//! Every inbound request goes through the same strictly ordered steps:
//! shutdown check, route resolution, identity, authorization, rate admission,
//! then the resource action. A request rejected at any step never reaches the
//! later ones, so a denied request is neither counted by the rate limiter nor
//! dispatched.

use std::sync::Arc;

use crate::authz::{PermissionEvaluator, ANONYMOUS_ROLE};
use crate::backend::StateHandle;
use crate::bus::Bus;
use crate::controllers::Resource;
use crate::errors::{BackendError, Result};
use crate::operations::security::{GetUser, VerifyToken};
use crate::rate_limit::{identity_key, AnonymousKey, RateLimiter};
use crate::request::{RawRequest, Request};
use crate::router::Router;

pub struct Funnel {
    bus: Arc<Bus>,
    router: Router<Arc<dyn Resource>>,
    permissions: PermissionEvaluator,
    rate_limiter: Arc<RateLimiter>,
    anonymous_key: AnonymousKey,
    state: StateHandle,
}

impl Funnel {
    pub fn new(
        bus: Arc<Bus>,
        permissions: PermissionEvaluator,
        rate_limiter: Arc<RateLimiter>,
        anonymous_key: AnonymousKey,
        state: StateHandle,
    ) -> Self {
        Self {
            bus,
            router: Router::new(),
            permissions,
            rate_limiter,
            anonymous_key,
            state,
        }
    }

    /// Attach every declared route, then run each resource's `init` hook.
    pub async fn init(&mut self, resources: Vec<Arc<dyn Resource>>) -> Result<()> {
        for resource in &resources {
            let name = resource.name();
            tracing::debug!(resource = name, "Initializing resource");

            for route in resource.routes() {
                let path = route.mount_path(name);
                if !resource.handles(route.action) {
                    return Err(BackendError::MissingAction {
                        path: format!("{} {path}", route.verb),
                        resource: name.to_string(),
                        action: route.action.to_string(),
                    });
                }
                self.router
                    .attach(route.verb.clone(), &path, resource.clone(), name, route.action)?;
                tracing::debug!("  {} {} -> {}:{}", route.verb, path, name, route.action);
            }
        }

        for resource in &resources {
            resource.init().await?;
        }

        tracing::info!(
            resources = resources.len(),
            routes = self.router.len(),
            "Funnel initialized"
        );
        Ok(())
    }

    pub fn router(&self) -> &Router<Arc<dyn Resource>> {
        &self.router
    }

    /// Run one request through the pipeline. On success the returned request carries the result.
    pub async fn execute(&self, raw: RawRequest) -> Result<Request> {
        if self.state.is_shutting_down() {
            return Err(BackendError::Shutdown);
        }

        let (resource, mut req) = {
            let route = self
                .router
                .resolve(&raw.method, &raw.path)
                .ok_or_else(|| BackendError::UrlNotFound(raw.path.clone()))?;
            let resource = route.handler.clone();
            let (controller, action) = (route.resource.to_string(), route.action.to_string());
            (resource, Request::new(raw, &controller, &action, route.params))
        };

        self.check_rights(&mut req).await?;

        let identity = identity_key(
            req.user_id(),
            req.raw().origin.as_deref(),
            self.anonymous_key,
        );
        if !self
            .rate_limiter
            .is_allowed(&identity, req.get_controller(), req.get_action())
        {
            tracing::debug!(
                identity = %identity,
                "Rate limit exceeded for {}:{}",
                req.get_controller(),
                req.get_action()
            );
            return Err(BackendError::RateLimitExceeded {
                resource: req.get_controller().to_string(),
                action: req.get_action().to_string(),
            });
        }

        let result = resource.call(req.get_action(), &req).await?;
        req.set_result(result);
        Ok(req)
    }

    /// Resolve the caller's identity and check the role may run the matched action.
    async fn check_rights(&self, req: &mut Request) -> Result<()> {
        let claims = self
            .bus
            .ask::<VerifyToken>(req.get_jwt().map(str::to_string))
            .await?;
        req.set_identity(claims.map(|c| c.user_id));

        let role = match req.user_id() {
            None => {
                tracing::debug!("Request made as anonymous");
                ANONYMOUS_ROLE.to_string()
            }
            Some(user_id) => {
                let user = self
                    .bus
                    .ask::<GetUser>(user_id)
                    .await?
                    .ok_or(BackendError::UserWithIdNotFound(user_id))?;
                tracing::debug!(
                    "Request made as {} (ID: {}, role: {})",
                    user.username,
                    user.id,
                    user.role
                );
                let role = user.role.clone();
                req.set_user(user);
                role
            }
        };

        if !self
            .permissions
            .is_allowed(&role, req.get_controller(), req.get_action())
        {
            tracing::debug!(
                "Insufficient permissions to execute {}:{}",
                req.get_controller(),
                req.get_action()
            );
            return Err(BackendError::PermissionDenied {
                resource: req.get_controller().to_string(),
                action: req.get_action().to_string(),
            });
        }
        Ok(())
    }
}
