use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::authz::{PermissionEvaluator, Policy};
use crate::bus::Bus;
use crate::controllers::{self, Resource};
use crate::errors::Result;
use crate::funnel::Funnel;
use crate::rate_limit::RateLimiter;
use crate::repository;
use crate::request::{RawRequest, Request};
use crate::security::TokenService;
use crate::settings::{RateLimit, Settings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BackendState {
    Starting = 0,
    Running = 1,
    ShuttingDown = 2,
}

impl BackendState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => BackendState::Starting,
            1 => BackendState::Running,
            _ => BackendState::ShuttingDown,
        }
    }
}

/// Shared, lock-free view of the backend lifecycle.
#[derive(Debug, Clone)]
pub struct StateHandle(Arc<AtomicU8>);

impl Default for StateHandle {
    fn default() -> Self {
        Self(Arc::new(AtomicU8::new(BackendState::Starting as u8)))
    }
}

impl StateHandle {
    pub fn get(&self) -> BackendState {
        BackendState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: BackendState) {
        self.0.store(state as u8, Ordering::Release);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.get() == BackendState::ShuttingDown
    }
}

pub struct Backend {
    bus: Arc<Bus>,
    funnel: Funnel,
    rate_limiter: Arc<RateLimiter>,
    state: StateHandle,
}

impl Backend {
    /// Register every service on a fresh bus and assemble the full backend.
    pub async fn start(settings: &Settings, policy: Policy, db: DatabaseConnection) -> Result<Self> {
        let bus = Arc::new(Bus::new());

        repository::register_all(&bus, db)?;
        TokenService::new(&settings.auth).register(&bus)?;
        repository::product_lookup::ProductLookup::new(&settings.products)?.register(&bus)?;

        let resources = controllers::all(bus.clone(), settings);
        let backend = Self::assemble(bus, resources, policy, &settings.rate_limit).await?;

        tracing::info!(
            operations = backend.bus.operations().len(),
            "Backend started"
        );
        Ok(backend)
    }

    /// Build the funnel over an already populated bus.
    pub async fn assemble(
        bus: Arc<Bus>,
        resources: Vec<Arc<dyn Resource>>,
        policy: Policy,
        rate: &RateLimit,
    ) -> Result<Self> {
        let state = StateHandle::default();
        let rate_limiter = Arc::new(RateLimiter::new(policy.rate_limits, rate.window()));

        let mut funnel = Funnel::new(
            bus.clone(),
            PermissionEvaluator::new(policy.permissions),
            rate_limiter.clone(),
            rate.anonymous_key,
            state.clone(),
        );
        funnel.init(resources).await?;

        state.set(BackendState::Running);
        Ok(Self {
            bus,
            funnel,
            rate_limiter,
            state,
        })
    }

    pub async fn execute(&self, raw: RawRequest) -> Result<Request> {
        self.funnel.execute(raw).await
    }

    pub fn bus(&self) -> &Arc<Bus> {
        &self.bus
    }

    pub fn funnel(&self) -> &Funnel {
        &self.funnel
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn state(&self) -> &StateHandle {
        &self.state
    }

    /// New requests are rejected from here on; requests already admitted run to completion.
    pub fn shutdown(&self) {
        if !self.state.is_shutting_down() {
            tracing::info!("Backend shutting down");
            self.state.set(BackendState::ShuttingDown);
        }
    }
}
