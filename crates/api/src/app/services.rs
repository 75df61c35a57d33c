use std::{
    collections::HashMap,
    convert::Infallible,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};

use eventhire_auth::user::UserStatus;
use eventhire_auth::{
    Hs256TokenService, JwtClaims, PasswordHash, PrincipalId, StaffRole, TokenCodecError, User,
    UserCommand, UserId,
};
use eventhire_catalog::ProductId;
use eventhire_core::{AggregateId, DomainError};
use eventhire_customers::CustomerId;
use eventhire_events::{EventBus, EventEnvelope, InMemoryEventBus};
use eventhire_incidents::{IncidentId, VoidPolicy};
use eventhire_infra::{
    command_dispatcher::{CommandDispatcher, DispatchError},
    event_store::{EventStore, InMemoryEventStore, PostgresEventStore, StoredEvent},
    incident_engine::IncidentWorkflowEngine,
    projections::{
        CatalogProjection, CustomerReadModel, CustomersProjection, IncidentRecord,
        IncidentsProjection, ProductReadModel, RentalOrderReadModel, RentalsProjection,
        StaffProjection, StaffRecord,
    },
    read_model::InMemoryKeyStore,
    streams,
};
use eventhire_rentals::RentalOrderId;

/// Realtime message broadcast to SSE subscribers after projections update.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RealtimeMessage {
    pub topic: String,
    pub payload: JsonValue,
}

type SharedStore = Arc<dyn EventStore>;
type SharedBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

pub type SharedCatalog = Arc<CatalogProjection<Arc<InMemoryKeyStore<ProductId, ProductReadModel>>>>;
pub type SharedCustomers =
    Arc<CustomersProjection<Arc<InMemoryKeyStore<CustomerId, CustomerReadModel>>>>;
pub type SharedRentals =
    Arc<RentalsProjection<Arc<InMemoryKeyStore<RentalOrderId, RentalOrderReadModel>>>>;
pub type SharedIncidents =
    Arc<IncidentsProjection<Arc<InMemoryKeyStore<IncidentId, IncidentRecord>>>>;
pub type SharedStaff = Arc<StaffProjection<Arc<InMemoryKeyStore<UserId, StaffRecord>>>>;

pub type SharedEngine = IncidentWorkflowEngine<SharedStore, SharedBus, SharedIncidents>;

const MAX_FAILED_LOGINS: u32 = 3;
const LOCKOUT_MINUTES: i64 = 15;
const TOKEN_TTL_HOURS: i64 = 8;

/// Per-username failed-login throttle.
///
/// After [`MAX_FAILED_LOGINS`] consecutive failures the account is locked for
/// [`LOCKOUT_MINUTES`]; a successful login clears the counter.
#[derive(Debug, Default)]
pub struct LoginThrottle {
    inner: Mutex<HashMap<String, FailureState>>,
}

#[derive(Debug, Default, Clone, Copy)]
struct FailureState {
    failures: u32,
    locked_until: Option<DateTime<Utc>>,
}

impl LoginThrottle {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, FailureState>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// `Err(until)` when the username is currently locked out.
    pub fn check(&self, username: &str, now: DateTime<Utc>) -> Result<(), DateTime<Utc>> {
        let mut map = self.lock();
        if let Some(state) = map.get_mut(username) {
            if let Some(until) = state.locked_until {
                if now < until {
                    return Err(until);
                }
                // Lockout elapsed; start a fresh window.
                *state = FailureState::default();
            }
        }
        Ok(())
    }

    pub fn record_failure(&self, username: &str, now: DateTime<Utc>) {
        let mut map = self.lock();
        let state = map.entry(username.to_string()).or_default();
        state.failures += 1;
        if state.failures >= MAX_FAILED_LOGINS {
            state.locked_until = Some(now + chrono::Duration::minutes(LOCKOUT_MINUTES));
        }
    }

    pub fn record_success(&self, username: &str) {
        self.lock().remove(username);
    }
}

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("account locked until {until}")]
    Locked { until: DateTime<Utc> },

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("account is suspended")]
    Suspended,

    #[error(transparent)]
    Token(#[from] TokenCodecError),
}

pub struct LoginSuccess {
    pub token: String,
    pub claims: JwtClaims,
}

/// Shared application services: event store, bus, dispatcher, projections,
/// and the incident workflow engine.
pub struct AppServices {
    dispatcher: CommandDispatcher<SharedStore, SharedBus>,
    engine: SharedEngine,
    catalog: SharedCatalog,
    customers: SharedCustomers,
    rentals: SharedRentals,
    incidents: SharedIncidents,
    staff: SharedStaff,
    tokens: Arc<Hs256TokenService>,
    logins: LoginThrottle,
    realtime_tx: broadcast::Sender<RealtimeMessage>,
}

/// Wire up the full service graph.
///
/// The event store backend is chosen at startup: `DATABASE_URL` set means
/// Postgres, otherwise everything runs in memory (dev/test).
pub async fn build_services(tokens: Arc<Hs256TokenService>) -> AppServices {
    let store: SharedStore = match std::env::var("DATABASE_URL") {
        Ok(url) if !url.trim().is_empty() => {
            let pool = sqlx::PgPool::connect(&url)
                .await
                .expect("failed to connect to Postgres");
            tracing::info!("event store backend: postgres");
            Arc::new(PostgresEventStore::new(pool))
        }
        _ => {
            tracing::info!("event store backend: in-memory");
            Arc::new(InMemoryEventStore::new())
        }
    };

    let bus: SharedBus = Arc::new(InMemoryEventBus::new());

    let catalog: SharedCatalog = Arc::new(CatalogProjection::new(Arc::new(InMemoryKeyStore::new())));
    let customers: SharedCustomers =
        Arc::new(CustomersProjection::new(Arc::new(InMemoryKeyStore::new())));
    let rentals: SharedRentals = Arc::new(RentalsProjection::new(Arc::new(InMemoryKeyStore::new())));
    let incidents: SharedIncidents =
        Arc::new(IncidentsProjection::new(Arc::new(InMemoryKeyStore::new())));
    let staff: SharedStaff = Arc::new(StaffProjection::new(Arc::new(InMemoryKeyStore::new())));

    // Realtime channel (SSE): lossy broadcast, consumers resync via reads.
    let (realtime_tx, _realtime_rx) = broadcast::channel::<RealtimeMessage>(256);

    // Background subscriber: bus -> projections. Each projection skips streams
    // it does not own, so every envelope is offered to all of them.
    {
        let sub = bus.subscribe();
        let catalog = catalog.clone();
        let customers = customers.clone();
        let rentals = rentals.clone();
        let incidents = incidents.clone();
        let staff = staff.clone();
        let realtime_tx = realtime_tx.clone();
        tokio::task::spawn_blocking(move || {
            loop {
                match sub.recv() {
                    Ok(env) => {
                        let applied = catalog
                            .apply_envelope(&env)
                            .and_then(|_| customers.apply_envelope(&env))
                            .and_then(|_| rentals.apply_envelope(&env))
                            .and_then(|_| incidents.apply_envelope(&env))
                            .and_then(|_| staff.apply_envelope(&env));

                        if let Err(e) = applied {
                            tracing::warn!("projection apply failed: {e}");
                            continue;
                        }

                        let _ = realtime_tx.send(RealtimeMessage {
                            topic: format!("{}.projection_updated", env.aggregate_type()),
                            payload: serde_json::json!({
                                "kind": "projection_update",
                                "aggregate_type": env.aggregate_type(),
                                "aggregate_id": env.aggregate_id().to_string(),
                                "sequence_number": env.sequence_number(),
                            }),
                        });
                    }
                    Err(_) => break,
                }
            }
        });
    }

    let dispatcher = CommandDispatcher::new(store.clone(), bus.clone());

    let void_policy = match std::env::var("INCIDENT_VOID_POLICY").as_deref() {
        Ok("write_off") => VoidPolicy::WriteOff,
        _ => VoidPolicy::RestoreStock,
    };
    let engine = IncidentWorkflowEngine::new(store, bus, incidents.clone(), void_policy);

    let services = AppServices {
        dispatcher,
        engine,
        catalog,
        customers,
        rentals,
        incidents,
        staff,
        tokens,
        logins: LoginThrottle::default(),
        realtime_tx,
    };

    services.seed_bootstrap_admin();
    services
}

impl AppServices {
    pub fn engine(&self) -> &SharedEngine {
        &self.engine
    }

    pub fn catalog(&self) -> &SharedCatalog {
        &self.catalog
    }

    pub fn customers(&self) -> &SharedCustomers {
        &self.customers
    }

    pub fn rentals(&self) -> &SharedRentals {
        &self.rentals
    }

    pub fn incidents(&self) -> &SharedIncidents {
        &self.incidents
    }

    pub fn staff(&self) -> &SharedStaff {
        &self.staff
    }

    pub fn realtime_tx(&self) -> &broadcast::Sender<RealtimeMessage> {
        &self.realtime_tx
    }

    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: eventhire_core::Aggregate<Error = DomainError>,
        A::Event: eventhire_events::Event + serde::Serialize + serde::de::DeserializeOwned,
    {
        self.dispatcher
            .dispatch::<A>(aggregate_id, aggregate_type, command, make_aggregate)
    }

    /// Authenticate a staff member and issue a session token.
    pub fn login(
        &self,
        username: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<LoginSuccess, LoginError> {
        if let Err(until) = self.logins.check(username, now) {
            return Err(LoginError::Locked { until });
        }

        let Some(record) = self.staff.by_username(username) else {
            self.logins.record_failure(username, now);
            return Err(LoginError::InvalidCredentials);
        };

        if !record.password.verify(password) {
            self.logins.record_failure(username, now);
            return Err(LoginError::InvalidCredentials);
        }

        if record.status == UserStatus::Suspended {
            return Err(LoginError::Suspended);
        }

        self.logins.record_success(username);

        let claims = JwtClaims {
            sub: PrincipalId::from_uuid(*record.user_id.0.as_uuid()),
            username: record.username.clone(),
            role: record.role,
            group: record.access_group,
            issued_at: now,
            expires_at: now + chrono::Duration::hours(TOKEN_TTL_HOURS),
        };
        let token = self.tokens.issue(&claims)?;

        Ok(LoginSuccess { token, claims })
    }

    /// Seed an administrator account when the staff directory is empty, so a
    /// fresh deployment has a login. Credentials come from `ADMIN_USERNAME` /
    /// `ADMIN_PASSWORD`.
    fn seed_bootstrap_admin(&self) {
        if !self.staff.list().is_empty() {
            return;
        }

        let username = std::env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string());
        let password = std::env::var("ADMIN_PASSWORD").unwrap_or_else(|_| {
            tracing::warn!("ADMIN_PASSWORD not set; using insecure dev default");
            "changeme123".to_string()
        });

        let hash = match PasswordHash::create(&password) {
            Ok(hash) => hash,
            Err(e) => {
                tracing::error!("bootstrap admin password rejected: {e}");
                return;
            }
        };

        let user_id = UserId::new(AggregateId::new());
        let command = UserCommand::CreateUser(eventhire_auth::user::CreateUser {
            user_id,
            username: username.clone(),
            display_name: "Administrator".to_string(),
            email: "admin@localhost".to_string(),
            phone: None,
            national_id: None,
            hired_on: None,
            role: StaffRole::Administrator,
            superuser: true,
            password: hash,
            occurred_at: Utc::now(),
        });

        match self.dispatch::<User>(user_id.0, streams::USER, command, |id| {
            User::empty(UserId::new(id))
        }) {
            Ok(committed) => {
                // Apply directly so login works before the bus catches up; the
                // pump's duplicate delivery is skipped by the cursor check.
                for stored in &committed {
                    if let Err(e) = self.staff.apply_envelope(&stored.to_envelope()) {
                        tracing::warn!("bootstrap admin projection apply failed: {e}");
                    }
                }
                tracing::info!(%username, "bootstrap administrator created");
            }
            Err(e) => tracing::error!("bootstrap admin creation failed: {e:?}"),
        }
    }
}

/// Build the SSE stream for `/stream`.
pub fn realtime_sse_stream(
    services: Arc<AppServices>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.realtime_tx().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(m) => {
            let data = serde_json::to_string(&m.payload).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(m.topic).data(data)))
        }
        // Lagged receivers just skip; the store is the source of truth.
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
