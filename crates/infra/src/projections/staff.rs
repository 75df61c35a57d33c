use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;

use eventhire_auth::user::{UserEvent, UserId, UserStatus};
use eventhire_auth::{AccessGroup, PasswordHash, StaffRole};
use eventhire_events::EventEnvelope;

use super::{CursorCheck, ProjectionError, StreamCursors};
use crate::read_model::KeyStore;
use crate::streams;

/// Staff read model, including the credential material the login path needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaffRecord {
    pub user_id: UserId,
    pub username: String,
    pub display_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: StaffRole,
    pub superuser: bool,
    pub access_group: AccessGroup,
    pub elevated: bool,
    pub status: UserStatus,
    pub password: PasswordHash,
}

/// Staff projection keyed by user id, with a username index for login.
#[derive(Debug)]
pub struct StaffProjection<S>
where
    S: KeyStore<UserId, StaffRecord>,
{
    store: S,
    username_index: RwLock<HashMap<String, UserId>>,
    cursors: StreamCursors,
}

impl<S> StaffProjection<S>
where
    S: KeyStore<UserId, StaffRecord>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            username_index: RwLock::new(HashMap::new()),
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, user_id: &UserId) -> Option<StaffRecord> {
        self.store.get(user_id)
    }

    pub fn by_username(&self, username: &str) -> Option<StaffRecord> {
        let user_id = *self.username_index.read().ok()?.get(username)?;
        self.store.get(&user_id)
    }

    pub fn list(&self) -> Vec<StaffRecord> {
        let mut staff = self.store.list();
        staff.sort_by(|a, b| a.username.cmp(&b.username));
        staff
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != streams::USER {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        if self.cursors.check(aggregate_id, seq)? == CursorCheck::Duplicate {
            return Ok(());
        }

        let event: UserEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let user_id = match &event {
            UserEvent::UserCreated(e) => e.user_id,
            UserEvent::ProfileUpdated(e) => e.user_id,
            UserEvent::RoleChanged(e) => e.user_id,
            UserEvent::AccessGroupSynced(e) => e.user_id,
            UserEvent::PasswordChanged(e) => e.user_id,
            UserEvent::UserSuspended(e) => e.user_id,
            UserEvent::UserReactivated(e) => e.user_id,
        };
        if user_id.0 != aggregate_id {
            return Err(ProjectionError::StreamMismatch(
                "event user_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match event {
            UserEvent::UserCreated(e) => {
                self.store.upsert(
                    e.user_id,
                    StaffRecord {
                        user_id: e.user_id,
                        username: e.username.clone(),
                        display_name: e.display_name,
                        email: e.email,
                        phone: e.phone,
                        role: e.role,
                        superuser: e.superuser,
                        access_group: AccessGroup::Standard,
                        elevated: false,
                        status: UserStatus::Active,
                        password: e.password,
                    },
                );
                if let Ok(mut index) = self.username_index.write() {
                    index.insert(e.username, e.user_id);
                }
            }
            UserEvent::ProfileUpdated(e) => {
                if let Some(mut record) = self.store.get(&e.user_id) {
                    record.display_name = e.display_name;
                    record.email = e.email;
                    record.phone = e.phone;
                    self.store.upsert(e.user_id, record);
                }
            }
            UserEvent::RoleChanged(e) => {
                if let Some(mut record) = self.store.get(&e.user_id) {
                    record.role = e.role;
                    record.superuser = e.superuser;
                    self.store.upsert(e.user_id, record);
                }
            }
            UserEvent::AccessGroupSynced(e) => {
                if let Some(mut record) = self.store.get(&e.user_id) {
                    record.access_group = e.access_group;
                    record.elevated = e.elevated;
                    self.store.upsert(e.user_id, record);
                }
            }
            UserEvent::PasswordChanged(e) => {
                if let Some(mut record) = self.store.get(&e.user_id) {
                    record.password = e.password;
                    self.store.upsert(e.user_id, record);
                }
            }
            UserEvent::UserSuspended(e) => {
                if let Some(mut record) = self.store.get(&e.user_id) {
                    record.status = UserStatus::Suspended;
                    self.store.upsert(e.user_id, record);
                }
            }
            UserEvent::UserReactivated(e) => {
                if let Some(mut record) = self.store.get(&e.user_id) {
                    record.status = UserStatus::Active;
                    self.store.upsert(e.user_id, record);
                }
            }
        }

        self.cursors.advance(aggregate_id, seq);
        Ok(())
    }

    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        self.cursors.clear();
        self.store.clear();
        if let Ok(mut index) = self.username_index.write() {
            index.clear();
        }

        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| (*e.aggregate_id().as_uuid().as_bytes(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}
