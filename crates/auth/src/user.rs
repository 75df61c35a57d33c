//! Staff user aggregate: identity, credentials, role, and access group.
//!
//! The access group is never edited directly. Every command that creates the
//! record or touches role/superuser runs the synchronizer
//! ([`crate::groups::resolve_access_group`]) and emits an `AccessGroupSynced`
//! event when membership or the elevated flag changes. The elevated flag is
//! only ever set through this path, never cleared, even when the group drops
//! back to `Standard`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use eventhire_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use eventhire_events::Event;

use crate::groups::{AccessGroup, resolve_access_group};
use crate::password::PasswordHash;
use crate::roles::StaffRole;

/// Staff user identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub AggregateId);

impl UserId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for UserId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// User account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Suspended,
}

/// Aggregate root: User (staff member).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    id: UserId,
    username: String,
    display_name: String,
    email: String,
    phone: Option<String>,
    national_id: Option<String>,
    hired_on: Option<NaiveDate>,
    role: StaffRole,
    superuser: bool,
    access_group: AccessGroup,
    elevated: bool,
    password: Option<PasswordHash>,
    status: UserStatus,
    version: u64,
    created: bool,
}

impl User {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: UserId) -> Self {
        Self {
            id,
            username: String::new(),
            display_name: String::new(),
            email: String::new(),
            phone: None,
            national_id: None,
            hired_on: None,
            role: StaffRole::Clerk,
            superuser: false,
            access_group: AccessGroup::Standard,
            elevated: false,
            password: None,
            status: UserStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> UserId {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn role(&self) -> StaffRole {
        self.role
    }

    pub fn is_superuser(&self) -> bool {
        self.superuser
    }

    pub fn access_group(&self) -> AccessGroup {
        self.access_group
    }

    pub fn is_elevated(&self) -> bool {
        self.elevated
    }

    pub fn status(&self) -> UserStatus {
        self.status
    }

    pub fn password(&self) -> Option<&PasswordHash> {
        self.password.as_ref()
    }
}

impl AggregateRoot for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Command: CreateUser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateUser {
    pub user_id: UserId,
    pub username: String,
    pub display_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub national_id: Option<String>,
    pub hired_on: Option<NaiveDate>,
    pub role: StaffRole,
    pub superuser: bool,
    pub password: PasswordHash,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateProfile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProfile {
    pub user_id: UserId,
    pub display_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeRole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRole {
    pub user_id: UserId,
    pub role: StaffRole,
    pub superuser: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetPassword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPassword {
    pub user_id: UserId,
    pub password: PasswordHash,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SuspendUser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspendUser {
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReactivateUser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactivateUser {
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserCommand {
    CreateUser(CreateUser),
    UpdateProfile(UpdateProfile),
    ChangeRole(ChangeRole),
    SetPassword(SetPassword),
    SuspendUser(SuspendUser),
    ReactivateUser(ReactivateUser),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// Event: UserCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreated {
    pub user_id: UserId,
    pub username: String,
    pub display_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub national_id: Option<String>,
    pub hired_on: Option<NaiveDate>,
    pub role: StaffRole,
    pub superuser: bool,
    pub password: PasswordHash,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProfileUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdated {
    pub user_id: UserId,
    pub display_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RoleChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleChanged {
    pub user_id: UserId,
    pub role: StaffRole,
    pub superuser: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AccessGroupSynced.
///
/// Emitted by the synchronizer when group membership or the elevated flag
/// changes. Carries the resulting state, so `apply` stays a plain assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGroupSynced {
    pub user_id: UserId,
    pub access_group: AccessGroup,
    pub elevated: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PasswordChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordChanged {
    pub user_id: UserId,
    pub password: PasswordHash,
    pub occurred_at: DateTime<Utc>,
}

/// Event: UserSuspended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSuspended {
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: UserReactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserReactivated {
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserEvent {
    UserCreated(UserCreated),
    ProfileUpdated(ProfileUpdated),
    RoleChanged(RoleChanged),
    AccessGroupSynced(AccessGroupSynced),
    PasswordChanged(PasswordChanged),
    UserSuspended(UserSuspended),
    UserReactivated(UserReactivated),
}

impl Event for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::UserCreated(_) => "auth.user.created",
            UserEvent::ProfileUpdated(_) => "auth.user.profile_updated",
            UserEvent::RoleChanged(_) => "auth.user.role_changed",
            UserEvent::AccessGroupSynced(_) => "auth.user.access_group_synced",
            UserEvent::PasswordChanged(_) => "auth.user.password_changed",
            UserEvent::UserSuspended(_) => "auth.user.suspended",
            UserEvent::UserReactivated(_) => "auth.user.reactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            UserEvent::UserCreated(e) => e.occurred_at,
            UserEvent::ProfileUpdated(e) => e.occurred_at,
            UserEvent::RoleChanged(e) => e.occurred_at,
            UserEvent::AccessGroupSynced(e) => e.occurred_at,
            UserEvent::PasswordChanged(e) => e.occurred_at,
            UserEvent::UserSuspended(e) => e.occurred_at,
            UserEvent::UserReactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for User {
    type Command = UserCommand;
    type Event = UserEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            UserEvent::UserCreated(e) => {
                self.id = e.user_id;
                self.username = e.username.clone();
                self.display_name = e.display_name.clone();
                self.email = e.email.clone();
                self.phone = e.phone.clone();
                self.national_id = e.national_id.clone();
                self.hired_on = e.hired_on;
                self.role = e.role;
                self.superuser = e.superuser;
                self.access_group = AccessGroup::Standard;
                self.elevated = false;
                self.password = Some(e.password.clone());
                self.status = UserStatus::Active;
                self.created = true;
            }
            UserEvent::ProfileUpdated(e) => {
                self.display_name = e.display_name.clone();
                self.email = e.email.clone();
                self.phone = e.phone.clone();
            }
            UserEvent::RoleChanged(e) => {
                self.role = e.role;
                self.superuser = e.superuser;
            }
            UserEvent::AccessGroupSynced(e) => {
                self.access_group = e.access_group;
                self.elevated = e.elevated;
            }
            UserEvent::PasswordChanged(e) => {
                self.password = Some(e.password.clone());
            }
            UserEvent::UserSuspended(_) => {
                self.status = UserStatus::Suspended;
            }
            UserEvent::UserReactivated(_) => {
                self.status = UserStatus::Active;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            UserCommand::CreateUser(cmd) => self.handle_create(cmd),
            UserCommand::UpdateProfile(cmd) => self.handle_update_profile(cmd),
            UserCommand::ChangeRole(cmd) => self.handle_change_role(cmd),
            UserCommand::SetPassword(cmd) => self.handle_set_password(cmd),
            UserCommand::SuspendUser(cmd) => self.handle_suspend(cmd),
            UserCommand::ReactivateUser(cmd) => self.handle_reactivate(cmd),
        }
    }
}

impl User {
    fn ensure_user_id(&self, user_id: UserId) -> Result<(), DomainError> {
        if self.id != user_id {
            return Err(DomainError::invariant("user_id mismatch"));
        }
        Ok(())
    }

    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    /// Run the group synchronizer against a prospective role/superuser pair.
    ///
    /// Returns a sync event when membership or the elevated flag would change.
    /// The elevated flag is sticky: dropping back to `Standard` keeps it set.
    fn sync_access_group(
        &self,
        user_id: UserId,
        role: StaffRole,
        superuser: bool,
        occurred_at: DateTime<Utc>,
    ) -> Option<UserEvent> {
        let group = resolve_access_group(role, superuser);
        let elevated = self.elevated || group == AccessGroup::Elevated;

        if !self.created || group != self.access_group || elevated != self.elevated {
            Some(UserEvent::AccessGroupSynced(AccessGroupSynced {
                user_id,
                access_group: group,
                elevated,
                occurred_at,
            }))
        } else {
            None
        }
    }

    fn handle_create(&self, cmd: &CreateUser) -> Result<Vec<UserEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("user already exists"));
        }
        validate_username(&cmd.username)?;
        validate_email(&cmd.email)?;
        if cmd.display_name.trim().is_empty() {
            return Err(DomainError::validation("display_name cannot be empty"));
        }

        let mut events = vec![UserEvent::UserCreated(UserCreated {
            user_id: cmd.user_id,
            username: cmd.username.clone(),
            display_name: cmd.display_name.clone(),
            email: cmd.email.clone(),
            phone: cmd.phone.clone(),
            national_id: cmd.national_id.clone(),
            hired_on: cmd.hired_on,
            role: cmd.role,
            superuser: cmd.superuser,
            password: cmd.password.clone(),
            occurred_at: cmd.occurred_at,
        })];

        events.extend(self.sync_access_group(
            cmd.user_id,
            cmd.role,
            cmd.superuser,
            cmd.occurred_at,
        ));

        Ok(events)
    }

    fn handle_update_profile(&self, cmd: &UpdateProfile) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_user_id(cmd.user_id)?;
        validate_email(&cmd.email)?;
        if cmd.display_name.trim().is_empty() {
            return Err(DomainError::validation("display_name cannot be empty"));
        }

        Ok(vec![UserEvent::ProfileUpdated(ProfileUpdated {
            user_id: cmd.user_id,
            display_name: cmd.display_name.clone(),
            email: cmd.email.clone(),
            phone: cmd.phone.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_role(&self, cmd: &ChangeRole) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_user_id(cmd.user_id)?;

        if cmd.role == self.role && cmd.superuser == self.superuser {
            return Err(DomainError::validation("role is unchanged"));
        }

        let mut events = vec![UserEvent::RoleChanged(RoleChanged {
            user_id: cmd.user_id,
            role: cmd.role,
            superuser: cmd.superuser,
            occurred_at: cmd.occurred_at,
        })];

        events.extend(self.sync_access_group(
            cmd.user_id,
            cmd.role,
            cmd.superuser,
            cmd.occurred_at,
        ));

        Ok(events)
    }

    fn handle_set_password(&self, cmd: &SetPassword) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_user_id(cmd.user_id)?;

        Ok(vec![UserEvent::PasswordChanged(PasswordChanged {
            user_id: cmd.user_id,
            password: cmd.password.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_suspend(&self, cmd: &SuspendUser) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_user_id(cmd.user_id)?;

        if self.status != UserStatus::Active {
            return Err(DomainError::invariant("only active users can be suspended"));
        }

        Ok(vec![UserEvent::UserSuspended(UserSuspended {
            user_id: cmd.user_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reactivate(&self, cmd: &ReactivateUser) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_user_id(cmd.user_id)?;

        if self.status != UserStatus::Suspended {
            return Err(DomainError::invariant(
                "only suspended users can be reactivated",
            ));
        }

        Ok(vec![UserEvent::UserReactivated(UserReactivated {
            user_id: cmd.user_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn validate_username(username: &str) -> Result<(), DomainError> {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("username cannot be empty"));
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(DomainError::validation("username cannot contain whitespace"));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), DomainError> {
    if !email.contains('@') {
        return Err(DomainError::validation("email is malformed"));
    }
    Ok(())
}
