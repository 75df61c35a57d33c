use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use eventhire_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ValueObject};
use eventhire_events::Event;

/// Customer identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(pub AggregateId);

impl CustomerId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Customer lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomerStatus {
    Active,
    Archived,
}

/// Contact details, compared by value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl ValueObject for ContactInfo {}

impl ContactInfo {
    fn validate(&self) -> Result<(), DomainError> {
        if let Some(email) = &self.email {
            if !email.contains('@') {
                return Err(DomainError::validation("email is malformed"));
            }
        }
        Ok(())
    }
}

/// Aggregate root: Customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customer {
    id: CustomerId,
    first_name: String,
    last_name: String,
    national_id: Option<String>,
    contact: ContactInfo,
    notes: Option<String>,
    status: CustomerStatus,
    version: u64,
    created: bool,
}

impl Customer {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: CustomerId) -> Self {
        Self {
            id,
            first_name: String::new(),
            last_name: String::new(),
            national_id: None,
            contact: ContactInfo {
                email: None,
                phone: None,
                address: None,
            },
            notes: None,
            status: CustomerStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> CustomerId {
        self.id
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    pub fn status(&self) -> CustomerStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, CustomerStatus::Active)
    }
}

impl AggregateRoot for Customer {
    type Id = CustomerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterCustomer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterCustomer {
    pub customer_id: CustomerId,
    pub first_name: String,
    pub last_name: String,
    pub national_id: Option<String>,
    pub contact: ContactInfo,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateContact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateContact {
    pub customer_id: CustomerId,
    pub contact: ContactInfo,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ArchiveCustomer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveCustomer {
    pub customer_id: CustomerId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerCommand {
    RegisterCustomer(RegisterCustomer),
    UpdateContact(UpdateContact),
    ArchiveCustomer(ArchiveCustomer),
}

/// Event: CustomerRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRegistered {
    pub customer_id: CustomerId,
    pub first_name: String,
    pub last_name: String,
    pub national_id: Option<String>,
    pub contact: ContactInfo,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ContactUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactUpdated {
    pub customer_id: CustomerId,
    pub contact: ContactInfo,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CustomerArchived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerArchived {
    pub customer_id: CustomerId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerEvent {
    CustomerRegistered(CustomerRegistered),
    ContactUpdated(ContactUpdated),
    CustomerArchived(CustomerArchived),
}

impl Event for CustomerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CustomerEvent::CustomerRegistered(_) => "customers.customer.registered",
            CustomerEvent::ContactUpdated(_) => "customers.customer.contact_updated",
            CustomerEvent::CustomerArchived(_) => "customers.customer.archived",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CustomerEvent::CustomerRegistered(e) => e.occurred_at,
            CustomerEvent::ContactUpdated(e) => e.occurred_at,
            CustomerEvent::CustomerArchived(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Customer {
    type Command = CustomerCommand;
    type Event = CustomerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CustomerEvent::CustomerRegistered(e) => {
                self.id = e.customer_id;
                self.first_name = e.first_name.clone();
                self.last_name = e.last_name.clone();
                self.national_id = e.national_id.clone();
                self.contact = e.contact.clone();
                self.notes = e.notes.clone();
                self.status = CustomerStatus::Active;
                self.created = true;
            }
            CustomerEvent::ContactUpdated(e) => {
                self.contact = e.contact.clone();
                self.notes = e.notes.clone();
            }
            CustomerEvent::CustomerArchived(_) => {
                self.status = CustomerStatus::Archived;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CustomerCommand::RegisterCustomer(cmd) => self.handle_register(cmd),
            CustomerCommand::UpdateContact(cmd) => self.handle_update_contact(cmd),
            CustomerCommand::ArchiveCustomer(cmd) => self.handle_archive(cmd),
        }
    }
}

impl Customer {
    fn ensure_customer_id(&self, customer_id: CustomerId) -> Result<(), DomainError> {
        if self.id != customer_id {
            return Err(DomainError::invariant("customer_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterCustomer) -> Result<Vec<CustomerEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("customer already exists"));
        }
        if cmd.first_name.trim().is_empty() || cmd.last_name.trim().is_empty() {
            return Err(DomainError::validation("customer name cannot be empty"));
        }
        cmd.contact.validate()?;

        Ok(vec![CustomerEvent::CustomerRegistered(CustomerRegistered {
            customer_id: cmd.customer_id,
            first_name: cmd.first_name.clone(),
            last_name: cmd.last_name.clone(),
            national_id: cmd.national_id.clone(),
            contact: cmd.contact.clone(),
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_contact(&self, cmd: &UpdateContact) -> Result<Vec<CustomerEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_customer_id(cmd.customer_id)?;

        if !self.is_active() {
            return Err(DomainError::invariant("archived customers cannot be updated"));
        }
        cmd.contact.validate()?;

        Ok(vec![CustomerEvent::ContactUpdated(ContactUpdated {
            customer_id: cmd.customer_id,
            contact: cmd.contact.clone(),
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_archive(&self, cmd: &ArchiveCustomer) -> Result<Vec<CustomerEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_customer_id(cmd.customer_id)?;

        if !self.is_active() {
            return Err(DomainError::invariant("customer is already archived"));
        }

        Ok(vec![CustomerEvent::CustomerArchived(CustomerArchived {
            customer_id: cmd.customer_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventhire_core::AggregateId;

    fn test_customer_id() -> CustomerId {
        CustomerId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn register_cmd(customer_id: CustomerId) -> RegisterCustomer {
        RegisterCustomer {
            customer_id,
            first_name: "Maria".to_string(),
            last_name: "Lopez".to_string(),
            national_id: Some("4551122".to_string()),
            contact: ContactInfo {
                email: Some("maria@example.com".to_string()),
                phone: Some("+595 981 000111".to_string()),
                address: None,
            },
            notes: None,
            occurred_at: test_time(),
        }
    }

    #[test]
    fn register_customer_emits_registered_event() {
        let customer_id = test_customer_id();
        let customer = Customer::empty(customer_id);

        let events = customer
            .handle(&CustomerCommand::RegisterCustomer(register_cmd(customer_id)))
            .unwrap();

        assert_eq!(events.len(), 1);
        match &events[0] {
            CustomerEvent::CustomerRegistered(e) => {
                assert_eq!(e.customer_id, customer_id);
                assert_eq!(e.first_name, "Maria");
            }
            _ => panic!("Expected CustomerRegistered event"),
        }
    }

    #[test]
    fn malformed_email_is_rejected() {
        let customer_id = test_customer_id();
        let customer = Customer::empty(customer_id);
        let mut cmd = register_cmd(customer_id);
        cmd.contact.email = Some("not-an-email".to_string());

        let err = customer
            .handle(&CustomerCommand::RegisterCustomer(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn archived_customer_rejects_updates() {
        let customer_id = test_customer_id();
        let mut customer = Customer::empty(customer_id);

        let events = customer
            .handle(&CustomerCommand::RegisterCustomer(register_cmd(customer_id)))
            .unwrap();
        customer.apply(&events[0]);

        let events = customer
            .handle(&CustomerCommand::ArchiveCustomer(ArchiveCustomer {
                customer_id,
                occurred_at: test_time(),
            }))
            .unwrap();
        customer.apply(&events[0]);
        assert_eq!(customer.status(), CustomerStatus::Archived);

        let err = customer
            .handle(&CustomerCommand::UpdateContact(UpdateContact {
                customer_id,
                contact: ContactInfo {
                    email: None,
                    phone: None,
                    address: None,
                },
                notes: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let customer_id = test_customer_id();
        let mut customer = Customer::empty(customer_id);
        let events = customer
            .handle(&CustomerCommand::RegisterCustomer(register_cmd(customer_id)))
            .unwrap();
        customer.apply(&events[0]);
        let before = customer.clone();

        let _ = customer.handle(&CustomerCommand::ArchiveCustomer(ArchiveCustomer {
            customer_id,
            occurred_at: test_time(),
        }));

        assert_eq!(customer, before);
    }
}
