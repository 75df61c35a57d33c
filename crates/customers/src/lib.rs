//! `eventhire-customers` — customer records.

pub mod customer;

pub use customer::{
    ArchiveCustomer, ContactInfo, Customer, CustomerArchived, CustomerCommand, CustomerEvent,
    CustomerId, CustomerRegistered, CustomerStatus, RegisterCustomer, UpdateContact,
};
