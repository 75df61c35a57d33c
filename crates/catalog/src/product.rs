use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use eventhire_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use eventhire_events::Event;

/// Product identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Supply category for rentable products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductCategory {
    Tableware,
    Glassware,
    Linens,
    Decor,
    Venue,
    Furniture,
}

/// Product lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Active,
    Retired,
}

/// Why a stock quantity moved.
///
/// Reason codes make the stock ledger auditable; incident-driven movements are
/// distinguishable from receiving and manual corrections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockMovementReason {
    Received,
    Correction,
    IncidentDebit,
    IncidentRestock,
    IncidentReplacement,
    IncidentVoidReversal,
}

/// Query capability injected by the caller on the retirement path.
///
/// Keeps this crate free of a dependency on the incidents crate while still
/// letting retirement refuse products with unresolved damage records.
pub trait OpenIncidentQuery: Send + Sync {
    fn has_open_incidents(&self, product_id: ProductId) -> bool;
}

/// Check the retirement precondition against the injected query.
///
/// Called by the API layer before dispatching [`RetireProduct`].
pub fn ensure_no_open_incidents(
    product_id: ProductId,
    query: &dyn OpenIncidentQuery,
) -> Result<(), DomainError> {
    if query.has_open_incidents(product_id) {
        Err(DomainError::conflict(
            "product has open incidents and cannot be retired",
        ))
    } else {
        Ok(())
    }
}

/// Aggregate root: Product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    name: String,
    category: ProductCategory,
    /// Price in smallest currency unit (e.g., cents) per rental day.
    unit_price: u64,
    stock: i64,
    status: ProductStatus,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            name: String::new(),
            category: ProductCategory::Tableware,
            unit_price: 0,
            stock: 0,
            status: ProductStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> ProductCategory {
        self.category
    }

    pub fn unit_price(&self) -> u64 {
        self.unit_price
    }

    pub fn stock(&self) -> i64 {
        self.stock
    }

    pub fn status(&self) -> ProductStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, ProductStatus::Active)
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub product_id: ProductId,
    pub name: String,
    pub category: ProductCategory,
    pub unit_price: u64,
    pub initial_stock: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProduct {
    pub product_id: ProductId,
    pub name: String,
    pub category: ProductCategory,
    pub unit_price: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdjustStock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub product_id: ProductId,
    pub delta: i64,
    pub reason: StockMovementReason,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RetireProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetireProduct {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    CreateProduct(CreateProduct),
    UpdateProduct(UpdateProduct),
    AdjustStock(AdjustStock),
    RetireProduct(RetireProduct),
}

/// Event: ProductCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub product_id: ProductId,
    pub name: String,
    pub category: ProductCategory,
    pub unit_price: u64,
    pub initial_stock: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdated {
    pub product_id: ProductId,
    pub name: String,
    pub category: ProductCategory,
    pub unit_price: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockAdjusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjusted {
    pub product_id: ProductId,
    pub delta: i64,
    pub reason: StockMovementReason,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductRetired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRetired {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    ProductUpdated(ProductUpdated),
    StockAdjusted(StockAdjusted),
    ProductRetired(ProductRetired),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "catalog.product.created",
            ProductEvent::ProductUpdated(_) => "catalog.product.updated",
            ProductEvent::StockAdjusted(_) => "catalog.product.stock_adjusted",
            ProductEvent::ProductRetired(_) => "catalog.product.retired",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(e) => e.occurred_at,
            ProductEvent::ProductUpdated(e) => e.occurred_at,
            ProductEvent::StockAdjusted(e) => e.occurred_at,
            ProductEvent::ProductRetired(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductCreated(e) => {
                self.id = e.product_id;
                self.name = e.name.clone();
                self.category = e.category;
                self.unit_price = e.unit_price;
                self.stock = e.initial_stock;
                self.status = ProductStatus::Active;
                self.created = true;
            }
            ProductEvent::ProductUpdated(e) => {
                self.name = e.name.clone();
                self.category = e.category;
                self.unit_price = e.unit_price;
            }
            ProductEvent::StockAdjusted(e) => {
                self.stock += e.delta;
            }
            ProductEvent::ProductRetired(_) => {
                self.status = ProductStatus::Retired;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::CreateProduct(cmd) => self.handle_create(cmd),
            ProductCommand::UpdateProduct(cmd) => self.handle_update(cmd),
            ProductCommand::AdjustStock(cmd) => self.handle_adjust(cmd),
            ProductCommand::RetireProduct(cmd) => self.handle_retire(cmd),
        }
    }
}

impl Product {
    fn ensure_product_id(&self, product_id: ProductId) -> Result<(), DomainError> {
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.unit_price == 0 {
            return Err(DomainError::validation("unit_price must be positive"));
        }
        if cmd.initial_stock < 0 {
            return Err(DomainError::validation("initial_stock cannot be negative"));
        }

        Ok(vec![ProductEvent::ProductCreated(ProductCreated {
            product_id: cmd.product_id,
            name: cmd.name.clone(),
            category: cmd.category,
            unit_price: cmd.unit_price,
            initial_stock: cmd.initial_stock,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_product_id(cmd.product_id)?;

        if !self.is_active() {
            return Err(DomainError::invariant("retired products cannot be updated"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.unit_price == 0 {
            return Err(DomainError::validation("unit_price must be positive"));
        }

        Ok(vec![ProductEvent::ProductUpdated(ProductUpdated {
            product_id: cmd.product_id,
            name: cmd.name.clone(),
            category: cmd.category,
            unit_price: cmd.unit_price,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_adjust(&self, cmd: &AdjustStock) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_product_id(cmd.product_id)?;

        if !self.is_active() {
            return Err(DomainError::invariant(
                "stock of retired products cannot be adjusted",
            ));
        }
        if cmd.delta == 0 {
            return Err(DomainError::validation("delta cannot be zero"));
        }

        let new_stock = self.stock + cmd.delta;
        if new_stock < 0 {
            return Err(DomainError::invariant("stock cannot go negative"));
        }

        Ok(vec![ProductEvent::StockAdjusted(StockAdjusted {
            product_id: cmd.product_id,
            delta: cmd.delta,
            reason: cmd.reason,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_retire(&self, cmd: &RetireProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_product_id(cmd.product_id)?;

        if !self.is_active() {
            return Err(DomainError::invariant("product is already retired"));
        }

        Ok(vec![ProductEvent::ProductRetired(ProductRetired {
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventhire_core::AggregateId;
    use proptest::prelude::*;

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn created_product(initial_stock: i64) -> Product {
        let product_id = test_product_id();
        let mut product = Product::empty(product_id);
        let events = product
            .handle(&ProductCommand::CreateProduct(CreateProduct {
                product_id,
                name: "Champagne flute".to_string(),
                category: ProductCategory::Glassware,
                unit_price: 150,
                initial_stock,
                occurred_at: test_time(),
            }))
            .unwrap();
        product.apply(&events[0]);
        product
    }

    #[test]
    fn create_product_sets_initial_stock() {
        let product = created_product(20);
        assert_eq!(product.stock(), 20);
        assert_eq!(product.status(), ProductStatus::Active);
        assert_eq!(product.version(), 1);
    }

    #[test]
    fn create_rejects_zero_price() {
        let product_id = test_product_id();
        let product = Product::empty(product_id);
        let err = product
            .handle(&ProductCommand::CreateProduct(CreateProduct {
                product_id,
                name: "Chair".to_string(),
                category: ProductCategory::Furniture,
                unit_price: 0,
                initial_stock: 10,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn stock_cannot_go_negative() {
        let product = created_product(5);
        let err = product
            .handle(&ProductCommand::AdjustStock(AdjustStock {
                product_id: product.id_typed(),
                delta: -6,
                reason: StockMovementReason::IncidentDebit,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("negative") => {}
            other => panic!("Expected negative-stock invariant, got {other:?}"),
        }
    }

    #[test]
    fn debit_then_credit_round_trips_stock() {
        let mut product = created_product(20);
        let product_id = product.id_typed();

        let events = product
            .handle(&ProductCommand::AdjustStock(AdjustStock {
                product_id,
                delta: -3,
                reason: StockMovementReason::IncidentDebit,
                occurred_at: test_time(),
            }))
            .unwrap();
        product.apply(&events[0]);
        assert_eq!(product.stock(), 17);

        let events = product
            .handle(&ProductCommand::AdjustStock(AdjustStock {
                product_id,
                delta: 3,
                reason: StockMovementReason::IncidentRestock,
                occurred_at: test_time(),
            }))
            .unwrap();
        product.apply(&events[0]);
        assert_eq!(product.stock(), 20);
    }

    #[test]
    fn retired_product_rejects_adjustments() {
        let mut product = created_product(5);
        let product_id = product.id_typed();

        let events = product
            .handle(&ProductCommand::RetireProduct(RetireProduct {
                product_id,
                occurred_at: test_time(),
            }))
            .unwrap();
        product.apply(&events[0]);
        assert_eq!(product.status(), ProductStatus::Retired);

        let err = product
            .handle(&ProductCommand::AdjustStock(AdjustStock {
                product_id,
                delta: 1,
                reason: StockMovementReason::Received,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    struct StubIncidentQuery(bool);

    impl OpenIncidentQuery for StubIncidentQuery {
        fn has_open_incidents(&self, _product_id: ProductId) -> bool {
            self.0
        }
    }

    #[test]
    fn retirement_guard_blocks_products_with_open_incidents() {
        let product_id = test_product_id();
        assert!(ensure_no_open_incidents(product_id, &StubIncidentQuery(false)).is_ok());
        assert!(matches!(
            ensure_no_open_incidents(product_id, &StubIncidentQuery(true)),
            Err(DomainError::Conflict(_))
        ));
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let product = created_product(10);
        let before = product.clone();

        let _ = product.handle(&ProductCommand::AdjustStock(AdjustStock {
            product_id: product.id_typed(),
            delta: -1,
            reason: StockMovementReason::IncidentDebit,
            occurred_at: test_time(),
        }));

        assert_eq!(product, before);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn handle_is_deterministic(
            name in "[a-zA-Z ]{1,24}",
            unit_price in 1u64..100_000,
            initial_stock in 0i64..10_000,
        ) {
            let product_id = test_product_id();
            let product = Product::empty(product_id);
            let cmd = ProductCommand::CreateProduct(CreateProduct {
                product_id,
                name: name.clone(),
                category: ProductCategory::Decor,
                unit_price,
                initial_stock,
                occurred_at: test_time(),
            });

            let first = product.handle(&cmd);
            let second = product.handle(&cmd);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn adjust_never_produces_negative_stock(
            initial_stock in 0i64..1_000,
            delta in -2_000i64..2_000,
        ) {
            let mut product = created_product(initial_stock);
            if delta == 0 {
                return Ok(());
            }
            let result = product.handle(&ProductCommand::AdjustStock(AdjustStock {
                product_id: product.id_typed(),
                delta,
                reason: StockMovementReason::Correction,
                occurred_at: test_time(),
            }));

            match result {
                Ok(events) => {
                    product.apply(&events[0]);
                    prop_assert!(product.stock() >= 0);
                }
                Err(_) => prop_assert!(initial_stock + delta < 0),
            }
        }
    }
}
