use crate::address::{Address, AddressMatcher, Target};
use crate::config::{DatabaseLocation, StoreConfig};
use crate::error::{InventoryError, Result};
use crate::observer::{ChangeKind, ChangeRegistry, Subscription};
use crate::product::{Product, ProductValues};
use crate::product_db::{ProductDb, WriteOutcome};
use crate::schema::Column;
use crate::selection::{Selection, SortOrder};
use crate::validation::{self, Problem, ValidationReport, WriteKind};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

mod cursor;

pub use cursor::Cursor;

/// Callback receiving lenient-mode validation diagnostics.
pub type ValidationHook = Box<dyn Fn(&Address, &ValidationReport) + Send + Sync>;

/// The main entry point for the inventory.
///
/// Every read and write goes through here: the address is routed, payloads
/// are validated, the backend is called, and observers are told about any
/// write that touched at least one row.
pub struct InventoryStore {
    root: Option<PathBuf>,
    config: StoreConfig,
    matcher: AddressMatcher,
    db: ProductDb,
    registry: ChangeRegistry,
    validation_hooks: Mutex<Vec<ValidationHook>>,
}

impl InventoryStore {
    /// Open the store kept in the given data directory.
    /// Reads `inventory.yaml` if present and opens/creates the database.
    pub fn open(path: &str) -> Result<Self> {
        let root = PathBuf::from(path);
        if !root.is_dir() {
            return Err(InventoryError::Config(format!(
                "Data directory does not exist: {}",
                root.display()
            )));
        }

        let config = StoreConfig::for_data_dir(&root)?;
        Self::with_config(config, &root)
    }

    /// Open a store with no backing file. Uses the default config.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_config(StoreConfig::in_memory(), Path::new("."))
    }

    /// Open a store from an explicit config, resolving relative database
    /// paths against `data_dir`.
    pub fn with_config(config: StoreConfig, data_dir: &Path) -> Result<Self> {
        let matcher = AddressMatcher::new(&config.authority)?;

        let (db, root) = match config.database_location(data_dir) {
            DatabaseLocation::InMemory => (ProductDb::open_in_memory()?, None),
            DatabaseLocation::File(path) => {
                log::info!("Opening inventory database at {}", path.display());
                (ProductDb::open(&path)?, Some(data_dir.to_path_buf()))
            }
        };

        Ok(InventoryStore {
            root,
            config,
            matcher,
            db,
            registry: ChangeRegistry::new(),
            validation_hooks: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The data directory, or `None` for an in-memory store.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// The collection address for all products.
    pub fn products_address(&self) -> Address {
        self.matcher.collection()
    }

    /// The item address for one product.
    pub fn product_address(&self, id: i64) -> Address {
        self.matcher.collection().with_appended_id(id)
    }

    /// Content-type descriptor for an address.
    pub fn content_type(&self, address: &Address) -> Result<String> {
        self.matcher.content_type(address)
    }

    /// Register interest in changes at `address` (or below it).
    pub fn subscribe(&self, address: &Address) -> Result<Subscription> {
        let (canonical, _) = self.route(address)?;
        Ok(self.registry.subscribe(canonical))
    }

    /// Register a callback for validation issues that lenient mode lets
    /// through.
    pub fn on_validation_issue(&self, hook: ValidationHook) {
        self.validation_hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hook);
    }

    // ── Mediator operations ─────────────────────────────────────────

    /// Read rows. An empty projection selects every column. Item addresses
    /// ignore `selection` and read only the addressed row.
    pub fn query(
        &self,
        address: &Address,
        projection: &[Column],
        selection: Option<Selection>,
        sort: Option<&SortOrder>,
    ) -> Result<Cursor> {
        let (canonical, target) = self.route(address)?;
        let address = &canonical;
        let selection = self.scope(address, target, selection)?;
        if let Some(sort) = sort {
            sort.validate()?;
        }

        // Subscribe first so a write landing mid-query is not missed.
        let subscription = self.registry.subscribe(address.clone());
        let rows = self.db.query(projection, selection.as_ref(), sort)?;
        log::debug!("Query {address} returned {} row(s)", rows.rows.len());

        Ok(Cursor::new(rows, subscription))
    }

    /// Insert a product into the collection. Returns the new item address.
    pub fn insert(&self, address: &Address, values: &ProductValues) -> Result<Address> {
        let (canonical, target) = self.route(address)?;
        if let Target::Item(_) = target {
            return Err(InventoryError::UnsupportedAddress {
                operation: "insert",
                address: address.to_string(),
            });
        }
        let address = &canonical;

        self.check_values(address, values, WriteKind::Insert)?;

        let id = self.db.insert(values).map_err(|e| {
            log::error!("Failed to insert row for {address}: {e}");
            InventoryError::InsertFailed {
                address: address.to_string(),
                reason: e.to_string(),
            }
        })?;

        self.registry.publish(address, ChangeKind::Inserted, 1);
        let item = address.with_appended_id(id);
        log::debug!("Inserted {item}");
        Ok(item)
    }

    /// Write the present fields. Item addresses ignore `selection`; the
    /// collection address applies it as given (all rows when `None`).
    /// Returns the number of rows changed.
    pub fn update(
        &self,
        address: &Address,
        values: &ProductValues,
        selection: Option<Selection>,
    ) -> Result<usize> {
        let (canonical, target) = self.route(address)?;
        let address = &canonical;
        if values.is_empty() {
            return Ok(0);
        }

        let selection = self.scope(address, target, selection)?;
        self.check_values(address, values, WriteKind::Update)?;

        let outcome = self
            .db
            .update(values, selection.as_ref())
            .map_err(|e| write_failed(address, e))?;

        self.notify(address, target, &outcome, ChangeKind::Updated);
        Ok(outcome.rows)
    }

    /// Delete rows, scoped the same way as [`InventoryStore::update`].
    /// Returns the number of rows deleted.
    pub fn delete(&self, address: &Address, selection: Option<Selection>) -> Result<usize> {
        let (canonical, target) = self.route(address)?;
        let address = &canonical;
        let selection = self.scope(address, target, selection)?;

        let outcome = self
            .db
            .delete(selection.as_ref())
            .map_err(|e| write_failed(address, e))?;

        self.notify(address, target, &outcome, ChangeKind::Deleted);
        Ok(outcome.rows)
    }

    // ── Typed helpers ────────────────────────────────────────────────

    /// Fetch one product by id.
    pub fn get_product(&self, id: i64) -> Result<Option<Product>> {
        let cursor = self.query(&self.product_address(id), &Column::ALL, None, None)?;
        Ok(cursor.products()?.into_iter().next())
    }

    /// Every product, ordered by id.
    pub fn list_products(&self) -> Result<Vec<Product>> {
        let sort = SortOrder::new(Column::Id.sql_name());
        self.query(&self.products_address(), &Column::ALL, None, Some(&sort))?
            .products()
    }

    /// Change an item's quantity by `delta` and return the new quantity.
    ///
    /// The new value is computed here and written as a replacement; a result
    /// below zero is refused before anything is written. Two callers racing
    /// on the same item resolve as last-writer-wins.
    pub fn adjust_quantity(&self, address: &Address, delta: i64) -> Result<i64> {
        let Target::Item(id) = self.matcher.resolve(address)? else {
            return Err(InventoryError::UnsupportedAddress {
                operation: "adjust_quantity",
                address: address.to_string(),
            });
        };

        let cursor = self.query(address, &[Column::Quantity], None, None)?;
        let current = cursor
            .get_i64(0, Column::Quantity)
            .ok_or_else(|| InventoryError::NotFound(address.to_string()))?;
        drop(cursor);

        let quantity = match current.checked_add(delta) {
            Some(q) if q >= 0 => q,
            Some(_) => {
                return Err(InventoryError::InsufficientStock {
                    id,
                    available: current,
                    requested: delta.saturating_neg(),
                })
            }
            None => {
                return Err(InventoryError::ValidationFailed(ValidationReport::single(
                    Column::Quantity,
                    Problem::WrongType("quantity out of range"),
                )))
            }
        };

        let rows = self.update(address, &ProductValues::new().quantity(quantity), None)?;
        if rows == 0 {
            return Err(InventoryError::NotFound(address.to_string()));
        }
        Ok(quantity)
    }

    /// Sell one unit. Fails with `InsufficientStock` when sold out.
    pub fn record_sale(&self, address: &Address) -> Result<i64> {
        self.adjust_quantity(address, -1)
    }

    /// Add `amount` units to stock.
    pub fn receive_stock(&self, address: &Address, amount: i64) -> Result<i64> {
        if amount <= 0 {
            return Err(InventoryError::ValidationFailed(ValidationReport::single(
                Column::Quantity,
                Problem::NotPositive(amount),
            )));
        }
        self.adjust_quantity(address, amount)
    }

    // ── Internals ────────────────────────────────────────────────────

    /// Resolve an address and return its canonical spelling, which is what
    /// observers are keyed by.
    fn route(&self, address: &Address) -> Result<(Address, Target)> {
        let target = self.matcher.resolve(address)?;
        Ok((self.matcher.canonical(target), target))
    }

    /// Pick the effective filter: item addresses always target exactly their
    /// own row, the collection address uses the caller's filter.
    fn scope(
        &self,
        address: &Address,
        target: Target,
        selection: Option<Selection>,
    ) -> Result<Option<Selection>> {
        match target {
            Target::Item(id) => {
                if let Some(ignored) = selection {
                    log::debug!("Ignoring filter '{}' for item address {address}", ignored.clause());
                }
                Ok(Some(Selection::by_id(id)))
            }
            Target::Collection => {
                if let Some(selection) = &selection {
                    selection.validate()?;
                }
                Ok(selection)
            }
        }
    }

    fn check_values(&self, address: &Address, values: &ProductValues, kind: WriteKind) -> Result<()> {
        let report = validation::enforce(values, kind, self.config.validation)?;
        if !report.is_ok() {
            // Only reachable in lenient mode.
            log::warn!("Writing {address} despite validation issues: {report}");
            let hooks = self
                .validation_hooks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            for hook in hooks.iter() {
                hook(address, &report);
            }
        }
        Ok(())
    }

    /// Publish a completed write. Item writes notify the item (and through
    /// ancestry its collection); collection writes also notify every matched
    /// item.
    fn notify(&self, address: &Address, target: Target, outcome: &WriteOutcome, kind: ChangeKind) {
        if outcome.rows == 0 {
            return;
        }
        match target {
            Target::Item(_) => {
                self.registry.publish(address, kind, outcome.rows);
            }
            Target::Collection => {
                let mut addresses: Vec<Address> = outcome
                    .ids
                    .iter()
                    .map(|id| address.with_appended_id(*id))
                    .collect();
                addresses.push(address.clone());
                self.registry.publish_all(&addresses, kind, outcome.rows);
            }
        }
    }
}

fn write_failed(address: &Address, error: InventoryError) -> InventoryError {
    match error {
        InventoryError::Sqlite(e) => {
            log::error!("Backend rejected write to {address}: {e}");
            InventoryError::BackendWriteFailed {
                address: address.to_string(),
                reason: e.to_string(),
            }
        }
        other => other,
    }
}
