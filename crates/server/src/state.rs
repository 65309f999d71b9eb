//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::WarehubConfig;
use crate::ledger::{EntitlementService, LedgerStore, ListingDirectory};

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`. Stores are held as trait objects so the
/// router runs unchanged over `PostgreSQL` or the in-memory backends.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: WarehubConfig,
    ledger: Arc<dyn LedgerStore>,
    listings: Arc<dyn ListingDirectory>,
    entitlements: EntitlementService,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(
        config: WarehubConfig,
        ledger: Arc<dyn LedgerStore>,
        listings: Arc<dyn ListingDirectory>,
    ) -> Self {
        let entitlements = EntitlementService::new(Arc::clone(&ledger), config.ledger);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                ledger,
                listings,
                entitlements,
            }),
        }
    }

    /// Get a reference to the server configuration.
    #[must_use]
    pub fn config(&self) -> &WarehubConfig {
        &self.inner.config
    }

    /// Get a reference to the ledger store.
    #[must_use]
    pub fn ledger(&self) -> &dyn LedgerStore {
        self.inner.ledger.as_ref()
    }

    /// Get a reference to the listing directory.
    #[must_use]
    pub fn listings(&self) -> &dyn ListingDirectory {
        self.inner.listings.as_ref()
    }

    /// Get a reference to the entitlement service.
    #[must_use]
    pub fn entitlements(&self) -> &EntitlementService {
        &self.inner.entitlements
    }
}
