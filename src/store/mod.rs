//! Persistence gateway
//!
//! The lifecycle engine and the HTTP handlers only see the [`Repository`]
//! trait. Two backends implement it:
//! - [`SqliteStore`] for the server
//! - [`MemoryStore`] as a fake for tests
//!
//! State-changing delivery writes are conditional: a backend must apply the
//! guard and the write as one atomic step, and report `Ok(None)` when the
//! guard no longer holds. Concurrent pickups of the same delivery, or pickups
//! racing for the last slot of a deliveryman's daily quota, rely on this.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    Delivery, DeliveryProblem, Deliveryman, File, NewDelivery, NewDeliveryman, NewFile,
    NewRecipient, NewUser, Recipient, User,
};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Filter for delivery listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryFilter {
    pub deliveryman_id: Option<i64>,
    /// `Some(true)` keeps only canceled deliveries, `Some(false)` only non-canceled ones
    pub canceled: Option<bool>,
    /// Excludes completed deliveries
    pub exclude_completed: bool,
}

impl DeliveryFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn canceled() -> Self {
        Self {
            canceled: Some(true),
            ..Self::default()
        }
    }

    pub fn for_deliveryman(deliveryman_id: i64) -> Self {
        Self {
            deliveryman_id: Some(deliveryman_id),
            ..Self::default()
        }
    }

    /// Deliveries still in the deliveryman's hands: neither canceled nor completed
    pub fn active_for_deliveryman(deliveryman_id: i64) -> Self {
        Self {
            deliveryman_id: Some(deliveryman_id),
            canceled: Some(false),
            exclude_completed: true,
        }
    }

    pub fn matches(&self, delivery: &Delivery) -> bool {
        if let Some(id) = self.deliveryman_id {
            if delivery.deliveryman_id != id {
                return false;
            }
        }
        if let Some(canceled) = self.canceled {
            if delivery.canceled_at.is_some() != canceled {
                return false;
            }
        }
        !(self.exclude_completed && delivery.end_date.is_some())
    }
}

/// Parameters of an atomic pickup write
#[derive(Debug, Clone, Copy)]
pub struct PickUpClaim {
    pub deliveryman_id: i64,
    pub at: DateTime<Utc>,
    /// Start of the pickup day (inclusive)
    pub day_start: DateTime<Utc>,
    /// Start of the following day (exclusive)
    pub day_end: DateTime<Utc>,
    pub daily_limit: i64,
}

#[async_trait]
pub trait Repository: Send + Sync {
    // Users

    async fn create_user(&self, user: NewUser) -> Result<User>;

    async fn find_user(&self, id: i64) -> Result<Option<User>>;

    async fn list_users(&self) -> Result<Vec<User>>;

    /// Updates the given fields; `Ok(None)` when the user does not exist
    async fn update_user(
        &self,
        id: i64,
        name: Option<String>,
        email: Option<String>,
    ) -> Result<Option<User>>;

    // Files

    async fn create_file(&self, file: NewFile) -> Result<File>;

    async fn find_file(&self, id: i64) -> Result<Option<File>>;

    // Recipients

    async fn create_recipient(&self, recipient: NewRecipient) -> Result<Recipient>;

    async fn find_recipient(&self, id: i64) -> Result<Option<Recipient>>;

    async fn list_recipients(&self) -> Result<Vec<Recipient>>;

    /// Returns `false` when nothing was deleted
    async fn delete_recipient(&self, id: i64) -> Result<bool>;

    // Deliverymen

    async fn create_deliveryman(&self, deliveryman: NewDeliveryman) -> Result<Deliveryman>;

    async fn find_deliveryman(&self, id: i64) -> Result<Option<Deliveryman>>;

    async fn find_deliveryman_by_email(&self, email: &str) -> Result<Option<Deliveryman>>;

    async fn list_deliverymen(&self) -> Result<Vec<Deliveryman>>;

    async fn update_deliveryman(
        &self,
        id: i64,
        deliveryman: NewDeliveryman,
    ) -> Result<Option<Deliveryman>>;

    async fn delete_deliveryman(&self, id: i64) -> Result<bool>;

    // Deliveries

    async fn create_delivery(&self, delivery: NewDelivery, at: DateTime<Utc>) -> Result<Delivery>;

    async fn find_delivery(&self, id: i64) -> Result<Option<Delivery>>;

    async fn list_deliveries(&self, filter: DeliveryFilter) -> Result<Vec<Delivery>>;

    /// Number of deliveries of `deliveryman_id` picked up in `[from, to)`
    async fn count_started_between(
        &self,
        deliveryman_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64>;

    /// Rewrites product and references. With `only_pending` the write applies
    /// only while the delivery is neither picked up, completed nor canceled.
    async fn reassign_delivery(
        &self,
        id: i64,
        delivery: NewDelivery,
        only_pending: bool,
        at: DateTime<Utc>,
    ) -> Result<Option<Delivery>>;

    /// Sets `start_date` if the delivery is not started, not canceled and the
    /// deliveryman is still under the daily limit.
    async fn start_delivery(&self, id: i64, claim: PickUpClaim) -> Result<Option<Delivery>>;

    /// Files the signature and sets `end_date` and `signature_id` if started,
    /// not ended and not canceled. Nothing is written when the guard fails.
    async fn complete_delivery(
        &self,
        id: i64,
        signature: NewFile,
        at: DateTime<Utc>,
    ) -> Result<Option<Delivery>>;

    /// Sets `canceled_at` if neither canceled nor ended.
    async fn cancel_delivery(&self, id: i64, at: DateTime<Utc>) -> Result<Option<Delivery>>;

    // Problems

    async fn create_problem(
        &self,
        delivery_id: i64,
        description: &str,
        at: DateTime<Utc>,
    ) -> Result<DeliveryProblem>;

    async fn list_problems(&self, delivery_id: i64) -> Result<Vec<DeliveryProblem>>;
}
