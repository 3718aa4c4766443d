//! In-memory store, used as a fake in tests
//!
//! A single write lock covers every conditional update, which gives the same
//! atomicity the SQLite backend gets from single-statement updates.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{DeliveryFilter, PickUpClaim, Repository};
use crate::error::{AppError, Result};
use crate::models::{
    Delivery, DeliveryProblem, Deliveryman, File, NewDelivery, NewDeliveryman, NewFile,
    NewRecipient, NewUser, Recipient, User,
};

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: BTreeMap<i64, User>,
    files: BTreeMap<i64, File>,
    recipients: BTreeMap<i64, Recipient>,
    deliverymen: BTreeMap<i64, Deliveryman>,
    deliveries: BTreeMap<i64, Delivery>,
    problems: BTreeMap<i64, DeliveryProblem>,
}

impl Tables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn started_between(&self, deliveryman_id: i64, from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
        self.deliveries
            .values()
            .filter(|d| d.deliveryman_id == deliveryman_id)
            .filter(|d| matches!(d.start_date, Some(s) if s >= from && s < to))
            .count() as i64
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a delivery as-is, bypassing every lifecycle guard
    pub async fn put_delivery(&self, delivery: Delivery) {
        let mut tables = self.tables.write().await;
        tables.next_id = tables.next_id.max(delivery.id);
        tables.deliveries.insert(delivery.id, delivery);
    }

    pub async fn delivery_count(&self) -> usize {
        self.tables.read().await.deliveries.len()
    }

    pub async fn file_count(&self) -> usize {
        self.tables.read().await.files.len()
    }
}

#[async_trait]
impl Repository for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(AppError::Conflict("User already exists".to_string()));
        }
        let now = Utc::now();
        let user = User {
            id: tables.allocate_id(),
            name: user.name,
            email: user.email,
            provider: user.provider,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.tables.read().await.users.values().cloned().collect())
    }

    async fn update_user(
        &self,
        id: i64,
        name: Option<String>,
        email: Option<String>,
    ) -> Result<Option<User>> {
        let mut tables = self.tables.write().await;
        if let Some(email) = &email {
            if tables.users.values().any(|u| u.id != id && &u.email == email) {
                return Err(AppError::Conflict("User already exists".to_string()));
            }
        }
        let Some(user) = tables.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = name {
            user.name = name;
        }
        if let Some(email) = email {
            user.email = email;
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn create_file(&self, file: NewFile) -> Result<File> {
        let mut tables = self.tables.write().await;
        let file = File {
            id: tables.allocate_id(),
            name: file.name,
            path: file.path,
            created_at: Utc::now(),
        };
        tables.files.insert(file.id, file.clone());
        Ok(file)
    }

    async fn find_file(&self, id: i64) -> Result<Option<File>> {
        Ok(self.tables.read().await.files.get(&id).cloned())
    }

    async fn create_recipient(&self, recipient: NewRecipient) -> Result<Recipient> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let recipient = Recipient {
            id: tables.allocate_id(),
            name: recipient.name,
            street: recipient.street,
            number: recipient.number,
            complement: recipient.complement,
            state: recipient.state,
            city: recipient.city,
            zip_code: recipient.zip_code,
            created_at: now,
            updated_at: now,
        };
        tables.recipients.insert(recipient.id, recipient.clone());
        Ok(recipient)
    }

    async fn find_recipient(&self, id: i64) -> Result<Option<Recipient>> {
        Ok(self.tables.read().await.recipients.get(&id).cloned())
    }

    async fn list_recipients(&self) -> Result<Vec<Recipient>> {
        Ok(self.tables.read().await.recipients.values().cloned().collect())
    }

    async fn delete_recipient(&self, id: i64) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if tables.deliveries.values().any(|d| d.recipient_id == id) {
            return Err(AppError::Conflict(
                "This recipient still has deliveries".to_string(),
            ));
        }
        Ok(tables.recipients.remove(&id).is_some())
    }

    async fn create_deliveryman(&self, deliveryman: NewDeliveryman) -> Result<Deliveryman> {
        let mut tables = self.tables.write().await;
        if tables.deliverymen.values().any(|d| d.email == deliveryman.email) {
            return Err(AppError::Conflict("Deliveryman already exists".to_string()));
        }
        let now = Utc::now();
        let deliveryman = Deliveryman {
            id: tables.allocate_id(),
            name: deliveryman.name,
            email: deliveryman.email,
            avatar_id: deliveryman.avatar_id,
            created_at: now,
            updated_at: now,
        };
        tables.deliverymen.insert(deliveryman.id, deliveryman.clone());
        Ok(deliveryman)
    }

    async fn find_deliveryman(&self, id: i64) -> Result<Option<Deliveryman>> {
        Ok(self.tables.read().await.deliverymen.get(&id).cloned())
    }

    async fn find_deliveryman_by_email(&self, email: &str) -> Result<Option<Deliveryman>> {
        Ok(self
            .tables
            .read()
            .await
            .deliverymen
            .values()
            .find(|d| d.email == email)
            .cloned())
    }

    async fn list_deliverymen(&self) -> Result<Vec<Deliveryman>> {
        Ok(self.tables.read().await.deliverymen.values().cloned().collect())
    }

    async fn update_deliveryman(
        &self,
        id: i64,
        deliveryman: NewDeliveryman,
    ) -> Result<Option<Deliveryman>> {
        let mut tables = self.tables.write().await;
        if tables
            .deliverymen
            .values()
            .any(|d| d.id != id && d.email == deliveryman.email)
        {
            return Err(AppError::Conflict("Deliveryman already exists".to_string()));
        }
        let Some(existing) = tables.deliverymen.get_mut(&id) else {
            return Ok(None);
        };
        existing.name = deliveryman.name;
        existing.email = deliveryman.email;
        existing.avatar_id = deliveryman.avatar_id;
        existing.updated_at = Utc::now();
        Ok(Some(existing.clone()))
    }

    async fn delete_deliveryman(&self, id: i64) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if tables.deliveries.values().any(|d| d.deliveryman_id == id) {
            return Err(AppError::Conflict(
                "This deliveryman still has deliveries".to_string(),
            ));
        }
        Ok(tables.deliverymen.remove(&id).is_some())
    }

    async fn create_delivery(&self, delivery: NewDelivery, at: DateTime<Utc>) -> Result<Delivery> {
        let mut tables = self.tables.write().await;
        let delivery = Delivery {
            id: tables.allocate_id(),
            product: delivery.product,
            recipient_id: delivery.recipient_id,
            deliveryman_id: delivery.deliveryman_id,
            signature_id: None,
            start_date: None,
            end_date: None,
            canceled_at: None,
            created_at: at,
            updated_at: at,
        };
        tables.deliveries.insert(delivery.id, delivery.clone());
        Ok(delivery)
    }

    async fn find_delivery(&self, id: i64) -> Result<Option<Delivery>> {
        Ok(self.tables.read().await.deliveries.get(&id).cloned())
    }

    async fn list_deliveries(&self, filter: DeliveryFilter) -> Result<Vec<Delivery>> {
        Ok(self
            .tables
            .read()
            .await
            .deliveries
            .values()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect())
    }

    async fn count_started_between(
        &self,
        deliveryman_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64> {
        Ok(self
            .tables
            .read()
            .await
            .started_between(deliveryman_id, from, to))
    }

    async fn reassign_delivery(
        &self,
        id: i64,
        delivery: NewDelivery,
        only_pending: bool,
        at: DateTime<Utc>,
    ) -> Result<Option<Delivery>> {
        let mut tables = self.tables.write().await;
        let Some(existing) = tables.deliveries.get_mut(&id) else {
            return Ok(None);
        };
        let pending = existing.start_date.is_none()
            && existing.end_date.is_none()
            && existing.canceled_at.is_none();
        if only_pending && !pending {
            return Ok(None);
        }
        existing.product = delivery.product;
        existing.recipient_id = delivery.recipient_id;
        existing.deliveryman_id = delivery.deliveryman_id;
        existing.updated_at = at;
        Ok(Some(existing.clone()))
    }

    async fn start_delivery(&self, id: i64, claim: PickUpClaim) -> Result<Option<Delivery>> {
        let mut tables = self.tables.write().await;
        let started = tables.started_between(claim.deliveryman_id, claim.day_start, claim.day_end);
        let Some(existing) = tables.deliveries.get_mut(&id) else {
            return Ok(None);
        };
        if existing.start_date.is_some()
            || existing.canceled_at.is_some()
            || started >= claim.daily_limit
        {
            return Ok(None);
        }
        existing.start_date = Some(claim.at);
        existing.updated_at = claim.at;
        Ok(Some(existing.clone()))
    }

    async fn complete_delivery(
        &self,
        id: i64,
        signature: NewFile,
        at: DateTime<Utc>,
    ) -> Result<Option<Delivery>> {
        let mut tables = self.tables.write().await;
        let completable = tables.deliveries.get(&id).is_some_and(|d| {
            d.start_date.is_some() && d.end_date.is_none() && d.canceled_at.is_none()
        });
        if !completable {
            return Ok(None);
        }

        let file = File {
            id: tables.allocate_id(),
            name: signature.name,
            path: signature.path,
            created_at: at,
        };
        tables.files.insert(file.id, file.clone());

        let Some(existing) = tables.deliveries.get_mut(&id) else {
            return Ok(None);
        };
        existing.end_date = Some(at);
        existing.signature_id = Some(file.id);
        existing.updated_at = at;
        Ok(Some(existing.clone()))
    }

    async fn cancel_delivery(&self, id: i64, at: DateTime<Utc>) -> Result<Option<Delivery>> {
        let mut tables = self.tables.write().await;
        let Some(existing) = tables.deliveries.get_mut(&id) else {
            return Ok(None);
        };
        if existing.canceled_at.is_some() || existing.end_date.is_some() {
            return Ok(None);
        }
        existing.canceled_at = Some(at);
        existing.updated_at = at;
        Ok(Some(existing.clone()))
    }

    async fn create_problem(
        &self,
        delivery_id: i64,
        description: &str,
        at: DateTime<Utc>,
    ) -> Result<DeliveryProblem> {
        let mut tables = self.tables.write().await;
        if !tables.deliveries.contains_key(&delivery_id) {
            return Err(AppError::NotFound("This delivery does not exist".to_string()));
        }
        let problem = DeliveryProblem {
            id: tables.allocate_id(),
            delivery_id,
            description: description.to_string(),
            created_at: at,
            updated_at: at,
        };
        tables.problems.insert(problem.id, problem.clone());
        Ok(problem)
    }

    async fn list_problems(&self, delivery_id: i64) -> Result<Vec<DeliveryProblem>> {
        Ok(self
            .tables
            .read()
            .await
            .problems
            .values()
            .filter(|p| p.delivery_id == delivery_id)
            .cloned()
            .collect())
    }
}
