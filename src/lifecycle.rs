//! Delivery lifecycle engine
//!
//! ```text
//! Created ──pick_up──▶ PickedUp ──complete──▶ Completed
//!    │                    │
//!    └──────cancel────────┴──────▶ Canceled (terminal)
//! ```
//!
//! Every guard is checked twice: once against a fresh read, to produce a
//! precise error, and once by the store's conditional write, which is what
//! actually protects against concurrent requests.

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Offset, TimeZone, Utc};
use mockable::Clock;

use crate::error::{AppError, Result};
use crate::models::{
    Delivery, DeliveryProblem, DeliveryStatus, Deliveryman, NewDelivery, NewFile,
};
use crate::notify::{Notification, Notifier};
use crate::store::{PickUpClaim, Repository};

/// Whether a delivery's recipient and deliveryman may change after pickup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ReassignPolicy {
    /// Reassignment is allowed in every state
    #[default]
    Any,
    /// Only deliveries that are not yet picked up, completed or canceled
    BeforePickup,
}

/// Business rules for pickups and reassignment
#[derive(Debug, Clone)]
pub struct LifecyclePolicy {
    pub pickup_opens: NaiveTime,
    pub pickup_closes: NaiveTime,
    pub daily_pickup_limit: i64,
    /// Offset of the carrier's wall clock from UTC
    pub utc_offset: FixedOffset,
    pub reassign: ReassignPolicy,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            pickup_opens: NaiveTime::from_hms_opt(8, 0, 0).expect("08:00 is a valid time"),
            pickup_closes: NaiveTime::from_hms_opt(18, 0, 0).expect("18:00 is a valid time"),
            daily_pickup_limit: 5,
            utc_offset: Utc.fix(),
            reassign: ReassignPolicy::Any,
        }
    }
}

impl LifecyclePolicy {
    /// Compares the wall-clock time of `now` against the window, both ends inclusive
    pub fn within_pickup_window(&self, now: DateTime<Utc>) -> bool {
        let time = now.with_timezone(&self.utc_offset).time();
        self.pickup_opens <= time && time <= self.pickup_closes
    }

    /// `[start, end)` of the wall-clock day containing `now`, in UTC
    pub fn pickup_day(&self, now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let midnight = now
            .with_timezone(&self.utc_offset)
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .and_then(|naive| self.utc_offset.from_local_datetime(&naive).single())
            .ok_or_else(|| AppError::Internal(format!("No local midnight for {}", now)))?
            .with_timezone(&Utc);

        Ok((midnight, midnight + Duration::days(1)))
    }

    pub fn window_message(&self) -> String {
        format!(
            "You can only withdraw orders between {} and {}",
            self.pickup_opens.format("%H:%M"),
            self.pickup_closes.format("%H:%M")
        )
    }
}

/// Rules governing creation, pickup, completion and cancellation of deliveries
pub struct DeliveryLifecycle {
    repo: Arc<dyn Repository>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    policy: LifecyclePolicy,
}

fn delivery_not_found() -> AppError {
    AppError::NotFound("This delivery does not exist".to_string())
}

fn transition(message: &str) -> AppError {
    AppError::InvalidTransition(message.to_string())
}

impl DeliveryLifecycle {
    pub fn new(
        repo: Arc<dyn Repository>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        policy: LifecyclePolicy,
    ) -> Self {
        Self {
            repo,
            notifier,
            clock,
            policy,
        }
    }

    async fn load(&self, id: i64) -> Result<Delivery> {
        self.repo.find_delivery(id).await?.ok_or_else(delivery_not_found)
    }

    /// Checks that both parties exist and returns the deliveryman
    async fn ensure_references(
        &self,
        recipient_id: i64,
        deliveryman_id: i64,
    ) -> Result<Deliveryman> {
        if self.repo.find_recipient(recipient_id).await?.is_none() {
            return Err(AppError::NotFound("This recipient does not exist".to_string()));
        }
        self.repo
            .find_deliveryman(deliveryman_id)
            .await?
            .ok_or_else(|| AppError::NotFound("This deliveryman does not exist".to_string()))
    }

    /// Registers a new delivery and tells its deliveryman it is ready for pickup.
    ///
    /// The notification is attempted once, after the delivery is stored. A
    /// failed send is logged and does not undo the delivery.
    pub async fn create(&self, delivery: NewDelivery) -> Result<Delivery> {
        let deliveryman = self
            .ensure_references(delivery.recipient_id, delivery.deliveryman_id)
            .await?;

        let created = self.repo.create_delivery(delivery, self.clock.utc()).await?;
        tracing::info!(
            delivery_id = created.id,
            deliveryman_id = created.deliveryman_id,
            "Delivery created"
        );

        let notification = Notification::ready_for_pickup(&deliveryman, &created.product);
        if let Err(e) = self.notifier.send(&notification).await {
            tracing::warn!(delivery_id = created.id, "Pickup notification not sent: {}", e);
        }

        Ok(created)
    }

    /// Changes product, recipient and deliveryman of an existing delivery
    pub async fn reassign(&self, id: i64, delivery: NewDelivery) -> Result<Delivery> {
        let current = self.load(id).await?;
        self.ensure_references(delivery.recipient_id, delivery.deliveryman_id)
            .await?;

        let only_pending = self.policy.reassign == ReassignPolicy::BeforePickup;
        if only_pending && current.status() != DeliveryStatus::Created {
            return Err(transition("This delivery can no longer be reassigned"));
        }

        let updated = self
            .repo
            .reassign_delivery(id, delivery, only_pending, self.clock.utc())
            .await?;

        match updated {
            Some(d) => {
                tracing::info!(
                    delivery_id = id,
                    deliveryman_id = d.deliveryman_id,
                    "Delivery reassigned"
                );
                Ok(d)
            }
            None if only_pending => Err(transition("This delivery can no longer be reassigned")),
            None => Err(delivery_not_found()),
        }
    }

    /// Marks the delivery as withdrawn by its deliveryman at the current time
    pub async fn pick_up(&self, id: i64) -> Result<Delivery> {
        self.pick_up_at(id, self.clock.utc()).await
    }

    pub async fn pick_up_at(&self, id: i64, now: DateTime<Utc>) -> Result<Delivery> {
        let delivery = self.load(id).await?;

        if delivery.canceled_at.is_some() {
            return Err(transition("This delivery has been canceled"));
        }
        if delivery.start_date.is_some() {
            return Err(transition("This delivery has already started"));
        }
        if !self.policy.within_pickup_window(now) {
            tracing::debug!(delivery_id = id, %now, "Pickup outside window");
            return Err(AppError::InvalidTransition(self.policy.window_message()));
        }

        let (day_start, day_end) = self.policy.pickup_day(now)?;
        let picked_today = self
            .repo
            .count_started_between(delivery.deliveryman_id, day_start, day_end)
            .await?;
        if picked_today >= self.policy.daily_pickup_limit {
            return Err(self.quota_error());
        }

        let claim = PickUpClaim {
            deliveryman_id: delivery.deliveryman_id,
            at: now,
            day_start,
            day_end,
            daily_limit: self.policy.daily_pickup_limit,
        };
        match self.repo.start_delivery(id, claim).await? {
            Some(started) => {
                tracing::info!(
                    delivery_id = id,
                    deliveryman_id = started.deliveryman_id,
                    "Delivery picked up"
                );
                Ok(started)
            }
            // Lost a race: report whichever guard failed
            None => match self.repo.find_delivery(id).await? {
                None => Err(delivery_not_found()),
                Some(d) if d.canceled_at.is_some() => {
                    Err(transition("This delivery has been canceled"))
                }
                Some(d) if d.start_date.is_some() => {
                    Err(transition("This delivery has already started"))
                }
                Some(_) => Err(self.quota_error()),
            },
        }
    }

    fn quota_error(&self) -> AppError {
        AppError::InvalidTransition(format!(
            "This deliveryman can only make {} deliveries per day",
            self.policy.daily_pickup_limit
        ))
    }

    /// Fails with the same error `complete` would give, without writing anything
    pub async fn ensure_completable(&self, id: i64) -> Result<()> {
        check_completable(&self.load(id).await?)
    }

    /// Closes a picked-up delivery with the recipient's signature
    pub async fn complete(&self, id: i64, signature: NewFile) -> Result<Delivery> {
        let delivery = self.load(id).await?;
        check_completable(&delivery)?;

        match self.repo.complete_delivery(id, signature, self.clock.utc()).await? {
            Some(done) => {
                tracing::info!(
                    delivery_id = id,
                    signature_id = ?done.signature_id,
                    "Delivery completed"
                );
                Ok(done)
            }
            None => {
                let current = self.load(id).await?;
                check_completable(&current)?;
                Err(AppError::Internal(format!(
                    "Delivery {} could not be completed",
                    id
                )))
            }
        }
    }

    pub async fn cancel(&self, id: i64) -> Result<Delivery> {
        let delivery = self.load(id).await?;
        check_cancelable(&delivery)?;

        match self.repo.cancel_delivery(id, self.clock.utc()).await? {
            Some(canceled) => {
                tracing::info!(delivery_id = id, "Delivery canceled");
                Ok(canceled)
            }
            None => {
                let current = self.load(id).await?;
                check_cancelable(&current)?;
                Err(AppError::Internal(format!(
                    "Delivery {} could not be canceled",
                    id
                )))
            }
        }
    }

    /// Records a problem; the delivery itself is left untouched
    pub async fn report_problem(&self, id: i64, description: &str) -> Result<DeliveryProblem> {
        self.load(id).await?;

        let problem = self
            .repo
            .create_problem(id, description, self.clock.utc())
            .await?;
        tracing::info!(delivery_id = id, problem_id = problem.id, "Delivery problem reported");
        Ok(problem)
    }
}

fn check_completable(delivery: &Delivery) -> Result<()> {
    if delivery.canceled_at.is_some() {
        return Err(transition("This delivery has been canceled"));
    }
    if delivery.start_date.is_none() {
        return Err(transition("This order hasn't started yet"));
    }
    if delivery.end_date.is_some() {
        return Err(transition("This delivery has already ended"));
    }
    Ok(())
}

fn check_cancelable(delivery: &Delivery) -> Result<()> {
    if delivery.canceled_at.is_some() {
        return Err(transition("This delivery has already been canceled"));
    }
    if delivery.end_date.is_some() {
        return Err(transition("This delivery has already ended"));
    }
    Ok(())
}
