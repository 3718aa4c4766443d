//! Data models for users, recipients, deliverymen and deliveries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// An account that can act on the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub provider: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A postal address that deliveries are sent to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: i64,
    pub name: String,
    pub street: String,
    pub number: String,
    pub complement: Option<String>,
    pub state: String,
    pub city: String,
    pub zip_code: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deliveryman {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub avatar_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An uploaded artifact (signature or avatar)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub created_at: DateTime<Utc>,
}

/// A package on its way from the carrier to a recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub id: i64,
    pub product: String,
    pub recipient_id: i64,
    pub deliveryman_id: i64,
    pub signature_id: Option<i64>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Delivery {
    pub fn status(&self) -> DeliveryStatus {
        if self.canceled_at.is_some() {
            DeliveryStatus::Canceled
        } else if self.end_date.is_some() {
            DeliveryStatus::Completed
        } else if self.start_date.is_some() {
            DeliveryStatus::PickedUp
        } else {
            DeliveryStatus::Created
        }
    }
}

/// Lifecycle state derived from a delivery's timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Created,
    PickedUp,
    Completed,
    Canceled,
}

/// A problem reported against a delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryProblem {
    pub id: i64,
    pub delivery_id: i64,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Delivery as returned by the API, with its derived status
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryResponse {
    #[serde(flatten)]
    pub delivery: Delivery,
    pub status: DeliveryStatus,
}

impl From<Delivery> for DeliveryResponse {
    fn from(delivery: Delivery) -> Self {
        let status = delivery.status();
        Self { delivery, status }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Address {
    pub street: String,
    pub number: String,
    pub complement: Option<String>,
    pub state: String,
    pub city: String,
    pub zip_code: String,
}

impl From<&Recipient> for Address {
    fn from(r: &Recipient) -> Self {
        Self {
            street: r.street.clone(),
            number: r.number.clone(),
            complement: r.complement.clone(),
            state: r.state.clone(),
            city: r.city.clone(),
            zip_code: r.zip_code.clone(),
        }
    }
}

/// Denormalized delivery for display: recipient address and deliveryman name inlined
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryView {
    pub id: i64,
    pub product: String,
    pub status: DeliveryStatus,
    pub recipient_id: i64,
    pub recipient_name: String,
    pub address: Address,
    pub deliveryman_id: i64,
    pub deliveryman_name: String,
    pub signature_id: Option<i64>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
}

impl DeliveryView {
    pub fn new(delivery: &Delivery, recipient: &Recipient, deliveryman: &Deliveryman) -> Self {
        Self {
            id: delivery.id,
            product: delivery.product.clone(),
            status: delivery.status(),
            recipient_id: recipient.id,
            recipient_name: recipient.name.clone(),
            address: recipient.into(),
            deliveryman_id: deliveryman.id,
            deliveryman_name: deliveryman.name.clone(),
            signature_id: delivery.signature_id,
            start_date: delivery.start_date,
            end_date: delivery.end_date,
            canceled_at: delivery.canceled_at,
        }
    }
}

/// A delivery together with every problem reported against it
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryWithProblems {
    pub delivery: DeliveryResponse,
    pub problems: Vec<DeliveryProblem>,
}

// Insert payloads handed to the store

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub provider: bool,
}

#[derive(Debug, Clone)]
pub struct NewRecipient {
    pub name: String,
    pub street: String,
    pub number: String,
    pub complement: Option<String>,
    pub state: String,
    pub city: String,
    pub zip_code: String,
}

#[derive(Debug, Clone)]
pub struct NewDeliveryman {
    pub name: String,
    pub email: String,
    pub avatar_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewDelivery {
    pub product: String,
    pub recipient_id: i64,
    pub deliveryman_id: i64,
}

#[derive(Debug, Clone)]
pub struct NewFile {
    pub name: String,
    pub path: String,
}

// Request bodies

/// Checks required fields after deserialization
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("Validation fails: {} is required", field)));
    }
    Ok(())
}

fn require_opt(field: &str, value: &Option<String>) -> Result<()> {
    match value {
        Some(v) => require(field, v),
        None => Err(AppError::Validation(format!("Validation fails: {} is required", field))),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub provider: bool,
}

impl Validate for CreateUserRequest {
    fn validate(&self) -> Result<()> {
        require_opt("name", &self.name)?;
        require_opt("email", &self.email)
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl Validate for UpdateUserRequest {
    fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            require("name", name)?;
        }
        if let Some(email) = &self.email {
            require("email", email)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateRecipientRequest {
    pub name: Option<String>,
    pub street: Option<String>,
    pub number: Option<String>,
    pub complement: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub zip_code: Option<String>,
}

impl Validate for CreateRecipientRequest {
    fn validate(&self) -> Result<()> {
        require_opt("name", &self.name)?;
        require_opt("street", &self.street)?;
        require_opt("number", &self.number)?;
        require_opt("state", &self.state)?;
        require_opt("city", &self.city)?;
        require_opt("zip_code", &self.zip_code)
    }
}

impl From<CreateRecipientRequest> for NewRecipient {
    fn from(req: CreateRecipientRequest) -> Self {
        Self {
            name: req.name.unwrap_or_default(),
            street: req.street.unwrap_or_default(),
            number: req.number.unwrap_or_default(),
            complement: req.complement.filter(|c| !c.trim().is_empty()),
            state: req.state.unwrap_or_default(),
            city: req.city.unwrap_or_default(),
            zip_code: req.zip_code.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DeliverymanRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar_id: Option<i64>,
}

impl Validate for DeliverymanRequest {
    fn validate(&self) -> Result<()> {
        require_opt("name", &self.name)?;
        require_opt("email", &self.email)
    }
}

impl From<DeliverymanRequest> for NewDeliveryman {
    fn from(req: DeliverymanRequest) -> Self {
        Self {
            name: req.name.unwrap_or_default(),
            email: req.email.unwrap_or_default(),
            avatar_id: req.avatar_id,
        }
    }
}

/// Body of both delivery creation and reassignment
#[derive(Debug, Deserialize)]
pub struct DeliveryRequest {
    pub product: Option<String>,
    pub recipient_id: Option<i64>,
    pub deliveryman_id: Option<i64>,
}

impl Validate for DeliveryRequest {
    fn validate(&self) -> Result<()> {
        require_opt("product", &self.product)?;
        if self.recipient_id.is_none() {
            return Err(AppError::Validation("Validation fails: recipient_id is required".into()));
        }
        if self.deliveryman_id.is_none() {
            return Err(AppError::Validation(
                "Validation fails: deliveryman_id is required".into(),
            ));
        }
        Ok(())
    }
}

impl From<DeliveryRequest> for NewDelivery {
    fn from(req: DeliveryRequest) -> Self {
        Self {
            product: req.product.unwrap_or_default(),
            recipient_id: req.recipient_id.unwrap_or_default(),
            deliveryman_id: req.deliveryman_id.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReportProblemRequest {
    pub description: Option<String>,
}

impl Validate for ReportProblemRequest {
    fn validate(&self) -> Result<()> {
        require_opt("description", &self.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery() -> Delivery {
        let now = Utc::now();
        Delivery {
            id: 1,
            product: "Widget".to_string(),
            recipient_id: 1,
            deliveryman_id: 2,
            signature_id: None,
            start_date: None,
            end_date: None,
            canceled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_status_follows_timestamps() {
        let mut d = delivery();
        assert_eq!(d.status(), DeliveryStatus::Created);

        d.start_date = Some(Utc::now());
        assert_eq!(d.status(), DeliveryStatus::PickedUp);

        d.end_date = Some(Utc::now());
        assert_eq!(d.status(), DeliveryStatus::Completed);
    }

    #[test]
    fn test_canceled_wins_over_other_timestamps() {
        let mut d = delivery();
        d.start_date = Some(Utc::now());
        d.canceled_at = Some(Utc::now());
        assert_eq!(d.status(), DeliveryStatus::Canceled);
    }

    #[test]
    fn test_delivery_response_includes_status() {
        let json = serde_json::to_value(DeliveryResponse::from(delivery())).unwrap();
        assert_eq!(json["status"], "created");
        assert_eq!(json["product"], "Widget");
        assert!(json["start_date"].is_null());
    }

    #[test]
    fn test_delivery_request_requires_ids() {
        let req: DeliveryRequest =
            serde_json::from_str(r#"{"product": "Widget", "recipient_id": 1}"#).unwrap();
        assert!(matches!(req.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_blank_strings_fail_validation() {
        let req: ReportProblemRequest = serde_json::from_str(r#"{"description": "  "}"#).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_recipient_blank_complement_is_dropped() {
        let req: CreateRecipientRequest = serde_json::from_value(serde_json::json!({
            "name": "Ana", "street": "Rua A", "number": "10", "complement": "",
            "state": "SP", "city": "Sao Paulo", "zip_code": "01000-000"
        }))
        .unwrap();
        req.validate().unwrap();
        let new: NewRecipient = req.into();
        assert_eq!(new.complement, None);
    }
}
