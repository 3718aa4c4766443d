//! Read-only projections over deliveries

use crate::error::{AppError, Result};
use crate::models::{Delivery, DeliveryView, DeliveryWithProblems};
use crate::store::{DeliveryFilter, Repository};

pub async fn all_deliveries(repo: &dyn Repository) -> Result<Vec<Delivery>> {
    repo.list_deliveries(DeliveryFilter::all()).await
}

/// Deliveries that ended in cancellation
pub async fn canceled_deliveries(repo: &dyn Repository) -> Result<Vec<Delivery>> {
    repo.list_deliveries(DeliveryFilter::canceled()).await
}

pub async fn deliveries_for_deliveryman(
    repo: &dyn Repository,
    deliveryman_id: i64,
) -> Result<Vec<Delivery>> {
    repo.list_deliveries(DeliveryFilter::for_deliveryman(deliveryman_id))
        .await
}

/// Deliveries the deliveryman still has to withdraw or hand over
pub async fn active_orders(repo: &dyn Repository, deliveryman_id: i64) -> Result<Vec<Delivery>> {
    if repo.find_deliveryman(deliveryman_id).await?.is_none() {
        return Err(AppError::NotFound("This deliveryman does not exist".to_string()));
    }
    repo.list_deliveries(DeliveryFilter::active_for_deliveryman(deliveryman_id))
        .await
}

pub async fn delivery_view(repo: &dyn Repository, id: i64) -> Result<DeliveryView> {
    let delivery = repo
        .find_delivery(id)
        .await?
        .ok_or_else(|| AppError::NotFound("This delivery does not exist".to_string()))?;
    let recipient = repo
        .find_recipient(delivery.recipient_id)
        .await?
        .ok_or_else(|| AppError::NotFound("This recipient does not exist".to_string()))?;
    let deliveryman = repo
        .find_deliveryman(delivery.deliveryman_id)
        .await?
        .ok_or_else(|| AppError::NotFound("This deliveryman does not exist".to_string()))?;

    Ok(DeliveryView::new(&delivery, &recipient, &deliveryman))
}

pub async fn delivery_with_problems(
    repo: &dyn Repository,
    id: i64,
) -> Result<DeliveryWithProblems> {
    let delivery = repo
        .find_delivery(id)
        .await?
        .ok_or_else(|| AppError::NotFound("This delivery does not exist".to_string()))?;
    let problems = repo.list_problems(id).await?;

    Ok(DeliveryWithProblems {
        delivery: delivery.into(),
        problems,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewDelivery, NewDeliveryman, NewRecipient};
    use crate::store::MemoryStore;
    use chrono::Utc;

    async fn seeded() -> (MemoryStore, i64, i64) {
        let store = MemoryStore::new();
        let recipient = store
            .create_recipient(NewRecipient {
                name: "Ana".to_string(),
                street: "Rua das Flores".to_string(),
                number: "42".to_string(),
                complement: Some("Apto 3".to_string()),
                state: "SP".to_string(),
                city: "Campinas".to_string(),
                zip_code: "13000-000".to_string(),
            })
            .await
            .unwrap();
        let deliveryman = store
            .create_deliveryman(NewDeliveryman {
                name: "Bruno".to_string(),
                email: "bruno@fastfeet.com".to_string(),
                avatar_id: None,
            })
            .await
            .unwrap();
        (store, recipient.id, deliveryman.id)
    }

    #[tokio::test]
    async fn test_delivery_view_joins_names_and_address() {
        let (store, recipient_id, deliveryman_id) = seeded().await;
        let delivery = store
            .create_delivery(
                NewDelivery {
                    product: "Widget".to_string(),
                    recipient_id,
                    deliveryman_id,
                },
                Utc::now(),
            )
            .await
            .unwrap();

        let view = delivery_view(&store, delivery.id).await.unwrap();
        assert_eq!(view.recipient_name, "Ana");
        assert_eq!(view.deliveryman_name, "Bruno");
        assert_eq!(view.address.city, "Campinas");
        assert_eq!(view.address.complement.as_deref(), Some("Apto 3"));
    }

    #[tokio::test]
    async fn test_active_orders_requires_deliveryman() {
        let (store, _, _) = seeded().await;
        let err = active_orders(&store, 999).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delivery_with_problems_not_found() {
        let (store, _, _) = seeded().await;
        assert!(matches!(
            delivery_with_problems(&store, 999).await,
            Err(AppError::NotFound(_))
        ));
    }
}
