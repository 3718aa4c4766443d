//! SQLite store for users, recipients, deliverymen and deliveries

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::{DeliveryFilter, PickUpClaim, Repository};
use crate::error::{conflict_on_unique, AppError, Result};
use crate::models::{
    Delivery, DeliveryProblem, Deliveryman, File, NewDelivery, NewDeliveryman, NewFile,
    NewRecipient, NewUser, Recipient, User,
};

const DELIVERY_COLUMNS: &str = "id, product, recipient_id, deliveryman_id, signature_id, \
     start_date, end_date, canceled_at, created_at, updated_at";

/// Runs the embedded migrations against `pool`
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| AppError::Internal(format!("Migration failed: {}", e)))
}

/// Database store
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_delivery(&self, id: i64) -> Result<Option<Delivery>> {
        let row = sqlx::query_as::<_, DeliveryRow>(&format!(
            "SELECT {} FROM deliveries WHERE id = ?",
            DELIVERY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Re-reads the delivery if a conditional update touched a row
    async fn reload_if_changed(&self, id: i64, rows_affected: u64) -> Result<Option<Delivery>> {
        if rows_affected == 0 {
            return Ok(None);
        }
        self.fetch_delivery(id).await
    }
}

fn delete_blocked(err: sqlx::Error, message: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            AppError::Conflict(message.to_string())
        }
        _ => AppError::Database(err),
    }
}

#[async_trait]
impl Repository for SqliteStore {
    // User operations

    async fn create_user(&self, user: NewUser) -> Result<User> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO users (name, email, provider, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.provider)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "User already exists"))?;

        Ok(User {
            id: result.last_insert_rowid(),
            name: user.name,
            email: user.email,
            provider: user.provider,
            created_at: now,
            updated_at: now,
        })
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, email, provider, created_at, updated_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, email, provider, created_at, updated_at
            FROM users
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update_user(
        &self,
        id: i64,
        name: Option<String>,
        email: Option<String>,
    ) -> Result<Option<User>> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE users
            SET name = COALESCE(?, name), email = COALESCE(?, email), updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(name)
        .bind(email)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "User already exists"))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_user(id).await
    }

    // File operations

    async fn create_file(&self, file: NewFile) -> Result<File> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO files (name, path, created_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&file.name)
        .bind(&file.path)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(File {
            id: result.last_insert_rowid(),
            name: file.name,
            path: file.path,
            created_at: now,
        })
    }

    async fn find_file(&self, id: i64) -> Result<Option<File>> {
        let row = sqlx::query_as::<_, FileRow>(
            r#"
            SELECT id, name, path, created_at
            FROM files
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    // Recipient operations

    async fn create_recipient(&self, recipient: NewRecipient) -> Result<Recipient> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO recipients (name, street, number, complement, state, city, zip_code, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&recipient.name)
        .bind(&recipient.street)
        .bind(&recipient.number)
        .bind(&recipient.complement)
        .bind(&recipient.state)
        .bind(&recipient.city)
        .bind(&recipient.zip_code)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Recipient {
            id: result.last_insert_rowid(),
            name: recipient.name,
            street: recipient.street,
            number: recipient.number,
            complement: recipient.complement,
            state: recipient.state,
            city: recipient.city,
            zip_code: recipient.zip_code,
            created_at: now,
            updated_at: now,
        })
    }

    async fn find_recipient(&self, id: i64) -> Result<Option<Recipient>> {
        let row = sqlx::query_as::<_, RecipientRow>(
            r#"
            SELECT id, name, street, number, complement, state, city, zip_code, created_at, updated_at
            FROM recipients
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn list_recipients(&self) -> Result<Vec<Recipient>> {
        let rows = sqlx::query_as::<_, RecipientRow>(
            r#"
            SELECT id, name, street, number, complement, state, city, zip_code, created_at, updated_at
            FROM recipients
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn delete_recipient(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM recipients WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| delete_blocked(e, "This recipient still has deliveries"))?;

        Ok(result.rows_affected() > 0)
    }

    // Deliveryman operations

    async fn create_deliveryman(&self, deliveryman: NewDeliveryman) -> Result<Deliveryman> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO deliverymen (name, email, avatar_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&deliveryman.name)
        .bind(&deliveryman.email)
        .bind(deliveryman.avatar_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Deliveryman already exists"))?;

        Ok(Deliveryman {
            id: result.last_insert_rowid(),
            name: deliveryman.name,
            email: deliveryman.email,
            avatar_id: deliveryman.avatar_id,
            created_at: now,
            updated_at: now,
        })
    }

    async fn find_deliveryman(&self, id: i64) -> Result<Option<Deliveryman>> {
        let row = sqlx::query_as::<_, DeliverymanRow>(
            r#"
            SELECT id, name, email, avatar_id, created_at, updated_at
            FROM deliverymen
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn find_deliveryman_by_email(&self, email: &str) -> Result<Option<Deliveryman>> {
        let row = sqlx::query_as::<_, DeliverymanRow>(
            r#"
            SELECT id, name, email, avatar_id, created_at, updated_at
            FROM deliverymen
            WHERE email = ?
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn list_deliverymen(&self) -> Result<Vec<Deliveryman>> {
        let rows = sqlx::query_as::<_, DeliverymanRow>(
            r#"
            SELECT id, name, email, avatar_id, created_at, updated_at
            FROM deliverymen
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update_deliveryman(
        &self,
        id: i64,
        deliveryman: NewDeliveryman,
    ) -> Result<Option<Deliveryman>> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE deliverymen SET name = ?, email = ?, avatar_id = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&deliveryman.name)
        .bind(&deliveryman.email)
        .bind(deliveryman.avatar_id)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Deliveryman already exists"))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_deliveryman(id).await
    }

    async fn delete_deliveryman(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM deliverymen WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| delete_blocked(e, "This deliveryman still has deliveries"))?;

        Ok(result.rows_affected() > 0)
    }

    // Delivery operations

    async fn create_delivery(&self, delivery: NewDelivery, at: DateTime<Utc>) -> Result<Delivery> {
        let result = sqlx::query(
            r#"
            INSERT INTO deliveries (product, recipient_id, deliveryman_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&delivery.product)
        .bind(delivery.recipient_id)
        .bind(delivery.deliveryman_id)
        .bind(at)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(Delivery {
            id: result.last_insert_rowid(),
            product: delivery.product,
            recipient_id: delivery.recipient_id,
            deliveryman_id: delivery.deliveryman_id,
            signature_id: None,
            start_date: None,
            end_date: None,
            canceled_at: None,
            created_at: at,
            updated_at: at,
        })
    }

    async fn find_delivery(&self, id: i64) -> Result<Option<Delivery>> {
        self.fetch_delivery(id).await
    }

    async fn list_deliveries(&self, filter: DeliveryFilter) -> Result<Vec<Delivery>> {
        let mut sql = format!("SELECT {} FROM deliveries WHERE 1 = 1", DELIVERY_COLUMNS);
        if filter.deliveryman_id.is_some() {
            sql.push_str(" AND deliveryman_id = ?");
        }
        match filter.canceled {
            Some(true) => sql.push_str(" AND canceled_at IS NOT NULL"),
            Some(false) => sql.push_str(" AND canceled_at IS NULL"),
            None => {}
        }
        if filter.exclude_completed {
            sql.push_str(" AND end_date IS NULL");
        }
        sql.push_str(" ORDER BY id ASC");

        let mut query = sqlx::query_as::<_, DeliveryRow>(&sql);
        if let Some(id) = filter.deliveryman_id {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn count_started_between(
        &self,
        deliveryman_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM deliveries
            WHERE deliveryman_id = ? AND start_date >= ? AND start_date < ?
            "#,
        )
        .bind(deliveryman_id)
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn reassign_delivery(
        &self,
        id: i64,
        delivery: NewDelivery,
        only_pending: bool,
        at: DateTime<Utc>,
    ) -> Result<Option<Delivery>> {
        let mut sql = String::from(
            "UPDATE deliveries SET product = ?, recipient_id = ?, deliveryman_id = ?, updated_at = ? \
             WHERE id = ?",
        );
        if only_pending {
            sql.push_str(" AND start_date IS NULL AND end_date IS NULL AND canceled_at IS NULL");
        }

        let result = sqlx::query(&sql)
            .bind(&delivery.product)
            .bind(delivery.recipient_id)
            .bind(delivery.deliveryman_id)
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;

        self.reload_if_changed(id, result.rows_affected()).await
    }

    async fn start_delivery(&self, id: i64, claim: PickUpClaim) -> Result<Option<Delivery>> {
        // Guard and write in one statement so concurrent pickups serialize on the row
        let result = sqlx::query(
            r#"
            UPDATE deliveries SET start_date = ?, updated_at = ?
            WHERE id = ?
              AND start_date IS NULL
              AND canceled_at IS NULL
              AND (
                SELECT COUNT(*) FROM deliveries
                WHERE deliveryman_id = ? AND start_date >= ? AND start_date < ?
              ) < ?
            "#,
        )
        .bind(claim.at)
        .bind(claim.at)
        .bind(id)
        .bind(claim.deliveryman_id)
        .bind(claim.day_start)
        .bind(claim.day_end)
        .bind(claim.daily_limit)
        .execute(&self.pool)
        .await?;

        self.reload_if_changed(id, result.rows_affected()).await
    }

    async fn complete_delivery(
        &self,
        id: i64,
        signature: NewFile,
        at: DateTime<Utc>,
    ) -> Result<Option<Delivery>> {
        let mut tx = self.pool.begin().await?;

        let file = sqlx::query(
            r#"
            INSERT INTO files (name, path, created_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&signature.name)
        .bind(&signature.path)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            r#"
            UPDATE deliveries SET end_date = ?, signature_id = ?, updated_at = ?
            WHERE id = ?
              AND start_date IS NOT NULL
              AND end_date IS NULL
              AND canceled_at IS NULL
            "#,
        )
        .bind(at)
        .bind(file.last_insert_rowid())
        .bind(at)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }
        tx.commit().await?;

        self.fetch_delivery(id).await
    }

    async fn cancel_delivery(&self, id: i64, at: DateTime<Utc>) -> Result<Option<Delivery>> {
        let result = sqlx::query(
            r#"
            UPDATE deliveries SET canceled_at = ?, updated_at = ?
            WHERE id = ? AND canceled_at IS NULL AND end_date IS NULL
            "#,
        )
        .bind(at)
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.reload_if_changed(id, result.rows_affected()).await
    }

    // Problem operations

    async fn create_problem(
        &self,
        delivery_id: i64,
        description: &str,
        at: DateTime<Utc>,
    ) -> Result<DeliveryProblem> {
        let result = sqlx::query(
            r#"
            INSERT INTO delivery_problems (delivery_id, description, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(delivery_id)
        .bind(description)
        .bind(at)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(DeliveryProblem {
            id: result.last_insert_rowid(),
            delivery_id,
            description: description.to_string(),
            created_at: at,
            updated_at: at,
        })
    }

    async fn list_problems(&self, delivery_id: i64) -> Result<Vec<DeliveryProblem>> {
        let rows = sqlx::query_as::<_, ProblemRow>(
            r#"
            SELECT id, delivery_id, description, created_at, updated_at
            FROM delivery_problems
            WHERE delivery_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(delivery_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

// Internal row types for sqlx

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    name: String,
    email: String,
    provider: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            name: row.name,
            email: row.email,
            provider: row.provider,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct FileRow {
    id: i64,
    name: String,
    path: String,
    created_at: DateTime<Utc>,
}

impl From<FileRow> for File {
    fn from(row: FileRow) -> Self {
        File {
            id: row.id,
            name: row.name,
            path: row.path,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RecipientRow {
    id: i64,
    name: String,
    street: String,
    number: String,
    complement: Option<String>,
    state: String,
    city: String,
    zip_code: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RecipientRow> for Recipient {
    fn from(row: RecipientRow) -> Self {
        Recipient {
            id: row.id,
            name: row.name,
            street: row.street,
            number: row.number,
            complement: row.complement,
            state: row.state,
            city: row.city,
            zip_code: row.zip_code,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DeliverymanRow {
    id: i64,
    name: String,
    email: String,
    avatar_id: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DeliverymanRow> for Deliveryman {
    fn from(row: DeliverymanRow) -> Self {
        Deliveryman {
            id: row.id,
            name: row.name,
            email: row.email,
            avatar_id: row.avatar_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DeliveryRow {
    id: i64,
    product: String,
    recipient_id: i64,
    deliveryman_id: i64,
    signature_id: Option<i64>,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    canceled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DeliveryRow> for Delivery {
    fn from(row: DeliveryRow) -> Self {
        Delivery {
            id: row.id,
            product: row.product,
            recipient_id: row.recipient_id,
            deliveryman_id: row.deliveryman_id,
            signature_id: row.signature_id,
            start_date: row.start_date,
            end_date: row.end_date,
            canceled_at: row.canceled_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProblemRow {
    id: i64,
    delivery_id: i64,
    description: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProblemRow> for DeliveryProblem {
    fn from(row: ProblemRow) -> Self {
        DeliveryProblem {
            id: row.id,
            delivery_id: row.delivery_id,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
