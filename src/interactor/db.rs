use crate::entity::{Order, OrderStatus, OrderUpdate, PriceTrigger, TriggerLog, TriggerMatch};
use chrono::Utc;
use log::{debug, info};
use rust_decimal::Decimal;
use sqlx::{Error as SqlxError, PgPool, Postgres, QueryBuilder, Row};

/// Get all pending orders, oldest first
pub async fn get_active_orders(pool: &PgPool) -> Result<Vec<Order>, SqlxError> {
    let rows = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders
         WHERE status = $1
         ORDER BY created_at ASC",
    )
    .bind(OrderStatus::Pending.to_string())
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Get a specific order by ID
pub async fn get_order_by_id(pool: &PgPool, order_id: &str) -> Result<Option<Order>, SqlxError> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(order_id)
        .fetch_optional(pool)
        .await?;

    Ok(order)
}

/// Apply a partial update to a pending order, stamping `updated_at`.
///
/// Rows that already reached a terminal status are left untouched; the
/// return value tells whether a row was updated.
pub async fn update_order(
    pool: &PgPool,
    order_id: &str,
    update: &OrderUpdate,
) -> Result<bool, SqlxError> {
    let mut query = QueryBuilder::<Postgres>::new("UPDATE orders SET updated_at = ");
    query.push_bind(Utc::now());

    if let Some(status) = update.status {
        query.push(", status = ").push_bind(status.to_string());
    }
    if let Some(executed_at) = update.executed_at {
        query.push(", executed_at = ").push_bind(executed_at);
    }
    if let Some(hash) = &update.transaction_hash {
        query.push(", transaction_hash = ").push_bind(hash.clone());
    }
    if let Some(price) = update.executed_price {
        query.push(", executed_price = ").push_bind(price);
    }
    if let Some(error) = &update.error {
        query.push(", error = ").push_bind(error.clone());
    }
    if let Some(key) = &update.submission_key {
        query.push(", submission_key = ").push_bind(key.clone());
    }

    query
        .push(" WHERE id = ")
        .push_bind(order_id)
        .push(" AND status = ")
        .push_bind(OrderStatus::Pending.to_string());
    if update.is_claim() {
        query.push(" AND submission_key IS NULL");
    }

    let result = query.build().execute(pool).await?;
    let updated = result.rows_affected() > 0;

    if updated {
        info!(
            "Updated order: id={}, status={}",
            order_id,
            update
                .status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unchanged".to_string())
        );
    } else {
        debug!("Order {} is not pending, update skipped", order_id);
    }

    Ok(updated)
}

/// Get all active price triggers with the time of their latest check
pub async fn get_active_triggers(pool: &PgPool) -> Result<Vec<PriceTrigger>, SqlxError> {
    let rows = sqlx::query_as::<_, PriceTrigger>(
        "SELECT t.*,
                (SELECT MAX(l.timestamp) FROM trigger_logs l WHERE l.trigger_id = t.id) AS last_checked_at
         FROM price_triggers t
         WHERE t.is_active = TRUE
         ORDER BY t.created_at ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Append one poll result to the trigger audit trail
pub async fn insert_trigger_log(
    pool: &PgPool,
    trigger_id: i64,
    current_price: Decimal,
    check_result: bool,
) -> Result<i64, SqlxError> {
    let row = sqlx::query(
        "INSERT INTO trigger_logs (trigger_id, current_price, check_result, timestamp)
         VALUES ($1, $2, $3, $4)
         RETURNING id",
    )
    .bind(trigger_id)
    .bind(current_price)
    .bind(check_result)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    let id: i64 = row.try_get("id")?;
    debug!("Recorded trigger log {} for trigger {}", id, trigger_id);

    Ok(id)
}

/// Deactivate a trigger and record the match in one transaction.
///
/// Returns `false` without inserting anything when the trigger was already
/// inactive, so a match is recorded at most once.
pub async fn record_trigger_match(
    pool: &PgPool,
    trigger_id: i64,
    current_price: Decimal,
) -> Result<bool, SqlxError> {
    let mut tx = pool.begin().await?;

    let deactivated = sqlx::query(
        "UPDATE price_triggers
         SET is_active = FALSE
         WHERE id = $1 AND is_active = TRUE",
    )
    .bind(trigger_id)
    .execute(&mut *tx)
    .await?;

    if deactivated.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    sqlx::query(
        "INSERT INTO triggers_met (trigger_id, current_price, timestamp)
         VALUES ($1, $2, $3)",
    )
    .bind(trigger_id)
    .bind(current_price)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!(
        "Trigger {} matched at {} and was deactivated",
        trigger_id, current_price
    );

    Ok(true)
}

/// Get the audit trail of a trigger, oldest first
pub async fn get_trigger_logs(pool: &PgPool, trigger_id: i64) -> Result<Vec<TriggerLog>, SqlxError> {
    let rows = sqlx::query_as::<_, TriggerLog>(
        "SELECT * FROM trigger_logs WHERE trigger_id = $1 ORDER BY timestamp ASC",
    )
    .bind(trigger_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Get the confirmed matches of a trigger, oldest first
pub async fn get_trigger_matches(
    pool: &PgPool,
    trigger_id: i64,
) -> Result<Vec<TriggerMatch>, SqlxError> {
    let rows = sqlx::query_as::<_, TriggerMatch>(
        "SELECT * FROM triggers_met WHERE trigger_id = $1 ORDER BY timestamp ASC",
    )
    .bind(trigger_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
