use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rail_core::payment::{GatewaySession, PaymentAction, PaymentLog, PaymentTransaction, TransactionStatus};
use rail_core::repository::{CompletionOutcome, PaymentCompletion, PaymentRepository};
use rail_core::ticket::{Ticket, TicketStatus};
use rail_core::{BookingError, BookingResult};
use serde_json::json;
use sqlx::PgConnection;
use tracing::{debug, info};
use uuid::Uuid;

use crate::catalog_repo::PgBookingStore;
use crate::rows::{
    db_err, violated_constraint, LogRow, TicketRow, TransactionRow, OPEN_TRANSACTION_INDEX, TICKET_COLUMNS,
    TRANSACTION_COLUMNS,
};

pub(crate) async fn insert_log(conn: &mut PgConnection, log: &PaymentLog) -> BookingResult<()> {
    sqlx::query(
        r#"
        INSERT INTO payment_logs (id, transaction_id, action, status, details, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(log.id)
    .bind(log.transaction_id)
    .bind(log.action.as_str())
    .bind(log.status.as_str())
    .bind(&log.details)
    .bind(log.created_at)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;
    Ok(())
}

/// Cancel every open transaction on a ticket, one log entry each.
pub(crate) async fn cancel_open_transactions(
    conn: &mut PgConnection,
    ticket_id: Uuid,
    action: PaymentAction,
    reason: &str,
    now: DateTime<Utc>,
) -> BookingResult<usize> {
    let ids: Vec<Uuid> = sqlx::query_scalar(
        r#"
        UPDATE payment_transactions
        SET status = 'CANCELLED', failure_reason = $2, updated_at = $3, completed_at = $3
        WHERE ticket_id = $1 AND status IN ('INITIATED', 'PENDING')
        RETURNING id
        "#,
    )
    .bind(ticket_id)
    .bind(reason)
    .bind(now)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_err)?;

    for id in &ids {
        let log = PaymentLog::new(
            *id,
            action,
            TransactionStatus::Cancelled,
            json!({ "reason": reason, "ticket_id": ticket_id }),
            now,
        );
        insert_log(conn, &log).await?;
    }

    Ok(ids.len())
}

fn open_attempt(ticket_id: Uuid) -> BookingError {
    BookingError::InvalidState(format!("ticket {} already has an open payment attempt", ticket_id))
}

async fn fetch_transaction(conn: &mut PgConnection, id: Uuid) -> BookingResult<Option<PaymentTransaction>> {
    let row: Option<TransactionRow> =
        sqlx::query_as(&format!("SELECT {} FROM payment_transactions WHERE id = $1", TRANSACTION_COLUMNS))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_err)?;
    row.map(PaymentTransaction::try_from).transpose()
}

#[async_trait]
impl PaymentRepository for PgBookingStore {
    async fn create_transaction(&self, transaction: &PaymentTransaction, log: PaymentLog) -> BookingResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Serialises attempts on the same ticket.
        let locked: Option<Uuid> = sqlx::query_scalar("SELECT id FROM tickets WHERE id = $1 FOR UPDATE")
            .bind(transaction.ticket_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
        if locked.is_none() {
            return Err(BookingError::not_found("ticket", transaction.ticket_id));
        }

        let open: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM payment_transactions
                WHERE ticket_id = $1 AND status IN ('INITIATED', 'PENDING')
            )
            "#,
        )
        .bind(transaction.ticket_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        if open {
            return Err(open_attempt(transaction.ticket_id));
        }

        sqlx::query(
            r#"
            INSERT INTO payment_transactions (id, ticket_id, user_id, amount_minor, currency, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            "#,
        )
        .bind(transaction.id)
        .bind(transaction.ticket_id)
        .bind(&transaction.user_id)
        .bind(transaction.amount_minor)
        .bind(&transaction.currency)
        .bind(transaction.status.as_str())
        .bind(transaction.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if violated_constraint(&e) == Some(OPEN_TRANSACTION_INDEX) {
                open_attempt(transaction.ticket_id)
            } else {
                db_err(e)
            }
        })?;

        insert_log(&mut tx, &log).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn get_transaction(&self, id: Uuid) -> BookingResult<Option<PaymentTransaction>> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        fetch_transaction(&mut conn, id).await
    }

    async fn record_session(&self, id: Uuid, session: &GatewaySession, log: PaymentLog) -> BookingResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let updated = sqlx::query(
            r#"
            UPDATE payment_transactions
            SET session_key = $2, gateway_url = $3, updated_at = $4
            WHERE id = $1 AND status IN ('INITIATED', 'PENDING')
            "#,
        )
        .bind(id)
        .bind(&session.session_key)
        .bind(&session.gateway_url)
        .bind(log.created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?
        .rows_affected();

        if updated == 0 {
            return Err(BookingError::InvalidState(format!("transaction {} is no longer open", id)));
        }

        insert_log(&mut tx, &log).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn transition_transaction(
        &self,
        id: Uuid,
        to: TransactionStatus,
        reason: Option<&str>,
        log: PaymentLog,
        now: DateTime<Utc>,
    ) -> BookingResult<bool> {
        let from: Vec<String> = [TransactionStatus::Initiated, TransactionStatus::Pending]
            .into_iter()
            .filter(|s| s.can_transition_to(to))
            .map(|s| s.as_str().to_string())
            .collect();
        let completed_at = (!to.is_open()).then_some(now);

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let moved: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE payment_transactions
            SET status = $2,
                failure_reason = COALESCE($3, failure_reason),
                updated_at = $4,
                completed_at = COALESCE($5, completed_at)
            WHERE id = $1 AND status = ANY($6)
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(to.as_str())
        .bind(reason)
        .bind(now)
        .bind(completed_at)
        .bind(&from)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        if moved.is_none() {
            debug!(transaction_id = %id, to = %to, "Transition skipped: transaction not open");
            return Ok(false);
        }

        insert_log(&mut tx, &log).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(true)
    }

    async fn complete_payment(&self, completion: PaymentCompletion) -> BookingResult<CompletionOutcome> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let transaction = fetch_transaction(&mut tx, completion.transaction_id)
            .await?
            .ok_or_else(|| BookingError::not_found("transaction", completion.transaction_id))?;

        if transaction.status == TransactionStatus::Completed {
            return Ok(CompletionOutcome::AlreadyCompleted);
        }
        if !transaction.status.is_open() {
            return Ok(CompletionOutcome::TransactionClosed(transaction.status));
        }

        // Ticket row first: the sweep and cancellation take the same order.
        let ticket_row: Option<TicketRow> = sqlx::query_as(&format!(
            r#"
            UPDATE tickets
            SET status = 'confirmed', payment_status = 'paid', confirmed_at = $2, updated_at = $2
            WHERE id = $1 AND status = 'pending' AND payment_status = 'pending'
            RETURNING {}
            "#,
            TICKET_COLUMNS
        ))
        .bind(transaction.ticket_id)
        .bind(completion.now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let Some(ticket_row) = ticket_row else {
            tx.rollback().await.map_err(db_err)?;
            return self.explain_lost_race(completion.transaction_id, transaction.ticket_id).await;
        };
        let ticket = Ticket::try_from(ticket_row)?;

        let completed: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE payment_transactions
            SET status = 'COMPLETED', validation_id = $2, bank_transaction_id = $3, card_type = $4,
                updated_at = $5, completed_at = $5
            WHERE id = $1 AND status IN ('INITIATED', 'PENDING')
            RETURNING id
            "#,
        )
        .bind(completion.transaction_id)
        .bind(&completion.validation_id)
        .bind(&completion.bank_transaction_id)
        .bind(&completion.card_type)
        .bind(completion.now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        if completed.is_none() {
            tx.rollback().await.map_err(db_err)?;
            return self.explain_lost_race(completion.transaction_id, transaction.ticket_id).await;
        }

        let log = PaymentLog::new(
            completion.transaction_id,
            PaymentAction::Completed,
            TransactionStatus::Completed,
            completion.details,
            completion.now,
        );
        insert_log(&mut tx, &log).await?;

        tx.commit().await.map_err(db_err)?;

        info!(
            transaction_id = %completion.transaction_id,
            ticket_number = %ticket.ticket_number,
            "Payment completed, ticket confirmed"
        );

        Ok(CompletionOutcome::Completed(ticket))
    }

    async fn transactions_for_ticket(&self, ticket_id: Uuid) -> BookingResult<Vec<PaymentTransaction>> {
        let rows: Vec<TransactionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payment_transactions WHERE ticket_id = $1 ORDER BY created_at",
            TRANSACTION_COLUMNS
        ))
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(PaymentTransaction::try_from).collect()
    }

    async fn logs_for_transaction(&self, transaction_id: Uuid) -> BookingResult<Vec<PaymentLog>> {
        let rows: Vec<LogRow> = sqlx::query_as(
            r#"
            SELECT id, transaction_id, action, status, details, created_at
            FROM payment_logs
            WHERE transaction_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(PaymentLog::try_from).collect()
    }
}

impl PgBookingStore {
    /// After a guarded update matched nothing, report who got there first.
    async fn explain_lost_race(&self, transaction_id: Uuid, ticket_id: Uuid) -> BookingResult<CompletionOutcome> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;

        if let Some(transaction) = fetch_transaction(&mut conn, transaction_id).await? {
            if transaction.status == TransactionStatus::Completed {
                return Ok(CompletionOutcome::AlreadyCompleted);
            }
            if !transaction.status.is_open() {
                return Ok(CompletionOutcome::TransactionClosed(transaction.status));
            }
        }

        let status: Option<String> = sqlx::query_scalar("SELECT status FROM tickets WHERE id = $1")
            .bind(ticket_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_err)?;

        match status {
            Some(status) => Ok(CompletionOutcome::TicketNotPending(status.parse::<TicketStatus>()?)),
            None => Err(BookingError::not_found("ticket", ticket_id)),
        }
    }
}
