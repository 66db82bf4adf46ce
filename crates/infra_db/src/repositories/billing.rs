//! Billing repository implementation
//!
//! SQL access for cases, the service catalog, installments and invoices.
//! Methods that take a `&mut PgConnection` are meant to run inside a
//! transaction opened with [`BillingRepository::begin`]; the others use the
//! pool directly.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::DatabaseError;

/// Repository for case billing data
#[derive(Debug, Clone)]
pub struct BillingRepository {
    pool: PgPool,
}

impl BillingRepository {
    /// Creates a new BillingRepository with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a transaction
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, DatabaseError> {
        Ok(self.pool.begin().await?)
    }

    // ------------------------------------------------------------------------
    // Cases
    // ------------------------------------------------------------------------

    /// Registers a case so billing rows can reference it
    pub async fn create_case(&self, case_id: Uuid) -> Result<(), DatabaseError> {
        sqlx::query("INSERT INTO cases (case_id) VALUES ($1) ON CONFLICT (case_id) DO NOTHING")
            .bind(case_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Checks whether a case exists
    pub async fn case_exists(&self, case_id: Uuid) -> Result<bool, DatabaseError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM cases WHERE case_id = $1)",
        )
        .bind(case_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Takes the row lock that serializes schedule edits of one case
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::NotFound` if the case does not exist
    pub async fn lock_case(&self, conn: &mut PgConnection, case_id: Uuid) -> Result<(), DatabaseError> {
        sqlx::query_scalar::<_, Uuid>("SELECT case_id FROM cases WHERE case_id = $1 FOR UPDATE")
            .bind(case_id)
            .fetch_optional(conn)
            .await?
            .map(|_| ())
            .ok_or_else(|| DatabaseError::not_found("Case", case_id))
    }

    // ------------------------------------------------------------------------
    // Installments
    // ------------------------------------------------------------------------

    /// Retrieves all installments of a case ordered by position
    pub async fn find_installments(&self, case_id: Uuid) -> Result<Vec<InstallmentRow>, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        self.fetch_installments(&mut conn, case_id).await
    }

    /// Retrieves all installments of a case ordered by position on `conn`
    pub async fn fetch_installments(
        &self,
        conn: &mut PgConnection,
        case_id: Uuid,
    ) -> Result<Vec<InstallmentRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, InstallmentRow>(
            r#"
            SELECT installment_id, case_id, amount, due_date, position,
                   is_down_payment, automatic_invoice, paid, created_at, updated_at
            FROM installments
            WHERE case_id = $1
            ORDER BY position
            "#,
        )
        .bind(case_id)
        .fetch_all(conn)
        .await?;

        Ok(rows)
    }

    /// Retrieves one installment by ID
    pub async fn find_installment(&self, installment_id: Uuid) -> Result<InstallmentRow, DatabaseError> {
        sqlx::query_as::<_, InstallmentRow>(
            r#"
            SELECT installment_id, case_id, amount, due_date, position,
                   is_down_payment, automatic_invoice, paid, created_at, updated_at
            FROM installments
            WHERE installment_id = $1
            "#,
        )
        .bind(installment_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Installment", installment_id))
    }

    /// Inserts or rewrites an installment row
    pub async fn upsert_installment(
        &self,
        conn: &mut PgConnection,
        row: &InstallmentRow,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO installments (
                installment_id, case_id, amount, due_date, position,
                is_down_payment, automatic_invoice, paid, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (installment_id) DO UPDATE SET
                amount = EXCLUDED.amount,
                due_date = EXCLUDED.due_date,
                position = EXCLUDED.position,
                automatic_invoice = EXCLUDED.automatic_invoice,
                paid = EXCLUDED.paid,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(row.installment_id)
        .bind(row.case_id)
        .bind(row.amount)
        .bind(row.due_date)
        .bind(row.position)
        .bind(row.is_down_payment)
        .bind(row.automatic_invoice)
        .bind(row.paid)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Deletes installments by ID
    pub async fn delete_installments(
        &self,
        conn: &mut PgConnection,
        installment_ids: &[Uuid],
    ) -> Result<u64, DatabaseError> {
        if installment_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query("DELETE FROM installments WHERE installment_id = ANY($1)")
            .bind(installment_ids)
            .execute(conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Flags an installment paid
    pub async fn mark_installment_paid(
        &self,
        conn: &mut PgConnection,
        installment_id: Uuid,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE installments SET paid = TRUE, updated_at = NOW() WHERE installment_id = $1",
        )
        .bind(installment_id)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("Installment", installment_id));
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Invoices
    // ------------------------------------------------------------------------

    /// Inserts a new invoice
    pub async fn insert_invoice(&self, conn: &mut PgConnection, row: &InvoiceRow) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO invoices (
                invoice_id, case_id, installment_id, invoice_name, invoice_number,
                amount, due_date, status, sent_at, paid_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(row.invoice_id)
        .bind(row.case_id)
        .bind(row.installment_id)
        .bind(&row.invoice_name)
        .bind(&row.invoice_number)
        .bind(row.amount)
        .bind(row.due_date)
        .bind(row.status)
        .bind(row.sent_at)
        .bind(row.paid_at)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Retrieves an invoice by ID
    pub async fn find_invoice(&self, invoice_id: Uuid) -> Result<InvoiceRow, DatabaseError> {
        sqlx::query_as::<_, InvoiceRow>(&format!("{} WHERE invoice_id = $1", SELECT_INVOICE))
            .bind(invoice_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::not_found("Invoice", invoice_id))
    }

    /// Retrieves an invoice and locks its row until the transaction ends
    pub async fn lock_invoice(
        &self,
        conn: &mut PgConnection,
        invoice_id: Uuid,
    ) -> Result<InvoiceRow, DatabaseError> {
        sqlx::query_as::<_, InvoiceRow>(&format!("{} WHERE invoice_id = $1 FOR UPDATE", SELECT_INVOICE))
            .bind(invoice_id)
            .fetch_optional(conn)
            .await?
            .ok_or_else(|| DatabaseError::not_found("Invoice", invoice_id))
    }

    /// Invoices of a case, newest first
    pub async fn find_invoices_by_case(&self, case_id: Uuid) -> Result<Vec<InvoiceRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, InvoiceRow>(&format!(
            "{} WHERE case_id = $1 ORDER BY created_at DESC, invoice_id DESC",
            SELECT_INVOICE
        ))
        .bind(case_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Writes the mutable fields of an invoice
    pub async fn update_invoice(&self, conn: &mut PgConnection, row: &InvoiceRow) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE invoices SET
                invoice_number = $2,
                status = $3,
                sent_at = $4,
                paid_at = $5,
                updated_at = $6
            WHERE invoice_id = $1
            "#,
        )
        .bind(row.invoice_id)
        .bind(&row.invoice_number)
        .bind(row.status)
        .bind(row.sent_at)
        .bind(row.paid_at)
        .bind(row.updated_at)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("Invoice", row.invoice_id));
        }
        Ok(())
    }

    /// Deletes an invoice
    pub async fn delete_invoice(&self, invoice_id: Uuid) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM invoices WHERE invoice_id = $1")
            .bind(invoice_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("Invoice", invoice_id));
        }
        Ok(())
    }

    /// Draws the next value of the invoice number sequence
    ///
    /// Sequence values are not returned on rollback.
    pub async fn next_invoice_sequence(&self, conn: &mut PgConnection) -> Result<i64, DatabaseError> {
        let value = sqlx::query_scalar::<_, i64>("SELECT nextval('invoice_number_seq')")
            .fetch_one(conn)
            .await?;
        Ok(value)
    }

    // ------------------------------------------------------------------------
    // Services
    // ------------------------------------------------------------------------

    /// Adds a service to the catalog
    pub async fn create_service(&self, name: &str, gross_price: Decimal) -> Result<ServiceRow, DatabaseError> {
        let row = sqlx::query_as::<_, ServiceRow>(
            r#"
            INSERT INTO services (service_id, name, gross_price)
            VALUES ($1, $2, $3)
            RETURNING service_id, name, gross_price
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(name)
        .bind(gross_price)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    /// Retrieves a catalog service
    pub async fn find_service(&self, service_id: Uuid) -> Result<ServiceRow, DatabaseError> {
        sqlx::query_as::<_, ServiceRow>(
            "SELECT service_id, name, gross_price FROM services WHERE service_id = $1",
        )
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Service", service_id))
    }

    /// The whole catalog ordered by name
    pub async fn find_services(&self) -> Result<Vec<ServiceRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, ServiceRow>(
            "SELECT service_id, name, gross_price FROM services ORDER BY name, service_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Records a service attachment
    pub async fn insert_attachment(&self, conn: &mut PgConnection, row: &AttachmentRow) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO case_services (case_service_id, case_id, service_id, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(row.case_service_id)
        .bind(row.case_id)
        .bind(row.service_id)
        .bind(row.created_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Retrieves an attachment joined with its service
    pub async fn find_attachment(&self, case_service_id: Uuid) -> Result<AttachedServiceRow, DatabaseError> {
        sqlx::query_as::<_, AttachedServiceRow>(&format!(
            "{} WHERE cs.case_service_id = $1",
            SELECT_ATTACHED_SERVICE
        ))
        .bind(case_service_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Attachment", case_service_id))
    }

    /// Services attached to a case, oldest attachment first
    pub async fn find_attachments_by_case(
        &self,
        case_id: Uuid,
    ) -> Result<Vec<AttachedServiceRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, AttachedServiceRow>(&format!(
            "{} WHERE cs.case_id = $1 ORDER BY cs.created_at, cs.case_service_id",
            SELECT_ATTACHED_SERVICE
        ))
        .bind(case_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Removes an attachment
    pub async fn delete_attachment(&self, conn: &mut PgConnection, case_service_id: Uuid) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM case_services WHERE case_service_id = $1")
            .bind(case_service_id)
            .execute(conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("Attachment", case_service_id));
        }
        Ok(())
    }

    /// Liveness probe used by health checks
    pub async fn ping(&self) -> Result<(), DatabaseError> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}

const SELECT_INVOICE: &str = r#"
    SELECT invoice_id, case_id, installment_id, invoice_name, invoice_number,
           amount, due_date, status, sent_at, paid_at, created_at, updated_at
    FROM invoices
"#;

const SELECT_ATTACHED_SERVICE: &str = r#"
    SELECT cs.case_service_id, cs.case_id, cs.service_id, cs.created_at,
           s.name, s.gross_price
    FROM case_services cs
    JOIN services s ON s.service_id = cs.service_id
"#;

/// Database row for an installment
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct InstallmentRow {
    pub installment_id: Uuid,
    pub case_id: Uuid,
    pub amount: Decimal,
    pub due_date: Option<NaiveDate>,
    pub position: i32,
    pub is_down_payment: bool,
    pub automatic_invoice: bool,
    pub paid: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Invoice status as stored in the `invoice_status` enum type
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "invoice_status", rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Viewed,
    Paid,
    Overdue,
    Cancelled,
}

/// Database row for an invoice
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct InvoiceRow {
    pub invoice_id: Uuid,
    pub case_id: Uuid,
    pub installment_id: Option<Uuid>,
    pub invoice_name: String,
    pub invoice_number: Option<String>,
    pub amount: Decimal,
    pub due_date: Option<NaiveDate>,
    pub status: InvoiceStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Database row for a catalog service
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ServiceRow {
    pub service_id: Uuid,
    pub name: String,
    pub gross_price: Decimal,
}

/// Database row for a case-service attachment
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct AttachmentRow {
    pub case_service_id: Uuid,
    pub case_id: Uuid,
    pub service_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Attachment joined with the current catalog data of its service
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct AttachedServiceRow {
    pub case_service_id: Uuid,
    pub case_id: Uuid,
    pub service_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub gross_price: Decimal,
}
