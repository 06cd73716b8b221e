//! Append-only payment ledger: `pending → paid | overdue`.
//!
//! Rows are never deleted and only `status` ever changes after insert. A
//! rejected payment stays `overdue`; the tenant retries with a new row.

use chrono::{DateTime, Utc};

use super::domain::{Payment, PaymentId, PaymentStatus, PaymentSubmission, Person, PersonId, Role};
use super::error::HousingError;
use super::store::StoreTransaction;

/// Append a `pending` row for the tenant. Rent is not checked here.
pub fn submit<T: StoreTransaction>(
    tx: &mut T,
    tenant_id: PersonId,
    submission: PaymentSubmission,
    now: DateTime<Utc>,
) -> Result<Payment, HousingError> {
    append(tx, tenant_id, submission, PaymentStatus::Pending, now)
}

/// Admin bookkeeping entry, e.g. rent collected in cash.
pub fn record<T: StoreTransaction>(
    tx: &mut T,
    tenant_id: PersonId,
    submission: PaymentSubmission,
    status: PaymentStatus,
    now: DateTime<Utc>,
) -> Result<Payment, HousingError> {
    match status {
        PaymentStatus::Pending | PaymentStatus::Paid => {
            append(tx, tenant_id, submission, status, now)
        }
        PaymentStatus::Overdue => Err(HousingError::Validation(
            "payments cannot be recorded as overdue".to_string(),
        )),
    }
}

pub fn approve<T: StoreTransaction>(
    tx: &mut T,
    payment_id: PaymentId,
) -> Result<Payment, HousingError> {
    settle(tx, payment_id, PaymentStatus::Paid)
}

pub fn reject<T: StoreTransaction>(
    tx: &mut T,
    payment_id: PaymentId,
) -> Result<Payment, HousingError> {
    settle(tx, payment_id, PaymentStatus::Overdue)
}

fn settle<T: StoreTransaction>(
    tx: &mut T,
    payment_id: PaymentId,
    to: PaymentStatus,
) -> Result<Payment, HousingError> {
    let mut payment = tx
        .fetch_for_update::<Payment>(payment_id)?
        .ok_or_else(|| HousingError::not_found("payment", payment_id))?;

    match payment.status {
        PaymentStatus::Pending => {
            payment.status = to;
            tx.put(payment.clone())?;
            Ok(payment)
        }
        PaymentStatus::Paid | PaymentStatus::Overdue => Err(HousingError::InvalidState(format!(
            "payment {payment_id} is {}, only pending payments can be marked {}",
            payment.status.label(),
            to.label()
        ))),
    }
}

fn append<T: StoreTransaction>(
    tx: &mut T,
    tenant_id: PersonId,
    submission: PaymentSubmission,
    status: PaymentStatus,
    now: DateTime<Utc>,
) -> Result<Payment, HousingError> {
    let tenant = tx
        .fetch::<Person>(tenant_id)?
        .ok_or_else(|| HousingError::not_found("tenant", tenant_id))?;
    if tenant.role != Role::Tenant {
        return Err(HousingError::InvalidState(format!(
            "person {tenant_id} is a {}, not a tenant",
            tenant.role.label()
        )));
    }

    let PaymentSubmission {
        amount,
        period,
        transaction_ref,
    } = submission;
    if amount == 0 {
        return Err(HousingError::Validation(
            "payment amount must be positive".to_string(),
        ));
    }
    let period = period.trim().to_string();
    if period.is_empty() {
        return Err(HousingError::Validation(
            "payment period label is required".to_string(),
        ));
    }

    tx.insert::<Payment, _>(|id| Payment {
        id,
        tenant_id,
        amount,
        period,
        transaction_ref,
        status,
        submitted_at: now,
    })
    .map_err(HousingError::from)
}
