use super::common::*;
use crate::housing::domain::{PaymentId, PaymentStatus, PaymentSubmission};
use crate::housing::error::HousingError;

#[test]
fn submitted_payments_start_pending() {
    let fx = fixture();
    let payment = fx
        .service
        .submit_payment(&fx.tenant, october_rent(6500))
        .expect("submitted");

    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.tenant_id, fx.tenant.id);
    assert_eq!(payment.period, "October 2025");
    assert_eq!(payment.submitted_at, fixed_now());
}

#[test]
fn approving_a_paid_payment_is_invalid_state() {
    let fx = fixture();
    let payment = fx
        .service
        .submit_payment(&fx.tenant, october_rent(6500))
        .expect("submitted");
    let paid = fx
        .service
        .approve_payment(&fx.admin, payment.id)
        .expect("approved");
    assert_eq!(paid.status, PaymentStatus::Paid);

    match fx.service.approve_payment(&fx.admin, payment.id) {
        Err(HousingError::InvalidState(message)) => assert!(message.contains("paid")),
        other => panic!("expected invalid state, got {other:?}"),
    }
    assert!(matches!(
        fx.service.reject_payment(&fx.admin, payment.id),
        Err(HousingError::InvalidState(_))
    ));
}

#[test]
fn rejected_payment_stays_overdue_and_resubmission_appends() {
    let fx = fixture();
    let first = fx
        .service
        .submit_payment(&fx.tenant, october_rent(6500))
        .expect("submitted");
    let rejected = fx
        .service
        .reject_payment(&fx.admin, first.id)
        .expect("rejected");
    assert_eq!(rejected.status, PaymentStatus::Overdue);

    let retry = fx
        .service
        .submit_payment(&fx.tenant, october_rent(6500))
        .expect("resubmitted");
    assert_ne!(retry.id, first.id);

    let history = fx.service.list_payments(&fx.tenant).expect("history");
    let rows: Vec<(PaymentId, PaymentStatus)> = history
        .iter()
        .map(|view| (view.payment.id, view.payment.status))
        .collect();
    assert_eq!(
        rows,
        vec![
            (retry.id, PaymentStatus::Pending),
            (first.id, PaymentStatus::Overdue),
        ],
        "newest first, rejected row untouched"
    );
}

#[test]
fn only_admins_settle_payments() {
    let fx = fixture();
    let payment = fx
        .service
        .submit_payment(&fx.tenant, october_rent(6500))
        .expect("submitted");

    for caller in [&fx.tenant, &fx.agent] {
        assert!(matches!(
            fx.service.approve_payment(caller, payment.id),
            Err(HousingError::Forbidden(_))
        ));
    }
    assert!(matches!(
        fx.service.approve_payment(&fx.admin, PaymentId(90)),
        Err(HousingError::NotFound { .. })
    ));
}

#[test]
fn submissions_are_validated() {
    let fx = fixture();
    assert!(matches!(
        fx.service.submit_payment(&fx.tenant, october_rent(0)),
        Err(HousingError::Validation(_))
    ));
    let unlabelled = PaymentSubmission {
        period: " ".to_string(),
        ..october_rent(6500)
    };
    assert!(matches!(
        fx.service.submit_payment(&fx.tenant, unlabelled),
        Err(HousingError::Validation(_))
    ));
    assert!(matches!(
        fx.service.submit_payment(&fx.admin, october_rent(6500)),
        Err(HousingError::Forbidden(_))
    ));
}

#[test]
fn admin_records_cash_payments() {
    let fx = fixture();
    let recorded = fx
        .service
        .record_payment(&fx.admin, fx.tenant.id, october_rent(6500), PaymentStatus::Paid)
        .expect("recorded");
    assert_eq!(recorded.status, PaymentStatus::Paid);

    assert!(matches!(
        fx.service
            .record_payment(&fx.admin, fx.tenant.id, october_rent(6500), PaymentStatus::Overdue),
        Err(HousingError::Validation(_))
    ));
    assert!(matches!(
        fx.service
            .record_payment(&fx.admin, fx.agent.id, october_rent(6500), PaymentStatus::Paid),
        Err(HousingError::InvalidState(_))
    ));
}

#[test]
fn payment_listing_is_scoped_by_role() {
    let fx = fixture();
    let neighbour = register_tenant(&fx.service, "dev@example.com", "Dev");
    fx.service
        .submit_payment(&fx.tenant, october_rent(6500))
        .expect("submitted");
    fx.service
        .submit_payment(&neighbour, october_rent(7000))
        .expect("submitted");

    let all = fx.service.list_payments(&fx.admin).expect("admin view");
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].tenant_name.as_deref(), Some("Dev"));
    assert_eq!(all[1].tenant_name.as_deref(), Some("Asha"));

    let own = fx.service.list_payments(&fx.tenant).expect("tenant view");
    assert_eq!(own.len(), 1);
    assert_eq!(own[0].tenant_name, None);

    assert!(matches!(
        fx.service.list_payments(&fx.agent),
        Err(HousingError::Forbidden(_))
    ));
}
