//! Payment reconciliation: signatures, order matching, idempotence and
//! gateway failures.
//!
//! Run with: `cargo test --test payment`

#![allow(clippy::unwrap_used)]

mod common;

use common::{HarnessBuilder, SECRET, harness};
use pgstay_booking::payment_gateway::signature;
use pgstay_booking::service::NewBooking;
use pgstay_booking::{
    BookingError, BookingEvent, BookingId, BookingStatus, MockPaymentGateway, Money, PaymentConfirmation,
    RecordingNotifier,
};

async fn pending_booking(h: &common::Harness) -> BookingId {
    h.service
        .create_booking(
            &h.tenant,
            NewBooking {
                listing_id: h.listing.id,
                ..NewBooking::default()
            },
        )
        .await
        .unwrap()
        .booking
        .id
}

#[tokio::test]
async fn verification_is_idempotent_per_payment_reference() {
    let h = harness().await;
    let id = pending_booking(&h).await;
    let order = h.service.create_order(&h.tenant, id).await.unwrap();
    let confirmation = h.gateway.confirm(&order.order_id, "pay_once");

    let first = h.service.verify_and_confirm(&h.tenant, id, confirmation.clone()).await.unwrap();
    let second = h.service.verify_and_confirm(&h.tenant, id, confirmation).await.unwrap();

    assert_eq!(first.booking, second.booking);
    assert_eq!(second.booking.status, BookingStatus::Confirmed);
    common::wait_for_notices(&h.notifier, 1).await;
    assert_eq!(h.notifier.sent().len(), 1);

    // A different payment for an already confirmed booking is not a replay.
    let other = h.gateway.confirm(&order.order_id, "pay_twice");
    assert_eq!(
        h.service.verify_and_confirm(&h.tenant, id, other).await.unwrap_err(),
        BookingError::InvalidTransition {
            status: Some(BookingStatus::Confirmed),
            event: BookingEvent::Pay,
        }
    );
}

#[tokio::test]
async fn bad_signature_leaves_booking_unchanged() {
    let h = harness().await;
    let id = pending_booking(&h).await;
    let order = h.service.create_order(&h.tenant, id).await.unwrap();

    let forged = PaymentConfirmation {
        order_id: order.order_id.clone(),
        payment_id: "pay_forged".to_string(),
        signature: signature::sign("not-the-secret", &order.order_id, "pay_forged"),
    };
    let error = h.service.verify_and_confirm(&h.tenant, id, forged).await.unwrap_err();
    assert!(matches!(error, BookingError::PaymentVerificationFailed { .. }));

    let booking = h.service.get_booking(&h.tenant, id).await.unwrap().booking;
    assert_eq!(booking.status, BookingStatus::Pending);
    assert!(booking.payment.is_none());
    assert!(h.notifier.sent().is_empty());

    // The order is still open; a genuine confirmation goes through.
    let genuine = PaymentConfirmation {
        order_id: order.order_id.clone(),
        payment_id: "pay_real".to_string(),
        signature: signature::sign(SECRET, &order.order_id, "pay_real"),
    };
    let view = h.service.verify_and_confirm(&h.tenant, id, genuine).await.unwrap();
    assert_eq!(view.booking.status, BookingStatus::Confirmed);
}

#[tokio::test]
async fn stale_order_amount_is_rejected_after_aid_approval() {
    let h = harness().await;
    let id = pending_booking(&h).await;

    // Order opened for the full rent, then aid is requested and approved.
    let stale = h.service.create_order(&h.tenant, id).await.unwrap();
    assert_eq!(stale.amount, Money::from_rupees(9000));
    h.service.request_aid(&h.tenant, id, None, None).await.unwrap();
    h.service.approve_aid(&h.donor, id, 20).await.unwrap();

    let error = h
        .service
        .verify_and_confirm(&h.tenant, id, h.gateway.confirm(&stale.order_id, "pay_stale"))
        .await
        .unwrap_err();
    assert!(matches!(error, BookingError::PaymentVerificationFailed { .. }));
    assert_eq!(
        h.service.get_booking(&h.tenant, id).await.unwrap().booking.status,
        BookingStatus::ApprovedAid
    );

    let fresh = h.service.create_order(&h.tenant, id).await.unwrap();
    assert_eq!(fresh.amount, Money::from_rupees(7200));
    let view = h
        .service
        .verify_and_confirm(&h.tenant, id, h.gateway.confirm(&fresh.order_id, "pay_fresh"))
        .await
        .unwrap();
    assert_eq!(view.booking.payment.unwrap().amount, Money::from_rupees(7200));
}

#[tokio::test]
async fn orders_cannot_settle_another_booking() {
    let h = harness().await;
    let mine = pending_booking(&h).await;
    let also_mine = pending_booking(&h).await;
    let order = h.service.create_order(&h.tenant, mine).await.unwrap();

    let error = h
        .service
        .verify_and_confirm(&h.tenant, also_mine, h.gateway.confirm(&order.order_id, "pay_x"))
        .await
        .unwrap_err();
    assert!(matches!(error, BookingError::PaymentVerificationFailed { .. }));

    let unknown = h
        .service
        .verify_and_confirm(&h.tenant, mine, h.gateway.confirm("order_unknown", "pay_y"))
        .await
        .unwrap_err();
    assert!(matches!(unknown, BookingError::PaymentVerificationFailed { .. }));
}

#[tokio::test]
async fn cancelled_booking_cannot_be_paid() {
    let h = harness().await;
    let id = pending_booking(&h).await;
    let order = h.service.create_order(&h.tenant, id).await.unwrap();
    h.service.cancel(&h.tenant, id).await.unwrap();

    let error = h
        .service
        .verify_and_confirm(&h.tenant, id, h.gateway.confirm(&order.order_id, "pay_late"))
        .await
        .unwrap_err();
    assert!(matches!(error, BookingError::InvalidTransition { .. }));
    assert!(h.service.create_order(&h.tenant, id).await.is_err());
}

#[tokio::test]
async fn only_the_tenant_pays() {
    let h = harness().await;
    let id = pending_booking(&h).await;

    for session in [h.other_tenant, h.owner, h.donor, h.admin] {
        let error = h.service.create_order(&session, id).await.unwrap_err();
        assert!(matches!(error, BookingError::Forbidden { .. }), "{:?}", session.role);
    }
}

#[tokio::test]
async fn gateway_outage_surfaces_as_gateway_error() {
    let h = HarnessBuilder::new()
        .gateway(MockPaymentGateway::failing(SECRET))
        .build()
        .await;
    let id = pending_booking(&h).await;

    let error = h.service.create_order(&h.tenant, id).await.unwrap_err();
    assert!(matches!(error, BookingError::Gateway { .. }));
    assert_eq!(
        h.service.get_booking(&h.tenant, id).await.unwrap().booking.status,
        BookingStatus::Pending
    );
}

#[tokio::test]
async fn failed_notification_does_not_undo_confirmation() {
    let h = HarnessBuilder::new()
        .notifier(RecordingNotifier::failing())
        .build()
        .await;
    let id = pending_booking(&h).await;
    let order = h.service.create_order(&h.tenant, id).await.unwrap();

    let view = h
        .service
        .verify_and_confirm(&h.tenant, id, h.gateway.confirm(&order.order_id, "pay_n"))
        .await
        .unwrap();
    assert_eq!(view.booking.status, BookingStatus::Confirmed);

    common::wait_for_notices(&h.notifier, 1).await;
    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].email, "asha@example.com");
    assert_eq!(sent[0].amount, Money::from_rupees(9000));
    assert_eq!(
        h.service.get_booking(&h.tenant, id).await.unwrap().booking.status,
        BookingStatus::Confirmed
    );
}
