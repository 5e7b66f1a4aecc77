//! End-to-end booking lifecycle through the service: booking, aid, payment,
//! cancellation and the read views around them.
//!
//! Run with: `cargo test --test lifecycle`

#![allow(clippy::unwrap_used)]
#![allow(clippy::too_many_lines)]

mod common;

use common::harness;
use pgstay_booking::service::NewBooking;
use pgstay_booking::{BookingError, BookingEvent, BookingStatus, Money, Role};

fn new_booking(h: &common::Harness, request_aid: bool) -> NewBooking {
    NewBooking {
        listing_id: h.listing.id,
        request_aid,
        reason: request_aid.then(|| "first job, salary starts next month".to_string()),
        requested_percent: request_aid.then_some(30),
    }
}

#[tokio::test]
async fn booking_without_aid_is_paid_in_full() {
    let h = harness().await;

    let view = h.service.create_booking(&h.tenant, new_booking(&h, false)).await.unwrap();
    assert_eq!(view.booking.status, BookingStatus::Pending);
    assert_eq!(view.booking.final_amount, Money::from_rupees(9000));
    assert_eq!(view.listing_name.as_deref(), Some("Sunrise PG"));
    assert_eq!(view.days_until_due, 30);

    let id = view.booking.id;
    let order = h.service.create_order(&h.tenant, id).await.unwrap();
    assert_eq!(order.amount, Money::from_rupees(9000));
    assert_eq!(order.currency, "INR");
    assert!(!order.sponsored);

    // Opening an order does not move the booking.
    let unchanged = h.service.get_booking(&h.tenant, id).await.unwrap();
    assert_eq!(unchanged.booking.status, BookingStatus::Pending);

    let confirmation = h.gateway.confirm(&order.order_id, "pay_full_1");
    let confirmed = h.service.verify_and_confirm(&h.tenant, id, confirmation).await.unwrap();

    assert_eq!(confirmed.booking.status, BookingStatus::Confirmed);
    assert_eq!(confirmed.booking.final_amount, Money::from_rupees(9000));
    let receipt = confirmed.booking.payment.unwrap();
    assert_eq!(receipt.payment_id, "pay_full_1");
    assert_eq!(receipt.amount, Money::from_rupees(9000));
}

#[tokio::test]
async fn due_date_is_projected_from_the_booking_date() {
    let h = harness().await;
    let id = h.service.create_booking(&h.tenant, new_booking(&h, false)).await.unwrap().booking.id;

    h.clock.advance(chrono::Duration::days(12));
    let view = h.service.get_booking(&h.tenant, id).await.unwrap();
    assert_eq!(view.due_date, view.booking.booking_date + chrono::Duration::days(30));
    assert_eq!(view.days_until_due, 18);

    h.clock.advance(chrono::Duration::days(20));
    let overdue = h.service.get_booking(&h.tenant, id).await.unwrap();
    assert_eq!(overdue.days_until_due, -2);
    assert_eq!(overdue.booking.status, BookingStatus::Pending);
}

#[tokio::test]
async fn sponsored_booking_pays_the_remainder() {
    let h = harness().await;

    let view = h.service.create_booking(&h.tenant, new_booking(&h, true)).await.unwrap();
    assert_eq!(view.booking.status, BookingStatus::RequestingAid);
    assert_eq!(view.booking.discount_percent, 0);
    let id = view.booking.id;

    let pending = h.service.list_pending_aid_requests(&h.donor).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].booking.id, id);

    let approved = h.service.approve_aid(&h.donor, id, 20).await.unwrap();
    assert_eq!(approved.booking.status, BookingStatus::ApprovedAid);
    assert_eq!(approved.booking.discount_percent, 20);
    assert_eq!(approved.booking.donor_id, Some(h.donor.user_id));
    assert_eq!(approved.booking.final_amount, Money::from_rupees(7200));
    assert!(h.service.list_pending_aid_requests(&h.donor).await.unwrap().is_empty());

    let order = h.service.create_order(&h.tenant, id).await.unwrap();
    assert_eq!(order.amount, Money::from_rupees(7200));

    let confirmation = h.gateway.confirm(&order.order_id, "pay_rest_1");
    let confirmed = h.service.verify_and_confirm(&h.tenant, id, confirmation).await.unwrap();
    assert_eq!(confirmed.booking.status, BookingStatus::Confirmed);
    assert_eq!(confirmed.booking.final_amount, Money::from_rupees(7200));

    // The donor still sees the sponsorship, now with the confirmed status.
    let history = h.service.list_sponsorship_history(&h.donor, h.donor.user_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].record.amount, Money::from_rupees(1800));
    assert_eq!(history[0].current_status, Some(BookingStatus::Confirmed));
}

#[tokio::test]
async fn cancelled_aid_request_cannot_be_approved() {
    let h = harness().await;
    let id = h.service.create_booking(&h.tenant, new_booking(&h, true)).await.unwrap().booking.id;

    let cancelled = h.service.cancel(&h.tenant, id).await.unwrap();
    assert_eq!(cancelled.booking.status, BookingStatus::Cancelled);

    let error = h.service.approve_aid(&h.donor, id, 20).await.unwrap_err();
    assert_eq!(
        error,
        BookingError::InvalidTransition {
            status: Some(BookingStatus::Cancelled),
            event: BookingEvent::ApproveAid { percent: 20 },
        }
    );
    assert!(h.service.list_sponsorship_history(&h.donor, h.donor.user_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn rejected_aid_returns_booking_to_pending_and_can_be_reopened() {
    let h = harness().await;
    let id = h.service.create_booking(&h.tenant, new_booking(&h, true)).await.unwrap().booking.id;

    let rejected = h
        .service
        .reject_aid(&h.donor, id, Some("budget exhausted".to_string()))
        .await
        .unwrap();
    assert_eq!(rejected.booking.status, BookingStatus::Pending);
    assert!(rejected.booking.aid_request.is_none());
    let last = rejected.booking.history.last().unwrap();
    assert_eq!(last.note.as_deref(), Some("budget exhausted"));
    assert_eq!(last.actor, h.donor.user_id);

    let reopened = h.service.request_aid(&h.tenant, id, None, Some(10)).await.unwrap();
    assert_eq!(reopened.booking.status, BookingStatus::RequestingAid);
    assert_eq!(reopened.booking.aid_request.unwrap().requested_percent, Some(10));
}

#[tokio::test]
async fn full_sponsorship_confirms_without_the_gateway() {
    let h = harness().await;
    let id = h.service.create_booking(&h.tenant, new_booking(&h, true)).await.unwrap().booking.id;
    h.service.approve_aid(&h.donor, id, 100).await.unwrap();

    let order = h.service.create_order(&h.tenant, id).await.unwrap();
    assert!(order.sponsored);
    assert_eq!(order.amount, Money::ZERO);

    let confirmation = pgstay_booking::PaymentConfirmation {
        order_id: order.order_id.clone(),
        payment_id: "sponsored".to_string(),
        signature: String::new(),
    };
    let confirmed = h.service.verify_and_confirm(&h.tenant, id, confirmation).await.unwrap();
    assert_eq!(confirmed.booking.status, BookingStatus::Confirmed);
    assert_eq!(confirmed.booking.final_amount, Money::ZERO);
}

#[tokio::test]
async fn only_admins_cancel_confirmed_bookings() {
    let h = harness().await;
    let id = h.service.create_booking(&h.tenant, new_booking(&h, false)).await.unwrap().booking.id;
    let order = h.service.create_order(&h.tenant, id).await.unwrap();
    h.service
        .verify_and_confirm(&h.tenant, id, h.gateway.confirm(&order.order_id, "pay_1"))
        .await
        .unwrap();

    let error = h.service.cancel(&h.tenant, id).await.unwrap_err();
    assert!(matches!(error, BookingError::Forbidden { role: Role::User, .. }));

    let cancelled = h.service.cancel(&h.admin, id).await.unwrap();
    assert_eq!(cancelled.booking.status, BookingStatus::Cancelled);

    // Cancelled is terminal.
    let error = h.service.cancel(&h.admin, id).await.unwrap_err();
    assert!(matches!(error, BookingError::InvalidTransition { .. }));
}

#[tokio::test]
async fn roles_outside_the_action_table_are_forbidden() {
    let h = harness().await;

    for session in [h.owner, h.donor, h.admin] {
        let error = h.service.create_booking(&session, new_booking(&h, false)).await.unwrap_err();
        assert!(matches!(error, BookingError::Forbidden { .. }), "{:?}", session.role);
    }

    let id = h.service.create_booking(&h.tenant, new_booking(&h, true)).await.unwrap().booking.id;
    for session in [h.tenant, h.owner, h.admin] {
        let error = h.service.approve_aid(&session, id, 20).await.unwrap_err();
        assert!(matches!(error, BookingError::Forbidden { .. }), "{:?}", session.role);
    }

    // Another tenant may neither cancel nor pay for someone else's booking.
    assert!(matches!(
        h.service.cancel(&h.other_tenant, id).await.unwrap_err(),
        BookingError::Forbidden { .. }
    ));
    assert!(matches!(
        h.service.list_users(&h.tenant).await.unwrap_err(),
        BookingError::Forbidden { .. }
    ));
}

#[tokio::test]
async fn bookings_are_visible_only_to_involved_parties() {
    let h = harness().await;
    let id = h.service.create_booking(&h.tenant, new_booking(&h, false)).await.unwrap().booking.id;

    assert!(h.service.get_booking(&h.tenant, id).await.is_ok());
    assert!(h.service.get_booking(&h.owner, id).await.is_ok());
    assert!(h.service.get_booking(&h.admin, id).await.is_ok());
    assert!(matches!(
        h.service.get_booking(&h.other_tenant, id).await.unwrap_err(),
        BookingError::NotFound { .. }
    ));
    // Donors only see bookings that ask for aid or that they sponsored.
    assert!(h.service.get_booking(&h.donor, id).await.is_err());

    h.service.request_aid(&h.tenant, id, None, None).await.unwrap();
    assert!(h.service.get_booking(&h.donor, id).await.is_ok());

    assert_eq!(h.service.list_my_bookings(&h.tenant).await.len(), 1);
    assert!(h.service.list_my_bookings(&h.other_tenant).await.is_empty());
    assert_eq!(h.service.owner_bookings(&h.owner).await.unwrap().len(), 1);
}

#[tokio::test]
async fn capacity_counts_active_bookings_only() {
    let h = common::HarnessBuilder::new().capacity(1).build().await;
    let first = h.service.create_booking(&h.tenant, new_booking(&h, false)).await.unwrap();

    let error = h.service.create_booking(&h.other_tenant, new_booking(&h, false)).await.unwrap_err();
    assert!(matches!(error, BookingError::CapacityExceeded { capacity: 1, .. }));

    h.service.cancel(&h.tenant, first.booking.id).await.unwrap();
    assert!(h.service.create_booking(&h.other_tenant, new_booking(&h, false)).await.is_ok());
}

#[tokio::test]
async fn admin_stats_and_deletions() {
    let h = harness().await;
    let aided = h.service.create_booking(&h.tenant, new_booking(&h, true)).await.unwrap().booking.id;
    h.service.approve_aid(&h.donor, aided, 50).await.unwrap();
    let plain = h.service.create_booking(&h.other_tenant, new_booking(&h, false)).await.unwrap().booking.id;

    let stats = h.service.stats(&h.admin).await.unwrap();
    assert_eq!(stats.users, 6);
    assert_eq!(stats.listings, 1);
    assert_eq!(stats.bookings_by_status[&BookingStatus::ApprovedAid], 1);
    assert_eq!(stats.bookings_by_status[&BookingStatus::Pending], 1);
    assert_eq!(stats.bookings_by_status[&BookingStatus::Confirmed], 0);
    assert_eq!(stats.sponsored_amount, Money::from_rupees(4500));
    assert!(h.service.stats(&h.owner).await.is_err());

    // Deleting a booking keeps the donor's ledger.
    h.service.delete_booking(&h.admin, aided).await.unwrap();
    let history = h.service.list_sponsorship_history(&h.admin, h.donor.user_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].current_status, None);

    // Deleting a user revokes their session but keeps their bookings.
    h.service.delete_user(&h.admin, h.other_tenant.user_id).await.unwrap();
    assert_eq!(
        h.service.authenticate(&common::token("Kiran")).await.unwrap_err(),
        BookingError::Unauthenticated
    );
    assert!(h.service.get_booking(&h.admin, plain).await.is_ok());

    assert!(matches!(
        h.service.delete_user(&h.admin, h.admin.user_id).await.unwrap_err(),
        BookingError::InvalidInput { .. }
    ));
}

#[tokio::test]
async fn listings_are_browsable_and_owner_managed() {
    let h = harness().await;

    assert_eq!(h.service.browse_listings(Some("pune")).await.len(), 1);
    assert!(h.service.browse_listings(Some("Mumbai")).await.is_empty());
    assert_eq!(h.service.list_managed_listings(&h.owner).await.unwrap().len(), 1);
    assert!(h.service.list_managed_listings(&h.tenant).await.is_err());

    let session = h.service.authenticate(&common::token("Vikram")).await.unwrap();
    assert_eq!(session, h.owner);

    h.service.delete_listing(&h.owner, h.listing.id).await.unwrap();
    assert!(h.service.browse_listings(None).await.is_empty());
    assert!(matches!(
        h.service.create_booking(&h.tenant, new_booking(&h, false)).await.unwrap_err(),
        BookingError::NotFound { .. }
    ));
}
