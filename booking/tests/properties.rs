//! Property tests over random command sequences.
//!
//! Commands are reduced directly (effects are dropped); the properties are
//! about state, which the reducer updates before returning.
//!
//! Run with: `cargo test --test properties`

#![allow(clippy::unwrap_used)]

use pgstay_booking::aid::discount;
use pgstay_booking::{
    Account, BookingAction, BookingEnvironment, BookingEvent, BookingId, BookingReducer, BookingState,
    BookingStatus, Listing, ListingId, MockPaymentGateway, Money, RecordingNotifier, Role, Session, UserId,
    transition,
};
use pgstay_core::reducer::Reducer;
use pgstay_testing::{test_clock, test_epoch};
use proptest::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

const ROLES: [Role; 4] = [Role::User, Role::Owner, Role::Donor, Role::Admin];

#[derive(Clone, Debug)]
enum Command {
    Create { request_aid: bool },
    RequestAid,
    Approve { percent: u32 },
    Reject,
    Cancel,
}

fn command() -> impl Strategy<Value = Command> {
    prop_oneof![
        any::<bool>().prop_map(|request_aid| Command::Create { request_aid }),
        Just(Command::RequestAid),
        (0u32..=120).prop_map(|percent| Command::Approve { percent }),
        Just(Command::Reject),
        Just(Command::Cancel),
    ]
}

/// (command, acting role index, target booking index)
fn steps() -> impl Strategy<Value = Vec<(Command, usize, usize)>> {
    prop::collection::vec((command(), 0usize..4, 0usize..3), 1..40)
}

fn event() -> impl Strategy<Value = BookingEvent> {
    prop_oneof![
        any::<bool>().prop_map(|request_aid| BookingEvent::Create { request_aid }),
        Just(BookingEvent::RequestAid),
        (0u32..=120).prop_map(|percent| BookingEvent::ApproveAid { percent }),
        Just(BookingEvent::RejectAid),
        Just(BookingEvent::Pay),
        Just(BookingEvent::Cancel),
    ]
}

fn status() -> impl Strategy<Value = Option<BookingStatus>> {
    prop_oneof![
        Just(None),
        prop::sample::select(BookingStatus::ALL.to_vec()).prop_map(Some),
    ]
}

struct World {
    state: BookingState,
    env: BookingEnvironment,
    sessions: Vec<Session>,
    listing_id: ListingId,
    bookings: Vec<BookingId>,
}

fn world(rent_rupees: u64) -> World {
    let mut state = BookingState::new();
    let sessions: Vec<Session> = ROLES
        .iter()
        .map(|&role| {
            let account = Account {
                id: UserId::new(),
                name: format!("{role}"),
                email: format!("{role}@example.com").to_lowercase(),
                role,
            };
            let session = Session::new(account.id, role);
            state.accounts.insert(account.id, account);
            session
        })
        .collect();

    let listing = Listing {
        id: ListingId::new(),
        owner_id: sessions[1].user_id,
        name: "Sunrise PG".to_string(),
        city: "Pune".to_string(),
        rent: Money::from_rupees(rent_rupees),
        capacity: 10,
        created_at: test_epoch(),
    };
    let listing_id = listing.id;
    state.listings.insert(listing_id, listing);

    World {
        state,
        env: BookingEnvironment::new(
            Arc::new(test_clock()),
            Arc::new(MockPaymentGateway::new("secret")),
            Arc::new(RecordingNotifier::new()),
        ),
        sessions,
        listing_id,
        bookings: (0..3).map(|_| BookingId::new()).collect(),
    }
}

impl World {
    fn apply(&mut self, command: &Command, role: usize, target: usize) {
        let session = self.sessions[role];
        let booking_id = self.bookings[target];
        let correlation_id = Uuid::new_v4();
        let action = match command {
            Command::Create { request_aid } => BookingAction::CreateBooking {
                correlation_id,
                session,
                booking_id,
                listing_id: self.listing_id,
                request_aid: *request_aid,
                reason: None,
                requested_percent: None,
            },
            Command::RequestAid => BookingAction::RequestAid {
                correlation_id,
                session,
                booking_id,
                reason: None,
                requested_percent: None,
            },
            Command::Approve { percent } => BookingAction::ApproveAid {
                correlation_id,
                session,
                booking_id,
                percent: *percent,
            },
            Command::Reject => BookingAction::RejectAid {
                correlation_id,
                session,
                booking_id,
                note: None,
            },
            Command::Cancel => BookingAction::CancelBooking {
                correlation_id,
                session,
                booking_id,
            },
        };
        let _effects = BookingReducer::new().reduce(&mut self.state, action, &self.env);
    }
}

proptest! {
    #[test]
    fn final_amount_never_exceeds_base(rent in 1u64..1_000_000, percent in 0u8..=100) {
        let base = Money::from_rupees(rent);
        let (covered, remainder) = discount(base, percent);
        prop_assert!(remainder <= base);
        prop_assert_eq!(covered.saturating_add(remainder), base);
    }

    #[test]
    fn unlisted_pairs_are_rejected(current in status(), event in event(), role in 0usize..4) {
        use BookingStatus::{ApprovedAid, Cancelled, Confirmed, Pending, RequestingAid};

        let listed = matches!(
            (current, event),
            (None, BookingEvent::Create { .. })
                | (Some(Pending | ApprovedAid), BookingEvent::Pay)
                | (Some(Pending), BookingEvent::RequestAid)
                | (Some(RequestingAid), BookingEvent::ApproveAid { .. } | BookingEvent::RejectAid)
                | (Some(Pending | RequestingAid | ApprovedAid | Confirmed), BookingEvent::Cancel)
                | (Some(ApprovedAid), BookingEvent::ApproveAid { .. })
        );
        let result = transition(current, event, ROLES[role]);
        if !listed {
            prop_assert!(
                matches!(result, Err(pgstay_booking::BookingError::InvalidTransition { .. })),
                "{:?} + {:?} gave {:?}", current, event, result
            );
        }
        if current == Some(Cancelled) {
            prop_assert!(result.is_err());
        }
    }

    #[test]
    fn random_command_sequences_keep_booking_invariants(
        rent in 1u64..50_000,
        steps in steps(),
    ) {
        let mut world = world(rent);
        let mut first_donor: Vec<Option<(UserId, u8)>> = vec![None; 3];
        let mut was_cancelled = [false; 3];

        for (command, role, target) in &steps {
            world.apply(command, *role, *target);

            for (i, id) in world.bookings.iter().enumerate() {
                let Some(booking) = world.state.booking(id) else { continue };

                prop_assert!(booking.final_amount <= booking.base_amount);
                prop_assert!(booking.discount_percent <= 100);

                // Discount is set at most once.
                if let Some(donor) = booking.donor_id {
                    match first_donor[i] {
                        None => first_donor[i] = Some((donor, booking.discount_percent)),
                        Some(first) => prop_assert_eq!(first, (donor, booking.discount_percent)),
                    }
                } else {
                    prop_assert!(first_donor[i].is_none());
                    prop_assert_eq!(booking.final_amount, booking.base_amount);
                }

                // Cancelled is terminal.
                if was_cancelled[i] {
                    prop_assert_eq!(booking.status, BookingStatus::Cancelled);
                }
                was_cancelled[i] = booking.status == BookingStatus::Cancelled;

                // Every recorded change was a legal move.
                for pair in booking.history.windows(2) {
                    prop_assert_eq!(pair[1].from, Some(pair[0].to));
                }
            }
        }

        let sponsored = world.state.sponsorships.len();
        let with_donor = world
            .state
            .bookings
            .values()
            .filter(|b| b.donor_id.is_some())
            .count();
        prop_assert_eq!(sponsored, with_donor);
    }
}
