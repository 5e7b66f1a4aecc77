//! Shared fixtures: a running booking service with one account per role and
//! one listing.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]

use pgstay_booking::reducer::NewListing;
use pgstay_booking::{
    Account, BookingEnvironment, BookingReducer, BookingService, BookingState, BookingStore, InMemorySessions,
    Listing, MockPaymentGateway, Money, Notifier, PaymentGateway, RecordingNotifier, Role, Session, UserId,
};
use pgstay_testing::{ManualClock, test_epoch};
use std::sync::Arc;
use std::time::Duration;

/// Gateway secret shared by the mock gateway and the test checkout
pub const SECRET: &str = "integration-secret";

/// A service plus the sessions and collaborators tests poke at.
pub struct Harness {
    pub service: BookingService,
    pub gateway: MockPaymentGateway,
    pub notifier: RecordingNotifier,
    pub sessions: Arc<InMemorySessions>,
    pub tenant: Session,
    pub other_tenant: Session,
    pub donor: Session,
    pub other_donor: Session,
    pub owner: Session,
    pub admin: Session,
    pub listing: Listing,
    pub clock: ManualClock,
}

/// Token of the account named `name` (`tok-<lowercase name>`).
pub fn token(name: &str) -> String {
    format!("tok-{}", name.to_lowercase())
}

pub struct HarnessBuilder {
    gateway: MockPaymentGateway,
    notifier: RecordingNotifier,
    capacity: u32,
    rent: Money,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            gateway: MockPaymentGateway::new(SECRET),
            notifier: RecordingNotifier::new(),
            capacity: 4,
            rent: Money::from_rupees(9000),
        }
    }

    pub fn gateway(mut self, gateway: MockPaymentGateway) -> Self {
        self.gateway = gateway;
        self
    }

    pub fn notifier(mut self, notifier: RecordingNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    pub async fn build(self) -> Harness {
        let manual = ManualClock::new(test_epoch());
        let clock = Arc::new(manual.clone());
        let gateway: Arc<dyn PaymentGateway> = Arc::new(self.gateway.clone());
        let notifier: Arc<dyn Notifier> = Arc::new(self.notifier.clone());
        let store = BookingStore::new(
            BookingState::new(),
            BookingReducer::new(),
            BookingEnvironment::new(clock.clone(), gateway, notifier),
        );
        let sessions = Arc::new(InMemorySessions::new());
        let service = BookingService::new(store, clock, sessions.clone())
            .with_request_timeout(Duration::from_secs(5));

        let tenant = register(&service, &sessions, "Asha", Role::User).await;
        let other_tenant = register(&service, &sessions, "Kiran", Role::User).await;
        let donor = register(&service, &sessions, "Meera", Role::Donor).await;
        let other_donor = register(&service, &sessions, "Farah", Role::Donor).await;
        let owner = register(&service, &sessions, "Vikram", Role::Owner).await;
        let admin = register(&service, &sessions, "Root", Role::Admin).await;

        let listing = service
            .register_listing(
                &owner,
                NewListing {
                    owner_id: None,
                    name: "Sunrise PG".to_string(),
                    city: "Pune".to_string(),
                    rent: self.rent,
                    capacity: self.capacity,
                },
            )
            .await
            .unwrap();

        Harness {
            service,
            gateway: self.gateway,
            notifier: self.notifier,
            sessions,
            tenant,
            other_tenant,
            donor,
            other_donor,
            owner,
            admin,
            listing,
            clock: manual,
        }
    }
}

async fn register(service: &BookingService, sessions: &InMemorySessions, name: &str, role: Role) -> Session {
    let account = Account {
        id: UserId::new(),
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase()),
        role,
    };
    let account = service.register_account(account).await.unwrap();
    sessions.insert(token(name), account.id);
    Session::new(account.id, account.role)
}

/// Default harness: mock gateway, recording notifier, ₹9000 listing with 4 beds.
pub async fn harness() -> Harness {
    HarnessBuilder::new().build().await
}

/// Wait until `notifier` has been handed `count` notices (they are sent by a
/// separate effect after the confirming reply).
pub async fn wait_for_notices(notifier: &RecordingNotifier, count: usize) {
    for _ in 0..100 {
        if notifier.sent().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
