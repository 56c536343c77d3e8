//! Cart reconciliation across sessions, over real HTTP.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use resale_core::{ProductId, SessionToken};
use resale_integration_tests::TestServer;
use resale_storefront::api::{HttpStoreApi, StoreApi};
use resale_storefront::cart::{AvailabilityModel, CartStore, MutationPolicy};
use resale_storefront::config::ApiConfig;
use resale_storefront::context::SessionContext;
use resale_storefront::error::CartError;
use resale_storefront::testing::{FakeProduct, FakeStore, Fault, Op};

fn cart(server: &TestServer, session: &str) -> CartStore {
    let api: Arc<dyn StoreApi> =
        Arc::new(HttpStoreApi::new(&ApiConfig::new(&server.origin()).unwrap()).unwrap());
    let ctx = SessionContext::new(SessionToken::parse(session).unwrap());
    CartStore::new(
        api,
        ctx.clone(),
        AvailabilityModel::new(ctx),
        MutationPolicy::Queue,
    )
}

#[tokio::test]
async fn test_add_set_remove_converges_on_server_state() {
    let fake = FakeStore::new().with_product(FakeProduct::new(1, 750, 3).named("Куртка"));
    let server = TestServer::start(fake.clone()).await.unwrap();
    let cart = cart(&server, "session_1_alice");
    let id = ProductId::new(1);

    cart.load().await.unwrap();
    let snapshot = cart.add_by_id(id).await.unwrap();
    assert_eq!(snapshot.quantity_of(id), 1);
    assert_eq!(snapshot.lines().first().unwrap().name, "Куртка");

    let snapshot = cart.set_quantity(id, 3).await.unwrap();
    assert_eq!(snapshot.total_units(), 3);
    assert_eq!(snapshot.total_price().to_string(), "2250 ₽");
    assert_eq!(cart.availability().ceiling_for(id, &snapshot), Some(3));

    let snapshot = cart.remove(id).await.unwrap();
    assert!(snapshot.is_empty());
    let alice = SessionToken::parse("session_1_alice").unwrap();
    assert_eq!(fake.server_units(&alice).await, 0);
}

#[tokio::test]
async fn test_last_unit_goes_to_exactly_one_session() {
    let fake = FakeStore::new().with_product(FakeProduct::new(1, 500, 1));
    let server = TestServer::start(fake.clone()).await.unwrap();
    let alice = cart(&server, "session_1_alice");
    let bob = cart(&server, "session_1_bob");
    let id = ProductId::new(1);

    alice.load().await.unwrap();
    bob.load().await.unwrap();

    let (a, b) = tokio::join!(alice.add_by_id(id), bob.add_by_id(id));

    let winners = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(winners, 1);
    let loser = if a.is_ok() { b } else { a };
    assert!(matches!(loser, Err(CartError::Unavailable { .. })));

    let total = alice.current_snapshot().total_units() + bob.current_snapshot().total_units();
    assert_eq!(total, 1);
}

#[tokio::test]
async fn test_server_rejection_message_reaches_the_user() {
    let fake = FakeStore::new().with_product(FakeProduct::new(1, 500, 1));
    let server = TestServer::start(fake.clone()).await.unwrap();
    let alice = cart(&server, "session_1_alice");
    let id = ProductId::new(1);

    // Alice's availability says one unit is left...
    alice.load().await.unwrap();
    // ...but another shopper takes it before she adds.
    let bob = SessionToken::parse("session_1_bob").unwrap();
    fake.seed_line(&bob, id, 1);

    let err = alice.add_by_id(id).await.unwrap_err();
    assert_eq!(err.user_message(), "Only 0 available");
    assert!(alice.current_snapshot().is_empty());

    // The refetch after the rejection makes the ceiling fresh again.
    let again = alice.add_by_id(id).await.unwrap_err();
    assert!(matches!(again, CartError::Unavailable { .. }));
}

#[tokio::test]
async fn test_failed_load_clears_snapshot() {
    let fake = FakeStore::new().with_product(FakeProduct::new(1, 500, 2));
    let server = TestServer::start(fake.clone()).await.unwrap();
    let alice = cart(&server, "session_1_alice");

    alice.add_by_id(ProductId::new(1)).await.unwrap();
    fake.fail_next(Op::FetchCart, Fault::Malformed);

    let err = alice.load().await.unwrap_err();
    assert!(err.is_transport());
    assert!(alice.current_snapshot().is_empty());

    let snapshot = alice.load().await.unwrap();
    assert_eq!(snapshot.total_units(), 1);
}

#[tokio::test]
async fn test_rejected_update_keeps_server_truth() {
    let fake = FakeStore::new().with_product(FakeProduct::new(1, 500, 5));
    let server = TestServer::start(fake.clone()).await.unwrap();
    let alice = cart(&server, "session_1_alice");
    let id = ProductId::new(1);

    alice.add_by_id(id).await.unwrap();
    fake.fail_next(
        Op::UpdateCartLine,
        Fault::Rejected {
            status: 400,
            message: "Quantity changes are paused".to_string(),
        },
    );

    let err = alice.set_quantity(id, 2).await.unwrap_err();
    assert_eq!(err.user_message(), "Quantity changes are paused");
    assert_eq!(alice.current_snapshot().quantity_of(id), 1);
}
