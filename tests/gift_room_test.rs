mod helpers;

use chrono::Duration;
use giftroom_backend::error::AppError;
use giftroom_backend::models::*;
use giftroom_backend::services::{CreateRoomInput, JoinCaller};
use helpers::*;
use rust_decimal::Decimal;
use tokio_test::{assert_err, assert_ok};

// ============================================================================
// Room creation
// ============================================================================

#[tokio::test]
async fn test_group_room_fully_claimed() {
    let ctx = TestContext::new();
    let creator = ctx.account("Ada", 5000).await;

    let room = ctx.create_room(&creator, "group", 3, 1000).await;
    assert_eq!(ctx.balance(creator.id).await, dec(2000));
    assert_eq!(room.status_enum(), RoomStatus::Active);
    assert_eq!(room.token.len(), 64);

    let mut payouts = dec(0);
    for name in ["Bola", "Chidi", "Dayo"] {
        let holder = ctx.account(name, 0).await;
        let joined = assert_ok!(ctx.join_as(&room, &holder).await);
        assert!(!joined.already_reserved);

        let claimed = assert_ok!(
            ctx.state
                .claims
                .claim(joined.reservation.id, holder.id, None)
                .await
        );
        assert_eq!(claimed.amount, dec(1000));
        assert!(!claimed.referral_bonus_awarded);
        assert_eq!(ctx.balance(holder.id).await, dec(1000));
        payouts += claimed.amount;
    }

    let room = ctx.room(room.id).await;
    assert_eq!(room.claimed_count, 3);
    assert_eq!(room.joined_count, 3);
    assert_eq!(room.status_enum(), RoomStatus::Full);
    assert_room_invariants(&room);

    // Nothing left to return, even after expiry
    ctx.advance(Duration::hours(49));
    let err = assert_err!(ctx.state.refunds.refund(room.id, creator.id).await);
    assert!(matches!(err, AppError::NothingToRefund));

    // Conservation: escrow == payouts + refund (0)
    assert_eq!(room.escrow_total().unwrap(), payouts);
}

#[tokio::test]
async fn test_create_room_rejects_invalid_parameters() {
    let ctx = TestContext::new();
    let creator = ctx.account("Ada", 100_000).await;

    let cases = [
        ("group", 1, 100, Some(48)),
        ("group", 51, 100, Some(48)),
        ("personal", 2, 100, Some(48)),
        ("public", 1001, 100, Some(48)),
        ("group", 3, 10, Some(48)),
        ("group", 3, 100, Some(5)),
        ("mega", 3, 100, Some(48)),
    ];

    for (room_type, capacity, amount, hours) in cases {
        let result = ctx
            .state
            .rooms
            .create_room(
                creator.id,
                CreateRoomInput {
                    room_type: room_type.to_string(),
                    capacity,
                    amount: dec(amount),
                    message: None,
                    expiration_hours: hours,
                },
            )
            .await;
        assert!(
            matches!(result, Err(AppError::Validation(_))),
            "{} / {} / {} should be rejected",
            room_type,
            capacity,
            amount
        );
    }

    let long_message = "x".repeat(MAX_MESSAGE_LEN + 1);
    let result = ctx
        .state
        .rooms
        .create_room(
            creator.id,
            CreateRoomInput {
                room_type: "group".to_string(),
                capacity: 2,
                amount: dec(100),
                message: Some(long_message),
                expiration_hours: None,
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));

    assert_eq!(ctx.balance(creator.id).await, dec(100_000));
}

#[tokio::test]
async fn test_create_room_rejects_amounts_beyond_money_range() {
    let ctx = TestContext::new();
    let creator = ctx.account("Ada", 100_000).await;

    let huge = [Decimal::MAX.round_dp(0), dec(1_000_000_000_000_000)];
    for amount in huge {
        let state = ctx.state.clone();
        let creator_id = creator.id;
        let outcome = tokio::spawn(async move {
            state
                .rooms
                .create_room(
                    creator_id,
                    CreateRoomInput {
                        room_type: "public".to_string(),
                        capacity: 1000,
                        amount,
                        message: None,
                        expiration_hours: None,
                    },
                )
                .await
        })
        .await;

        let result = assert_ok!(outcome, "create_room must not panic on {}", amount);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    assert_eq!(ctx.balance(creator.id).await, dec(100_000));
    assert!(ctx.state.rooms.my_rooms(creator.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_deposit_beyond_money_range_is_rejected() {
    let ctx = TestContext::new();
    let account = ctx.account("Ada", 100).await;

    let err = assert_err!(
        ctx.store
            .deposit(account.id, MAX_LEDGER_AMOUNT, ctx.clock_now())
            .await
    );
    assert!(matches!(err, AppError::Validation(_)));

    let err = assert_err!(
        ctx.store
            .deposit(account.id, Decimal::MAX, ctx.clock_now())
            .await
    );
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(ctx.balance(account.id).await, dec(100));
}

#[tokio::test]
async fn test_create_room_requires_full_escrow() {
    let ctx = TestContext::new();
    let creator = ctx.account("Ada", 150).await;

    let result = ctx
        .state
        .rooms
        .create_room(
            creator.id,
            CreateRoomInput {
                room_type: "group".to_string(),
                capacity: 2,
                amount: dec(100),
                message: None,
                expiration_hours: None,
            },
        )
        .await;

    assert!(matches!(result, Err(AppError::InsufficientBalance { .. })));
    assert_eq!(ctx.balance(creator.id).await, dec(150));
    assert!(ctx.state.rooms.my_rooms(creator.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_default_expiration_applies() {
    let ctx = TestContext::new();
    let creator = ctx.account("Ada", 1000).await;

    let room = ctx
        .state
        .rooms
        .create_room(
            creator.id,
            CreateRoomInput {
                room_type: "personal".to_string(),
                capacity: 1,
                amount: dec(500),
                message: None,
                expiration_hours: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(room.expires_at - room.created_at, Duration::hours(48));
}

#[tokio::test]
async fn test_escrow_is_recorded_in_ledger() {
    let ctx = TestContext::new();
    let creator = ctx.account("Ada", 5000).await;
    let room = ctx.create_room(&creator, "group", 3, 1000).await;

    let transactions = ctx.store.wallet_transactions(creator.id, 10).await.unwrap();
    let escrow = transactions
        .iter()
        .find(|t| t.tx_type() == Some(TransactionType::GiftEscrow))
        .expect("escrow entry");

    assert_eq!(escrow.amount, dec(3000));
    assert_eq!(escrow.balance_before, dec(5000));
    assert_eq!(escrow.balance_after, dec(2000));
    assert_eq!(escrow.reference_id, Some(room.id));
}

// ============================================================================
// Joining
// ============================================================================

#[tokio::test]
async fn test_personal_room_second_holder_is_rejected() {
    let ctx = TestContext::new();
    let creator = ctx.account("Ada", 1000).await;
    let room = ctx.create_room(&creator, "personal", 1, 500).await;

    let a = ctx.account("Bola", 0).await;
    let b = ctx.account("Chidi", 0).await;

    let joined = assert_ok!(ctx.join_as(&room, &a).await);
    assert_eq!(joined.room.status_enum(), RoomStatus::Full);

    let err = assert_err!(ctx.join_as(&room, &b).await);
    assert!(matches!(err, AppError::RoomFull));

    // The original holder retrying still gets their slot back
    let retry = assert_ok!(ctx.join_as(&room, &a).await);
    assert!(retry.already_reserved);
    assert_eq!(retry.reservation.id, joined.reservation.id);
}

#[tokio::test]
async fn test_join_is_idempotent_per_holder() {
    let ctx = TestContext::new();
    let creator = ctx.account("Ada", 5000).await;
    let room = ctx.create_room(&creator, "group", 5, 100).await;
    let holder = ctx.account("Bola", 0).await;

    let first = ctx.join_as(&room, &holder).await.unwrap();
    let second = ctx.join_as(&room, &holder).await.unwrap();

    assert!(!first.already_reserved);
    assert!(second.already_reserved);
    assert_eq!(first.reservation.id, second.reservation.id);
    assert_eq!(ctx.room(room.id).await.joined_count, 1);
}

#[tokio::test]
async fn test_join_rejections() {
    let ctx = TestContext::new();
    let creator = ctx.account("Ada", 5000).await;
    let room = ctx.create_room(&creator, "group", 5, 100).await;

    // Creator may not take a slot in their own room
    let err = assert_err!(ctx.join_as(&room, &creator).await);
    assert!(matches!(err, AppError::Validation(_)));

    // Unknown token
    let mut unknown = room.clone();
    unknown.token = "0".repeat(64);
    let holder = ctx.account("Bola", 0).await;
    let err = assert_err!(ctx.join_as(&unknown, &holder).await);
    assert!(matches!(err, AppError::RoomNotFound));

    // Missing fingerprint
    let err = assert_err!(
        ctx.state
            .reservations
            .join(&room.token, JoinCaller::default(), "  ", None)
            .await
    );
    assert!(matches!(err, AppError::Validation(_)));

    // Invalid contact details
    let err = assert_err!(
        ctx.state
            .reservations
            .join(
                &room.token,
                JoinCaller::default(),
                "device-1",
                Some(ContactInfo {
                    email: Some("nope".to_string()),
                    ..ContactInfo::default()
                }),
            )
            .await
    );
    assert!(matches!(err, AppError::Validation(_)));

    // Past the deadline
    ctx.advance(Duration::hours(48) + Duration::seconds(1));
    let err = assert_err!(ctx.join_as(&room, &holder).await);
    assert!(matches!(err, AppError::RoomExpired));
    assert_eq!(ctx.room(room.id).await.joined_count, 0);
}

#[tokio::test]
async fn test_public_room_caps_reservations_per_device() {
    let ctx = TestContext::new();
    let creator = ctx.account("Ada", 5000).await;
    let room = ctx.create_room(&creator, "public", 10, 100).await;

    let first = ctx.account("Bola", 0).await;
    let second = ctx.account("Chidi", 0).await;

    let caller = |account_id| JoinCaller {
        account_id: Some(account_id),
        client_ip: Some("10.0.0.7".to_string()),
    };

    assert_ok!(
        ctx.state
            .reservations
            .join(&room.token, caller(first.id), "shared-phone", None)
            .await
    );
    let err = assert_err!(
        ctx.state
            .reservations
            .join(&room.token, caller(second.id), "shared-phone", None)
            .await
    );
    assert!(matches!(err, AppError::DeviceLimitReached));

    // Group rooms do not apply the device cap
    let group = ctx.create_room(&creator, "group", 10, 100).await;
    for account in [&first, &second] {
        assert_ok!(
            ctx.state
                .reservations
                .join(
                    &group.token,
                    JoinCaller {
                        account_id: Some(account.id),
                        client_ip: None,
                    },
                    "shared-phone",
                    None,
                )
                .await
        );
    }
}

#[tokio::test]
async fn test_join_rate_limit() {
    let ctx = TestContext::with_config(giftroom_backend::config::GiftRoomConfig {
        join_rate_limit_per_minute: 2,
        ..test_gift_config()
    });
    let creator = ctx.account("Ada", 5000).await;
    let room = ctx.create_room(&creator, "public", 10, 100).await;

    assert_ok!(ctx.join_anonymous(&room, "device-x").await);
    assert_ok!(ctx.join_anonymous(&room, "device-x").await);
    let err = assert_err!(ctx.join_anonymous(&room, "device-x").await);
    assert!(matches!(err, AppError::RateLimited { .. }));
    assert!(!err.is_retryable());

    ctx.advance(Duration::minutes(2));
    let again = assert_ok!(ctx.join_anonymous(&room, "device-x").await);
    assert!(again.already_reserved);
}

// ============================================================================
// Room details
// ============================================================================

#[tokio::test]
async fn test_room_details_show_callers_reservation() {
    let ctx = TestContext::new();
    let creator = ctx.account("Ada", 5000).await;
    let room = ctx.create_room(&creator, "group", 4, 100).await;

    let joined = ctx.join_anonymous(&room, "device-a").await.unwrap();

    let details = ctx
        .state
        .rooms
        .get_room_details(&room.token, Some("device-a"), None)
        .await
        .unwrap();
    assert_eq!(details.creator.display_name, "Ada");
    assert_eq!(details.spots_remaining, 3);
    assert_eq!(details.status, RoomStatus::Active);
    assert_eq!(details.reservation.map(|r| r.id), Some(joined.reservation.id));

    let stranger = ctx
        .state
        .rooms
        .get_room_details(&room.token, Some("device-b"), None)
        .await
        .unwrap();
    assert!(stranger.reservation.is_none());

    // Expiry is derived at read time before the sweep persists it
    ctx.advance(Duration::hours(49));
    let later = ctx
        .state
        .rooms
        .get_room_details(&room.token, None, None)
        .await
        .unwrap();
    assert_eq!(later.status, RoomStatus::Expired);
    assert_eq!(later.room.status_enum(), RoomStatus::Active);
}

// ============================================================================
// Claims
// ============================================================================

#[tokio::test]
async fn test_claim_twice_pays_once() {
    let ctx = TestContext::new();
    let creator = ctx.account("Ada", 5000).await;
    let room = ctx.create_room(&creator, "group", 2, 700).await;
    let holder = ctx.account("Bola", 0).await;
    let joined = ctx.join_as(&room, &holder).await.unwrap();

    let first = ctx
        .state
        .claims
        .claim(joined.reservation.id, holder.id, None)
        .await
        .unwrap();
    let second = ctx
        .state
        .claims
        .claim(joined.reservation.id, holder.id, None)
        .await
        .unwrap();

    assert!(!first.already_claimed);
    assert!(second.already_claimed);
    assert_eq!(first.claim.id, second.claim.id);
    assert_eq!(second.amount, dec(700));
    assert_eq!(ctx.balance(holder.id).await, dec(700));
    assert_eq!(ctx.room(room.id).await.claimed_count, 1);
}

#[tokio::test]
async fn test_claim_authorization() {
    let ctx = TestContext::new();
    let creator = ctx.account("Ada", 5000).await;
    let room = ctx.create_room(&creator, "group", 3, 100).await;
    let holder = ctx.account("Bola", 0).await;
    let thief = ctx.account("Mallory", 0).await;
    let joined = ctx.join_as(&room, &holder).await.unwrap();

    let err = assert_err!(
        ctx.state
            .claims
            .claim(joined.reservation.id, thief.id, None)
            .await
    );
    assert!(matches!(err, AppError::Unauthorized(_)));

    let err = assert_err!(
        ctx.state
            .claims
            .claim(uuid::Uuid::new_v4(), holder.id, None)
            .await
    );
    assert!(matches!(err, AppError::ReservationNotFound));

    // A claimed reservation stays out of reach of other accounts
    ctx.state
        .claims
        .claim(joined.reservation.id, holder.id, None)
        .await
        .unwrap();
    let err = assert_err!(
        ctx.state
            .claims
            .claim(joined.reservation.id, thief.id, None)
            .await
    );
    assert!(matches!(err, AppError::Unauthorized(_)));
    assert_eq!(ctx.balance(thief.id).await, dec(0));
}

#[tokio::test]
async fn test_anonymous_hold_binds_to_claimant_on_same_device() {
    let ctx = TestContext::new();
    let creator = ctx.account("Ada", 5000).await;
    let room = ctx.create_room(&creator, "public", 5, 250).await;
    let joined = ctx.join_anonymous(&room, "phone-123").await.unwrap();
    assert_eq!(joined.reservation.holder_kind, "device");

    let claimant = ctx.account("Bola", 0).await;

    let err = assert_err!(
        ctx.state
            .claims
            .claim(joined.reservation.id, claimant.id, None)
            .await
    );
    assert!(matches!(err, AppError::Unauthorized(_)));

    let err = assert_err!(
        ctx.state
            .claims
            .claim(joined.reservation.id, claimant.id, Some("laptop-9"))
            .await
    );
    assert!(matches!(err, AppError::Unauthorized(_)));

    let claimed = ctx
        .state
        .claims
        .claim(joined.reservation.id, claimant.id, Some("phone-123"))
        .await
        .unwrap();
    assert_eq!(claimed.amount, dec(250));

    let reservation = ctx
        .store
        .find_reservation(joined.reservation.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reservation.holder().unwrap(), HolderRef::Account(claimant.id));
    assert_eq!(reservation.status_enum(), ReservationStatus::Claimed);
}

#[tokio::test]
async fn test_referral_bonus_paid_once_on_first_funding() {
    let ctx = TestContext::new();
    let creator = ctx.account("Ada", 10_000).await;
    let referred = ctx.account_referred_by("Bola", Some(creator.id), 0).await;
    let other_referrer = ctx.account("Femi", 0).await;
    let referred_elsewhere = ctx
        .account_referred_by("Chidi", Some(other_referrer.id), 0)
        .await;

    let room = ctx.create_room(&creator, "group", 3, 1000).await;
    assert_eq!(ctx.balance(creator.id).await, dec(7000));

    let joined = ctx.join_as(&room, &referred).await.unwrap();
    let claimed = ctx
        .state
        .claims
        .claim(joined.reservation.id, referred.id, None)
        .await
        .unwrap();
    assert!(claimed.referral_bonus_awarded);
    assert_eq!(claimed.claim.referral_bonus_amount, Some(dec(100)));
    assert_eq!(ctx.balance(creator.id).await, dec(7100));

    // Retrying the claim does not pay the bonus again
    let retry = ctx
        .state
        .claims
        .claim(joined.reservation.id, referred.id, None)
        .await
        .unwrap();
    assert!(retry.already_claimed);
    assert_eq!(ctx.balance(creator.id).await, dec(7100));

    // Not the creator's referral
    let joined = ctx.join_as(&room, &referred_elsewhere).await.unwrap();
    let claimed = ctx
        .state
        .claims
        .claim(joined.reservation.id, referred_elsewhere.id, None)
        .await
        .unwrap();
    assert!(!claimed.referral_bonus_awarded);

    // The referral is funded now, so a second room pays no bonus
    let second_room = ctx.create_room(&creator, "personal", 1, 500).await;
    let joined = ctx.join_as(&second_room, &referred).await.unwrap();
    let claimed = ctx
        .state
        .claims
        .claim(joined.reservation.id, referred.id, None)
        .await
        .unwrap();
    assert!(!claimed.referral_bonus_awarded);
    assert_eq!(ctx.balance(creator.id).await, dec(6600));
}

// ============================================================================
// Expiry and refunds
// ============================================================================

#[tokio::test]
async fn test_expired_room_refund_scenario() {
    let ctx = TestContext::new();
    let creator = ctx.account("Ada", 1000).await;
    let room = ctx.create_room(&creator, "group", 5, 200).await;
    assert_eq!(ctx.balance(creator.id).await, dec(0));

    let mut reservations = Vec::new();
    for name in ["Bola", "Chidi", "Dayo"] {
        let holder = ctx.account(name, 0).await;
        let joined = ctx.join_as(&room, &holder).await.unwrap();
        reservations.push((holder, joined.reservation));
    }
    for (holder, reservation) in &reservations[..2] {
        ctx.state
            .claims
            .claim(reservation.id, holder.id, None)
            .await
            .unwrap();
    }

    // Refund is only offered once the room is over
    let err = assert_err!(ctx.state.refunds.refund(room.id, creator.id).await);
    assert!(matches!(err, AppError::RefundNotAvailable(_)));

    ctx.advance(Duration::hours(48) + Duration::minutes(5));

    let stranger = ctx.account("Mallory", 0).await;
    let err = assert_err!(ctx.state.refunds.refund(room.id, stranger.id).await);
    assert!(matches!(err, AppError::Unauthorized(_)));

    let refund = ctx.state.refunds.refund(room.id, creator.id).await.unwrap();
    assert_eq!(refund.refund_amount, dec(600));
    assert_eq!(refund.unclaimed_count, 3);
    assert_eq!(refund.room.status_enum(), RoomStatus::Cancelled);
    assert_eq!(ctx.balance(creator.id).await, dec(600));

    let err = assert_err!(ctx.state.refunds.refund(room.id, creator.id).await);
    assert!(matches!(err, AppError::AlreadyRefunded));
    assert_eq!(ctx.balance(creator.id).await, dec(600));

    // The unclaimed hold was released with the refund
    let (late_holder, late_reservation) = &reservations[2];
    let err = assert_err!(
        ctx.state
            .claims
            .claim(late_reservation.id, late_holder.id, None)
            .await
    );
    assert!(matches!(err, AppError::GiftExpired));

    let room = ctx.room(room.id).await;
    assert_eq!(room.joined_count, 2);
    assert_eq!(room.claimed_count, 2);
    assert_room_invariants(&room);

    // Conservation
    let payouts = dec(200) * rust_decimal::Decimal::from(room.claimed_count);
    assert_eq!(room.escrow_total().unwrap(), payouts + refund.refund_amount);
}

#[tokio::test]
async fn test_refund_preview() {
    let ctx = TestContext::new();
    let creator = ctx.account("Ada", 5000).await;
    let room = ctx.create_room(&creator, "group", 4, 300).await;

    let preview = ctx.state.refunds.preview(room.id, creator.id).await.unwrap();
    assert!(!preview.eligible);
    assert_eq!(preview.reason.as_deref(), Some("REFUND_NOT_AVAILABLE"));
    assert_eq!(preview.status, RoomStatus::Active);

    ctx.advance(Duration::hours(49));
    let preview = ctx.state.refunds.preview(room.id, creator.id).await.unwrap();
    assert!(preview.eligible);
    assert_eq!(preview.refund_amount, dec(1200));
    assert_eq!(preview.unclaimed_count, 4);

    ctx.state.refunds.refund(room.id, creator.id).await.unwrap();
    let preview = ctx.state.refunds.preview(room.id, creator.id).await.unwrap();
    assert!(!preview.eligible);
    assert_eq!(preview.reason.as_deref(), Some("ALREADY_REFUNDED"));
    assert_eq!(preview.status, RoomStatus::Cancelled);
}

#[tokio::test]
async fn test_grace_window_then_sweep() {
    let ctx = TestContext::new();
    let creator = ctx.account("Ada", 5000).await;
    let room = ctx.create_room(&creator, "group", 3, 100).await;

    let early = ctx.account("Bola", 0).await;
    let late = ctx.account("Chidi", 0).await;
    let early_join = ctx.join_as(&room, &early).await.unwrap();
    let late_join = ctx.join_as(&room, &late).await.unwrap();

    // Just past the deadline the hold is still claimable
    ctx.advance(Duration::hours(48) + Duration::minutes(10));
    assert_ok!(
        ctx.state
            .claims
            .claim(early_join.reservation.id, early.id, None)
            .await
    );

    // The sweep leaves rooms alone while they are inside the grace window
    let sweeper = ctx.state.sweeper();
    assert_eq!(sweeper.sweep_once().await.unwrap(), 0);

    ctx.expire_past_grace(&room);
    assert_eq!(sweeper.sweep_once().await.unwrap(), 1);
    assert_eq!(sweeper.sweep_once().await.unwrap(), 0);

    let swept = ctx.room(room.id).await;
    assert_eq!(swept.status_enum(), RoomStatus::Expired);
    assert_eq!(swept.joined_count, 1);
    assert_eq!(swept.claimed_count, 1);
    assert_room_invariants(&swept);

    let err = assert_err!(
        ctx.state
            .claims
            .claim(late_join.reservation.id, late.id, None)
            .await
    );
    assert!(matches!(err, AppError::GiftExpired));

    // Sweep does not move money; the creator still refunds the remainder
    let refund = ctx.state.refunds.refund(room.id, creator.id).await.unwrap();
    assert_eq!(refund.refund_amount, dec(200));
    assert_eq!(ctx.balance(creator.id).await, dec(5000 - 300 + 200));
}

#[tokio::test]
async fn test_sweep_processes_in_batches() {
    let ctx = TestContext::with_config(giftroom_backend::config::GiftRoomConfig {
        sweep_batch_size: 2,
        ..test_gift_config()
    });
    let creator = ctx.account("Ada", 10_000).await;

    let mut rooms = Vec::new();
    for _ in 0..5 {
        rooms.push(ctx.create_room(&creator, "personal", 1, 100).await);
    }

    ctx.expire_past_grace(&rooms[0]);
    assert_eq!(ctx.state.sweeper().sweep_once().await.unwrap(), 5);

    for room in rooms {
        assert_eq!(ctx.room(room.id).await.status_enum(), RoomStatus::Expired);
    }
}

// ============================================================================
// Listings
// ============================================================================

#[tokio::test]
async fn test_my_rooms_and_history() {
    let ctx = TestContext::new();
    let creator = ctx.account("Ada", 5000).await;
    let holder = ctx.account("Bola", 0).await;

    let open_room = ctx.create_room(&creator, "group", 2, 100).await;
    let finished_room = ctx.create_room(&creator, "personal", 1, 100).await;

    let joined = ctx.join_as(&finished_room, &holder).await.unwrap();
    ctx.state
        .claims
        .claim(joined.reservation.id, holder.id, None)
        .await
        .unwrap();

    let mine = ctx.state.rooms.my_rooms(creator.id).await.unwrap();
    assert_eq!(mine.len(), 2);
    assert!(mine.iter().any(|r| r.room.id == open_room.id && r.spots_remaining == 2));

    let history = ctx.state.rooms.history(holder.id).await.unwrap();
    assert_eq!(history.claims.len(), 1);
    assert_eq!(history.claims[0].room_id, finished_room.id);
    assert!(history.rooms.is_empty());

    ctx.advance(Duration::hours(49));
    ctx.state.refunds.refund(open_room.id, creator.id).await.unwrap();

    let history = ctx.state.rooms.history(creator.id).await.unwrap();
    assert_eq!(history.rooms.len(), 2);
    assert!(history
        .rooms
        .iter()
        .any(|r| r.room.id == open_room.id && r.effective_status == RoomStatus::Cancelled));
}
