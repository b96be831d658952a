use mintgrid::{
    Config,
    GridController,
    GridError,
    PixelId,
    config::SyncConfig,
    test_helpers::{
        StalledAuthority,
        TestContext,
    },
};

#[tokio::test]
async fn claim__succeeds_and_fixes_mint_facts() {
    let ctx = TestContext::new();
    let mut controller = ctx.controller();
    let alice = ctx.alice();

    // when
    let outcome = controller.claim(25, 25, alice.clone()).await.unwrap();

    // then: legendary claim fee equals the tier price
    assert_eq!(outcome.fee, 100_000);
    let pixel = ctx.store.get(PixelId::new(25, 25)).unwrap();
    assert_eq!(pixel.owner().unwrap(), &alice);
    let mint = pixel.mint.as_ref().unwrap();
    // first legendary claim gets sequence 1 in both scopes
    assert_eq!(mint.tier_sequence, 1);
    assert_eq!(mint.global_sequence, 1);
    assert_eq!(mint.minter, alice);
    assert!(pixel.ownership.as_ref().unwrap().token_ref.is_some());
    assert!(!ctx.store.is_pending(pixel.id));
}

#[tokio::test]
async fn claim__out_of_bounds_is_rejected_before_any_state_change() {
    let ctx = TestContext::new();
    let mut controller = ctx.controller();

    // when
    let err = controller.claim(120, 3, ctx.alice()).await.unwrap_err();

    // then
    assert_eq!(
        err,
        GridError::OutOfBounds {
            x: 120,
            y: 3,
            side: 50,
        }
    );
    assert!(ctx.authority.pixels().iter().all(|p| !p.claimed()));
    assert!(ctx.store.get_all().iter().all(|p| !p.claimed()));
}

#[tokio::test]
async fn claim__of_locally_claimed_pixel_fails_fast() {
    let ctx = TestContext::new();
    let bob = ctx.bob();
    let claimed = ctx.authority.claim(10, 10, &bob, None).unwrap();
    ctx.store.apply_update(claimed.clone());
    let mut controller = ctx.controller();

    // when
    let err = controller.claim(10, 10, ctx.alice()).await.unwrap_err();

    // then: rejected against the local view, owner and mint untouched
    assert_eq!(
        err,
        GridError::AlreadyClaimed {
            id: PixelId::new(10, 10),
            owner: bob.clone(),
        }
    );
    let after = ctx.authority.pixel(PixelId::new(10, 10)).unwrap();
    assert_eq!(after, claimed);
}

#[tokio::test]
async fn claim__race_loss_rolls_back_and_adopts_winner() {
    let ctx = TestContext::new();
    let alice = ctx.alice();
    let bob = ctx.bob();
    // given: bob won the race at the authority, but this client's view is
    // still the seeded snapshot with the pixel unclaimed
    let winner = ctx.authority.claim(10, 10, &bob, None).unwrap();
    let mut controller = ctx.controller();

    // when
    let err = controller.claim(10, 10, alice.clone()).await.unwrap_err();

    // then: the optimistic write is gone and bob's record was adopted
    assert!(err.is_conflict());
    let id = PixelId::new(10, 10);
    let local = ctx.store.get(id).unwrap();
    assert_eq!(local, winner);
    assert!(!ctx.store.is_pending(id));
    // the losing attempt never bumped any mint sequence
    assert_eq!(local.mint.as_ref().unwrap().tier_sequence, 1);
    assert_eq!(
        ctx.authority.claim(11, 10, &alice, None).unwrap().mint.unwrap().global_sequence,
        2
    );
}

#[tokio::test]
async fn claim__without_fee_confirmation_is_rolled_back() {
    let ctx = TestContext::new();
    ctx.authority.set_fee_confirmation(false);
    let mut controller = ctx.controller();

    // when
    let err = controller.claim(5, 5, ctx.alice()).await.unwrap_err();

    // then
    assert_eq!(err, GridError::FeeUnconfirmed(PixelId::new(5, 5)));
    let pixel = ctx.store.get(PixelId::new(5, 5)).unwrap();
    assert!(!pixel.claimed());
    assert!(!ctx.store.is_pending(pixel.id));
}

#[tokio::test]
async fn claim__timeout_leaves_provisional_until_a_snapshot_settles_it() {
    let config = Config {
        sync: SyncConfig {
            submit_timeout_ms: 50,
            ..SyncConfig::default()
        },
        ..Config::default()
    };
    let ctx = TestContext::with_config(config.clone());
    let alice = ctx.alice();
    let stalled = StalledAuthority {
        inner: ctx.authority.clone(),
    };
    let mut controller = GridController::new(ctx.store.clone(), stalled, config);

    // when: the authority never answers
    let err = controller.claim(7, 7, alice.clone()).await.unwrap_err();

    // then: unconfirmed, optimistic state still visible and marked pending
    assert!(matches!(err, GridError::AuthorityTimeout(_)));
    let id = PixelId::new(7, 7);
    assert!(ctx.store.is_pending(id));
    assert_eq!(ctx.store.get(id).unwrap().owner().unwrap(), &alice);

    // a later authoritative snapshot overrides the local assumption
    ctx.store.replace_all(ctx.authority.pixels());
    assert!(!ctx.store.is_pending(id));
    assert!(!ctx.store.get(id).unwrap().claimed());
}
