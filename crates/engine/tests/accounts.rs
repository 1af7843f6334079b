use engine::{
    AccountFilter, AccountKind, AccountStatus, Currency, Engine, EngineError, TagMatch,
};
use migration::MigratorTrait;
use sea_orm::Database;
use uuid::Uuid;

async fn engine_with_user() -> (Engine, Uuid) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder().database(db).build().await.unwrap();
    let user_id = engine.create_user("alice").await.unwrap();
    (engine, user_id)
}

async fn plain_account(engine: &Engine, user_id: Uuid, name: &str) -> Uuid {
    engine
        .create_account(user_id, name, AccountKind::Money, Currency::Eur, None, &[])
        .await
        .unwrap()
        .id
}

fn tags(names: &[&str]) -> Vec<String> {
    names.iter().map(ToString::to_string).collect()
}

#[tokio::test]
async fn create_and_load_account() {
    let (engine, user_id) = engine_with_user().await;

    let created = engine
        .create_account(
            user_id,
            "  Main   account ",
            AccountKind::Money,
            Currency::Eur,
            Some("daily spending"),
            &tags(&["daily"]),
        )
        .await
        .unwrap();
    assert_eq!(created.name, "Main account");
    assert_eq!(created.balance_minor, 0);
    assert_eq!(created.status, AccountStatus::Active);

    let loaded = engine.account(user_id, created.id).await.unwrap();
    assert_eq!(loaded.id, created.id);
    assert_eq!(loaded.name, created.name);
    assert_eq!(loaded.description.as_deref(), Some("daily spending"));
    assert_eq!(loaded.kind, AccountKind::Money);
    assert_eq!(loaded.currency, Currency::Eur);
    assert_eq!(
        engine
            .tags_of(engine::TagOwner::Account, created.id)
            .await
            .unwrap(),
        vec!["daily".to_string()]
    );

    // Existence goes through the normalized name key.
    assert!(engine.account_exists(user_id, "main ACCOUNT").await.unwrap());
    assert!(!engine.account_exists(user_id, "other").await.unwrap());
}

#[tokio::test]
async fn duplicate_account_name_is_a_conflict() {
    let (engine, user_id) = engine_with_user().await;
    plain_account(&engine, user_id, "Savings").await;

    let err = engine
        .create_account(
            user_id,
            "  savings ",
            AccountKind::Savings,
            Currency::Eur,
            None,
            &[],
        )
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::Conflict("account already exists".to_string()));
}

#[tokio::test]
async fn missing_account_is_not_found() {
    let (engine, user_id) = engine_with_user().await;
    let err = engine.account(user_id, Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err, EngineError::NotFound("account not exists".to_string()));
}

#[tokio::test]
async fn tag_filters_follow_set_semantics() {
    let (engine, user_id) = engine_with_user().await;

    let rent = engine
        .create_account(
            user_id,
            "Rent",
            AccountKind::Money,
            Currency::Eur,
            None,
            &tags(&["rent"]),
        )
        .await
        .unwrap();
    let bills = engine
        .create_account(
            user_id,
            "Bills",
            AccountKind::Money,
            Currency::Eur,
            None,
            &tags(&["rent", "bills"]),
        )
        .await
        .unwrap();
    let fun = engine
        .create_account(
            user_id,
            "Fun",
            AccountKind::Money,
            Currency::Eur,
            None,
            &tags(&["fun"]),
        )
        .await
        .unwrap();

    // Superset of {"rent"}.
    let have_rent = engine
        .list_accounts(
            user_id,
            vec![AccountFilter::Tags {
                tags: tags(&["rent"]),
                mode: TagMatch::HaveAll,
            }],
        )
        .await
        .unwrap();
    let mut ids: Vec<Uuid> = have_rent.iter().map(|account| account.id).collect();
    ids.sort();
    let mut expected = vec![rent.id, bills.id];
    expected.sort();
    assert_eq!(ids, expected);

    let have_both = engine
        .list_accounts(
            user_id,
            vec![AccountFilter::Tags {
                tags: tags(&["rent", "bills"]),
                mode: TagMatch::HaveAll,
            }],
        )
        .await
        .unwrap();
    assert_eq!(have_both.len(), 1);
    assert_eq!(have_both[0].id, bills.id);

    let overlap = engine
        .list_accounts(
            user_id,
            vec![AccountFilter::Tags {
                tags: tags(&["rent", "fun"]),
                mode: TagMatch::HaveAny,
            }],
        )
        .await
        .unwrap();
    assert_eq!(overlap.len(), 3);

    let exclude_rent = engine
        .list_accounts(
            user_id,
            vec![AccountFilter::Tags {
                tags: tags(&["rent"]),
                mode: TagMatch::HaveNothing,
            }],
        )
        .await
        .unwrap();
    assert_eq!(exclude_rent.len(), 1);
    assert_eq!(exclude_rent[0].id, fun.id);

    // The same predicate twice is idempotent: identical result set.
    let duplicated = engine
        .list_accounts(
            user_id,
            vec![
                AccountFilter::Tags {
                    tags: tags(&["rent"]),
                    mode: TagMatch::HaveAll,
                },
                AccountFilter::Tags {
                    tags: tags(&["rent"]),
                    mode: TagMatch::HaveAll,
                },
            ],
        )
        .await
        .unwrap();
    assert_eq!(duplicated.len(), have_rent.len());
}

#[tokio::test]
async fn kind_and_status_filters_combine() {
    let (engine, user_id) = engine_with_user().await;

    let cash = plain_account(&engine, user_id, "Cash").await;
    let goal = engine
        .create_account(user_id, "Holiday", AccountKind::Goal, Currency::Eur, None, &[])
        .await
        .unwrap()
        .id;
    engine
        .update_account(
            user_id,
            goal,
            None,
            None,
            Some(AccountStatus::Disabled),
            None,
        )
        .await
        .unwrap();

    let money_only = engine
        .list_accounts(user_id, vec![AccountFilter::Kinds(vec![AccountKind::Money])])
        .await
        .unwrap();
    assert_eq!(money_only.len(), 1);
    assert_eq!(money_only[0].id, cash);

    let active_only = engine
        .list_accounts(
            user_id,
            vec![AccountFilter::Statuses(vec![AccountStatus::Active])],
        )
        .await
        .unwrap();
    assert_eq!(active_only.len(), 1);
    assert_eq!(active_only[0].id, cash);

    let disabled = engine.list_disabled_accounts(user_id).await.unwrap();
    assert_eq!(disabled.len(), 1);
    assert_eq!(disabled[0].id, goal);

    // An empty filter list is the unfiltered base listing.
    assert_eq!(engine.list_accounts(user_id, vec![]).await.unwrap().len(), 2);
}

#[tokio::test]
async fn balance_range_filter_bounds_are_optional() {
    let (engine, user_id) = engine_with_user().await;

    let poor = plain_account(&engine, user_id, "Poor").await;
    let rich = plain_account(&engine, user_id, "Rich").await;
    engine.set_account_balance(user_id, poor, 100).await.unwrap();
    engine.set_account_balance(user_id, rich, 100_000).await.unwrap();

    let above = engine
        .list_accounts(
            user_id,
            vec![AccountFilter::BalanceRange {
                from_minor: Some(1_000),
                to_minor: None,
            }],
        )
        .await
        .unwrap();
    assert_eq!(above.len(), 1);
    assert_eq!(above[0].id, rich);

    // Neither bound set: degenerates to always-true, not an error.
    let all = engine
        .list_accounts(
            user_id,
            vec![AccountFilter::BalanceRange {
                from_minor: None,
                to_minor: None,
            }],
        )
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn pagination_walks_250_rows_in_three_pages() {
    let (engine, user_id) = engine_with_user().await;

    let mut created = Vec::new();
    for index in 0..250 {
        created.push(plain_account(&engine, user_id, &format!("acc {index:03}")).await);
    }

    let (first, first_cursor) = engine
        .list_accounts_page(user_id, vec![], Some(100), None)
        .await
        .unwrap();
    assert_eq!(first.len(), 100);
    let first_cursor = first_cursor.expect("first page must have a next cursor");

    let (second, second_cursor) = engine
        .list_accounts_page(user_id, vec![], Some(100), Some(&first_cursor))
        .await
        .unwrap();
    assert_eq!(second.len(), 100);
    let second_cursor = second_cursor.expect("second page must have a next cursor");

    let (third, third_cursor) = engine
        .list_accounts_page(user_id, vec![], Some(100), Some(&second_cursor))
        .await
        .unwrap();
    assert_eq!(third.len(), 50);
    assert!(third_cursor.is_none(), "last page has no further cursor");

    // No gaps, no duplicates across pages.
    let mut seen: Vec<Uuid> = first
        .iter()
        .chain(second.iter())
        .chain(third.iter())
        .map(|account| account.id)
        .collect();
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 250);
    created.sort();
    assert_eq!(seen, created);
}

#[tokio::test]
async fn default_page_size_applies_without_a_limit() {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder()
        .database(db)
        .default_page_size(3)
        .build()
        .await
        .unwrap();
    let user_id = engine.create_user("alice").await.unwrap();

    for index in 0..5 {
        plain_account(&engine, user_id, &format!("acc {index}")).await;
    }

    let (page, cursor) = engine
        .list_accounts_page(user_id, vec![], None, None)
        .await
        .unwrap();
    assert_eq!(page.len(), 3);
    assert!(cursor.is_some());
}

#[tokio::test]
async fn transfer_moves_balances_atomically() {
    let (engine, user_id) = engine_with_user().await;
    let src = plain_account(&engine, user_id, "Checking").await;
    let dst = plain_account(&engine, user_id, "Savings").await;
    engine.set_account_balance(user_id, src, 10_000).await.unwrap();

    engine.transfer(user_id, src, dst, 2_500).await.unwrap();

    assert_eq!(engine.account(user_id, src).await.unwrap().balance_minor, 7_500);
    assert_eq!(engine.account(user_id, dst).await.unwrap().balance_minor, 2_500);
}

#[tokio::test]
async fn transfer_rejects_bad_input() {
    let (engine, user_id) = engine_with_user().await;
    let src = plain_account(&engine, user_id, "Checking").await;
    let dst = plain_account(&engine, user_id, "Savings").await;
    engine.set_account_balance(user_id, src, 100).await.unwrap();

    let err = engine.transfer(user_id, src, dst, 500).await.unwrap_err();
    assert!(matches!(err, EngineError::InsufficientFunds(_)));

    let err = engine.transfer(user_id, src, src, 50).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidAmount(_)));

    let err = engine.transfer(user_id, src, dst, 0).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidAmount(_)));

    // Nothing moved.
    assert_eq!(engine.account(user_id, src).await.unwrap().balance_minor, 100);
    assert_eq!(engine.account(user_id, dst).await.unwrap().balance_minor, 0);
}

#[tokio::test]
async fn transfer_rejects_currency_mismatch() {
    let (engine, user_id) = engine_with_user().await;
    let eur = plain_account(&engine, user_id, "Euros").await;
    let usd = engine
        .create_account(user_id, "Dollars", AccountKind::Money, Currency::Usd, None, &[])
        .await
        .unwrap()
        .id;
    engine.set_account_balance(user_id, eur, 1_000).await.unwrap();

    let err = engine.transfer(user_id, eur, usd, 100).await.unwrap_err();
    assert!(matches!(err, EngineError::CurrencyMismatch(_)));
}

#[tokio::test]
async fn accounts_are_isolated_per_user() {
    let (engine, alice) = engine_with_user().await;
    let bob = engine.create_user("bob").await.unwrap();

    let alice_account = plain_account(&engine, alice, "Shared name").await;
    // Same display name for another user is fine: uniqueness is per owner.
    plain_account(&engine, bob, "Shared name").await;

    let err = engine.account(bob, alice_account).await.unwrap_err();
    assert_eq!(err, EngineError::NotFound("account not exists".to_string()));
    assert_eq!(engine.list_accounts(bob, vec![]).await.unwrap().len(), 1);
}
