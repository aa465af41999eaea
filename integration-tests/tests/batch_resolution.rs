//! Batch resolution: membership is known up front, sync access resolves
//! lazily and caches, and async resolution overlaps slow providers instead
//! of serializing them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ampule::{Container, Error, Injectable, Scope, Token};

#[derive(Debug)]
struct Db;
impl Injectable for Db {}

#[derive(Debug)]
struct Cache;
impl Injectable for Cache {}

#[derive(Debug)]
struct Mailer;
impl Injectable for Mailer {}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_async_members_resolve_concurrently() {
    let container = Container::new();
    let db: Token<Db> = Token::new("db").with_scope(Scope::Singleton);
    let cache: Token<Cache> = Token::new("cache").with_scope(Scope::Singleton);
    let mailer: Token<Mailer> = Token::new("mailer").with_scope(Scope::Singleton);

    container
        .register_async(&db, |_| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(Db)
            })
        })
        .unwrap();
    container
        .register_async(&cache, |_| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(Cache)
            })
        })
        .unwrap();
    container
        .register_async(&mailer, |_| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(Mailer)
            })
        })
        .unwrap();

    let ctx = container.context();
    let deps = ctx.dependencies((&db, &cache, &mailer));

    let started = Instant::now();
    deps.resolve_async().await.unwrap();
    let elapsed = started.elapsed();

    // Three 50ms providers overlapping, not 150ms back to back.
    assert!(
        elapsed < Duration::from_millis(120),
        "expected concurrent resolution, took {elapsed:?}"
    );
    assert!(deps.get::<Db>().is_ok());
    assert!(deps.get::<Cache>().is_ok());
    assert!(deps.get::<Mailer>().is_ok());
}

#[test]
fn test_membership_and_size_before_resolution() {
    let container = Container::new();
    let db: Token<Db> = Token::new("db").with_scope(Scope::Singleton);
    let cache: Token<Cache> = Token::new("cache").with_scope(Scope::Singleton);
    container.register(&db, |_| Ok(Db)).unwrap();
    container.register(&cache, |_| Ok(Cache)).unwrap();

    let ctx = container.context();
    let deps = ctx.dependencies((&db, &cache));

    assert_eq!(deps.len(), 2);
    assert!(!deps.is_empty());
    assert!(deps.contains::<Db>());
    assert!(!deps.contains::<Mailer>());
}

#[test]
fn test_access_caches_after_first_resolution() {
    let container = Container::new();
    let db: Token<Db> = Token::new("db").with_scope(Scope::Transient);
    container.register(&db, |_| Ok(Db)).unwrap();

    let ctx = container.context();
    let deps = ctx.dependencies((&db,));

    // Even a transient member is pinned inside the set once resolved.
    let first = deps.get::<Db>().unwrap();
    let second = deps.get::<Db>().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn test_undeclared_type_is_membership_error() {
    let container = Container::new();
    let db: Token<Db> = Token::new("db").with_scope(Scope::Singleton);
    container.register(&db, |_| Ok(Db)).unwrap();

    let ctx = container.context();
    let deps = ctx.dependencies((&db,));

    match deps.get::<Mailer>() {
        Err(Error::NotInSet { requested, members }) => {
            assert!(requested.contains("Mailer"));
            assert_eq!(members, "db");
        }
        other => panic!("expected NotInSet, got {other:?}"),
    }
}

#[test]
fn test_member_failure_propagates_and_caches_nothing() {
    let container = Container::new();
    let db: Token<Db> = Token::new("db").with_scope(Scope::Singleton);
    let cache: Token<Cache> = Token::new("cache").with_scope(Scope::Singleton);
    container.register(&db, |_| Ok(Db)).unwrap();
    container
        .register(&cache, |_| anyhow::bail!("cache backend down"))
        .unwrap();

    let ctx = container.context();
    let deps = ctx.dependencies((&db, &cache));

    assert!(deps.resolve().is_err());
    // The set cached nothing, so even the member that succeeded resolves
    // again on the next attempt.
    assert!(deps.get::<Db>().is_err());
}

#[tokio::test]
async fn test_async_failure_reports_first_in_declaration_order() {
    let container = Container::new();
    let db: Token<Db> = Token::new("db").with_scope(Scope::Singleton);
    let cache: Token<Cache> = Token::new("cache").with_scope(Scope::Singleton);

    container
        .register_async(&db, |_| {
            Box::pin(async { anyhow::bail!("db unreachable") })
        })
        .unwrap();
    container
        .register_async(&cache, |_| {
            Box::pin(async { anyhow::bail!("cache unreachable") })
        })
        .unwrap();

    let ctx = container.context();
    let deps = ctx.dependencies((&db, &cache));

    match deps.resolve_async().await {
        Err(Error::Factory(err)) => assert!(err.to_string().contains("db")),
        other => panic!("expected Factory, got {other:?}"),
    }
}

#[test]
fn test_members_share_the_open_request_layer() {
    struct PerRequest;
    impl Injectable for PerRequest {}

    let container = Container::new();
    let token: Token<PerRequest> = Token::new("per-request").with_scope(Scope::Request);
    container.register(&token, |_| Ok(PerRequest)).unwrap();

    let ctx = container.context();
    let request = ctx.enter_request();

    let deps = ctx.dependencies((&token,));
    let from_set = deps.get::<PerRequest>().unwrap();
    let direct = ctx.get(&token).unwrap();

    // The set resolved on the same layer chain, so the request cache is
    // shared with direct resolution.
    assert!(Arc::ptr_eq(&from_set, &direct));
    request.close().unwrap();
}
