//! Async resolution paths: factories may await, nested async dependencies
//! chain, and a cancelled construction releases its gate instead of
//! wedging every later resolution of the token.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ampule::{Container, Injectable, Scope, Token};

struct Conn {
    target: String,
}
impl Injectable for Conn {}

struct Api {
    conn_target: String,
}
impl Injectable for Api {}

#[tokio::test]
async fn test_async_factory_with_nested_async_dependency() {
    let container = Container::new();
    let conn: Token<Conn> = Token::new("conn").with_scope(Scope::Singleton);
    let api: Token<Api> = Token::new("api").with_scope(Scope::Singleton);

    container
        .register_async(&conn, |_| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(Conn {
                    target: "db:5432".into(),
                })
            })
        })
        .unwrap();
    let conn2 = conn.clone();
    container
        .register_async(&api, move |ctx| {
            let conn2 = conn2.clone();
            Box::pin(async move {
                let conn = ctx.aget(&conn2).await?;
                Ok(Api {
                    conn_target: conn.target.clone(),
                })
            })
        })
        .unwrap();

    let resolved = container.aget(&api).await.unwrap();
    assert_eq!(resolved.conn_target, "db:5432");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelled_construction_releases_the_gate() {
    let container = Container::new();
    let token: Token<Conn> = Token::new("conn").with_scope(Scope::Singleton);

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    container
        .register_async(&token, move |_| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(Conn {
                    target: "slow".into(),
                })
            })
        })
        .unwrap();

    let racing = {
        let container = container.clone();
        let token = token.clone();
        tokio::spawn(async move { container.aget(&token).await })
    };
    // Let the factory start, then cancel mid-construction.
    tokio::time::sleep(Duration::from_millis(20)).await;
    racing.abort();
    assert!(racing.await.is_err());

    // Nothing was cached and the construction gate was released with the
    // dropped future; a fresh resolution runs the factory again.
    let resolved = tokio::time::timeout(Duration::from_secs(2), container.aget(&token))
        .await
        .expect("resolution wedged behind a cancelled construction")
        .unwrap();
    assert_eq!(resolved.target, "slow");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_contexts_share_singletons_across_tasks() {
    let container = Container::new();
    let token: Token<Conn> = Token::new("conn").with_scope(Scope::Singleton);
    container
        .register_async(&token, |_| {
            Box::pin(async {
                Ok(Conn {
                    target: "shared".into(),
                })
            })
        })
        .unwrap();

    let a = {
        let container = container.clone();
        let token = token.clone();
        tokio::spawn(async move { container.context().aget(&token).await.unwrap() })
    };
    let b = {
        let container = container.clone();
        let token = token.clone();
        tokio::spawn(async move { container.context().aget(&token).await.unwrap() })
    };

    let (a, b) = (a.await.unwrap(), b.await.unwrap());
    assert!(Arc::ptr_eq(&a, &b));
}

#[tokio::test]
async fn test_request_scope_with_async_providers() {
    struct PerRequest;
    impl Injectable for PerRequest {}

    let container = Container::new();
    let token: Token<PerRequest> = Token::new("per-request").with_scope(Scope::Request);
    container
        .register_async(&token, |_| Box::pin(async { Ok(PerRequest) }))
        .unwrap();

    let ctx = container.context();
    let request = ctx.enter_request();
    let a = ctx.aget(&token).await.unwrap();
    let b = ctx.aget(&token).await.unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    request.aclose().await.unwrap();
}
