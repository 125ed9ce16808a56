//! Transaction manager behavior against an in-memory source.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{FakeSource, FakeTx, Op};
use futures_util::FutureExt;
use shared_infra::database::TransactionManager;
use shared_infra::error::{classify, Error, ErrorKind};

async fn insert_order(tx: &mut FakeTx) -> Result<u64, Error> {
    tx.execute("INSERT INTO orders").await?;
    Ok(tx.id())
}

async fn insert_line(tx: &mut FakeTx) -> Result<(), Error> {
    tx.execute("INSERT INTO order_lines").await
}

#[tokio::test]
async fn success_commits_exactly_once() {
    let source = FakeSource::new();
    let manager = TransactionManager::new(source.clone());

    let value = manager
        .with_transaction(|tx| {
            async move {
                tx.execute("UPDATE stock").await?;
                Ok::<_, Error>(42)
            }
            .boxed()
        })
        .await
        .unwrap();

    assert_eq!(value, 42);
    assert_eq!(source.names(), ["begin", "exec", "commit"]);
}

#[tokio::test]
async fn error_rolls_back_and_is_returned_unchanged() {
    let source = FakeSource::new();
    let manager = TransactionManager::new(source.clone());

    let err = manager
        .with_transaction(|tx| {
            async move {
                tx.execute("UPDATE stock").await?;
                Err::<(), _>(Error::business_rule("insufficient stock"))
            }
            .boxed()
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::BusinessRule);
    assert_eq!(err.to_string(), "insufficient stock");
    assert!(err.rollback_error().is_none());
    assert_eq!(source.names(), ["begin", "exec", "rollback"]);
}

#[tokio::test]
async fn failed_rollback_reports_both_errors() {
    let source = FakeSource::new();
    source.fail_rollback.store(true, Ordering::SeqCst);
    let manager = TransactionManager::new(source.clone());

    let err = manager
        .with_transaction(|_tx| async { Err::<(), _>(Error::not_found("order not found")) }.boxed())
        .await
        .unwrap_err();

    // The original kind survives, so the client still sees a 404.
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let message = err.to_string();
    assert!(message.contains("order not found"), "{message}");
    assert!(message.contains("connection lost during rollback"), "{message}");
    assert!(err.rollback_error().is_some());

    let response = classify(&err);
    assert_eq!(response.status.as_u16(), 404);
    assert!(!response.message.contains("rollback"));
}

#[tokio::test]
async fn commit_failure_is_infrastructure() {
    let source = FakeSource::new();
    source.fail_commit.store(true, Ordering::SeqCst);
    let manager = TransactionManager::new(source.clone());

    let err = manager
        .with_transaction(|_tx| async { Ok(1) }.boxed())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Infrastructure);
    assert!(err.to_string().contains("failed to commit transaction"));
    assert_eq!(classify(&err).status.as_u16(), 500);
}

#[tokio::test]
async fn begin_failure_never_runs_work() {
    let source = FakeSource::new();
    source.fail_begin.store(true, Ordering::SeqCst);
    let manager = TransactionManager::new(source.clone());

    let ran = Arc::new(AtomicBool::new(false));
    let flag = ran.clone();
    let err = manager
        .with_transaction(move |_tx| {
            async move {
                flag.store(true, Ordering::SeqCst);
                Ok::<_, Error>(())
            }
            .boxed()
        })
        .await
        .unwrap_err();

    assert!(!ran.load(Ordering::SeqCst));

    assert_eq!(err.kind(), ErrorKind::Infrastructure);
    assert!(err.to_string().contains("failed to begin transaction"));
    assert!(source.ops().is_empty());
}

#[tokio::test]
async fn panic_rolls_back_and_propagates() {
    let source = FakeSource::new();
    let manager = TransactionManager::new(source.clone());

    let task = tokio::spawn(async move {
        manager
            .with_transaction(|tx| {
                async move {
                    tx.execute("UPDATE stock").await?;
                    if tx.id() == 0 {
                        panic!("unit of work exploded");
                    }
                    Ok::<_, Error>(())
                }
                .boxed()
            })
            .await
    });

    let joined = task.await.unwrap_err();
    assert!(joined.is_panic());
    assert_eq!(source.names(), ["begin", "exec", "rollback"]);
}

#[tokio::test]
async fn nested_helpers_share_the_transaction() {
    let source = FakeSource::new();
    let manager = TransactionManager::new(source.clone());

    let id = manager
        .with_transaction(|tx| {
            async move {
                let id = insert_order(tx).await?;
                insert_line(tx).await?;
                insert_line(tx).await?;
                Ok::<_, Error>(id)
            }
            .boxed()
        })
        .await
        .unwrap();

    assert_eq!(
        source.ops(),
        vec![
            Op::Begin(id),
            Op::Exec(id, "INSERT INTO orders".into()),
            Op::Exec(id, "INSERT INTO order_lines".into()),
            Op::Exec(id, "INSERT INTO order_lines".into()),
            Op::Commit(id),
        ]
    );
}

#[tokio::test]
async fn concurrent_calls_get_independent_transactions() {
    let source = FakeSource::new();
    let manager = TransactionManager::new(source.clone());

    let (a, b) = tokio::join!(
        manager.with_transaction(|tx| insert_order(tx).boxed()),
        manager.with_transaction(|tx| insert_order(tx).boxed()),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a, b);

    let ops = source.ops();
    assert!(ops.contains(&Op::Commit(a)));
    assert!(ops.contains(&Op::Commit(b)));
    assert_eq!(ops.len(), 6);
}

#[tokio::test]
async fn cancelled_unit_of_work_abandons_the_transaction() {
    let source = FakeSource::new();
    let manager = TransactionManager::new(source.clone());

    let result = tokio::time::timeout(
        Duration::from_millis(50),
        manager.with_transaction(|_tx| {
            async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<_, Error>(())
            }
            .boxed()
        }),
    )
    .await;

    assert!(result.is_err());
    assert_eq!(source.names(), ["begin", "abandon"]);
}
