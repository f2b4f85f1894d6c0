use cpstore_core::db::open_db_in_memory;
use cpstore_core::model::document::LOCKS_CONTAINER;
use cpstore_core::{Database, DbClient, DocumentDbClient, LockClient, SqliteDatabase};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn setup(lock_ttl: Duration) -> DocumentDbClient {
    let db = SqliteDatabase::new(open_db_in_memory().unwrap());
    DocumentDbClient::new(Arc::new(db), lock_ttl).unwrap()
}

fn locks(client: &DocumentDbClient) -> &LockClient {
    client.lock_client().unwrap()
}

#[test]
fn lock_is_exclusive_until_released() {
    let client = setup(Duration::from_secs(30));
    let locks = locks(&client);

    let held = locks.try_acquire("Cluster-Reconciler").unwrap().unwrap();
    assert_eq!(held.name(), "cluster-reconciler");
    assert!(locks.try_acquire("cluster-reconciler").unwrap().is_none());

    locks.release(held).unwrap();
    let again = locks.try_acquire("cluster-reconciler").unwrap();
    assert!(again.is_some());
}

#[test]
fn renew_keeps_ownership_and_stale_holder_is_rejected() {
    let client = setup(Duration::from_secs(30));
    let locks = locks(&client);

    let mut held = locks.try_acquire("renewing").unwrap().unwrap();
    let stale = held.clone();
    assert!(locks.renew(&mut held).unwrap());

    // The pre-renewal copy no longer matches the stored version.
    let mut stale_copy = stale.clone();
    assert!(!locks.renew(&mut stale_copy).unwrap());
    locks.release(stale).unwrap();
    assert!(locks.try_acquire("renewing").unwrap().is_none());

    locks.release(held).unwrap();
    assert!(locks.try_acquire("renewing").unwrap().is_some());
}

#[test]
fn expired_lock_can_be_taken_over() {
    let client = setup(Duration::from_secs(1));
    let locks = locks(&client);

    let mut first = locks.try_acquire("expiring").unwrap().unwrap();
    thread::sleep(Duration::from_millis(1_200));

    let second = locks.try_acquire("expiring").unwrap().unwrap();
    assert_ne!(second.owner(), first.owner());
    assert!(!locks.renew(&mut first).unwrap());
    // Releasing a lost lock leaves the new holder alone.
    locks.release(first).unwrap();
    assert!(locks.try_acquire("expiring").unwrap().is_none());
}

#[test]
fn acquire_gives_up_after_timeout() {
    let client = setup(Duration::from_secs(30));
    let locks = locks(&client);
    let _held = locks.try_acquire("busy").unwrap().unwrap();

    let started = Instant::now();
    let waited = locks
        .acquire("busy", Duration::from_millis(300))
        .unwrap();
    assert!(waited.is_none());
    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[test]
fn acquire_waits_for_release() {
    let client = Arc::new(setup(Duration::from_secs(30)));
    let held = locks(&client).try_acquire("handoff").unwrap().unwrap();

    let releaser = {
        let client = Arc::clone(&client);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            locks(&client).release(held).unwrap();
        })
    };

    let acquired = locks(&client)
        .acquire("handoff", Duration::from_secs(5))
        .unwrap();
    releaser.join().unwrap();
    assert!(acquired.is_some());
}

#[test]
fn fast_polling_client_picks_up_released_lock() {
    let db = SqliteDatabase::new(open_db_in_memory().unwrap());
    let ttl = Duration::from_secs(30);
    let holder = LockClient::new(db.container(LOCKS_CONTAINER).unwrap(), ttl);
    let waiter = LockClient::new(db.container(LOCKS_CONTAINER).unwrap(), ttl)
        .with_poll_interval(Duration::from_millis(20));

    let held = holder.try_acquire("poller").unwrap().unwrap();
    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        holder.release(held).unwrap();
    });

    let started = Instant::now();
    let acquired = waiter
        .acquire("poller", Duration::from_secs(5))
        .unwrap();
    releaser.join().unwrap();
    assert!(acquired.is_some());
    // Well under one default 250ms poll.
    assert!(started.elapsed() < Duration::from_millis(200));
}
