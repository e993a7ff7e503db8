use std::sync::Arc;

use battleship_server::SessionPool;

#[test]
fn test_claim_until_full() {
    let pool = SessionPool::new(2);
    let a = pool.claim_slot().unwrap();
    let b = pool.claim_slot().unwrap();
    assert_ne!(a, b);
    assert_eq!(pool.claim_slot(), None);
    assert_eq!(pool.active_count(), 2);

    pool.release_slot(a);
    assert!(!pool.is_active(a));
    assert_eq!(pool.claim_slot(), Some(a));
}

#[test]
fn test_release_is_idempotent() {
    let pool = SessionPool::new(1);
    let id = pool.claim_slot().unwrap();
    pool.release_slot(id);
    pool.release_slot(id);
    assert_eq!(pool.active_count(), 0);
    assert_eq!(pool.capacity(), 1);
}

#[test]
fn test_lease_releases_on_drop() {
    let pool = Arc::new(SessionPool::new(1));
    {
        let lease = pool.lease().unwrap();
        assert!(pool.is_active(lease.id()));
        assert!(pool.lease().is_none());
    }
    assert_eq!(pool.active_count(), 0);

    let lease = pool.lease().unwrap();
    let id = lease.id();
    lease.release();
    assert!(!pool.is_active(id));
}

#[test]
fn test_concurrent_claims_never_exceed_capacity() {
    let pool = Arc::new(SessionPool::new(4));
    let handles: Vec<_> = (0..16)
        .map(|_| {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || pool.claim_slot())
        })
        .collect();
    let mut claimed: Vec<_> = handles
        .into_iter()
        .filter_map(|h| h.join().unwrap())
        .collect();
    assert_eq!(claimed.len(), 4);
    claimed.sort();
    claimed.dedup();
    assert_eq!(claimed.len(), 4);
    assert_eq!(pool.active_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_claim_time_follows_the_runtime_clock() {
    let pool = SessionPool::new(1);
    let id = pool.claim_slot().unwrap();

    tokio::time::advance(std::time::Duration::from_secs(90)).await;
    let held = pool.claimed_at(id).map(|at| at.elapsed());
    assert_eq!(held, Some(std::time::Duration::from_secs(90)));

    pool.release_slot(id);
    assert_eq!(pool.claimed_at(id), None);
}
