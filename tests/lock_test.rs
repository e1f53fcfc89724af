use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use triplegate::ReentrantReadExclusiveWriteLock;

#[test]
fn test_nested_reads_release_fully() {
    for depth in [1usize, 2, 5, 16] {
        let lock = Arc::new(ReentrantReadExclusiveWriteLock::new());
        for _ in 0..depth {
            lock.lock_for_read();
        }
        assert_eq!(lock.read_depth(), depth);
        for _ in 0..depth {
            lock.unlock();
        }
        assert!(!lock.is_locked());

        // another thread reads without waiting
        let other = Arc::clone(&lock);
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            other.lock_for_read();
            tx.send(()).unwrap();
            other.unlock();
        });
        rx.recv_timeout(Duration::from_secs(2))
            .expect("second thread read without blocking");
    }
}

#[test]
fn test_under_released_read_still_blocks_other_threads() {
    let lock = Arc::new(ReentrantReadExclusiveWriteLock::new());
    lock.lock_for_read();
    lock.lock_for_read();
    lock.unlock();

    let other = Arc::clone(&lock);
    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        other.lock_for_read();
        tx.send(()).unwrap();
        other.unlock();
    });
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    lock.unlock();
    rx.recv_timeout(Duration::from_secs(2)).expect("released after last unlock");
    handle.join().unwrap();
}

fn writer_excludes(second_wants_write: bool) {
    let lock = Arc::new(ReentrantReadExclusiveWriteLock::new());
    lock.lock_for_write();

    let other = Arc::clone(&lock);
    let handle = thread::spawn(move || {
        if second_wants_write {
            other.lock_for_write();
        } else {
            other.lock_for_read();
        }
        let acquired = Instant::now();
        other.unlock();
        acquired
    });

    thread::sleep(Duration::from_millis(50));
    let released = Instant::now();
    lock.unlock();
    let acquired = handle.join().unwrap();
    assert!(acquired >= released);
}

#[test]
fn test_writer_excludes_reader() {
    writer_excludes(false);
}

#[test]
fn test_writer_excludes_writer() {
    writer_excludes(true);
}

#[test]
fn test_reader_waits_for_writer_holding_100ms() {
    let lock = Arc::new(ReentrantReadExclusiveWriteLock::new());
    let (locked_tx, locked_rx) = mpsc::channel();

    let writer_lock = Arc::clone(&lock);
    let writer = thread::spawn(move || {
        writer_lock.lock_for_write();
        let start = Instant::now();
        locked_tx.send(start).unwrap();
        thread::sleep(Duration::from_millis(100));
        writer_lock.unlock();
    });

    let write_acquired = locked_rx.recv().unwrap();
    thread::sleep(Duration::from_millis(10));
    lock.lock_for_read();
    let waited = write_acquired.elapsed();
    lock.unlock();
    writer.join().unwrap();

    assert!(waited >= Duration::from_millis(100), "reader got in after {:?}", waited);
}

#[test]
fn test_unlock_from_another_thread() {
    let lock = Arc::new(ReentrantReadExclusiveWriteLock::new());
    lock.lock_for_read();
    let other = Arc::clone(&lock);
    thread::spawn(move || other.unlock()).join().unwrap();
    assert!(!lock.is_locked());
    let _w = lock.write();
    assert!(lock.is_write_locked());
}
