use super::*;

fn pool(max_retained: usize) -> PixelBufferPool {
    PixelBufferPool::new(
        FrameSize::new(8, 4).unwrap(),
        PixelFormat::Rgba,
        PoolOpts { max_retained },
    )
    .unwrap()
}

#[test]
fn acquire_allocates_then_reuses() {
    let p = pool(4);
    let a = p.acquire();
    assert_eq!(a.size(), FrameSize::new(8, 4).unwrap());
    assert_eq!(a.data().len(), 8 * 4 * 4);
    drop(a);

    let _b = p.acquire();
    let st = p.stats();
    assert_eq!(st.allocations, 1);
    assert_eq!(st.reuses, 1);
    assert_eq!(st.outstanding, 1);
    assert_eq!(st.retained, 0);
}

#[test]
fn pool_honors_retention_cap() {
    let p = pool(1);
    let a = p.acquire();
    let b = p.acquire();
    drop(a);
    drop(b);

    let st = p.stats();
    assert_eq!(st.retained, 1);
    assert_eq!(st.outstanding, 0);
    assert_eq!(st.dropped_on_release, 1);
}

#[test]
fn buffers_return_from_other_threads() {
    let p = pool(2);
    let a = p.acquire();
    std::thread::spawn(move || drop(a)).join().unwrap();
    assert_eq!(p.stats().retained, 1);
}

#[test]
fn buffer_outliving_pool_is_freed_quietly() {
    let p = pool(2);
    let a = p.acquire();
    drop(p);
    drop(a);
}

#[test]
fn rejects_zero_sized_pool() {
    assert!(
        PixelBufferPool::new(
            FrameSize {
                width: 0,
                height: 4
            },
            PixelFormat::Rgba,
            PoolOpts::default(),
        )
        .is_err()
    );
}
