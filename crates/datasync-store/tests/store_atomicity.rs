//! Cross-thread atomicity: a reader must never observe a torn image.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use datasync_store::{DurableStore, FsStore, MemoryStore};

fn hammer(store: Arc<dyn DurableStore>) {
    let image_a = vec![0xAA_u8; 32 * 1024];
    let image_b = vec![0xBB_u8; 64 * 1024];
    store.save("hammer.db", &image_a).expect("seed save");

    let stop = Arc::new(AtomicBool::new(false));

    let writer = {
        let store = Arc::clone(&store);
        let stop = Arc::clone(&stop);
        let (image_a, image_b) = (image_a.clone(), image_b.clone());
        thread::spawn(move || {
            let mut flip = false;
            while !stop.load(Ordering::Relaxed) {
                let img = if flip { &image_a } else { &image_b };
                store.save("hammer.db", img).expect("save");
                flip = !flip;
            }
        })
    };

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let store = Arc::clone(&store);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut observed = 0_u32;
                while !stop.load(Ordering::Relaxed) {
                    let bytes = store
                        .load("hammer.db")
                        .expect("load")
                        .expect("record exists");
                    let full_a = bytes.len() == 32 * 1024 && bytes.iter().all(|&b| b == 0xAA);
                    let full_b = bytes.len() == 64 * 1024 && bytes.iter().all(|&b| b == 0xBB);
                    assert!(full_a || full_b, "torn image: {} bytes", bytes.len());
                    observed += 1;
                }
                observed
            })
        })
        .collect();

    thread::sleep(std::time::Duration::from_millis(300));
    stop.store(true, Ordering::Relaxed);
    writer.join().expect("writer");
    for r in readers {
        let observed = r.join().expect("reader");
        assert!(observed > 0, "reader made no observations");
    }
}

#[test]
fn memory_store_saves_are_atomic() {
    hammer(Arc::new(MemoryStore::new()));
}

#[test]
fn fs_store_saves_are_atomic() {
    let dir = tempfile::tempdir().expect("tempdir");
    hammer(Arc::new(FsStore::new(dir.path()).expect("store")));
}
