use crate::alloc::{slab_size_for, FreeList, FreeSlot};
use crate::{SLAB_LARGE, SLAB_SMALL, SLAB_TINY, SLOT_HEADER_SIZE};

// --------------------- size classes ---------------------

#[test]
fn small_payloads_use_the_tiny_class() {
    assert_eq!(slab_size_for(0), SLAB_TINY);
    assert_eq!(slab_size_for(128), SLAB_TINY);
    // 1008 + 16 == 1024 exactly still fits.
    assert_eq!(slab_size_for(1008), SLAB_TINY);
}

#[test]
fn class_boundaries() {
    assert_eq!(slab_size_for(1009), SLAB_SMALL);
    assert_eq!(slab_size_for(8176), SLAB_SMALL);
    assert_eq!(slab_size_for(8177), SLAB_LARGE);
    assert_eq!(slab_size_for(65520), SLAB_LARGE);
}

#[test]
fn oversized_payloads_round_to_4k_multiples() {
    // 65521 + 16 = 65537 -> 17 pages.
    assert_eq!(slab_size_for(65521), 17 * 4096);
    assert_eq!(slab_size_for(100_000), 25 * 4096);
}

#[test]
fn every_class_respects_slab_discipline() {
    for len in [0usize, 1, 100, 1008, 1009, 8000, 9000, 65000, 70000, 1_000_000] {
        let slab = slab_size_for(len);
        assert!(
            len + SLOT_HEADER_SIZE as usize <= slab as usize,
            "payload {} does not fit slab {}",
            len,
            slab
        );
    }
}

// --------------------- free list ---------------------

#[test]
fn empty_list_appends_at_end() {
    let mut free = FreeList::new();
    let a = free.allocate(1024, 64);
    assert_eq!(a.offset, 64);
    assert_eq!(a.slab_size, 1024);
    assert!(!a.reused);
}

#[test]
fn first_fit_returns_the_original_slab_size() {
    let mut free = FreeList::new();
    free.push(FreeSlot {
        offset: 64,
        slab_size: 8192,
    });

    // A 1 KiB request takes the 8 KiB slot whole — no splitting.
    let a = free.allocate(1024, 10_000);
    assert!(a.reused);
    assert_eq!(a.offset, 64);
    assert_eq!(a.slab_size, 8192);
    assert!(free.is_empty());
}

#[test]
fn too_small_free_slots_are_skipped() {
    let mut free = FreeList::new();
    free.push(FreeSlot {
        offset: 64,
        slab_size: 1024,
    });

    let a = free.allocate(8192, 5000);
    assert!(!a.reused);
    assert_eq!(a.offset, 5000);
    assert_eq!(free.len(), 1);
}

#[test]
fn first_fit_takes_the_first_big_enough_entry() {
    let mut free = FreeList::new();
    free.push(FreeSlot {
        offset: 64,
        slab_size: 1024,
    });
    free.push(FreeSlot {
        offset: 1088,
        slab_size: 65536,
    });
    free.push(FreeSlot {
        offset: 66624,
        slab_size: 8192,
    });

    let a = free.allocate(8192, 100_000);
    assert!(a.reused);
    // The 64 KiB entry comes before the exact-fit 8 KiB one.
    assert_eq!(a.offset, 1088);
    assert_eq!(a.slab_size, 65536);
    assert_eq!(free.len(), 2);
}

#[test]
fn clear_drops_everything() {
    let mut free = FreeList::new();
    free.push(FreeSlot {
        offset: 64,
        slab_size: 1024,
    });
    assert_eq!(free.total_bytes(), 1024);

    free.clear();
    assert!(free.is_empty());
    assert_eq!(free.total_bytes(), 0);
}
