use super::*;

fn open_block(data: &[u8]) -> Arc<Block<'_>> {
    Arc::new(Block::new(BlockContents::Borrowed(data)).unwrap())
}

#[test]
fn round_trip_for_every_restart_interval() {
    let entries = sample_entries(200);
    for interval in [1, 2, 3, 16, 199, 500] {
        let data = build_block(&entries, interval);
        let block = open_block(&data);
        assert_eq!(
            block.num_restarts() as usize,
            (entries.len() + interval - 1) / interval,
            "interval {}",
            interval
        );

        let mut it = block.iter(bytewise());
        assert_eq!(collect_forward(&mut it), entries, "interval {}", interval);
        assert!(it.status().is_ok());
    }
}

#[test]
fn backward_iteration_crosses_restart_points() {
    let entries = sample_entries(50);
    for interval in [1, 4, 16] {
        let data = build_block(&entries, interval);
        let block = open_block(&data);
        let mut it = block.iter(bytewise());

        let mut expected = entries.clone();
        expected.reverse();
        assert_eq!(collect_backward(&mut it), expected, "interval {}", interval);
    }
}

#[test]
fn next_and_prev_interleave() {
    let entries = sample_entries(10);
    let data = build_block(&entries, 3);
    let block = open_block(&data);
    let mut it = block.iter(bytewise());

    it.seek(b"key00004");
    assert_eq!(it.key(), b"key00004");
    it.next();
    assert_eq!(it.key(), b"key00005");
    it.prev();
    it.prev();
    assert_eq!(it.key(), b"key00003");
    assert_eq!(it.value(), b"value3");

    it.seek_to_first();
    it.prev();
    assert!(!it.valid());
    assert!(it.status().is_ok());
}

#[test]
fn seek_lands_on_first_key_at_or_after_target() {
    let entries = sample_entries(100);
    let data = build_block(&entries, 16);
    let block = open_block(&data);
    let mut it = block.iter(bytewise());

    for (k, v) in &entries {
        it.seek(k);
        assert!(it.valid());
        assert_eq!(it.key(), k.as_slice());
        assert_eq!(it.value(), v.as_slice());
    }

    // Between two keys.
    it.seek(b"key00010a");
    assert_eq!(it.key(), b"key00011");

    // Before the first key.
    it.seek(b"a");
    assert_eq!(it.key(), b"key00000");
    it.seek(b"");
    assert_eq!(it.key(), b"key00000");

    // After the last key.
    it.seek(b"key00099\x00");
    assert!(!it.valid());
    it.seek(b"zzz");
    assert!(!it.valid());
    assert!(it.status().is_ok());
}

#[test]
fn seek_agrees_with_linear_scan() {
    let entries = sample_entries(64);
    let data = build_block(&entries, 5);
    let block = open_block(&data);

    let targets: Vec<Vec<u8>> = vec![
        b"key00000".to_vec(),
        b"key00007x".to_vec(),
        b"key00033".to_vec(),
        b"key0004".to_vec(),
        b"key00063".to_vec(),
        b"key1".to_vec(),
    ];

    // One long-lived iterator so later seeks start from an earlier position,
    // both ahead of and behind the target.
    let mut seeker = block.iter(bytewise());
    for target in targets.iter().chain(targets.iter().rev()) {
        let mut scan = block.iter(bytewise());
        scan.seek_to_first();
        while scan.valid() && scan.key() < target.as_slice() {
            scan.next();
        }

        seeker.seek(target);
        assert_eq!(seeker.valid(), scan.valid(), "target {:?}", target);
        if scan.valid() {
            assert_eq!(seeker.key(), scan.key(), "target {:?}", target);
            assert_eq!(seeker.value(), scan.value());
        }
    }
}

#[test]
fn shared_prefixes_are_reconstructed() {
    let entries: Vec<(Vec<u8>, Vec<u8>)> = vec![
        (b"".to_vec(), b"empty key".to_vec()),
        (b"a".to_vec(), b"".to_vec()),
        (b"aaaa".to_vec(), b"4".to_vec()),
        (b"aaaab".to_vec(), b"5".to_vec()),
        (b"ab".to_vec(), vec![0u8; 300]),
        (vec![b'b'; 200], b"long key".to_vec()),
        (vec![0xff, 0x00, 0xff], b"binary".to_vec()),
    ];
    let data = build_block(&entries, 3);
    let block = open_block(&data);
    let mut it = block.iter(bytewise());
    assert_eq!(collect_forward(&mut it), entries);
}

#[test]
fn empty_block_iterates_as_empty() {
    let data = build_block(&[], 16);
    assert_eq!(data.len(), 8, "single restart + count");

    let block = open_block(&data);
    assert_eq!(block.num_restarts(), 1);

    let mut it = block.iter(bytewise());
    it.seek_to_first();
    assert!(!it.valid());
    it.seek_to_last();
    assert!(!it.valid());
    it.seek(b"anything");
    assert!(!it.valid());
    assert!(it.status().is_ok());
}

#[test]
fn zero_restarts_iterates_as_empty() {
    let data = [0u8; 4];
    let block = open_block(&data);
    assert_eq!(block.num_restarts(), 0);

    let mut it = block.iter(bytewise());
    it.seek_to_first();
    assert!(!it.valid());
    it.seek(b"k");
    assert!(!it.valid());
    assert!(it.status().is_ok());
}

#[test]
fn block_shorter_than_restart_count_is_corruption() {
    let err = Block::new(BlockContents::Borrowed(&[0, 0, 0])).unwrap_err();
    assert!(err.is_corruption(), "{}", err);
}

#[test]
fn restart_count_larger_than_block_is_corruption() {
    let mut data = vec![0u8; 4];
    data.extend_from_slice(&0xffffu32.to_le_bytes());
    let err = Block::new(BlockContents::Owned(data)).unwrap_err();
    assert!(err.is_corruption(), "{}", err);
}

#[test]
fn corrupt_entry_length_sets_status() {
    let entries = vec![(b"abc".to_vec(), b"xyz".to_vec())];
    let mut data = build_block(&entries, 16);
    // [shared=0][non_shared=3][value_len=3]abcxyz[restart 0][count 1]
    assert_eq!(&data[..3], &[0, 3, 3]);
    data[1] = 100;

    let block = open_block(&data);
    let mut it = block.iter(bytewise());
    it.seek_to_first();
    assert!(!it.valid());
    let err = it.status().unwrap_err();
    assert!(err.is_corruption());

    // The status is sticky across repositioning.
    it.seek(b"abc");
    assert!(!it.valid());
    assert!(it.status().is_err());
}

#[test]
fn restart_offset_past_entries_is_corruption() {
    let mut data = build_block(&sample_entries(3), 16);
    // [entries][restart 0][count 1]
    let restart_pos = data.len() - 8;
    data[restart_pos..restart_pos + 4].copy_from_slice(&0xffffu32.to_le_bytes());

    let block = open_block(&data);
    let mut it = block.iter(bytewise());

    it.seek_to_first();
    assert!(!it.valid());
    assert!(it.status().unwrap_err().is_corruption());

    let mut it = block.iter(bytewise());
    it.seek_to_last();
    assert!(!it.valid());
    assert!(it.status().unwrap_err().is_corruption());

    let mut it = block.iter(bytewise());
    it.seek(b"key00001");
    assert!(!it.valid());
    assert!(it.status().unwrap_err().is_corruption());
}

#[test]
fn restart_offset_at_restart_array_is_corruption() {
    let mut data = build_block(&sample_entries(3), 16);
    let restart_pos = data.len() - 8;
    data[restart_pos..restart_pos + 4].copy_from_slice(&(restart_pos as u32).to_le_bytes());

    let block = open_block(&data);
    let mut it = block.iter(bytewise());
    it.seek_to_first();
    assert!(!it.valid());
    assert!(it.status().unwrap_err().is_corruption());
}

#[test]
fn shared_longer_than_previous_key_is_corruption() {
    let entries = vec![(b"abc".to_vec(), b"xyz".to_vec())];
    let mut data = build_block(&entries, 16);
    data[0] = 2;

    let block = open_block(&data);
    let mut it = block.iter(bytewise());
    it.seek_to_first();
    assert!(!it.valid());
    assert!(it.status().unwrap_err().is_corruption());
}

#[test]
fn owned_and_borrowed_contents_read_the_same() {
    let entries = sample_entries(20);
    let data = build_block(&entries, 4);

    let borrowed = open_block(&data);
    let owned = Arc::new(Block::new(BlockContents::from(data.clone())).unwrap());
    assert!(owned.contents().is_owned());
    assert!(!borrowed.contents().is_owned());
    assert_eq!(owned.size(), borrowed.size());

    let mut a = borrowed.iter(bytewise());
    let mut b = owned.iter(bytewise());
    assert_eq!(collect_forward(&mut a), collect_forward(&mut b));
}

#[test]
fn iterators_share_one_block() {
    let entries = sample_entries(30);
    let data = build_block(&entries, 4);
    let block = open_block(&data);

    let mut first = block.iter(bytewise());
    let mut second = block.iter(bytewise());
    first.seek_to_first();
    second.seek_to_last();
    assert_eq!(first.key(), b"key00000");
    assert_eq!(second.key(), b"key00029");
    assert_eq!(Arc::strong_count(&block), 3);

    drop(first);
    drop(second);
    assert_eq!(Arc::strong_count(&block), 1);
}

#[test]
fn builder_reset_produces_independent_blocks() {
    let mut builder = BlockBuilder::new(2, bytewise());
    builder.add(b"x", b"1");
    builder.add(b"y", b"2");
    let first = builder.finish().to_vec();

    builder.reset();
    assert!(builder.is_empty());
    builder.add(b"a", b"3");
    assert_eq!(builder.last_key(), b"a");
    let estimate = builder.current_size_estimate();
    let second = builder.finish().to_vec();
    assert_eq!(second.len(), estimate);

    let block = open_block(&first);
    let mut it = block.iter(bytewise());
    assert_eq!(
        collect_forward(&mut it),
        vec![
            (b"x".to_vec(), b"1".to_vec()),
            (b"y".to_vec(), b"2".to_vec())
        ]
    );

    let block = open_block(&second);
    let mut it = block.iter(bytewise());
    assert_eq!(collect_forward(&mut it), vec![(b"a".to_vec(), b"3".to_vec())]);
}
