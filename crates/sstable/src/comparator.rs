use std::cmp::Ordering;

/// A total order over keys.
///
/// The table format never interprets keys itself; every ordering decision in
/// blocks, the index and the two-level iterator goes through a comparator.
/// The comparator used to read a table must be the one it was written with.
pub trait Comparator: Send + Sync {
    /// Name of the ordering. Used to catch mismatched comparators.
    fn name(&self) -> &'static str;

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    /// If `start < limit`, may shorten `start` to any key in `[start, limit)`.
    ///
    /// Used to keep index block keys small. Leaving `start` untouched is a
    /// correct implementation.
    fn find_shortest_separator(&self, start: &mut Vec<u8>, limit: &[u8]);

    /// May change `key` to any key `>= key`.
    fn find_short_successor(&self, key: &mut Vec<u8>);
}

/// Lexicographic byte-wise ordering.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytewiseComparator;

impl Comparator for BytewiseComparator {
    fn name(&self) -> &'static str {
        "riptide.BytewiseComparator"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    fn find_shortest_separator(&self, start: &mut Vec<u8>, limit: &[u8]) {
        let min_length = start.len().min(limit.len());
        let diff_index = start
            .iter()
            .zip(limit.iter())
            .take_while(|(a, b)| a == b)
            .count();

        if diff_index >= min_length {
            // One key is a prefix of the other.
            return;
        }

        let diff_byte = start[diff_index];
        if diff_byte < 0xff && diff_byte + 1 < limit[diff_index] {
            start[diff_index] += 1;
            start.truncate(diff_index + 1);
            debug_assert_eq!(self.compare(start, limit), Ordering::Less);
        }
    }

    fn find_short_successor(&self, key: &mut Vec<u8>) {
        // Bump the first byte that can be bumped and drop the rest.
        if let Some(i) = key.iter().position(|&b| b != 0xff) {
            key[i] += 1;
            key.truncate(i + 1);
        }
        // All 0xff: leave as is.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separator(start: &[u8], limit: &[u8]) -> Vec<u8> {
        let mut s = start.to_vec();
        BytewiseComparator.find_shortest_separator(&mut s, limit);
        s
    }

    fn successor(key: &[u8]) -> Vec<u8> {
        let mut k = key.to_vec();
        BytewiseComparator.find_short_successor(&mut k);
        k
    }

    #[test]
    fn compare_is_lexicographic() {
        let c = BytewiseComparator;
        assert_eq!(c.compare(b"a", b"b"), Ordering::Less);
        assert_eq!(c.compare(b"ab", b"a"), Ordering::Greater);
        assert_eq!(c.compare(b"", b""), Ordering::Equal);
        assert_eq!(c.compare(&[0xff], &[0x00, 0x01]), Ordering::Greater);
    }

    #[test]
    fn separator_shortens_when_room() {
        assert_eq!(separator(b"abcdef", b"abzzzz"), b"abd".to_vec());
        assert_eq!(separator(b"helloworld", b"hellozoomer"), b"hellox".to_vec());
    }

    #[test]
    fn separator_keeps_adjacent_bytes() {
        // 'c' + 1 == 'd', no room in between.
        assert_eq!(separator(b"abc1", b"abd"), b"abc1".to_vec());
    }

    #[test]
    fn separator_keeps_prefix_keys() {
        assert_eq!(separator(b"foo", b"foobar"), b"foo".to_vec());
        assert_eq!(separator(b"foobar", b"foo"), b"foobar".to_vec());
    }

    #[test]
    fn successor_bumps_first_byte() {
        assert_eq!(successor(b"abc"), b"b".to_vec());
        assert_eq!(successor(&[0xff, 0xff, 0x10, 0x20]), vec![0xff, 0xff, 0x11]);
        assert_eq!(successor(&[0xff, 0xff]), vec![0xff, 0xff]);
        assert_eq!(successor(b""), Vec::<u8>::new());
    }
}
