use core::cmp::Ordering;
use std::slice::{ChunksExact, ChunksExactMut};

/// Ranges shorter than this are insertion sorted.
const INSERTION_SORT_LEN: usize = 7;

/// A growable, flat array of fixed-length `i32` records.
///
/// All of the elevation query and reply queues are `RecordArray`s. Records are stored back-to-back in a single `Vec`, so
/// pushing and popping never allocate per record, and sorting swaps records in place using an external comparator.
///
/// ```
/// use globe_terrain_storage::RecordArray;
///
/// let mut queue = RecordArray::new(2);
/// queue.push(&[3, 30]);
/// queue.push(&[1, 10]);
/// queue.push(&[2, 20]);
/// queue.sort_by(|a, b| a[0].cmp(&b[0]));
///
/// assert_eq!(queue.get(0), &[1, 10]);
/// assert_eq!(queue.get(2), &[3, 30]);
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RecordArray {
    record_len: usize,
    data: Vec<i32>,
}

impl RecordArray {
    pub fn new(record_len: usize) -> Self {
        Self::with_capacity(record_len, 0)
    }

    pub fn with_capacity(record_len: usize, num_records: usize) -> Self {
        assert!(record_len > 0);

        Self {
            record_len,
            data: Vec::with_capacity(record_len * num_records),
        }
    }

    #[inline]
    pub fn record_len(&self) -> usize {
        self.record_len
    }

    /// The number of records.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() / self.record_len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Makes room for at least `additional` more records.
    pub fn reserve(&mut self, additional: usize) {
        self.data.reserve(additional * self.record_len);
    }

    #[inline]
    pub fn push(&mut self, record: &[i32]) {
        assert_eq!(record.len(), self.record_len);
        self.data.extend_from_slice(record);
    }

    /// Appends every record of `other` in the range `[from, to)`.
    pub fn extend_from_range(&mut self, other: &RecordArray, from: usize, to: usize) {
        assert_eq!(other.record_len, self.record_len);
        self.data
            .extend_from_slice(&other.data[from * other.record_len..to * other.record_len]);
    }

    #[inline]
    pub fn get(&self, i: usize) -> &[i32] {
        &self.data[i * self.record_len..(i + 1) * self.record_len]
    }

    #[inline]
    pub fn get_mut(&mut self, i: usize) -> &mut [i32] {
        &mut self.data[i * self.record_len..(i + 1) * self.record_len]
    }

    #[inline]
    pub fn field(&self, i: usize, field: usize) -> i32 {
        debug_assert!(field < self.record_len);
        self.data[i * self.record_len + field]
    }

    #[inline]
    pub fn set_field(&mut self, i: usize, field: usize, value: i32) {
        debug_assert!(field < self.record_len);
        self.data[i * self.record_len + field] = value;
    }

    /// Copies the last record into `out` and removes it. Returns `false` if the array is empty.
    pub fn pop_into(&mut self, out: &mut [i32]) -> bool {
        if self.is_empty() {
            return false;
        }
        let start = self.data.len() - self.record_len;
        out.copy_from_slice(&self.data[start..]);
        self.data.truncate(start);

        true
    }

    /// Removes record `i`, shifting all following records down.
    pub fn remove(&mut self, i: usize) {
        self.data
            .drain(i * self.record_len..(i + 1) * self.record_len);
    }

    /// Keeps only the first `len` records.
    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len * self.record_len);
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn iter(&self) -> ChunksExact<'_, i32> {
        self.data.chunks_exact(self.record_len)
    }

    pub fn iter_mut(&mut self) -> ChunksExactMut<'_, i32> {
        self.data.chunks_exact_mut(self.record_len)
    }

    /// Keeps only the records for which `f` returns `true`, preserving their order.
    pub fn retain(&mut self, mut f: impl FnMut(&[i32]) -> bool) {
        let rl = self.record_len;
        let mut write = 0;
        for read in 0..self.len() {
            if f(&self.data[read * rl..(read + 1) * rl]) {
                if read != write {
                    self.data.copy_within(read * rl..(read + 1) * rl, write * rl);
                }
                write += 1;
            }
        }
        self.data.truncate(write * rl);
    }

    /// Sorts the records with a quicksort that finishes short ranges with insertion sort. Not stable.
    pub fn sort_by(&mut self, mut compare: impl FnMut(&[i32], &[i32]) -> Ordering) {
        let n = self.len();
        if n < 2 {
            return;
        }
        let mut pivot = vec![0; self.record_len];
        quicksort(&mut self.data, self.record_len, 0, n, &mut pivot, &mut compare);
    }
}

#[inline]
fn record(data: &[i32], rl: usize, i: usize) -> &[i32] {
    &data[i * rl..(i + 1) * rl]
}

#[inline]
fn swap_records(data: &mut [i32], rl: usize, a: usize, b: usize) {
    if a == b {
        return;
    }
    for k in 0..rl {
        data.swap(a * rl + k, b * rl + k);
    }
}

fn insertion_sort(
    data: &mut [i32],
    rl: usize,
    lo: usize,
    hi: usize,
    compare: &mut impl FnMut(&[i32], &[i32]) -> Ordering,
) {
    for i in lo + 1..hi {
        let mut j = i;
        while j > lo && compare(record(data, rl, j), record(data, rl, j - 1)) == Ordering::Less {
            swap_records(data, rl, j, j - 1);
            j -= 1;
        }
    }
}

/// Sorts records `[lo, hi)`. Recurses into the smaller partition and loops on the larger, so stack depth stays logarithmic.
fn quicksort(
    data: &mut [i32],
    rl: usize,
    mut lo: usize,
    mut hi: usize,
    pivot: &mut [i32],
    compare: &mut impl FnMut(&[i32], &[i32]) -> Ordering,
) {
    while hi - lo >= INSERTION_SORT_LEN {
        let split = partition(data, rl, lo, hi, pivot, compare);
        if split - lo < hi - split {
            quicksort(data, rl, lo, split, pivot, compare);
            lo = split;
        } else {
            quicksort(data, rl, split, hi, pivot, compare);
            hi = split;
        }
    }
    insertion_sort(data, rl, lo, hi, compare);
}

/// Hoare partition around the median of the first, middle and last records. Returns `split` such that every record in
/// `[lo, split)` compares less than or equal to every record in `[split, hi)`, with both ranges non-empty.
fn partition(
    data: &mut [i32],
    rl: usize,
    lo: usize,
    hi: usize,
    pivot: &mut [i32],
    compare: &mut impl FnMut(&[i32], &[i32]) -> Ordering,
) -> usize {
    let last = hi - 1;
    let mid = lo + (last - lo) / 2;
    if compare(record(data, rl, mid), record(data, rl, lo)) == Ordering::Less {
        swap_records(data, rl, mid, lo);
    }
    if compare(record(data, rl, last), record(data, rl, lo)) == Ordering::Less {
        swap_records(data, rl, last, lo);
    }
    if compare(record(data, rl, last), record(data, rl, mid)) == Ordering::Less {
        swap_records(data, rl, last, mid);
    }
    pivot.copy_from_slice(record(data, rl, mid));

    let mut i = lo;
    let mut j = hi;
    loop {
        while compare(record(data, rl, i), pivot) == Ordering::Less {
            i += 1;
        }
        j -= 1;
        while compare(record(data, rl, j), pivot) == Ordering::Greater {
            j -= 1;
        }
        if i >= j {
            return j + 1;
        }
        swap_records(data, rl, i, j);
        i += 1;
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::*;

    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn sorted_reference(records: &[[i32; 3]]) -> Vec<[i32; 3]> {
        let mut reference = records.to_vec();
        reference.sort();

        reference
    }

    #[test]
    fn sort_matches_std_sort() {
        let mut rng = StdRng::seed_from_u64(0xdead);
        for &n in [0, 1, 2, 6, 7, 8, 31, 500, 2000].iter() {
            // Narrow key range so there are plenty of duplicates.
            let records: Vec<[i32; 3]> = (0..n)
                .map(|_| [rng.gen_range(-20..20), rng.gen_range(-3..3), rng.gen()])
                .collect();

            let mut array = RecordArray::with_capacity(3, n);
            for r in records.iter() {
                array.push(r);
            }
            array.sort_by(|a, b| a.cmp(b));

            let sorted: Vec<[i32; 3]> = array.iter().map(|r| [r[0], r[1], r[2]]).collect();
            assert_eq!(sorted, sorted_reference(&records));
        }
    }

    #[test]
    fn sort_already_sorted_and_reversed() {
        let mut array = RecordArray::new(1);
        for i in 0..1000 {
            array.push(&[i]);
        }
        array.sort_by(|a, b| b[0].cmp(&a[0]));
        assert_eq!(array.get(0), &[999]);
        assert_eq!(array.get(999), &[0]);

        array.sort_by(|a, b| a[0].cmp(&b[0]));
        assert!(array.iter().zip(0..).all(|(r, i)| r[0] == i));
    }

    #[test]
    fn push_pop_remove_retain() {
        let mut array = RecordArray::new(2);
        for i in 0..5 {
            array.push(&[i, 10 * i]);
        }
        assert_eq!(array.len(), 5);

        let mut out = [0; 2];
        assert!(array.pop_into(&mut out));
        assert_eq!(out, [4, 40]);

        array.remove(1);
        assert_eq!(array.get(1), &[2, 20]);

        array.set_field(0, 0, -1);
        array.retain(|r| r[0] >= 0);
        assert_eq!(array.len(), 2);
        assert_eq!(array.field(0, 1), 20);

        array.clear();
        assert!(!array.pop_into(&mut out));
    }
}
