//-
// Copyright (c) 2020, Jason Lingle
//
// This file is part of Boxsync.
//
// Boxsync is free software: you can  redistribute it and/or modify it under
// the terms of  the GNU General Public License as published  by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Boxsync is distributed in the hope that  it will be useful, but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Boxsync. If not, see <http://www.gnu.org/licenses/>.

use std::fmt;
use std::iter::FromIterator;
use std::mem;
use std::str;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The default number of bytes a `FlagSet` can hold before it needs to
/// allocate.
///
/// With a one-byte length and the enum tag, this makes the whole container 24
/// bytes on 64-bit targets, which is enough for the common `\Seen \Flagged`
/// case.
pub const INLINE_CAPACITY: usize = 22;

/// An ordered list of short strings (flags or labels), strongly
/// memory-optimised for the case where the whole list fits in a couple dozen
/// bytes.
///
/// Each flag is stored followed by a NUL terminator, all in one contiguous
/// buffer. While the buffer fits in `N` bytes it lives inside the container;
/// past that it is moved ("spilled") into a separately allocated block which
/// grows by a factor of 4 whenever it runs out of room. A spilled set never
/// goes back to inline storage except through `clear()`.
///
/// There is no deduplication; appending the same flag twice stores it twice.
///
/// Allocation failure is not represented here. Like everything else using the
/// global allocator, running out of memory while spilling or growing aborts
/// the process, so `append` is infallible.
///
/// Serialises as a sequence of strings.
#[derive(Clone)]
pub struct FlagSet<const N: usize = INLINE_CAPACITY> {
    storage: Storage<N>,
}

#[derive(Clone)]
enum Storage<const N: usize> {
    Inline { bytes: [u8; N], used: u8 },
    Spilled(Box<Block>),
}

/// Out-of-line storage for a spilled `FlagSet`.
///
/// `data.len()` is the capacity; it is always allocated to an exact size so
/// the growth policy is under our control rather than `Vec`'s.
#[derive(Clone)]
struct Block {
    used: usize,
    data: Box<[u8]>,
}

/// The bookkeeping overhead charged against each block allocation.
const BLOCK_HEADER: usize = mem::size_of::<Block>();

impl Block {
    /// Allocate a block occupying `total_size` bytes including the header,
    /// initially holding `initial`.
    fn new(total_size: usize, initial: &[u8]) -> Self {
        let capacity =
            total_size.saturating_sub(BLOCK_HEADER).max(initial.len());
        let mut data = vec![0u8; capacity].into_boxed_slice();
        data[..initial.len()].copy_from_slice(initial);
        Block {
            used: initial.len(),
            data,
        }
    }

    fn try_push(&mut self, flag: &[u8]) -> bool {
        let end = self.used + flag.len() + 1;
        if end > self.data.len() {
            return false;
        }

        self.data[self.used..end - 1].copy_from_slice(flag);
        self.data[end - 1] = 0;
        self.used = end;
        true
    }

    fn grow(&mut self) {
        let grown = Block::new(
            4 * (self.data.len() + BLOCK_HEADER),
            &self.data[..self.used],
        );
        *self = grown;
    }
}

impl<const N: usize> Default for FlagSet<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> FlagSet<N> {
    const INLINE_LEN_FITS: () =
        assert!(N <= u8::MAX as usize, "inline capacity must fit in a u8");

    /// Create a new, empty set in inline mode.
    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::INLINE_LEN_FITS;

        FlagSet {
            storage: Storage::Inline {
                bytes: [0u8; N],
                used: 0,
            },
        }
    }

    /// Add `flag` to the end of the set.
    ///
    /// `flag` must not contain NUL.
    pub fn append(&mut self, flag: &str) {
        debug_assert!(!flag.contains('\0'), "flag {:?} contains NUL", flag);

        let flag = flag.as_bytes();
        loop {
            match self.storage {
                Storage::Inline {
                    ref mut bytes,
                    ref mut used,
                } => {
                    let start = usize::from(*used);
                    let end = start + flag.len() + 1;
                    if end <= N {
                        bytes[start..end - 1].copy_from_slice(flag);
                        bytes[end - 1] = 0;
                        *used = end as u8;
                        return;
                    }

                    let block =
                        Block::new(Self::initial_spill_size(), &bytes[..start]);
                    self.storage = Storage::Spilled(Box::new(block));
                }

                Storage::Spilled(ref mut block) => {
                    if block.try_push(flag) {
                        return;
                    }

                    block.grow();
                }
            }
        }
    }

    /// The total allocation made on the first spill.
    ///
    /// This is a multiple of the container's own footprint so that the first
    /// spill already has room well past the flag that caused it.
    fn initial_spill_size() -> usize {
        4 * mem::size_of::<Self>()
    }

    /// Return the number of bytes used by the encoded flags, including the
    /// terminators.
    pub fn byte_length(&self) -> usize {
        match self.storage {
            Storage::Inline { used, .. } => usize::from(used),
            Storage::Spilled(ref block) => block.used,
        }
    }

    /// Return the encoded flags: each flag followed by a NUL byte, in
    /// insertion order.
    pub fn raw_view(&self) -> &[u8] {
        match self.storage {
            Storage::Inline {
                ref bytes, used, ..
            } => &bytes[..usize::from(used)],
            Storage::Spilled(ref block) => &block.data[..block.used],
        }
    }

    /// Return the number of bytes that can be held before the next spill or
    /// growth.
    pub fn capacity(&self) -> usize {
        match self.storage {
            Storage::Inline { .. } => N,
            Storage::Spilled(ref block) => block.data.len(),
        }
    }

    /// Return whether the flags have been moved out of line.
    pub fn is_spilled(&self) -> bool {
        matches!(self.storage, Storage::Spilled(..))
    }

    /// Release any out-of-line storage and make the set empty again.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub fn is_empty(&self) -> bool {
        0 == self.byte_length()
    }

    /// Return the number of flags (not bytes) in the set.
    pub fn len(&self) -> usize {
        memchr::memchr_iter(0, self.raw_view()).count()
    }

    /// Iterate the flags in insertion order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            rest: self.raw_view(),
        }
    }

    /// Return whether `flag` is in the set, compared byte-for-byte.
    pub fn contains(&self, flag: &str) -> bool {
        self.iter().any(|f| f == flag)
    }
}

/// Iterator over the flags of a `FlagSet`.
#[derive(Clone, Debug)]
pub struct Iter<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.rest.is_empty() {
            return None;
        }

        let end = memchr::memchr(0, self.rest).unwrap_or(self.rest.len());
        let (flag, rest) = self.rest.split_at(end);
        self.rest = rest.get(1..).unwrap_or(&[]);
        // Only whole `&str`s are ever appended, and NUL never occurs inside a
        // UTF-8 sequence, so every piece is valid UTF-8.
        Some(str::from_utf8(flag).expect("FlagSet holds non-UTF-8 data"))
    }
}

impl<'a, const N: usize> IntoIterator for &'a FlagSet<N> {
    type Item = &'a str;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

impl<S: AsRef<str>, const N: usize> Extend<S> for FlagSet<N> {
    fn extend<I: IntoIterator<Item = S>>(&mut self, it: I) {
        for flag in it {
            self.append(flag.as_ref());
        }
    }
}

impl<S: AsRef<str>, const N: usize> FromIterator<S> for FlagSet<N> {
    fn from_iter<I: IntoIterator<Item = S>>(it: I) -> Self {
        let mut this = Self::new();
        this.extend(it);
        this
    }
}

impl<const N: usize> PartialEq for FlagSet<N> {
    fn eq(&self, other: &Self) -> bool {
        self.raw_view() == other.raw_view()
    }
}

impl<const N: usize> Eq for FlagSet<N> {}

impl<const N: usize> fmt::Debug for FlagSet<N> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "FlagSet")?;
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<const N: usize> Serialize for FlagSet<N> {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de, const N: usize> Deserialize<'de> for FlagSet<N> {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        let flags: Vec<String> = Vec::deserialize(deserializer)?;
        if flags.iter().any(|f| f.contains('\0')) {
            return Err(serde::de::Error::custom("flag contains NUL"));
        }

        Ok(flags.into_iter().collect())
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    fn decode(raw: &[u8]) -> Vec<&str> {
        raw.split(|&b| 0 == b)
            .take(memchr::memchr_iter(0, raw).count())
            .map(|s| str::from_utf8(s).unwrap())
            .collect()
    }

    #[test]
    fn empty_set() {
        let fs = FlagSet::<16>::new();
        assert_eq!(0, fs.byte_length());
        assert!(fs.raw_view().is_empty());
        assert!(fs.is_empty());
        assert!(!fs.is_spilled());
        assert_eq!(16, fs.capacity());
        assert_eq!(0, fs.iter().count());
    }

    #[test]
    fn seen_flagged_deleted_spills_on_third_append() {
        let mut fs = FlagSet::<16>::new();

        fs.append("Seen");
        assert!(!fs.is_spilled());
        assert_eq!(5, fs.byte_length());

        fs.append("Flagged");
        assert!(!fs.is_spilled());
        assert_eq!(13, fs.byte_length());

        fs.append("\\Deleted");
        assert!(fs.is_spilled());
        assert_eq!(22, fs.byte_length());
        assert_eq!(b"Seen\0Flagged\0\\Deleted\0", fs.raw_view());
        assert_eq!(
            vec!["Seen", "Flagged", "\\Deleted"],
            fs.iter().collect::<Vec<_>>()
        );
        assert_eq!(3, fs.len());
    }

    #[test]
    fn exact_fit_stays_inline() {
        let mut fs = FlagSet::<8>::new();
        fs.append("abc");
        fs.append("xyz");
        assert_eq!(8, fs.byte_length());
        assert!(!fs.is_spilled());

        fs.append("");
        assert!(fs.is_spilled());
        assert_eq!(vec!["abc", "xyz", ""], fs.iter().collect::<Vec<_>>());
    }

    #[test]
    fn first_spill_has_headroom() {
        let mut fs = FlagSet::<16>::new();
        fs.append("0123456789abcdef");
        assert!(fs.is_spilled());
        assert_eq!(
            4 * mem::size_of::<FlagSet<16>>() - BLOCK_HEADER,
            fs.capacity()
        );
        assert!(fs.capacity() > fs.byte_length());
    }

    #[test]
    fn single_flag_far_beyond_all_capacities() {
        let huge = "x".repeat(100_000);
        let mut fs = FlagSet::<16>::new();
        fs.append(&huge);

        assert!(fs.is_spilled());
        assert_eq!(100_001, fs.byte_length());
        assert!(fs.capacity() >= 100_001);
        assert_eq!(vec![&huge[..]], fs.iter().collect::<Vec<_>>());

        fs.append("Seen");
        assert_eq!(vec![&huge[..], "Seen"], fs.iter().collect::<Vec<_>>());
    }

    #[test]
    fn clear_is_destructive_and_idempotent() {
        let mut fs = FlagSet::<16>::new();
        fs.clear();
        assert_eq!(0, fs.byte_length());

        fs.append("Seen");
        fs.clear();
        assert_eq!(0, fs.byte_length());
        assert!(!fs.is_spilled());

        for _ in 0..10 {
            fs.append("$Label");
        }
        assert!(fs.is_spilled());
        fs.clear();
        assert_eq!(0, fs.byte_length());
        assert!(fs.raw_view().is_empty());
        assert!(!fs.is_spilled());
        assert_eq!(16, fs.capacity());

        fs.clear();
        assert_eq!(0, fs.byte_length());

        fs.append("Seen");
        assert_eq!(vec!["Seen"], fs.iter().collect::<Vec<_>>());
    }

    #[test]
    fn duplicates_are_kept() {
        let fs: FlagSet = vec!["\\Seen", "\\Seen"].into_iter().collect();
        assert_eq!(vec!["\\Seen", "\\Seen"], fs.iter().collect::<Vec<_>>());
        assert!(fs.contains("\\Seen"));
        assert!(!fs.contains("\\seen"));
    }

    #[test]
    fn default_container_is_compact() {
        assert!(mem::size_of::<FlagSet>() <= 24);
    }

    #[test]
    fn equality_ignores_storage_mode() {
        let mut a = FlagSet::<4>::new();
        let mut b = FlagSet::<64>::new();
        for flag in &["one", "two", "three"] {
            a.append(flag);
            b.append(flag);
        }

        assert!(a.is_spilled());
        assert!(!b.is_spilled());
        assert_eq!(a.raw_view(), b.raw_view());
        assert_eq!(a.clone(), a);
    }

    #[test]
    fn test_serde() {
        let fs: FlagSet = vec!["\\Seen", "Important", "$label1"]
            .into_iter()
            .collect();
        let as_bytes = serde_cbor::to_vec(&fs).unwrap();
        let reread: FlagSet = serde_cbor::from_reader(&as_bytes[..]).unwrap();
        assert_eq!(fs, reread);

        let as_bytes = serde_cbor::to_vec(&vec!["a\0b"]).unwrap();
        assert!(serde_cbor::from_reader::<FlagSet, _>(&as_bytes[..]).is_err());
    }

    proptest! {
        #[test]
        fn append_preserves_order_and_growth_policy(
            flags in prop::collection::vec("[A-Za-z$\\\\]{0,40}", 0..64)
        ) {
            let mut fs = FlagSet::<16>::new();
            let mut total = 0usize;
            for flag in &flags {
                let cap_before = fs.capacity();
                let spilled_before = fs.is_spilled();

                fs.append(flag);
                total += flag.len() + 1;

                prop_assert_eq!(total, fs.byte_length());
                prop_assert_eq!(total > 16, fs.is_spilled());
                prop_assert!(fs.capacity() >= cap_before);
                prop_assert!(fs.capacity() >= fs.byte_length());
                if spilled_before && fs.capacity() != cap_before {
                    prop_assert!(fs.capacity() >= 4 * cap_before);
                }
            }

            prop_assert_eq!(
                flags.iter().map(|s| &s[..]).collect::<Vec<_>>(),
                decode(fs.raw_view())
            );
            prop_assert_eq!(
                flags.iter().map(|s| &s[..]).collect::<Vec<_>>(),
                fs.iter().collect::<Vec<_>>()
            );
            prop_assert_eq!(flags.len(), fs.len());
        }
    }
}
