use std::cmp::Ordering;

use crate::{DEFAULT_SLOT_PREFIX, Slot};

/// Slot naming convention: `<prefix><n>`, `n >= 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotNaming {
    prefix: String,
}

impl SlotNaming {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    #[inline]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Slot name for ordinal `n`.
    pub fn name(&self, n: u32) -> Slot {
        format!("{}{n}", self.prefix)
    }

    /// Ordinal of a conforming slot name, `None` for foreign names.
    pub fn ordinal(&self, slot: &str) -> Option<u32> {
        let rest = slot.strip_prefix(&self.prefix)?;
        if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        rest.parse().ok().filter(|n| *n > 0)
    }

    #[inline]
    pub fn matches(&self, slot: &str) -> bool {
        self.ordinal(slot).is_some()
    }

    /// Name after the highest ordinal currently taken (`<prefix>1` when none are).
    pub fn next_free<'a, I>(&self, taken: I) -> Slot
    where
        I: IntoIterator<Item = &'a str>,
    {
        let max = taken
            .into_iter()
            .filter_map(|s| self.ordinal(s))
            .max()
            .unwrap_or(0);
        self.name(max + 1)
    }
}

impl Default for SlotNaming {
    fn default() -> Self {
        Self::new(DEFAULT_SLOT_PREFIX)
    }
}

/// Order slot names so that `node-2` sorts before `node-10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (a_head, a_num) = split_trailing_number(a);
    let (b_head, b_num) = split_trailing_number(b);
    a_head
        .cmp(b_head)
        .then_with(|| a_num.cmp(&b_num))
        .then_with(|| a.cmp(b))
}

fn split_trailing_number(s: &str) -> (&str, Option<u64>) {
    let digits = s.bytes().rev().take_while(|b| b.is_ascii_digit()).count();
    let (head, tail) = s.split_at(s.len() - digits);
    (head, tail.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinal_of_conforming_names() {
        let naming = SlotNaming::default();
        assert_eq!(naming.name(3), "nexus-node-3");
        assert_eq!(naming.ordinal("nexus-node-3"), Some(3));
        assert_eq!(naming.ordinal("nexus-node-0"), None);
        assert_eq!(naming.ordinal("nexus-node-"), None);
        assert_eq!(naming.ordinal("nexus-node-3a"), None);
        assert_eq!(naming.ordinal("redis"), None);
    }

    #[test]
    fn next_free_follows_highest_ordinal() {
        let naming = SlotNaming::default();
        assert_eq!(naming.next_free(std::iter::empty()), "nexus-node-1");
        assert_eq!(
            naming.next_free(["nexus-node-1", "nexus-node-4", "other-9"]),
            "nexus-node-5"
        );
    }

    #[test]
    fn natural_order_compares_numbers() {
        let mut slots = vec!["nexus-node-10", "nexus-node-2", "nexus-node-1", "a"];
        slots.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(slots, vec!["a", "nexus-node-1", "nexus-node-2", "nexus-node-10"]);
    }
}
