//! Collection types for Tessera.
//!
//! Re-exports of hash collections using AHash. Device implementations key
//! their resource tables by small integer handles, where AHash is much
//! cheaper than SipHash.

pub use ahash::{AHashMap as HashMap, AHashSet as HashSet, RandomState};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashmap_ahash() {
        let mut map = HashMap::new();
        map.insert(3u32, "buffer");
        assert_eq!(map.get(&3), Some(&"buffer"));
    }

    #[test]
    fn test_hashset_ahash() {
        let mut set = HashSet::new();
        set.insert(42u32);
        assert!(set.contains(&42));
    }
}
