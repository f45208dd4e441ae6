//-------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use anyhow::{ensure, Result};
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use test_log::test;

    use crate::btree::BTree;

    const ORDER: usize = 8;
    const NODE_SIZE: usize = 256;
    const CACHE_CAPACITY: usize = 4;

    struct Fixture {
        dir: TempDir,

        // Option so close/reopen can take the tree.
        tree: Option<BTree>,
    }

    impl Fixture {
        fn new() -> Result<Self> {
            Self::with_geometry(ORDER, NODE_SIZE, CACHE_CAPACITY)
        }

        fn with_geometry(order: usize, node_size: usize, cache: usize) -> Result<Self> {
            let dir = TempDir::new()?;
            let tree = BTree::create(order, node_size, dir.path().join("store.flraf"), cache)?;
            Ok(Self {
                dir,
                tree: Some(tree),
            })
        }

        fn tree(&mut self) -> &mut BTree {
            self.tree.as_mut().unwrap()
        }

        fn header_path(&self) -> PathBuf {
            self.dir.path().join("store.hdr")
        }

        fn reopen(&mut self, cache: usize) -> Result<()> {
            self.tree.take().unwrap().close()?;
            self.tree = Some(BTree::open(self.header_path(), cache)?);
            Ok(())
        }

        fn add_all(&mut self, keys: &[&str]) -> Result<()> {
            for k in keys {
                ensure!(self.tree().add(k)?, "{} was already present", k);
            }
            Ok(())
        }
    }

    //-------------------------------

    #[test]
    fn bootstrap_then_reopen() -> Result<()> {
        let mut fix = Fixture::new()?;
        fix.add_all(&["a", "b", "c", "d", "e", "f", "g"])?;

        assert!(!fix.tree().is_empty());
        assert!(fix.tree().contains("d")?);
        assert!(!fix.tree().contains("h")?);
        assert_eq!(fix.tree().check()?, 7);

        fix.reopen(CACHE_CAPACITY)?;

        assert!(!fix.tree().is_empty());
        assert!(fix.tree().contains("d")?);
        assert!(!fix.tree().contains("h")?);
        assert_eq!(fix.tree().check()?, 7);
        Ok(())
    }

    #[test]
    fn adding_an_eighth_key_splits_the_root() -> Result<()> {
        let mut fix = Fixture::new()?;
        fix.add_all(&["a", "b", "c", "d", "e", "f", "g"])?;
        assert_eq!(fix.tree().nr_nodes(), 1);

        assert!(fix.tree().add("h")?);

        // one-key internal root over two leaves
        assert_eq!(fix.tree().nr_nodes(), 3);
        assert_eq!(fix.tree().size_in_bytes(), 3 * NODE_SIZE as u64);
        assert_eq!(fix.tree().check()?, 8);

        for k in ["a", "b", "c", "d", "e", "f", "g", "h"] {
            assert!(fix.tree().contains(k)?);
        }
        Ok(())
    }

    #[test]
    fn duplicate_add_is_rejected() -> Result<()> {
        let mut fix = Fixture::new()?;

        assert!(fix.tree().add("apple")?);
        assert!(!fix.tree().add("apple")?);

        assert_eq!(fix.tree().len(), 1);
        assert_eq!(fix.tree().nr_nodes(), 1);
        assert_eq!(fix.tree().check()?, 1);
        Ok(())
    }

    #[test]
    fn duplicate_add_matching_a_median_is_rejected() -> Result<()> {
        let mut fix = Fixture::new()?;
        fix.add_all(&["a", "b", "c", "d", "e", "f", "g", "h"])?;

        // "d" was promoted into the root by the split
        assert!(!fix.tree().add("d")?);
        assert_eq!(fix.tree().check()?, 8);
        Ok(())
    }

    #[test]
    fn remove_via_predecessor() -> Result<()> {
        let mut fix = Fixture::new()?;

        // Ends up as root [d, h] over leaves [a, b, c], [e, f, g] and
        // [i, j, k, l].
        fix.add_all(&[
            "a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l",
        ])?;
        assert_eq!(fix.tree().nr_nodes(), 4);

        // "h" sits in the internal root; its predecessor "g" is the last
        // key of the left subtree's rightmost leaf and takes its slot.
        assert!(fix.tree().remove("h")?);

        assert!(!fix.tree().contains("h")?);
        assert!(fix.tree().contains("g")?);
        assert_eq!(fix.tree().check()?, 11);

        fix.reopen(CACHE_CAPACITY)?;
        assert!(!fix.tree().contains("h")?);
        assert!(fix.tree().contains("g")?);
        Ok(())
    }

    #[test]
    fn remove_missing_key() -> Result<()> {
        let mut fix = Fixture::new()?;
        fix.add_all(&["a", "b", "c"])?;

        assert!(!fix.tree().remove("x")?);
        assert!(!fix.tree().remove("b2")?);
        assert_eq!(fix.tree().check()?, 3);

        assert!(fix.tree().remove("b")?);
        assert!(!fix.tree().remove("b")?);
        assert_eq!(fix.tree().check()?, 2);
        Ok(())
    }

    #[test]
    fn remove_from_empty_tree() -> Result<()> {
        let mut fix = Fixture::new()?;
        assert!(!fix.tree().remove("a")?);
        Ok(())
    }

    #[test]
    fn underflow_steals_from_the_right_sibling() -> Result<()> {
        let mut fix = Fixture::new()?;

        // root [d, h], leaves [a, b, c], [e, f, g], [i, j, k, l]
        fix.add_all(&[
            "a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l",
        ])?;

        // Removing "e" underflows the middle leaf; the left sibling has no
        // spare key so "i" rotates in through the root.
        assert!(fix.tree().remove("e")?);

        assert_eq!(fix.tree().nr_nodes(), 4);
        assert_eq!(fix.tree().check()?, 11);
        for k in ["a", "b", "c", "d", "f", "g", "h", "i", "j", "k", "l"] {
            assert!(fix.tree().contains(k)?);
        }
        Ok(())
    }

    #[test]
    fn underflow_steals_from_the_left_sibling() -> Result<()> {
        let mut fix = Fixture::new()?;

        // Removing "e" from the freshly built tree leaves root [d, i] over
        // [a, b, c], [f, g, h] and [j, k, l].
        fix.add_all(&[
            "a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l",
        ])?;
        assert!(fix.tree().remove("e")?);
        assert_eq!(fix.tree().check()?, 11);

        // Fatten the middle leaf so it has a key to spare.
        assert!(fix.tree().add("ga")?);

        // Removing "l" underflows the rightmost leaf; the left sibling
        // donates through the root.
        assert!(fix.tree().remove("l")?);

        assert_eq!(fix.tree().check()?, 11);
        for k in ["a", "b", "c", "d", "f", "g", "ga", "h", "i", "j", "k"] {
            assert!(fix.tree().contains(k)?);
        }
        Ok(())
    }

    #[test]
    fn underflow_merges_and_frees_a_block() -> Result<()> {
        let mut fix = Fixture::new()?;

        // root [d, h], leaves [a, b, c], [e, f, g], [i, j, k, l]
        fix.add_all(&[
            "a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l",
        ])?;
        assert_eq!(fix.tree().nr_nodes(), 4);
        assert!(fix.tree().unallocated_blocks().is_empty());

        assert!(fix.tree().remove("l")?);
        assert_eq!(fix.tree().nr_nodes(), 4);

        // Removing "k" underflows the rightmost leaf; neither sibling can
        // donate, so it merges with [e, f, g] and a block is released.
        assert!(fix.tree().remove("k")?);

        assert_eq!(fix.tree().nr_nodes(), 3);
        assert_eq!(fix.tree().unallocated_blocks().len(), 1);
        assert_eq!(fix.tree().check()?, 10);

        // The freed block is the next to be allocated: force a split and
        // watch the free list drain.
        fix.add_all(&["m", "n"])?;
        assert_eq!(fix.tree().nr_nodes(), 4);
        assert!(fix.tree().unallocated_blocks().is_empty());
        assert_eq!(fix.tree().check()?, 12);
        Ok(())
    }

    #[test]
    fn draining_the_tree_collapses_the_root() -> Result<()> {
        let mut fix = Fixture::new()?;
        let keys = ["a", "b", "c", "d", "e", "f", "g", "h"];
        fix.add_all(&keys)?;
        assert_eq!(fix.tree().nr_nodes(), 3);

        for k in keys {
            assert!(fix.tree().remove(k)?);
            fix.tree().check()?;
        }

        assert!(fix.tree().is_empty());
        assert_eq!(fix.tree().len(), 0);
        assert_eq!(fix.tree().nr_nodes(), 0);
        assert_eq!(fix.tree().size_in_bytes(), 0);

        // freed blocks are reused once keys come back
        assert!(fix.tree().add("z")?);
        assert_eq!(fix.tree().nr_nodes(), 1);
        assert_eq!(fix.tree().check()?, 1);
        Ok(())
    }

    #[test]
    fn emptied_tree_survives_reopen() -> Result<()> {
        let mut fix = Fixture::new()?;
        fix.add_all(&["a", "b"])?;
        assert!(fix.tree().remove("a")?);
        assert!(fix.tree().remove("b")?);

        fix.reopen(CACHE_CAPACITY)?;

        assert!(fix.tree().is_empty());
        assert!(!fix.tree().contains("a")?);
        assert!(fix.tree().add("a")?);
        assert!(fix.tree().contains("a")?);
        Ok(())
    }

    #[test]
    fn churn_under_a_tiny_cache() -> Result<()> {
        let mut fix = Fixture::with_geometry(ORDER, NODE_SIZE, 2)?;

        let keys: Vec<String> = (0..50).map(|i| format!("key{:02}", i)).collect();
        for (i, k) in keys.iter().enumerate() {
            assert!(fix.tree().add(k)?);

            // every key added so far is still visible
            for seen in &keys[0..=i] {
                assert!(fix.tree().contains(seen)?, "{} went missing", seen);
            }
        }

        fix.tree().check()?;
        fix.reopen(2)?;

        for k in &keys {
            assert!(fix.tree().contains(k)?);
        }
        assert!(!fix.tree().contains("key50")?);
        Ok(())
    }

    #[test]
    fn random_churn() -> Result<()> {
        let mut fix = Fixture::new()?;
        let mut rng = rand::rngs::StdRng::seed_from_u64(97);

        let mut keys: Vec<String> = (0..200).map(|i| format!("{:04}", i)).collect();
        keys.shuffle(&mut rng);

        for (i, k) in keys.iter().enumerate() {
            assert!(fix.tree().add(k)?);
            if i % 20 == 0 {
                fix.tree().check()?;
            }
        }
        assert_eq!(fix.tree().check()?, 200);

        let (gone, kept) = keys.split_at(100);
        for (i, k) in gone.iter().enumerate() {
            assert!(fix.tree().remove(k)?, "{} was not removable", k);
            if i % 20 == 0 {
                fix.tree().check()?;
            }
        }
        assert_eq!(fix.tree().check()?, 100);

        fix.reopen(CACHE_CAPACITY)?;
        for k in gone {
            assert!(!fix.tree().contains(k)?);
        }
        for k in kept {
            assert!(fix.tree().contains(k)?);
        }
        Ok(())
    }

    #[test]
    fn custom_comparator() -> Result<()> {
        let dir = TempDir::new()?;
        let reverse = Box::new(|a: &str, b: &str| b.cmp(a));
        let mut tree = BTree::create_with_comparator(
            ORDER,
            NODE_SIZE,
            dir.path().join("store.flraf"),
            CACHE_CAPACITY,
            reverse,
        )?;

        for k in ["a", "b", "c", "d", "e", "f", "g", "h", "i"] {
            assert!(tree.add(k)?);
        }

        assert_eq!(tree.check()?, 9);
        assert!(tree.contains("e")?);
        assert!(tree.remove("e")?);
        assert!(!tree.contains("e")?);
        assert_eq!(tree.check()?, 8);
        tree.close()?;
        Ok(())
    }

    #[test]
    fn oversized_keys_are_rejected() -> Result<()> {
        let mut fix = Fixture::new()?;

        // key slots hold 32 bytes at this geometry
        assert!(fix.tree().add(&"x".repeat(32))?);
        assert!(fix.tree().add(&"y".repeat(33)).is_err());

        assert_eq!(fix.tree().check()?, 1);
        Ok(())
    }

    #[test]
    fn header_tracks_every_mutation() -> Result<()> {
        use crate::btree::header::read_header;

        let mut fix = Fixture::new()?;
        fix.add_all(&["a", "b", "c"])?;

        // No close yet; the sidecar must already describe the store.
        let hdr = read_header(&fix.header_path())?;
        assert_eq!(hdr.nr_keys, 3);
        assert_eq!(hdr.nr_nodes, 1);
        assert_eq!(hdr.order, ORDER as u32);
        assert_eq!(hdr.tree_size(), NODE_SIZE as u64);

        fix.tree().remove("b")?;
        assert_eq!(read_header(&fix.header_path())?.nr_keys, 2);
        Ok(())
    }

    #[test]
    fn flush_persists_without_close() -> Result<()> {
        use crate::btree::header::read_header;
        use crate::btree::node::NodeCodec;

        let mut fix = Fixture::new()?;
        fix.add_all(&["a", "b", "c"])?;
        fix.tree().flush()?;

        // The block file alone must now hold the root; decode it straight
        // off disk while the tree stays open.
        let hdr = read_header(&fix.header_path())?;
        let bytes = std::fs::read(fix.dir.path().join("store.flraf"))?;
        assert_eq!(bytes.len() as u64, hdr.tree_size());

        let codec = NodeCodec::new(ORDER, NODE_SIZE)?;
        let begin = hdr.root.unwrap() as usize * NODE_SIZE;
        let node = codec.decode(&bytes[begin..begin + NODE_SIZE])?;
        assert_eq!(node.keys(), ["a", "b", "c"]);
        Ok(())
    }

    #[test]
    fn rejects_a_degenerate_order() -> Result<()> {
        let dir = TempDir::new()?;
        assert!(BTree::create(2, 256, dir.path().join("store.flraf"), 4).is_err());
        Ok(())
    }
}

//-------------------------------------------------------------------------
