//! B+ tree property tests over seeded random workloads.

use cedar_common::{Address, IndexConfig};
use cedar_storage::{BPlusTree, Key};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use tempfile::{tempdir, TempDir};

const SEED: u64 = 0x5eed_cafe;

fn create_tree(m: usize) -> (BPlusTree, TempDir) {
    let dir = tempdir().unwrap();
    let tree = BPlusTree::create(dir.path(), "field", IndexConfig::with_branching_factor(m), false).unwrap();
    (tree, dir)
}

fn random_keys(rng: &mut StdRng, n: usize, values: u64, pages: u64) -> Vec<Key> {
    (0..n)
        .map(|_| Key::new(rng.gen_range(0..values), rng.gen_range(0..pages)))
        .collect()
}

// =============================================================================
// Structural invariants
// =============================================================================

#[test]
fn test_random_inserts_keep_invariants() {
    let mut rng = StdRng::seed_from_u64(SEED);
    for m in [3, 4, 5, 10, 17] {
        let (mut tree, _dir) = create_tree(m);
        let mut inserted = BTreeSet::new();

        for (i, key) in random_keys(&mut rng, 600, 80, 50).into_iter().enumerate() {
            let fresh = inserted.insert(key);
            assert_eq!(tree.insert(key).unwrap(), fresh, "m={} key={}", m, key);
            if i % 97 == 0 {
                tree.verify().unwrap();
            }
        }

        let shape = tree.verify().unwrap();
        assert_eq!(shape.keys as usize, inserted.len());
        assert_eq!(shape.nodes, tree.num_nodes());

        let chain = tree.leaf_chain().unwrap();
        let expected: Vec<Key> = inserted.iter().copied().collect();
        assert_eq!(chain, expected, "leaf chain differs for m={}", m);

        for key in &expected {
            assert!(tree.contains(key).unwrap());
        }
    }
}

#[test]
fn test_sequential_and_reverse_inserts() {
    for keys in [
        (0..500u64).collect::<Vec<_>>(),
        (0..500u64).rev().collect::<Vec<_>>(),
    ] {
        let (mut tree, _dir) = create_tree(4);
        for &v in &keys {
            assert!(tree.insert(Key::new(v, 0)).unwrap());
        }
        let shape = tree.verify().unwrap();
        assert_eq!(shape.keys, 500);
        let chain = tree.leaf_chain().unwrap();
        assert!(chain.windows(2).all(|w| w[0] < w[1]));
    }
}

// =============================================================================
// Weak scans
// =============================================================================

#[test]
fn test_weak_scan_counts_match_inserted_keys() {
    let mut rng = StdRng::seed_from_u64(SEED + 1);
    let (mut tree, _dir) = create_tree(5);

    // Skewed values so some codes span many leaves.
    let mut expected: BTreeMap<String, BTreeSet<u64>> = BTreeMap::new();
    for _ in 0..1500 {
        let value = if rng.gen_bool(0.4) {
            "hot".to_string()
        } else {
            format!("v{}", rng.gen_range(0..40))
        };
        let record = rng.gen_range(0..400);
        let fresh = expected.entry(value.clone()).or_default().insert(record);
        assert_eq!(tree.insert_value(&value, Address::new(record)).unwrap(), fresh);
    }

    assert_eq!(tree.unique_keys() as usize, expected.len());
    for (value, records) in &expected {
        let code = tree.dictionary().code(value).unwrap();
        assert_eq!(tree.count_weak(code).unwrap() as usize, records.len(), "value {}", value);
        let addresses: Vec<u64> = tree.addresses_weak(code).unwrap().iter().map(|a| a.get()).collect();
        assert_eq!(addresses, records.iter().copied().collect::<Vec<_>>());
    }
    tree.verify().unwrap();
}

#[test]
fn test_weak_leaf_is_first_holder() {
    let (mut tree, _dir) = create_tree(3);
    for record in 0..30 {
        tree.insert_value("a", Address::new(record)).unwrap();
        tree.insert_value("b", Address::new(record)).unwrap();
    }
    let b = tree.dictionary().code("b").unwrap();
    let found = tree.locate_leaf_weak(b).unwrap();
    let leaf = tree.node(found.address).unwrap();

    let first = leaf.first_weak_position(b).unwrap();
    assert_eq!(leaf.keys()[first], Key::new(b, 0));
    assert!(found.io_steps >= tree.depth() as u64);
}

// =============================================================================
// Idempotence and split arithmetic
// =============================================================================

#[test]
fn test_duplicate_inserts_change_nothing() {
    let mut rng = StdRng::seed_from_u64(SEED + 2);
    let (mut tree, dir) = create_tree(4);
    let keys = random_keys(&mut rng, 300, 1000, 1000);
    for &key in &keys {
        tree.insert(key).unwrap();
    }
    tree.flush().unwrap();

    let index_path = dir.path().join("tree");
    let before = fs::read(&index_path).unwrap();
    let chain_before = tree.leaf_chain().unwrap();

    for &key in &keys {
        assert!(!tree.insert(key).unwrap());
    }
    tree.flush().unwrap();

    assert_eq!(fs::read(&index_path).unwrap(), before);
    assert_eq!(tree.leaf_chain().unwrap(), chain_before);
}

#[test]
fn test_leaf_split_sizes() {
    for m in 3..=12 {
        let (mut tree, _dir) = create_tree(m);
        let max_keys = (m - 1) as u64;
        for v in 0..max_keys {
            tree.insert(Key::new(v * 2, 0)).unwrap();
        }
        assert_eq!(tree.depth(), 0);

        // The new key lands in the middle of the full leaf.
        let new_key = Key::new(max_keys - 1, 1);
        tree.insert(new_key).unwrap();
        assert_eq!(tree.depth(), 1, "m={}", m);

        let root = tree.root().clone();
        assert_eq!(root.children().len(), 2);
        let left = tree.node(root.children()[0]).unwrap();
        let right = tree.node(root.children()[1]).unwrap();
        assert_eq!(left.count(), m / 2, "m={}", m);
        assert_eq!(right.count(), m - m / 2, "m={}", m);
        assert_eq!(root.keys()[0], right.min_key().unwrap());

        let mut union: Vec<Key> = left.keys().to_vec();
        union.extend_from_slice(right.keys());
        let mut expected: Vec<Key> = (0..max_keys).map(|v| Key::new(v * 2, 0)).collect();
        expected.push(new_key);
        expected.sort();
        assert_eq!(union, expected);
    }
}

#[test]
fn test_root_split_increments_depth() {
    let mut rng = StdRng::seed_from_u64(SEED + 3);
    let (mut tree, _dir) = create_tree(3);
    let mut splits = 0;

    for key in random_keys(&mut rng, 400, 10_000, 10_000) {
        let root_before = tree.root_address();
        let depth_before = tree.depth();
        tree.insert(key).unwrap();

        if tree.root_address() != root_before {
            splits += 1;
            assert_eq!(tree.depth(), depth_before + 1);
            assert_eq!(tree.root().children().len(), 2);
            assert_eq!(tree.root().count(), 1);
        } else {
            assert_eq!(tree.depth(), depth_before);
        }
    }
    assert_eq!(splits, tree.depth());
}

// =============================================================================
// File format and reopen
// =============================================================================

#[test]
fn test_concrete_scenario_file_layout() {
    let (mut tree, dir) = create_tree(10);
    tree.flush().unwrap();
    let path = dir.path().join("tree");

    let fresh = fs::read(&path).unwrap();
    assert_eq!(fresh.len(), 101 + 1011);
    assert!(fresh[..101].starts_with(b"101 0 "));
    assert!(fresh[101..].starts_with(b"L 0 0 0 0 "));
    assert_eq!(fresh[100], b'\n');
    assert_eq!(*fresh.last().unwrap(), b'\n');

    for v in 0..9 {
        tree.insert(Key::new(v, v)).unwrap();
    }
    tree.flush().unwrap();
    assert_eq!(fs::read(&path).unwrap().len(), 101 + 1011);

    tree.insert(Key::new(9, 9)).unwrap();
    tree.flush().unwrap();
    let grown = fs::read(&path).unwrap();
    assert_eq!(grown.len(), 101 + 3 * 1011);
    // Root line appended after the split leaf.
    assert!(grown.starts_with(b"2123 1 "));
    assert!(grown[2123..].starts_with(b"N 0 1 101 5 5 1112 "));
}

#[test]
fn test_reopen_and_continue() {
    let mut rng = StdRng::seed_from_u64(SEED + 4);
    let dir = tempdir().unwrap();
    let config = IndexConfig::with_branching_factor(6);
    let keys = random_keys(&mut rng, 400, 500, 100);

    let (first, second) = keys.split_at(250);
    {
        let mut tree = BPlusTree::create(dir.path(), "field", config, false).unwrap();
        for &key in first {
            tree.insert(key).unwrap();
        }
        tree.flush().unwrap();
    }

    let mut tree = BPlusTree::open(dir.path(), "field", config, false).unwrap();
    tree.verify().unwrap();
    for &key in second {
        tree.insert(key).unwrap();
    }

    let expected: Vec<Key> = keys.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
    assert_eq!(tree.leaf_chain().unwrap(), expected);
    tree.verify().unwrap();
}

#[test]
fn test_open_rejects_garbled_node() {
    let dir = tempdir().unwrap();
    let config = IndexConfig::with_branching_factor(4);
    {
        let mut tree = BPlusTree::create(dir.path(), "field", config, false).unwrap();
        for v in 0..20 {
            tree.insert(Key::new(v, 0)).unwrap();
        }
        tree.flush().unwrap();
    }

    // Overwrite the first node line with an unknown tag.
    let path = dir.path().join("tree");
    let mut bytes = fs::read(&path).unwrap();
    bytes[config.root_address() as usize] = b'X';
    fs::write(&path, bytes).unwrap();

    let mut tree = BPlusTree::open(dir.path(), "field", config, false).unwrap();
    assert!(tree.verify().is_err());
}
