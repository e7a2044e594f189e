#![allow(clippy::expect_used, clippy::unwrap_used)]
//! Property tests: random edit sequences keep the archive layout valid

use std::collections::BTreeMap;

use potato_bundle::{Bundle, BundleError, MemoryStore};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Create { slot: u8, data: Vec<u8>, code: u32 },
    Overwrite { slot: u8, data: Vec<u8> },
    Rename { slot: u8, to: u8 },
    Move { slot: u8, to: u8, overwrite: bool },
    Delete { slot: u8 },
}

fn path(slot: u8) -> String {
    format!("\\dir{}\\file{slot}.bin", slot % 3)
}

fn name(slot: u8) -> String {
    format!("file{slot}.bin")
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let data = prop::collection::vec(any::<u8>(), 0..512);
    let code = prop::sample::select(vec![0u32, 1, 2, 4]);
    prop_oneof![
        3 => (0u8..8, data.clone(), code).prop_map(|(slot, data, code)| Op::Create { slot, data, code }),
        2 => (0u8..8, data).prop_map(|(slot, data)| Op::Overwrite { slot, data }),
        1 => (0u8..8, 0u8..8).prop_map(|(slot, to)| Op::Rename { slot, to }),
        1 => (0u8..8, 0u8..8, any::<bool>()).prop_map(|(slot, to, overwrite)| Op::Move { slot, to, overwrite }),
        2 => (0u8..8).prop_map(|slot| Op::Delete { slot }),
    ]
}

/// Apply one operation to the bundle and to the expected contents
fn apply(bundle: &Bundle<MemoryStore>, model: &mut BTreeMap<String, Vec<u8>>, op: &Op) {
    match op {
        Op::Create { slot, data, code } => {
            let p = path(*slot);
            let result = bundle.create(data, &p, *code, false);
            if model.contains_key(&p) {
                assert!(matches!(result, Err(BundleError::AlreadyExists(_))));
            } else {
                result.expect("create");
                model.insert(p, data.clone());
            }
        }
        Op::Overwrite { slot, data } => {
            let p = path(*slot);
            let result = bundle.overwrite(&p, data);
            if model.contains_key(&p) {
                result.expect("overwrite");
                model.insert(p, data.clone());
            } else {
                assert!(matches!(result, Err(BundleError::NotFound(_))));
            }
        }
        Op::Rename { slot, to } => {
            let p = path(*slot);
            let result = bundle.rename(&p, &name(*to));
            // Renaming keeps the folder of the source
            let target = format!("\\dir{}\\{}", slot % 3, name(*to));
            if !model.contains_key(&p) {
                assert!(matches!(result, Err(BundleError::NotFound(_))));
            } else if model.contains_key(&target) {
                assert!(matches!(result, Err(BundleError::AlreadyExists(_))));
            } else {
                result.expect("rename");
                let data = model.remove(&p).expect("source");
                model.insert(target, data);
            }
        }
        Op::Move { slot, to, overwrite } => {
            let p = path(*slot);
            let target = path(*to);
            let result = bundle.move_file(&p, &target, *overwrite);
            if !model.contains_key(&p) {
                assert!(matches!(result, Err(BundleError::NotFound(_))));
            } else if p == target {
                result.expect("move onto itself");
            } else if model.contains_key(&target) && !overwrite {
                assert!(matches!(result, Err(BundleError::AlreadyExists(_))));
            } else {
                result.expect("move");
                let data = model.remove(&p).expect("source");
                model.insert(target, data);
            }
        }
        Op::Delete { slot } => {
            let p = path(*slot);
            let result = bundle.delete(&p);
            if model.remove(&p).is_some() {
                result.expect("delete");
            } else {
                assert!(matches!(result, Err(BundleError::NotFound(_))));
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn edit_sequences_keep_layout_valid(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let bundle = Bundle::in_memory().expect("bundle");
        let mut model = BTreeMap::new();

        for op in &ops {
            apply(&bundle, &mut model, op);

            let report = bundle.verify();
            prop_assert!(report.is_valid(), "after {:?}: {}", op, report);

            let header = bundle.header();
            let payloads: u64 = bundle
                .records()
                .iter()
                .map(|record| u64::from(record.compressed_size))
                .sum();
            prop_assert_eq!(
                u64::from(header.file_size),
                32 + u64::from(header.index_size) + payloads
            );
        }

        let mut listed = bundle.list_files();
        listed.sort();
        prop_assert_eq!(listed, model.keys().cloned().collect::<Vec<_>>());
        for (path, data) in &model {
            prop_assert_eq!(&bundle.read_all(path).expect("read"), data);
        }

        let store = bundle.into_store();
        let reopened = Bundle::from_store(store).expect("reopen");
        prop_assert!(reopened.verify().is_valid());
        prop_assert_eq!(reopened.len(), model.len());
    }
}
