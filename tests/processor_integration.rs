//! End-to-end tests for the optimization processor
//!
//! Drives the public API the way an interpreter and a state layer would:
//! requests on deploy and call, loads on execution, flushes on code change.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use alloy_primitives::{Address, Bytes, U256};
use opfusion::bytecode::cache::CodeCache;
use opfusion::{
    fuse_bytecode, CodeIdentity, ConstantMemoTable, EvictionKind, OpcodeProcessor,
    OptimizerConfig, OptimizerError,
};

const WAIT: Duration = Duration::from_secs(10);

fn enabled(workers: usize) -> OpcodeProcessor {
    OpcodeProcessor::new(
        OptimizerConfig::default()
            .with_workers(workers)
            .with_queue_capacity(1024)
            .with_enabled(true),
    )
}

fn contract(n: u8) -> (CodeIdentity, Bytes) {
    // PUSH1 n PUSH1 3 PUSH1 2 SHL SUB POP POP STOP
    let code = Bytes::from(vec![0x60, n, 0x60, 0x03, 0x60, 0x02, 0x1B, 0x03, 0x50, 0x50, 0x00]);
    let identity = CodeIdentity::from_code(Address::repeat_byte(n), &code);
    (identity, code)
}

#[test]
fn test_background_result_matches_direct_fusion() {
    let processor = enabled(4);
    let contracts: Vec<_> = (0..32).map(contract).collect();

    for (identity, code) in &contracts {
        processor.request_optimize(*identity, code.clone());
    }
    assert!(processor.wait_idle(WAIT));

    let memo = ConstantMemoTable::new();
    for (identity, code) in &contracts {
        let loaded = processor.load(identity).expect("optimized code cached");
        let (direct, _) = fuse_bytecode(code, &memo).unwrap();
        assert_eq!(&loaded[..], direct.as_slice());
    }

    let stats = processor.stats();
    assert_eq!(stats.tasks_processed, 32);
    assert_eq!(stats.compilations, 32);
    assert_eq!(stats.fusion.shl_and_sub, 32);
    assert_eq!(stats.fusion.pop2, 32);
    assert_eq!(stats.memo.entries, 32);
}

#[test]
fn test_memoized_values_for_every_contract() {
    let processor = enabled(2);
    for n in 0..8u8 {
        let (identity, code) = contract(n);
        processor.compile_sync(identity, &code).unwrap();
        // (3 << 2) - n
        assert_eq!(
            processor.shl_and_sub_value(n, 3, 2),
            Some(U256::from(12u64).wrapping_sub(U256::from(n)))
        );
    }
}

#[test]
fn test_disabled_processor_is_inert() {
    let processor = OpcodeProcessor::new(
        OptimizerConfig::default()
            .with_workers(2)
            .with_queue_capacity(16),
    );
    let (identity, code) = contract(1);

    processor.request_optimize(identity, code.clone());
    processor.rewrite_for_storage(identity, code.clone());
    processor.invalidate(identity);
    assert!(processor.wait_idle(WAIT));

    assert!(processor.load(&identity).is_none());
    assert_eq!(
        processor.compile_sync(identity, &code),
        Err(OptimizerError::Disabled)
    );
    assert_eq!(processor.shl_and_sub_value(1, 3, 2), None);

    let stats = processor.stats();
    assert_eq!(stats.tasks_submitted, 2);
    assert_eq!(stats.tasks_skipped_disabled, 2);
    assert_eq!(stats.compilations, 0);
    assert!(stats.cache.is_none());
}

#[test]
fn test_flush_then_regenerate_per_identity() {
    let processor = enabled(4);
    let contracts: Vec<_> = (0..16).map(contract).collect();

    for (identity, code) in &contracts {
        processor.request_optimize(*identity, code.clone());
        processor.invalidate(*identity);
        processor.request_optimize(*identity, code.clone());
    }
    assert!(processor.wait_idle(WAIT));

    // Last task per identity was a generate
    for (identity, _) in &contracts {
        assert!(processor.load(identity).is_some());
    }

    for (identity, _) in &contracts {
        processor.invalidate(*identity);
    }
    assert!(processor.wait_idle(WAIT));
    for (identity, _) in &contracts {
        assert!(processor.load(identity).is_none());
    }
}

#[test]
fn test_redeployed_code_gets_new_entry() {
    let processor = enabled(2);
    let address = Address::repeat_byte(0xAA);
    let old_code = [0x50, 0x50, 0x00];
    let new_code = [0x90, 0x50, 0x00];
    let old_id = CodeIdentity::from_code(address, &old_code);
    let new_id = CodeIdentity::from_code(address, &new_code);

    processor.compile_sync(old_id, &old_code).unwrap();
    assert!(processor.load(&new_id).is_none());

    let (fused, hit) = processor.get_or_compile(new_id, &new_code).unwrap();
    assert!(!hit);
    assert_ne!(fused, processor.load(&old_id).unwrap());
}

#[test]
fn test_full_clear_under_small_limits() {
    // Evicts once size + 16 > 64, i.e. above 48 cached bytes
    let processor = OpcodeProcessor::new(
        OptimizerConfig::default()
            .with_workers(1)
            .with_queue_capacity(1)
            .with_cache_limits(64, 16)
            .with_enabled(true),
    );
    for n in 0..6u8 {
        let (identity, code) = contract(n);
        processor.compile_sync(identity, &code).unwrap();
    }

    // 11-byte bodies: the sixth insert sees 55 + 16 > 64 and clears
    let cache_stats = processor.stats().cache.unwrap();
    assert_eq!(cache_stats.eviction_rounds, 1);
    assert_eq!(cache_stats.entries, 1);
    assert_eq!(cache_stats.size_bytes, 11);

    let (last, _) = contract(5);
    assert!(processor.load(&last).is_some());
}

#[test]
fn test_lru_under_small_limits() {
    let processor = OpcodeProcessor::new(
        OptimizerConfig::default()
            .with_workers(1)
            .with_queue_capacity(1)
            .with_cache_limits(64, 16)
            .with_eviction(EvictionKind::Lru)
            .with_enabled(true),
    );
    for n in 0..6u8 {
        let (identity, code) = contract(n);
        processor.compile_sync(identity, &code).unwrap();
        // Contract 0 stays hot
        let (hot, _) = contract(0);
        assert!(processor.load(&hot).is_some());
    }

    let cache = processor.cache().unwrap();
    assert_eq!(cache.policy_name(), "lru");
    // The sixth insert drops the two least recent entries to fit 48 bytes
    assert_eq!(cache.size_bytes(), 44);
    let (hot, _) = contract(0);
    assert!(cache.contains(&hot));
    assert!(!cache.contains(&contract(1).0));
    assert!(!cache.contains(&contract(2).0));
    assert!(cache.contains(&contract(5).0));
}

#[test]
fn test_toggle_while_tasks_queued() {
    let processor = Arc::new(enabled(2));
    let contracts: Vec<_> = (0..64).map(contract).collect();

    let toggler = {
        let processor = Arc::clone(&processor);
        thread::spawn(move || {
            for _ in 0..50 {
                processor.disable();
                processor.enable();
            }
        })
    };
    for (identity, code) in &contracts {
        processor.request_optimize(*identity, code.clone());
    }
    toggler.join().unwrap();
    assert!(processor.wait_idle(WAIT));
    assert!(processor.is_enabled());

    // Every cached entry is the correct fusion of its code
    let cache: &Arc<CodeCache> = processor.cache().unwrap();
    let memo = ConstantMemoTable::new();
    for (identity, code) in &contracts {
        if let Some(cached) = cache.get(identity) {
            let (direct, _) = fuse_bytecode(code, &memo).unwrap();
            assert_eq!(&cached[..], direct.as_slice());
        }
    }

    let stats = processor.stats();
    assert_eq!(stats.tasks_processed, 64);
    assert_eq!(
        stats.compilations + stats.tasks_skipped_disabled,
        64,
        "each task either compiled or was skipped"
    );
}

#[test]
fn test_concurrent_compile_and_load() {
    let processor = Arc::new(enabled(2));
    let handles: Vec<_> = (0..8u8)
        .map(|t| {
            let processor = Arc::clone(&processor);
            thread::spawn(move || {
                for n in 0..16u8 {
                    let (identity, code) = contract(t.wrapping_mul(16).wrapping_add(n));
                    let (fused, _) = processor.get_or_compile(identity, &code).unwrap();
                    assert_eq!(processor.load(&identity), Some(fused));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(processor.cache().unwrap().len(), 128);
}

#[test]
fn test_racing_compiles_of_same_code_agree() {
    let processor = Arc::new(enabled(2));
    let (identity, code) = contract(7);
    let start = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let processor = Arc::clone(&processor);
            let start = Arc::clone(&start);
            let code = code.clone();
            thread::spawn(move || {
                start.wait();
                processor.compile_sync(identity, &code).unwrap()
            })
        })
        .collect();
    let results: Vec<Bytes> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for fused in &results[1..] {
        assert_eq!(fused, &results[0]);
    }
    assert_eq!(processor.load(&identity).as_ref(), Some(&results[0]));

    let cache = processor.cache().unwrap();
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.size_bytes(), code.len() as u64);

    // (3 << 2) - 7, stored once whoever won
    assert_eq!(processor.shl_and_sub_value(7, 3, 2), Some(U256::from(5)));
    assert_eq!(processor.memo().len(), 1);
}
