//! Tests for opcode fusion.

#[cfg(test)]
#[allow(clippy::module_inception)]
mod tests {
    use alloy_primitives::U256;

    use crate::bytecode::memo_cache::ConstantMemoTable;
    use crate::bytecode::opcodes::Opcode;
    use crate::bytecode::optimizer::{fuse_bytecode, match_idiom, FusionEngine};

    const NOP: u8 = Opcode::Nop as u8;

    fn fuse(code: &[u8]) -> Vec<u8> {
        let memo = ConstantMemoTable::new();
        let (fused, _) = fuse_bytecode(code, &memo).expect("fusion should succeed");
        fused
    }

    #[test]
    fn test_shl_and_sub() {
        let memo = ConstantMemoTable::new();
        let code = [0x60, 5, 0x60, 3, 0x60, 2, 0x1B, 0x03, 0x00];

        let (fused, stats) = fuse_bytecode(&code, &memo).unwrap();

        assert_eq!(
            fused,
            vec![Opcode::ShlAndSub.to_byte(), 5, 3, 2, NOP, NOP, NOP, NOP, 0x00]
        );
        assert_eq!(memo.get(5, 3, 2), Some(U256::from(7)));
        assert_eq!(stats.shl_and_sub, 1);
        assert_eq!(stats.constants_memoized, 1);
        assert_eq!(stats.nops_written, 4);
        assert_eq!(stats.total_fusions(), 1);
    }

    #[test]
    fn test_shl_and_sub_address_mask() {
        // PUSH1 1 PUSH1 1 PUSH1 0xa0 SHL SUB builds the 160-bit address mask
        let memo = ConstantMemoTable::new();
        let code = [0x60, 0x01, 0x60, 0x01, 0x60, 0xA0, 0x1B, 0x03];

        fuse_bytecode(&code, &memo).unwrap();

        let mask = (U256::from(1) << 160usize) - U256::from(1);
        assert_eq!(memo.get(1, 1, 0xA0), Some(mask));
    }

    #[test]
    fn test_shl_and_sub_memo_written_once() {
        // The same constant appearing twice is memoized once
        let memo = ConstantMemoTable::new();
        let idiom = [0x60, 5, 0x60, 3, 0x60, 2, 0x1B, 0x03];
        let code: Vec<u8> = idiom.iter().chain(idiom.iter()).copied().collect();

        let (_, stats) = fuse_bytecode(&code, &memo).unwrap();

        assert_eq!(stats.shl_and_sub, 2);
        assert_eq!(stats.constants_memoized, 1);
        assert_eq!(memo.len(), 1);
    }

    #[test]
    fn test_five_byte_idioms() {
        assert_eq!(
            fuse(&[0x16, 0x90, 0x50, 0x91, 0x90]),
            vec![Opcode::AndSwap1PopSwap2Swap1.to_byte(), NOP, NOP, NOP, NOP]
        );
        // Jump target bytes stay in the middle of the span
        assert_eq!(
            fuse(&[0x15, 0x61, 0x12, 0x34, 0x57]),
            vec![Opcode::JumpIfZero.to_byte(), NOP, 0x12, 0x34, NOP]
        );
    }

    #[test]
    fn test_four_byte_stack_idioms() {
        assert_eq!(
            fuse(&[0x91, 0x90, 0x50, 0x56]),
            vec![Opcode::Swap2Swap1PopJump.to_byte(), NOP, NOP, NOP]
        );
        assert_eq!(
            fuse(&[0x90, 0x50, 0x91, 0x90]),
            vec![Opcode::Swap1PopSwap2Swap1.to_byte(), NOP, NOP, NOP]
        );
        assert_eq!(
            fuse(&[0x50, 0x91, 0x90, 0x50]),
            vec![Opcode::PopSwap2Swap1Pop.to_byte(), NOP, NOP, NOP]
        );
    }

    #[test]
    fn test_push_jump_idioms() {
        assert_eq!(
            fuse(&[0x61, 0xAB, 0xCD, 0x56]),
            vec![Opcode::Push2Jump.to_byte(), 0xAB, 0xCD, NOP]
        );
        assert_eq!(
            fuse(&[0x61, 0xAB, 0xCD, 0x57]),
            vec![Opcode::Push2JumpI.to_byte(), 0xAB, 0xCD, NOP]
        );
    }

    #[test]
    fn test_push1_idioms() {
        assert_eq!(
            fuse(&[0x60, 0x11, 0x60, 0x22]),
            vec![Opcode::Push1Push1.to_byte(), 0x11, NOP, 0x22]
        );
        assert_eq!(
            fuse(&[0x60, 0x07, 0x01]),
            vec![Opcode::Push1Add.to_byte(), 0x07, NOP]
        );
        assert_eq!(
            fuse(&[0x60, 0x07, 0x1B]),
            vec![Opcode::Push1Shl.to_byte(), 0x07, NOP]
        );
        assert_eq!(
            fuse(&[0x60, 0x07, 0x80]),
            vec![Opcode::Push1Dup1.to_byte(), 0x07, NOP]
        );
    }

    #[test]
    fn test_two_byte_idioms() {
        let cases: [([u8; 2], Opcode); 6] = [
            ([0x90, 0x50], Opcode::Swap1Pop),
            ([0x50, 0x56], Opcode::PopJump),
            ([0x50, 0x50], Opcode::Pop2),
            ([0x91, 0x90], Opcode::Swap2Swap1),
            ([0x91, 0x50], Opcode::Swap2Pop),
            ([0x81, 0x10], Opcode::Dup2LT),
        ];
        for (code, expected) in cases {
            assert_eq!(fuse(&code), vec![expected.to_byte(), NOP], "{}", expected);
        }
    }

    #[test]
    fn test_longest_match_wins() {
        // SWAP1 POP SWAP2 SWAP1 also starts with SWAP1 POP
        assert_eq!(match_idiom(&[0x90, 0x50, 0x91, 0x90]), Some(Opcode::Swap1PopSwap2Swap1));
        // The 8-byte idiom also starts with PUSH1 _ PUSH1 _
        assert_eq!(
            match_idiom(&[0x60, 5, 0x60, 3, 0x60, 2, 0x1B, 0x03]),
            Some(Opcode::ShlAndSub)
        );
        assert_eq!(match_idiom(&[0x90, 0x50, 0x91]), Some(Opcode::Swap1Pop));
    }

    #[test]
    fn test_short_window_falls_back() {
        // Missing SUB: the 8-byte idiom cannot match, shorter ones take over
        let code = [0x60, 5, 0x60, 3, 0x60, 2, 0x1B];
        assert_eq!(
            fuse(&code),
            vec![
                Opcode::Push1Push1.to_byte(),
                5,
                NOP,
                3,
                Opcode::Push1Shl.to_byte(),
                2,
                NOP
            ]
        );
    }

    #[test]
    fn test_push_data_is_not_fused() {
        // PUSH3 carries SWAP1 POP POP as literal data
        let code = [0x62, 0x90, 0x50, 0x50, 0x00];
        assert_eq!(fuse(&code), code.to_vec());

        // PUSH32 with idiom bytes in its payload
        let mut code = vec![0x7F];
        code.extend_from_slice(&[0x50; 32]);
        assert_eq!(fuse(&code), code);
    }

    #[test]
    fn test_truncated_push_at_end() {
        let code = [0x50, 0x7F, 0x90, 0x50];
        assert_eq!(fuse(&code), code.to_vec());
    }

    #[test]
    fn test_adjacent_idioms_do_not_overlap() {
        // POP POP POP: first pair fuses, the third POP stands alone
        assert_eq!(
            fuse(&[0x50, 0x50, 0x50]),
            vec![Opcode::Pop2.to_byte(), NOP, 0x50]
        );
    }

    #[test]
    fn test_empty_and_unknown() {
        assert!(fuse(&[]).is_empty());
        assert_eq!(fuse(&[0x00]), vec![0x00]);
        assert_eq!(fuse(&[0xEF, 0x0C, 0x21]), vec![0xEF, 0x0C, 0x21]);
    }

    #[test]
    fn test_jump_destination_offset_preserved() {
        // PUSH1 0x08 JUMP ... JUMPDEST at offset 8
        let code = [0x60, 0x08, 0x56, 0x90, 0x50, 0x50, 0x50, 0x00, 0x5B, 0x00];
        let fused = fuse(&code);
        assert_eq!(fused.len(), code.len());
        assert_eq!(fused[8], 0x5B);
        assert_eq!(fused[1], 0x08);
    }

    #[test]
    fn test_fusion_is_idempotent() {
        let code = [
            0x60, 0x01, 0x60, 0x01, 0x60, 0xA0, 0x1B, 0x03, // shl and sub
            0x16, 0x90, 0x50, 0x91, 0x90, // and swap1 pop swap2 swap1
            0x15, 0x61, 0x00, 0x20, 0x57, // jump if zero
            0x61, 0x00, 0x14, 0x56, // push2 jump
            0x60, 0x02, 0x01, // push1 add
            0x90, 0x50, // swap1 pop
            0x5B, 0x00,
        ];
        let once = fuse(&code);
        let twice = fuse(&once);
        assert_eq!(once, twice);
        assert_eq!(once.len(), code.len());
    }

    #[test]
    fn test_engine_stats_accumulate() {
        let memo = ConstantMemoTable::new();
        let mut engine = FusionEngine::new();

        engine.fuse(&[0x50, 0x50], &memo).unwrap();
        engine.fuse(&[0x60, 0x01, 0x01, 0x61, 0x00], &memo).unwrap();

        let stats = engine.stats();
        assert_eq!(stats.pop2, 1);
        assert_eq!(stats.push1_add, 1);
        assert_eq!(stats.total_fusions(), 2);
        assert_eq!(stats.bytes_scanned, 7);
        // PUSH2 at the end declares 2 data bytes but only 1 is present
        assert_eq!(stats.data_bytes_skipped, 1);
        assert_eq!(
            stats.by_idiom(),
            vec![(Opcode::Push1Add, 1), (Opcode::Pop2, 1)]
        );
    }

    #[test]
    fn test_stats_merge() {
        let memo = ConstantMemoTable::new();
        let (_, mut a) = fuse_bytecode(&[0x50, 0x50], &memo).unwrap();
        let (_, b) = fuse_bytecode(&[0x50, 0x50, 0x81, 0x10], &memo).unwrap();
        a.merge(&b);
        assert_eq!(a.pop2, 2);
        assert_eq!(a.dup2_lt, 1);
        assert_eq!(a.bytes_scanned, 6);
    }
}
