//! Property tests for the fundamental types.

use lattice_types::{Account, Amount, Block, BlockHash, BlockType, Signature};
use proptest::prelude::*;

fn arbitrary_block() -> impl Strategy<Value = Block> {
    (
        any::<[u8; 32]>(),
        any::<[u8; 32]>(),
        any::<[u8; 32]>(),
        any::<u128>(),
        any::<[u8; 32]>(),
    )
        .prop_map(|(account, previous, representative, balance, link)| {
            let mut block = Block {
                block_type: BlockType::State,
                account: Account::new(account),
                previous: BlockHash::new(previous),
                representative: Account::new(representative),
                balance: Amount::raw(balance),
                destination: Account::ZERO,
                link: BlockHash::new(link),
                work: 0,
                signature: Signature::ZERO,
                sideband: None,
                hash: BlockHash::ZERO,
            };
            block.hash = block.compute_hash();
            block
        })
}

proptest! {
    #[test]
    fn partitions_are_consecutive_and_ordered(count in 1u64..=64) {
        let mut previous_end = Account::ZERO;
        for i in 0..count {
            let (start, end) = Account::range_bounds(i, count);
            prop_assert_eq!(start, previous_end);
            prop_assert!(start < end);
            previous_end = end;
        }
        prop_assert_eq!(previous_end, Account::MAX);
    }

    #[test]
    fn every_account_falls_in_exactly_one_partition(
        bytes in any::<[u8; 32]>(),
        count in 1u64..=16,
    ) {
        let account = Account::new(bytes);
        let mut containing = 0;
        for i in 0..count {
            let (start, end) = Account::range_bounds(i, count);
            // The final range is closed at MAX, all others half-open.
            let inside = if i == count - 1 {
                account >= start && account <= end
            } else {
                account >= start && account < end
            };
            if inside {
                containing += 1;
            }
        }
        prop_assert_eq!(containing, 1);
    }

    #[test]
    fn block_hash_is_deterministic(block in arbitrary_block()) {
        prop_assert_eq!(block.hash, block.compute_hash());
    }

    #[test]
    fn hash_display_is_64_hex_chars(bytes in any::<[u8; 32]>()) {
        let rendered = BlockHash::new(bytes).to_string();
        prop_assert_eq!(rendered.len(), 64);
        prop_assert!(rendered.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
