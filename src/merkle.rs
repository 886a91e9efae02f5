//! Merkle Builder. Produces one Merkle root per
//! `(chain, epoch)` over aggregated per-address entitlements, bit-exact
//! with the on-chain leaf encoding: `keccak256(address ‖
//! amount-as-ASCII-decimal)`.
//!
//! Address iteration order is otherwise unconstrained, so this
//! implementation orders addresses lexicographically for reproducibility
//! across runs and database engines; see DESIGN.md.

use std::collections::BTreeMap;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;

use crate::chain::ChainId;
use crate::db::{Database, Distribution, GasRefundTransaction, Participation};
use crate::decimal::{amount_ascii_bytes, zero};
use crate::epoch::Epoch;
use crate::error::{ChainError, RunError};

/// One sealed `(chain, epoch)` Merkle tree: root plus per-address proofs.
#[derive(Debug, Clone)]
pub struct MerkleResult {
    pub root: String,
    pub total_psp_amount_to_refund: BigDecimal,
    pub per_address: Vec<(String, BigDecimal, Vec<String>)>,
}

/// A malformed address can never legitimately reach this stage (it would
/// already be rejected upstream), so failing to decode it here is a
/// fatal-to-run error rather than a silent substitution — the leaf
/// encoding must stay bit-exact for on-chain compatibility.
fn leaf_hash(address: &str, amount: &BigInt) -> Result<[u8; 32], RunError> {
    let address_bytes =
        hex::decode(address.trim_start_matches("0x")).map_err(|_| RunError::MalformedAddress {
            address: address.to_string(),
        })?;
    let mut preimage = address_bytes;
    preimage.extend(amount_ascii_bytes(amount));
    Ok(keccak_hash::keccak(preimage).0)
}

fn node_hash(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut preimage = Vec::with_capacity(64);
    preimage.extend_from_slice(left);
    preimage.extend_from_slice(right);
    keccak_hash::keccak(preimage).0
}

fn to_hex(bytes: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Aggregates `VALIDATED` rows by address, builds the tree, and returns
/// the root plus a proof per address. Fails if any address can't be
/// decoded as hex — the leaf encoding must stay bit-exact, so a corrupted
/// address is a fatal-to-run error, never a silently-wrong leaf.
pub fn build(rows: &[GasRefundTransaction]) -> Result<MerkleResult, RunError> {
    let mut by_address: BTreeMap<String, BigDecimal> = BTreeMap::new();
    for row in rows {
        let entry = by_address.entry(row.address.clone()).or_insert_with(zero);
        *entry += &row.refunded_amount_psp;
    }

    let addresses: Vec<String> = by_address.keys().cloned().collect();
    let leaves: Vec<[u8; 32]> = addresses
        .iter()
        .map(|addr| {
            let amount = &by_address[addr];
            let (digits, _) = crate::decimal::floor_to_integer(amount).into_bigint_and_exponent();
            leaf_hash(addr, &digits)
        })
        .collect::<Result<Vec<_>, RunError>>()?;

    if leaves.is_empty() {
        return Ok(MerkleResult {
            root: to_hex(&[0u8; 32]),
            total_psp_amount_to_refund: zero(),
            per_address: Vec::new(),
        });
    }

    // Build the tree level by level, recording each level so proofs can be
    // derived by walking leaf -> root.
    let mut levels: Vec<Vec<[u8; 32]>> = vec![leaves.clone()];
    while levels.last().unwrap().len() > 1 {
        let current = levels.last().unwrap();
        let mut next = Vec::with_capacity(current.len().div_ceil(2));
        let mut i = 0;
        while i < current.len() {
            if i + 1 < current.len() {
                next.push(node_hash(&current[i], &current[i + 1]));
            } else {
                next.push(current[i]);
            }
            i += 2;
        }
        levels.push(next);
    }

    let root = levels.last().unwrap()[0];

    let per_address = addresses
        .iter()
        .enumerate()
        .map(|(index, addr)| {
            let proof = proof_for_leaf(&levels, index);
            (addr.clone(), by_address[addr].clone(), proof)
        })
        .collect();

    let total = by_address.values().fold(zero(), |acc, v| acc + v);

    Ok(MerkleResult {
        root: to_hex(&root),
        total_psp_amount_to_refund: total,
        per_address,
    })
}

/// Each entry is `"L:0x.."` / `"R:0x.."` — the sibling hash plus which
/// side it sits on, so a verifier can fold the proof without needing the
/// leaf's original tree index.
fn proof_for_leaf(levels: &[Vec<[u8; 32]>], leaf_index: usize) -> Vec<String> {
    let mut proof = Vec::new();
    let mut index = leaf_index;
    for level in &levels[..levels.len() - 1] {
        let is_left = index % 2 == 0;
        let sibling_index = if is_left { index + 1 } else { index - 1 };
        if let Some(sibling) = level.get(sibling_index) {
            let side = if is_left { "R" } else { "L" };
            proof.push(format!("{side}:{}", to_hex(sibling)));
        }
        index /= 2;
    }
    proof
}

/// Recomputes the root a leaf's proof folds up to, for verification
/// (used by tests and by the downstream claim API before trusting a
/// proof against a published root).
pub fn verify(leaf: [u8; 32], proof: &[String]) -> [u8; 32] {
    let mut computed = leaf;
    for entry in proof {
        let (side, hex_hash) = entry.split_once(':').expect("proof entries are side:hash");
        let sibling_bytes = hex::decode(hex_hash.trim_start_matches("0x")).expect("valid hex");
        let mut sibling = [0u8; 32];
        sibling.copy_from_slice(&sibling_bytes);
        computed = match side {
            "R" => node_hash(&computed, &sibling),
            "L" => node_hash(&sibling, &computed),
            _ => unreachable!("proof side is always L or R"),
        };
    }
    computed
}

/// Builds and persists the `(chain, epoch)` Distribution and its
/// Participation rows.
pub async fn seal_epoch(
    db: &dyn Database,
    chain: ChainId,
    epoch: Epoch,
) -> Result<(), ChainError> {
    let rows = db
        .validated_rows_for_epoch(chain, epoch)
        .await
        .map_err(ChainError::DatabaseUnreachable)?;
    let result = build(&rows)?;

    let distribution = Distribution {
        chain_id: chain,
        epoch,
        merkle_root: result.root,
        total_psp_amount_to_refund: result.total_psp_amount_to_refund,
        is_completed: true,
    };
    let participations = result
        .per_address
        .into_iter()
        .map(|(address, amount, proof)| Participation {
            chain_id: chain,
            epoch,
            address,
            refunded_amount_psp: amount,
            merkle_proofs: proof,
            is_completed: true,
        })
        .collect();

    db.seal_epoch(distribution, participations)
        .await
        .map_err(ChainError::DatabaseUnreachable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TransactionStatus;
    use std::str::FromStr;

    fn row(address: &str, amount_psp: &str) -> GasRefundTransaction {
        GasRefundTransaction {
            id: 0,
            chain_id: ChainId::Mainnet,
            epoch: Epoch::new(1),
            hash: "0x1".to_string(),
            address: address.to_string(),
            timestamp: 0,
            block_number: 0,
            gas_used: 0,
            gas_used_chain_currency: zero(),
            psp_chain_currency: zero(),
            psp_usd: zero(),
            chain_currency_usd: zero(),
            total_stake_amount_psp: zero(),
            refunded_amount_psp: BigDecimal::from_str(amount_psp).unwrap(),
            refunded_amount_usd: zero(),
            status: TransactionStatus::Validated,
        }
    }

    #[test]
    fn aggregates_multiple_rows_per_address() {
        let rows = vec![
            row("1111111111111111111111111111111111111111", "100"),
            row("1111111111111111111111111111111111111111", "50"),
            row("2222222222222222222222222222222222222222", "25"),
        ];
        let result = build(&rows).unwrap();
        assert_eq!(result.total_psp_amount_to_refund, BigDecimal::from(175));
        assert_eq!(result.per_address.len(), 2);
    }

    #[test]
    fn every_leaf_proof_validates_against_the_root() {
        let rows = vec![
            row("1111111111111111111111111111111111111111", "100"),
            row("2222222222222222222222222222222222222222", "200"),
            row("3333333333333333333333333333333333333333", "300"),
        ];
        let result = build(&rows).unwrap();

        for (address, amount, proof) in &result.per_address {
            let (digits, _) = crate::decimal::floor_to_integer(amount).into_bigint_and_exponent();
            let leaf = leaf_hash(address, &digits).unwrap();
            let computed_root = verify(leaf, proof);
            assert_eq!(to_hex(&computed_root), result.root);
        }
    }

    #[test]
    fn empty_row_set_produces_zero_root() {
        let result = build(&[]).unwrap();
        assert_eq!(result.total_psp_amount_to_refund, zero());
        assert!(result.per_address.is_empty());
    }

    #[test]
    fn malformed_address_is_fatal_not_a_silent_zero_leaf() {
        let rows = vec![row("not-valid-hex", "100")];
        let result = build(&rows);
        assert!(matches!(result, Err(RunError::MalformedAddress { .. })));
    }
}
