//! Downstream read API. No HTTP server
//! lives in the core — the spec marks the HTTP surface out of scope — but
//! the query logic it would serve reads the same rows C7/C8 produce, so
//! it is implemented and tested here as plain functions over `&dyn
//! Database`.

use bigdecimal::BigDecimal;
use serde::Serialize;

use crate::chain::ChainId;
use crate::db::Database;
use crate::decimal::zero;
use crate::epoch::Epoch;
use crate::error::ChainError;

/// One participation entry for `claims_for_address`.
#[derive(Debug, Clone, Serialize)]
pub struct Claim {
    pub epoch: Epoch,
    pub amount: BigDecimal,
    pub merkle_proofs: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClaimsForAddress {
    pub total_claimable: BigDecimal,
    pub claims: Vec<Claim>,
}

/// `entries-for-epoch(chainId, epoch)` — every sealed Participation row
/// for one `(chain, epoch)`.
pub async fn entries_for_epoch(
    db: &dyn Database,
    chain: ChainId,
    epoch: Epoch,
) -> Result<Vec<Claim>, ChainError> {
    let rows = db
        .participations_for_epoch(chain, epoch)
        .await
        .map_err(ChainError::DatabaseUnreachable)?;
    Ok(rows
        .into_iter()
        .filter(|p| p.is_completed)
        .map(|p| Claim {
            epoch,
            amount: p.refunded_amount_psp,
            merkle_proofs: p.merkle_proofs,
        })
        .collect())
}

/// `claims-for-address(chainId, address)` — every sealed Participation row
/// for one address across all epochs, summed into `totalClaimable`
///. The on-chain `claimStatus` bitmap filter the spec
/// describes is applied by the caller against the Merkle-redeem contract;
/// this function returns the full unfiltered claimable set since the
/// contract read is out of the core's scope.
pub async fn claims_for_address(
    db: &dyn Database,
    chain: ChainId,
    address: &str,
) -> Result<ClaimsForAddress, ChainError> {
    let rows = db
        .participations_for_address(chain, address)
        .await
        .map_err(ChainError::DatabaseUnreachable)?;

    let mut total_claimable = zero();
    let mut claims = Vec::with_capacity(rows.len());
    for p in rows.into_iter().filter(|p| p.is_completed) {
        total_claimable += &p.refunded_amount_psp;
        claims.push(Claim {
            epoch: p.epoch,
            amount: p.refunded_amount_psp,
            merkle_proofs: p.merkle_proofs,
        });
    }
    claims.sort_by_key(|c| c.epoch);

    Ok(ClaimsForAddress {
        total_claimable,
        claims,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Distribution, MemoryDatabase, Participation};

    async fn seed_sealed(db: &MemoryDatabase, chain: ChainId, epoch: Epoch, address: &str, amount: &str) {
        db.seal_epoch(
            Distribution {
                chain_id: chain,
                epoch,
                merkle_root: "0xroot".to_string(),
                total_psp_amount_to_refund: amount.parse().unwrap(),
                is_completed: true,
            },
            vec![Participation {
                chain_id: chain,
                epoch,
                address: address.to_string(),
                refunded_amount_psp: amount.parse().unwrap(),
                merkle_proofs: vec!["L:0xabc".to_string()],
                is_completed: true,
            }],
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn entries_for_epoch_returns_only_completed_rows() {
        let db = MemoryDatabase::new();
        seed_sealed(&db, ChainId::Mainnet, Epoch::new(1), "0xaddr", "100").await;

        let entries = entries_for_epoch(&db, ChainId::Mainnet, Epoch::new(1))
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].amount, BigDecimal::from(100));
    }

    #[tokio::test]
    async fn claims_for_address_sums_across_epochs() {
        let db = MemoryDatabase::new();
        seed_sealed(&db, ChainId::Mainnet, Epoch::new(1), "0xaddr", "100").await;
        seed_sealed(&db, ChainId::Mainnet, Epoch::new(2), "0xaddr", "50").await;
        seed_sealed(&db, ChainId::Mainnet, Epoch::new(1), "0xother", "999").await;

        let claims = claims_for_address(&db, ChainId::Mainnet, "0xaddr")
            .await
            .unwrap();
        assert_eq!(claims.total_claimable, BigDecimal::from(150));
        assert_eq!(claims.claims.len(), 2);
        assert_eq!(claims.claims[0].epoch, Epoch::new(1));
        assert_eq!(claims.claims[1].epoch, Epoch::new(2));
    }
}
