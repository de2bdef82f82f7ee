//! Fee models and change distribution
//!
//! The solver runs in two passes at most: size is estimated with
//! worst-case unlocking lengths, the remainder after fee and fixed
//! outputs is spread across change outputs, and any change output that
//! would receive nothing is dropped before a single re-solve. A second
//! failure is an error, never a silent loss of value.

use async_trait::async_trait;
use rand::Rng;

use crate::transaction::{Transaction, TransactionError, TransactionResult};

/// Computes the fee a transaction should pay.
#[async_trait]
pub trait FeeModel: Send + Sync {
    async fn compute_fee(&self, tx: &Transaction) -> TransactionResult<u64>;
}

/// Rate-based model: satoshis per 1000 bytes, rounded up.
#[derive(Debug, Clone)]
pub struct SatoshisPerKilobyte {
    pub value: u64,
}

impl SatoshisPerKilobyte {
    pub fn new(value: u64) -> Self {
        Self { value }
    }
}

impl Default for SatoshisPerKilobyte {
    fn default() -> Self {
        Self { value: 1 }
    }
}

#[async_trait]
impl FeeModel for SatoshisPerKilobyte {
    async fn compute_fee(&self, tx: &Transaction) -> TransactionResult<u64> {
        let size = tx.estimated_size()? as u64;
        Ok((size * self.value).div_ceil(1000))
    }
}

/// Fixed fee regardless of size.
#[derive(Debug, Clone)]
pub struct FixedFee {
    pub satoshis: u64,
}

impl FixedFee {
    pub fn new(satoshis: u64) -> Self {
        Self { satoshis }
    }
}

#[async_trait]
impl FeeModel for FixedFee {
    async fn compute_fee(&self, _tx: &Transaction) -> TransactionResult<u64> {
        Ok(self.satoshis)
    }
}

/// How the remainder is spread across change outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeDistribution {
    /// Integer-equal shares; the sub-share residual goes to the fee.
    #[default]
    Equal,
    /// A random partition summing exactly to the remainder.
    Random,
}

/// Resolve change outputs and seal output amounts.
pub(crate) async fn solve(
    tx: &mut Transaction,
    model: &dyn FeeModel,
    distribution: ChangeDistribution,
) -> TransactionResult<()> {
    for attempt in 0..2 {
        let change_indices: Vec<usize> = tx
            .outputs
            .iter()
            .enumerate()
            .filter(|(_, o)| o.satoshis.is_none())
            .map(|(i, _)| i)
            .collect();

        let fee = model.compute_fee(tx).await?;

        let mut available: u64 = 0;
        for (i, input) in tx.inputs.iter().enumerate() {
            available += input
                .source_satoshis()
                .ok_or(TransactionError::UnresolvedSource(i))?;
        }
        let fixed: u64 = tx.outputs.iter().filter_map(|o| o.satoshis).sum();
        let needed = fixed + fee;
        if available < needed {
            return Err(TransactionError::InsufficientFunds { needed, available });
        }
        let remainder = available - needed;

        if change_indices.is_empty() {
            // any excess simply raises the fee
            return Ok(());
        }

        let shares = match distribution {
            ChangeDistribution::Equal => equal_shares(remainder, change_indices.len()),
            ChangeDistribution::Random => random_shares(remainder, change_indices.len()),
        };

        if shares.iter().all(|&s| s > 0) {
            for (&idx, &share) in change_indices.iter().zip(shares.iter()) {
                tx.outputs[idx].satoshis = Some(share);
            }
            return Ok(());
        }

        if attempt > 0 {
            break;
        }

        // drop the starved outputs, highest index first, and re-solve
        let mut to_remove: Vec<usize> = change_indices
            .iter()
            .zip(shares.iter())
            .filter(|(_, &s)| s == 0)
            .map(|(&i, _)| i)
            .collect();
        to_remove.sort_unstable_by(|a, b| b.cmp(a));
        for idx in to_remove {
            tx.outputs.remove(idx);
        }
    }

    Err(TransactionError::FeeSolverDidNotConverge)
}

fn equal_shares(remainder: u64, n: usize) -> Vec<u64> {
    let share = remainder / n as u64;
    vec![share; n]
}

/// Random non-zero partition of `remainder` into `n` shares summing
/// exactly to `remainder`. When the remainder cannot cover one satoshi
/// per output the tail shares are zero, which the caller drops.
fn random_shares(remainder: u64, n: usize) -> Vec<u64> {
    let n64 = n as u64;
    if remainder < n64 {
        let mut shares = vec![1u64; remainder as usize];
        shares.resize(n, 0);
        return shares;
    }

    let mut rng = rand::thread_rng();
    let mut shares = vec![1u64; n];
    let mut left = remainder - n64;
    for share in shares.iter_mut().take(n - 1) {
        let take = rng.gen_range(0..=left);
        *share += take;
        left -= take;
    }
    shares[n - 1] += left;
    shares
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_shares() {
        assert_eq!(equal_shares(2999, 1), vec![2999]);
        assert_eq!(equal_shares(10, 3), vec![3, 3, 3]); // residual 1 to fee
        assert_eq!(equal_shares(2, 3), vec![0, 0, 0]);
    }

    #[test]
    fn test_random_shares_sum_exactly() {
        for n in 1..=6usize {
            for remainder in [n as u64, 100, 7919] {
                let shares = random_shares(remainder, n);
                assert_eq!(shares.len(), n);
                assert_eq!(shares.iter().sum::<u64>(), remainder);
                assert!(shares.iter().all(|&s| s >= 1));
            }
        }
    }

    #[test]
    fn test_random_shares_starved() {
        let shares = random_shares(2, 4);
        assert_eq!(shares.iter().sum::<u64>(), 2);
        assert_eq!(shares.iter().filter(|&&s| s == 0).count(), 2);
    }
}
