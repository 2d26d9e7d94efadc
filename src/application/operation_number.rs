use crate::domain::ports::OperationCounterArc;
use crate::domain::transaction::OperationNumber;
use crate::error::Result;

/// Name of the durable counter behind operation numbers.
pub const OPERATION_COUNTER: &str = "operation-number";

/// Hands out operation numbers from one atomic counter increment each, so
/// concurrent callers never share or skip a value.
#[derive(Clone)]
pub struct OperationNumberIssuer {
    counter: OperationCounterArc,
}

impl OperationNumberIssuer {
    pub fn new(counter: OperationCounterArc) -> Self {
        Self { counter }
    }

    pub async fn next(&self) -> Result<OperationNumber> {
        let sequence = self.counter.increment(OPERATION_COUNTER).await?;
        OperationNumber::from_sequence(sequence)
    }

    /// The last number handed out, if any.
    pub async fn last(&self) -> Result<Option<OperationNumber>> {
        match self.counter.current(OPERATION_COUNTER).await? {
            0 => Ok(None),
            sequence => OperationNumber::from_sequence(sequence).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::transaction::MAX_OPERATION_SEQUENCE;
    use crate::error::LedgerError;
    use crate::infrastructure::in_memory::InMemoryCounter;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_numbers_are_sequential_and_padded() {
        let issuer = OperationNumberIssuer::new(Arc::new(InMemoryCounter::new()));
        assert!(issuer.last().await.unwrap().is_none());

        assert_eq!(issuer.next().await.unwrap().as_str(), "000000000001");
        assert_eq!(issuer.next().await.unwrap().as_str(), "000000000002");
        assert_eq!(issuer.last().await.unwrap().unwrap().as_str(), "000000000002");
    }

    #[tokio::test]
    async fn test_concurrent_callers_get_contiguous_distinct_numbers() {
        let start = 1_000;
        let issuer = OperationNumberIssuer::new(Arc::new(InMemoryCounter::starting_at(
            OPERATION_COUNTER,
            start,
        )));

        let handles: Vec<_> = (0..15)
            .map(|_| {
                let issuer = issuer.clone();
                tokio::spawn(async move { issuer.next().await.unwrap() })
            })
            .collect();

        let mut issued = BTreeSet::new();
        for handle in handles {
            assert!(issued.insert(handle.await.unwrap().sequence()));
        }

        let expected: BTreeSet<u64> = (start + 1..=start + 15).collect();
        assert_eq!(issued, expected);
    }

    #[tokio::test]
    async fn test_exhausted_counter_fails() {
        let issuer = OperationNumberIssuer::new(Arc::new(InMemoryCounter::starting_at(
            OPERATION_COUNTER,
            MAX_OPERATION_SEQUENCE,
        )));
        assert!(matches!(issuer.next().await, Err(LedgerError::CounterExhausted)));
    }
}
