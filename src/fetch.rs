use crate::error::{BenchError, BenchResult, TaskError};
use async_trait::async_trait;

/// Default row ceiling for [`FetchPolicy::All`]
pub const DEFAULT_MAX_FETCH_ROWS: u64 = 100_000_000;

/// How much of a result set each instance pulls to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPolicy {
    /// Move the cursor to the end without transferring rows
    None,
    /// Pull batches of up to `n` rows until an empty batch comes back
    Chunked(u64),
    /// Pull everything in one request, bounded by the row ceiling
    All,
}

impl FetchPolicy {
    /// Map a caller-supplied fetch size onto a policy
    ///
    /// `0` is [`FetchPolicy::None`], `-1` is [`FetchPolicy::All`] and any
    /// positive value is a chunk size.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::InvalidFetchSize`] for values below `-1`
    pub fn resolve(fetch_size: i64) -> BenchResult<Self> {
        match fetch_size {
            0 => Ok(Self::None),
            -1 => Ok(Self::All),
            n if n > 0 => Ok(Self::Chunked(n.unsigned_abs())),
            n => Err(BenchError::InvalidFetchSize(n)),
        }
    }

    /// Apply the policy to a blocking cursor
    ///
    /// Returns the number of rows pulled, or `None` when rows were skipped.
    ///
    /// # Errors
    ///
    /// Propagates the first cursor error
    pub fn drain<S: RowSource + ?Sized>(
        self,
        source: &mut S,
        max_rows: u64,
    ) -> Result<Option<u64>, TaskError> {
        match self {
            Self::None => {
                source.skip_remaining()?;
                Ok(None)
            }
            Self::Chunked(chunk_size) => {
                let mut total = 0;
                loop {
                    let batch = source.fetch(chunk_size)?;
                    if batch == 0 {
                        break;
                    }
                    total += batch;
                }
                Ok(Some(total))
            }
            Self::All => source.fetch(max_rows).map(Some),
        }
    }

    /// Apply the policy to a non-blocking cursor
    ///
    /// Same semantics as [`FetchPolicy::drain`]; every request is an await point.
    ///
    /// # Errors
    ///
    /// Propagates the first cursor error
    pub async fn drain_async<S: AsyncRowSource + ?Sized>(
        self,
        source: &mut S,
        max_rows: u64,
    ) -> Result<Option<u64>, TaskError> {
        match self {
            Self::None => {
                source.skip_remaining().await?;
                Ok(None)
            }
            Self::Chunked(chunk_size) => {
                let mut total = 0;
                loop {
                    let batch = source.fetch(chunk_size).await?;
                    if batch == 0 {
                        break;
                    }
                    total += batch;
                }
                Ok(Some(total))
            }
            Self::All => source.fetch(max_rows).await.map(Some),
        }
    }
}

/// Server-side cursor driven by a blocking driver
pub trait RowSource {
    /// Pull up to `max_rows` rows and return how many arrived
    ///
    /// # Errors
    ///
    /// Returns the driver error mapped into a [`TaskError`]
    fn fetch(&mut self, max_rows: u64) -> Result<u64, TaskError>;

    /// Advance to the end of the result set without materializing rows
    ///
    /// # Errors
    ///
    /// Returns the driver error mapped into a [`TaskError`]
    fn skip_remaining(&mut self) -> Result<(), TaskError>;
}

/// Server-side cursor driven by a non-blocking driver
#[async_trait]
pub trait AsyncRowSource: Send {
    async fn fetch(&mut self, max_rows: u64) -> Result<u64, TaskError>;

    async fn skip_remaining(&mut self) -> Result<(), TaskError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays a fixed sequence of batch sizes, then empty batches forever
    struct ScriptedCursor {
        batches: VecDeque<u64>,
        requests: Vec<u64>,
        skipped: bool,
    }

    impl ScriptedCursor {
        fn new(batches: &[u64]) -> Self {
            Self {
                batches: batches.iter().copied().collect(),
                requests: Vec::new(),
                skipped: false,
            }
        }
    }

    impl RowSource for ScriptedCursor {
        fn fetch(&mut self, max_rows: u64) -> Result<u64, TaskError> {
            self.requests.push(max_rows);
            Ok(self.batches.pop_front().unwrap_or(0).min(max_rows))
        }

        fn skip_remaining(&mut self) -> Result<(), TaskError> {
            self.skipped = true;
            self.batches.clear();
            Ok(())
        }
    }

    #[async_trait]
    impl AsyncRowSource for ScriptedCursor {
        async fn fetch(&mut self, max_rows: u64) -> Result<u64, TaskError> {
            RowSource::fetch(self, max_rows)
        }

        async fn skip_remaining(&mut self) -> Result<(), TaskError> {
            RowSource::skip_remaining(self)
        }
    }

    struct FailingCursor;

    impl RowSource for FailingCursor {
        fn fetch(&mut self, _max_rows: u64) -> Result<u64, TaskError> {
            Err(TaskError::statement(Some("57014".to_string()), "canceled"))
        }

        fn skip_remaining(&mut self) -> Result<(), TaskError> {
            Err(TaskError::statement(None, "canceled"))
        }
    }

    #[test]
    fn test_resolve_fetch_size() {
        assert_eq!(FetchPolicy::resolve(0).unwrap(), FetchPolicy::None);
        assert_eq!(FetchPolicy::resolve(-1).unwrap(), FetchPolicy::All);
        assert_eq!(FetchPolicy::resolve(1).unwrap(), FetchPolicy::Chunked(1));
        assert_eq!(
            FetchPolicy::resolve(5000).unwrap(),
            FetchPolicy::Chunked(5000)
        );
    }

    #[test]
    fn test_resolve_rejects_below_minus_one() {
        assert!(matches!(
            FetchPolicy::resolve(-2),
            Err(BenchError::InvalidFetchSize(-2))
        ));
        assert!(matches!(
            FetchPolicy::resolve(i64::MIN),
            Err(BenchError::InvalidFetchSize(i64::MIN))
        ));
    }

    #[test]
    fn test_chunked_stops_only_on_empty_batch() {
        // The short batch of 2 must not end the loop
        let mut cursor = ScriptedCursor::new(&[5, 2, 5, 1]);
        let rows = FetchPolicy::Chunked(5).drain(&mut cursor, 100).unwrap();

        assert_eq!(rows, Some(13));
        assert_eq!(cursor.requests, vec![5, 5, 5, 5, 5]);
    }

    #[test]
    fn test_chunked_confirms_exhaustion_after_short_final_batch() {
        let mut cursor = ScriptedCursor::new(&[3]);
        let rows = FetchPolicy::Chunked(10).drain(&mut cursor, 100).unwrap();

        assert_eq!(rows, Some(3));
        assert_eq!(cursor.requests.len(), 2);
    }

    #[test]
    fn test_chunked_empty_result_set() {
        let mut cursor = ScriptedCursor::new(&[]);
        let rows = FetchPolicy::Chunked(10).drain(&mut cursor, 100).unwrap();

        assert_eq!(rows, Some(0));
        assert_eq!(cursor.requests.len(), 1);
    }

    #[test]
    fn test_all_issues_single_bounded_request() {
        let mut cursor = ScriptedCursor::new(&[250, 250]);
        let rows = FetchPolicy::All.drain(&mut cursor, 1_000).unwrap();

        assert_eq!(rows, Some(250));
        assert_eq!(cursor.requests, vec![1_000]);
    }

    #[test]
    fn test_none_skips_without_counting() {
        let mut cursor = ScriptedCursor::new(&[10, 10]);
        let rows = FetchPolicy::None.drain(&mut cursor, 100).unwrap();

        assert_eq!(rows, None);
        assert!(cursor.skipped);
        assert!(cursor.requests.is_empty());
    }

    #[test]
    fn test_drain_propagates_cursor_error() {
        let err = FetchPolicy::Chunked(10)
            .drain(&mut FailingCursor, 100)
            .unwrap_err();
        assert_eq!(err.code(), Some("57014"));
        assert!(FetchPolicy::None.drain(&mut FailingCursor, 100).is_err());
    }

    #[tokio::test]
    async fn test_drain_async_matches_blocking_semantics() {
        let mut cursor = ScriptedCursor::new(&[4, 1, 4]);
        let rows = FetchPolicy::Chunked(4)
            .drain_async(&mut cursor, 100)
            .await
            .unwrap();

        assert_eq!(rows, Some(9));
        assert_eq!(cursor.requests.len(), 4);

        let mut cursor = ScriptedCursor::new(&[7]);
        let rows = FetchPolicy::All.drain_async(&mut cursor, 50).await.unwrap();
        assert_eq!(rows, Some(7));
    }
}
