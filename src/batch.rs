//! Bulk reads and writes through BatchGetItem and BatchWriteItem.
//!
//! Work is sent in chunks of at most [`BATCH_GET_LIMIT`] keys or
//! [`BATCH_WRITE_LIMIT`] write requests. After each call the store may hand back
//! part of the chunk as unprocessed; the request's [`ContinuationPolicy`] receives
//! the work not yet sent plus those leftovers and returns the next work list. The
//! loop ends when that list is empty.
//!
//! The default policy, [`RetryUnprocessed`], re-queues every leftover and never
//! gives up. Against a table that keeps throttling it loops forever, so callers
//! that need a bound supply their own policy:
//!
//! ```rust,no_run
//! # use dynamo_mapper::mapper::Mapper;
//! # use dynamo_mapper::batch::Backoff;
//! # use aws_sdk_dynamodb::types::WriteRequest;
//! # use std::time::Duration;
//! # async fn example<T: dynamo_mapper::schema::Record>(mapper: Mapper<T>, items: Vec<T>) -> Result<(), dynamo_mapper::Error> {
//! let mut passes = 0;
//! let output = mapper
//!     .batch_save(&items)
//!     .policy(move |mut remaining: Vec<WriteRequest>, unprocessed: Vec<WriteRequest>| {
//!         passes += 1;
//!         if passes <= 5 {
//!             remaining.extend(unprocessed);
//!         }
//!         remaining
//!     })
//!     .backoff(Backoff::new(Duration::from_millis(100), Duration::from_secs(2)))
//!     .send()
//!     .await?;
//! println!("{} of {} written", output.processed, items.len());
//! # Ok(())
//! # }
//! ```
//!
//! Batch writes are plain puts and deletes: no version conditions and no
//! generated timestamps.

use aws_sdk_dynamodb::types::{self, KeysAndAttributes, WriteRequest};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::attribute::Key;
use crate::error::Error;
use crate::expression::{ExpressionBuilder, Projection, compose};
use crate::mapper::{Mapper, observe};
use crate::schema::Record;

/// Most keys one BatchGetItem call may carry
pub const BATCH_GET_LIMIT: usize = 100;

/// Most write requests one BatchWriteItem call may carry
pub const BATCH_WRITE_LIMIT: usize = 25;

/// Decides what to send next after a chunk comes back partially processed
pub trait ContinuationPolicy<W>: Send {
    /// `remaining` was never sent; `unprocessed` was sent and bounced
    fn next(&mut self, remaining: Vec<W>, unprocessed: Vec<W>) -> Vec<W>;
}

impl<W, F> ContinuationPolicy<W> for F
where
    F: FnMut(Vec<W>, Vec<W>) -> Vec<W> + Send,
{
    fn next(&mut self, remaining: Vec<W>, unprocessed: Vec<W>) -> Vec<W> {
        self(remaining, unprocessed)
    }
}

/// Append unprocessed work to the queue and keep going
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryUnprocessed;

impl<W> ContinuationPolicy<W> for RetryUnprocessed {
    fn next(&mut self, mut remaining: Vec<W>, unprocessed: Vec<W>) -> Vec<W> {
        remaining.extend(unprocessed);
        remaining
    }
}

/// Exponential delay before a call that follows a partially processed chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay after the first partially processed chunk
    pub initial: Duration,
    /// Upper bound for any single delay
    pub max: Duration,
}

impl Backoff {
    /// Doubling delays from `initial`, capped at `max`
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    /// Delay for the `attempt`-th consecutive partial chunk, 0-based
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(2000),
        }
    }
}

/// Result of one chunk call
pub(crate) struct Chunk<W, O> {
    pub(crate) unprocessed: Vec<W>,
    pub(crate) output: O,
}

/// Run `work` through `execute` in chunks of `limit` until the policy returns
/// an empty list. Returns every chunk's output and the number of calls made.
pub(crate) async fn drive<W, O, E, Fut, P>(
    operation: &'static str,
    mut work: Vec<W>,
    limit: usize,
    policy: &mut P,
    backoff: Option<Backoff>,
    mut execute: E,
) -> Result<(Vec<O>, usize), Error>
where
    E: FnMut(Vec<W>) -> Fut,
    Fut: Future<Output = Result<Chunk<W, O>, Error>>,
    P: ContinuationPolicy<W> + ?Sized,
{
    let limit = limit.max(1);
    let mut outputs = Vec::new();
    let mut calls = 0;
    let mut partial_streak = 0u32;

    while !work.is_empty() {
        if let Some(backoff) = backoff {
            if partial_streak > 0 {
                sleep(backoff.delay(partial_streak - 1)).await;
            }
        }

        let remaining = work.split_off(limit.min(work.len()));
        let sent = work.len();
        calls += 1;

        let Chunk {
            unprocessed,
            output,
        } = execute(work).await?;
        outputs.push(output);

        if unprocessed.is_empty() {
            partial_streak = 0;
        } else {
            warn!(
                operation,
                sent,
                unprocessed = unprocessed.len(),
                "batch chunk returned unprocessed items"
            );
            partial_streak = partial_streak.saturating_add(1);
        }

        work = policy.next(remaining, unprocessed);
    }

    debug!(operation, calls, "batch finished");
    Ok((outputs, calls))
}

/// Table every item of a batch targets
fn target_table<T: Record>(mapper: &Mapper<T>, items: &[T]) -> Result<String, Error> {
    if mapper.has_table_override() {
        return Ok(mapper.table_name().to_string());
    }
    let Some(first) = items.first() else {
        return Ok(mapper.table_name().to_string());
    };
    let expected = first.table_name();
    for (index, item) in items.iter().enumerate().skip(1) {
        if item.table_name() != expected {
            return Err(Error::MixedTables {
                index,
                expected: expected.to_string(),
                found: item.table_name().to_string(),
            });
        }
    }
    Ok(expected.to_string())
}

/// Output of [`BatchLoadRequest::send`]
#[must_use = "batch load results carry the loaded items"]
#[derive(Debug)]
pub struct BatchLoadOutput<T> {
    /// Items found, in no particular order; missing keys are skipped
    pub items: Vec<T>,
    /// BatchGetItem calls made
    pub calls: usize,
}

/// Output of [`BatchWriteRequest::send`]
#[must_use = "batch write results report how many items were processed"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchWriteOutput {
    /// Write requests the store processed
    pub processed: usize,
    /// BatchWriteItem calls made
    pub calls: usize,
}

/// Load items by the keys of `items`
pub struct BatchLoadRequest<'a, T: Record, P = RetryUnprocessed> {
    mapper: &'a Mapper<T>,
    items: &'a [T],
    policy: P,
    backoff: Option<Backoff>,
    consistent_read: Option<bool>,
    projection: Option<Projection>,
}

impl<'a, T: Record, P: ContinuationPolicy<Key>> BatchLoadRequest<'a, T, P> {
    /// Replace the continuation policy
    pub fn policy<Q: ContinuationPolicy<Key>>(self, policy: Q) -> BatchLoadRequest<'a, T, Q> {
        BatchLoadRequest {
            mapper: self.mapper,
            items: self.items,
            policy,
            backoff: self.backoff,
            consistent_read: self.consistent_read,
            projection: self.projection,
        }
    }

    /// Sleep between calls while chunks keep coming back partial
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Strongly consistent reads
    pub fn consistent_read(mut self, consistent_read: bool) -> Self {
        self.consistent_read = Some(consistent_read);
        self
    }

    /// Only return the given attribute path; may be called repeatedly
    pub fn projection(mut self, path: impl Into<String>) -> Self {
        self.projection = Some(compose::add_names(
            self.projection.take(),
            path,
            std::iter::empty::<String>(),
        ));
        self
    }

    /// Target table and the key of every item, validated before any call
    fn work(&self) -> Result<(String, Vec<Key>), Error> {
        let table = target_table(self.mapper, self.items)?;
        let keys = self
            .items
            .iter()
            .map(|item| self.mapper.schema().key(item))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((table, keys))
    }

    /// Load every item, re-queueing unprocessed keys through the policy.
    ///
    /// Each chunk's items are decoded as the chunk arrives. An item that cannot
    /// be decoded fails the load at that chunk and no further keys are requested.
    pub async fn send(mut self) -> Result<BatchLoadOutput<T>, Error> {
        let (table, keys) = self.work()?;
        if keys.is_empty() {
            return Ok(BatchLoadOutput {
                items: Vec::new(),
                calls: 0,
            });
        }

        let expr = match self.projection.take() {
            Some(projection) => Some(ExpressionBuilder::new().with_projection(projection).build()?),
            None => None,
        };
        let mapper = self.mapper;
        let client = mapper.client();
        let consistent_read = self.consistent_read;

        let (pages, calls) = drive(
            "BatchGetItem",
            keys,
            BATCH_GET_LIMIT,
            &mut self.policy,
            self.backoff,
            |keys| {
                let table = table.clone();
                let request = KeysAndAttributes::builder()
                    .set_keys(Some(keys))
                    .set_consistent_read(consistent_read)
                    .set_projection_expression(expr.as_ref().and_then(|e| e.projection.clone()))
                    .set_expression_attribute_names(expr.as_ref().and_then(|e| e.attribute_names()))
                    .build();
                async move {
                    let result = client
                        .batch_get_item()
                        .request_items(table.clone(), request?)
                        .send()
                        .await
                        .map_err(Error::from);
                    let output = observe("BatchGetItem", Some(&table), result)?;

                    let loaded = output
                        .responses
                        .and_then(|mut responses| responses.remove(&table))
                        .unwrap_or_default()
                        .into_iter()
                        .map(|item| mapper.unmarshal(item))
                        .collect::<Result<Vec<_>, _>>()?;
                    let unprocessed = output
                        .unprocessed_keys
                        .and_then(|mut unprocessed| unprocessed.remove(&table))
                        .map(|request| request.keys)
                        .unwrap_or_default();
                    Ok::<_, Error>(Chunk {
                        unprocessed,
                        output: loaded,
                    })
                }
            },
        )
        .await?;

        let items = pages.into_iter().flatten().collect();
        Ok(BatchLoadOutput { items, calls })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteKind {
    Put,
    Delete,
}

/// Put or delete `items` without optimistic locking
pub struct BatchWriteRequest<'a, T: Record, P = RetryUnprocessed> {
    mapper: &'a Mapper<T>,
    items: &'a [T],
    kind: WriteKind,
    policy: P,
    backoff: Option<Backoff>,
}

impl<'a, T: Record, P: ContinuationPolicy<WriteRequest>> BatchWriteRequest<'a, T, P> {
    /// Replace the continuation policy
    pub fn policy<Q: ContinuationPolicy<WriteRequest>>(
        self,
        policy: Q,
    ) -> BatchWriteRequest<'a, T, Q> {
        BatchWriteRequest {
            mapper: self.mapper,
            items: self.items,
            kind: self.kind,
            policy,
            backoff: self.backoff,
        }
    }

    /// Sleep between calls while chunks keep coming back partial
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Target table and one write request per item, validated before any call
    fn work(&self) -> Result<(String, Vec<WriteRequest>), Error> {
        let table = target_table(self.mapper, self.items)?;
        let requests = self
            .items
            .iter()
            .map(|item| -> Result<WriteRequest, Error> {
                match self.kind {
                    WriteKind::Put => {
                        let put = types::PutRequest::builder()
                            .set_item(Some(self.mapper.marshal(item)?))
                            .build()?;
                        Ok(WriteRequest::builder().put_request(put).build())
                    }
                    WriteKind::Delete => {
                        let delete = types::DeleteRequest::builder()
                            .set_key(Some(self.mapper.schema().key(item)?))
                            .build()?;
                        Ok(WriteRequest::builder().delete_request(delete).build())
                    }
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok((table, requests))
    }

    /// Write every item, re-queueing unprocessed requests through the policy
    pub async fn send(mut self) -> Result<BatchWriteOutput, Error> {
        let (table, requests) = self.work()?;
        let client = self.mapper.client();

        let (processed, calls) = drive(
            "BatchWriteItem",
            requests,
            BATCH_WRITE_LIMIT,
            &mut self.policy,
            self.backoff,
            |requests| {
                let table = table.clone();
                let sent = requests.len();
                async move {
                    let result = client
                        .batch_write_item()
                        .request_items(table.clone(), requests)
                        .send()
                        .await
                        .map_err(Error::from);
                    let output = observe("BatchWriteItem", Some(&table), result)?;

                    let unprocessed = output
                        .unprocessed_items
                        .and_then(|mut unprocessed| unprocessed.remove(&table))
                        .unwrap_or_default();
                    Ok::<_, Error>(Chunk {
                        output: sent.saturating_sub(unprocessed.len()),
                        unprocessed,
                    })
                }
            },
        )
        .await?;

        Ok(BatchWriteOutput {
            processed: processed.into_iter().sum(),
            calls,
        })
    }
}

impl<T: Record> Mapper<T> {
    /// BatchGetItem by the keys of `items`
    pub fn batch_load<'a>(&'a self, items: &'a [T]) -> BatchLoadRequest<'a, T> {
        BatchLoadRequest {
            mapper: self,
            items,
            policy: RetryUnprocessed,
            backoff: None,
            consistent_read: None,
            projection: None,
        }
    }

    /// BatchWriteItem puts of `items`
    pub fn batch_save<'a>(&'a self, items: &'a [T]) -> BatchWriteRequest<'a, T> {
        self.batch_write(items, WriteKind::Put)
    }

    /// BatchWriteItem deletes by the keys of `items`
    pub fn batch_delete<'a>(&'a self, items: &'a [T]) -> BatchWriteRequest<'a, T> {
        self.batch_write(items, WriteKind::Delete)
    }

    fn batch_write<'a>(&'a self, items: &'a [T], kind: WriteKind) -> BatchWriteRequest<'a, T> {
        BatchWriteRequest {
            mapper: self,
            items,
            kind,
            policy: RetryUnprocessed,
            backoff: None,
        }
    }
}
