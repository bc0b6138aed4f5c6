use futures_core::Stream;
use seedlink4_protocol::Record;

use crate::Consumer;
use crate::error::ClientError;

/// Convert a streaming [`Consumer`] into a [`Stream`] of records.
///
/// The consumer must be in the `Streaming` state (after
/// [`data()`](Consumer::data)). The stream yields `Ok(Record)` per frame and
/// terminates with `None` when the server closes the connection.
pub fn record_stream(mut consumer: Consumer) -> impl Stream<Item = Result<Record, ClientError>> {
    async_stream::try_stream! {
        while let Some(record) = consumer.next_record().await? {
            yield record;
        }
    }
}
