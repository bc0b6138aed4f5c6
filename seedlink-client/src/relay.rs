use seedlink4_protocol::{FrameFamily, SequenceNumber};
use tracing::{debug, info};

use crate::consumer::Consumer;
use crate::error::Result;
use crate::feeder::Feeder;

/// How [`relay`] re-publishes records.
#[derive(Clone, Copy, Debug)]
pub struct RelayOptions {
    /// Frame family written to the feeder.
    pub family: FrameFamily,
    /// Send every record with an undefined sequence so the downstream server
    /// numbers them itself.
    pub clear_sequence: bool,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            family: FrameFamily::Legacy,
            clear_sequence: false,
        }
    }
}

/// Copy records from a streaming `upstream` into a feeding `downstream`
/// until the upstream server closes the connection.
///
/// Returns the number of records relayed. The feeder is left open.
pub async fn relay(
    upstream: &mut Consumer,
    downstream: &mut Feeder,
    options: RelayOptions,
) -> Result<u64> {
    info!(family = %options.family, clear_sequence = options.clear_sequence, "relay started");
    let mut relayed = 0u64;

    while let Some(mut record) = upstream.next_record().await? {
        if options.clear_sequence {
            record.sequence = SequenceNumber::UNDEFINED;
        }
        downstream.send(&record, options.family).await?;
        relayed += 1;
        if relayed % 1000 == 0 {
            debug!(relayed, "relay progress");
        }
    }

    info!(relayed, "relay finished");
    Ok(relayed)
}
