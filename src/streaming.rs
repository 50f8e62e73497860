//! Server-sent event framing for streamed model responses

use crate::error::ModelError;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::{Stream, StreamExt};
use std::fmt;

/// Turn a raw byte stream into the `data` payloads of its server-sent events.
///
/// Multi-line `data:` fields of one event arrive joined with `\n`. Comments,
/// empty events and the `[DONE]` sentinel are dropped. Transport errors pass
/// through; framing errors become `MalformedResponse`.
pub fn data_payloads<S, B, E>(stream: S) -> impl Stream<Item = Result<String, ModelError>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<ModelError> + fmt::Display,
{
    stream.eventsource().filter_map(|event| async move {
        match event {
            Ok(event) => {
                if event.data.is_empty() || event.data == "[DONE]" {
                    None
                } else {
                    Some(Ok(event.data))
                }
            }
            Err(EventStreamError::Transport(err)) => Some(Err(err.into())),
            Err(err) => Some(Err(ModelError::MalformedResponse(err.to_string()))),
        }
    })
}
