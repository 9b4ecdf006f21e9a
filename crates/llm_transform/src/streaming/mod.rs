//! Pull-based stream transcoding.
//!
//! A vendor stream is decoded into canonical chunks by a per-format decoder
//! and re-encoded into another vendor's events by a per-format encoder. Both
//! are [`StreamBuffer`] state machines driven by [`TranscodeStream`], which
//! only pulls from upstream when its output queue is empty.

pub mod aggregator;
pub mod anthropic;
pub mod gemini;
pub mod openai;
pub mod responses;

use std::collections::VecDeque;

use crate::apis::sse::SseEvent;
use crate::canonical::Response;
use crate::errors::TransformError;

pub use aggregator::ResponseAggregator;

/// Canonical chunks; ends with [`Response::done`] on a clean finish.
pub type CanonicalStream<'a> = Box<dyn Iterator<Item = Result<Response, TransformError>> + Send + 'a>;

/// Vendor SSE events, parsed or ready for the wire.
pub type SseStream<'a> = Box<dyn Iterator<Item = Result<SseEvent, TransformError>> + Send + 'a>;

/// A streaming state machine that turns each input into zero or more outputs.
pub trait StreamBuffer {
    type Input;
    type Output;

    /// Feed one upstream item, queueing whatever it produces.
    fn add_event(
        &mut self,
        input: Self::Input,
        out: &mut VecDeque<Self::Output>,
    ) -> Result<(), TransformError>;

    /// Upstream is exhausted; flush anything still open. Called once.
    fn finish(&mut self, out: &mut VecDeque<Self::Output>) -> Result<(), TransformError>;
}

/// Iterator adapter that drives a [`StreamBuffer`] over an upstream iterator.
///
/// The first error, from upstream or from the buffer, is yielded and ends
/// the stream.
pub struct TranscodeStream<I, B>
where
    B: StreamBuffer,
{
    upstream: I,
    buffer: B,
    queue: VecDeque<B::Output>,
    finished: bool,
}

impl<I, B> TranscodeStream<I, B>
where
    I: Iterator<Item = Result<B::Input, TransformError>>,
    B: StreamBuffer,
{
    pub fn new(upstream: I, buffer: B) -> Self {
        TranscodeStream {
            upstream,
            buffer,
            queue: VecDeque::new(),
            finished: false,
        }
    }

    pub fn buffer(&self) -> &B {
        &self.buffer
    }
}

impl<I, B> Iterator for TranscodeStream<I, B>
where
    I: Iterator<Item = Result<B::Input, TransformError>>,
    B: StreamBuffer,
{
    type Item = Result<B::Output, TransformError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(output) = self.queue.pop_front() {
                return Some(Ok(output));
            }
            if self.finished {
                return None;
            }
            let step = match self.upstream.next() {
                Some(Ok(input)) => self.buffer.add_event(input, &mut self.queue),
                Some(Err(err)) => Err(err),
                None => {
                    self.finished = true;
                    self.buffer.finish(&mut self.queue)
                }
            };
            if let Err(err) = step {
                self.finished = true;
                self.queue.clear();
                return Some(Err(err));
            }
        }
    }
}

/// Runs `buffer` over a finished list of inputs, collecting every output.
pub fn run_to_end<B>(buffer: &mut B, inputs: impl IntoIterator<Item = B::Input>) -> Result<Vec<B::Output>, TransformError>
where
    B: StreamBuffer,
{
    let mut queue = VecDeque::new();
    for input in inputs {
        buffer.add_event(input, &mut queue)?;
    }
    buffer.finish(&mut queue)?;
    Ok(queue.into_iter().collect())
}

/// Lifts a plain SSE event iterator into a fallible stream.
pub fn sse_stream<'a, I>(events: I) -> SseStream<'a>
where
    I: IntoIterator<Item = SseEvent>,
    I::IntoIter: Send + 'a,
{
    Box::new(events.into_iter().map(Ok))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Emits each input twice and a trailing marker on finish.
    struct Doubler;

    impl StreamBuffer for Doubler {
        type Input = u32;
        type Output = u32;

        fn add_event(&mut self, input: u32, out: &mut VecDeque<u32>) -> Result<(), TransformError> {
            if input == 13 {
                return Err(TransformError::internal("unlucky"));
            }
            out.push_back(input);
            out.push_back(input);
            Ok(())
        }

        fn finish(&mut self, out: &mut VecDeque<u32>) -> Result<(), TransformError> {
            out.push_back(0);
            Ok(())
        }
    }

    #[test]
    fn test_transcode_drains_queue_then_finishes_once() {
        let stream = TranscodeStream::new(vec![Ok(1), Ok(2)].into_iter(), Doubler);
        let out: Vec<u32> = stream.map(Result::unwrap).collect();
        assert_eq!(out, vec![1, 1, 2, 2, 0]);
    }

    #[test]
    fn test_error_terminates_stream() {
        let mut stream = TranscodeStream::new(vec![Ok(1), Ok(13), Ok(2)].into_iter(), Doubler);
        assert_eq!(stream.next().unwrap().unwrap(), 1);
        assert_eq!(stream.next().unwrap().unwrap(), 1);
        assert!(stream.next().unwrap().is_err());
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_upstream_error_passes_through() {
        let upstream = vec![Err(TransformError::invalid_request("bad")), Ok(1)].into_iter();
        let mut stream = TranscodeStream::new(upstream, Doubler);
        assert!(matches!(stream.next(), Some(Err(TransformError::InvalidRequest(_)))));
        assert!(stream.next().is_none());
    }
}
