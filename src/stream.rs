//! Async conversion.
//!
//! [`convert_async`] runs a conversion on a Tokio blocking thread and hands
//! back two halves: a [`ConversionFuture`] resolving to the finished
//! [`Conversion`], and a [`StatusStream`] of the phase messages and progress
//! snapshots reported along the way. The stream ends when the run does.
//!
//! # Example
//!
//! ```no_run
//! use tokio_stream::StreamExt;
//!
//! use vidgif::{Converter, QualityOptions, RunToken, StatusEvent};
//!
//! # async fn example() -> Result<(), vidgif::ConvertError> {
//! let (conversion, mut status) = vidgif::convert_async(
//!     Converter::new(),
//!     "clip.gif".into(),
//!     QualityOptions::default(),
//!     RunToken::detached(),
//! );
//!
//! while let Some(event) = status.next().await {
//!     if let StatusEvent::Phase { message, .. } = event {
//!         println!("{message}");
//!     }
//! }
//! let conversion = conversion.await?;
//! println!("{} bytes", conversion.output().len());
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::convert::{Conversion, Converter};
use crate::error::ConvertError;
use crate::options::QualityOptions;
use crate::progress::{ProgressCallback, ProgressInfo};
use crate::run::{RunPhase, RunToken};

/// One status report from a running conversion.
#[derive(Debug, Clone)]
pub enum StatusEvent {
    /// The run entered a new phase.
    Phase {
        /// Generation of the reporting run.
        generation: u64,
        /// The phase entered.
        phase: RunPhase,
        /// Status text for the phase.
        message: String,
    },
    /// A progress snapshot.
    Progress(ProgressInfo),
}

/// Status reports of one conversion, ending when the conversion does.
pub struct StatusStream {
    receiver: UnboundedReceiver<StatusEvent>,
}

impl Stream for StatusStream {
    type Item = StatusEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Resolves to the result of a conversion running on a blocking thread.
pub struct ConversionFuture {
    handle: JoinHandle<Result<Conversion, ConvertError>>,
}

impl Future for ConversionFuture {
    type Output = Result<Conversion, ConvertError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(|joined| {
            joined.unwrap_or_else(|error| Err(ConvertError::TaskFailed(error.to_string())))
        })
    }
}

/// Forwards every report to the channel and to the caller's own callback.
struct ChannelProgress {
    sender: UnboundedSender<StatusEvent>,
    inner: Arc<dyn ProgressCallback>,
}

impl ProgressCallback for ChannelProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        // A dropped stream only means nobody is listening.
        let _ = self.sender.send(StatusEvent::Progress(info.clone()));
        self.inner.on_progress(info);
    }

    fn on_phase(&self, generation: u64, phase: &RunPhase, message: &str) {
        let _ = self.sender.send(StatusEvent::Phase {
            generation,
            phase: *phase,
            message: message.to_string(),
        });
        self.inner.on_phase(generation, phase, message);
    }
}

/// Run `converter` on `path` without blocking the async runtime.
///
/// Must be called from within a Tokio runtime.
pub fn convert_async(
    converter: Converter,
    path: PathBuf,
    quality: QualityOptions,
    token: RunToken,
) -> (ConversionFuture, StatusStream) {
    let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
    let forwarding = Arc::new(ChannelProgress {
        sender,
        inner: converter.options().progress.clone(),
    });
    let options = converter.options().clone().with_progress(forwarding);
    let converter = converter.with_options(options);

    let handle = tokio::task::spawn_blocking(move || converter.run(&path, quality, &token));

    (ConversionFuture { handle }, StatusStream { receiver })
}

impl Converter {
    /// Run on a blocking thread, discarding status reports.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn run_async(
        &self,
        path: PathBuf,
        quality: QualityOptions,
        token: RunToken,
    ) -> ConversionFuture {
        let converter = self.clone();
        let handle = tokio::task::spawn_blocking(move || converter.run(&path, quality, &token));
        ConversionFuture { handle }
    }
}
