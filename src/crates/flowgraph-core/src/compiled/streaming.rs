//! Streaming execution
//!
//! The run executes on a spawned task and forwards events through a bounded
//! channel. Sending waits when the channel is full, so a slow consumer slows
//! the run down instead of buffering without limit. Dropping the stream
//! cancels the run.

use super::graph::CompiledGraph;
use crate::config::RunConfig;
use crate::error::Result;
use crate::listener::{ListenerError, NodeListener};
use crate::state::State;
use crate::stream::{EventKind, EventStream, GraphEvent, StreamConfig, StreamMode};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Run listener forwarding events into the stream channel
struct ChannelListener<S> {
    tx: mpsc::Sender<GraphEvent<S>>,
    mode: StreamMode,
    cancel: CancellationToken,
}

#[async_trait]
impl<S: State> NodeListener<S> for ChannelListener<S> {
    async fn on_event(&self, event: &GraphEvent<S>) -> std::result::Result<(), ListenerError> {
        if !self.mode.accepts(event.kind) {
            return Ok(());
        }
        if self.tx.send(event.clone()).await.is_err() {
            tracing::debug!("stream consumer dropped, cancelling run");
            self.cancel.cancel();
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "stream"
    }
}

impl<S: State> CompiledGraph<S> {
    /// Stream every event of a fresh run
    ///
    /// # Example
    ///
    /// ```rust
    /// use flowgraph_core::{EventKind, StateGraph, END};
    /// use futures::StreamExt;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> flowgraph_core::Result<()> {
    /// let mut graph = StateGraph::<u32>::new();
    /// graph
    ///     .add_node("inc", "", |_ctx, n| async move { Ok(n + 1) })?
    ///     .add_edge("inc", END)?
    ///     .set_entry_point("inc");
    ///
    /// let kinds: Vec<EventKind> = graph
    ///     .compile()?
    ///     .stream(1)
    ///     .await?
    ///     .map(|event| event.kind)
    ///     .collect()
    ///     .await;
    ///
    /// assert_eq!(kinds.first(), Some(&EventKind::ChainStart));
    /// assert_eq!(kinds.last(), Some(&EventKind::ChainEnd));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn stream(&self, input: S) -> Result<EventStream<S>> {
        let config = StreamConfig::new().with_buffer_size(self.stream_buffer);
        self.stream_with_config(input, RunConfig::new(), config).await
    }

    /// Stream a run with per-run and stream configuration
    ///
    /// The stream ends after `ChainEnd`, which is also emitted when the run
    /// fails (with `error` set) or pauses.
    pub async fn stream_with_config(
        &self,
        input: S,
        mut config: RunConfig<S>,
        stream: StreamConfig,
    ) -> Result<EventStream<S>> {
        let (tx, mut rx) = mpsc::channel(stream.buffer_size.max(1));
        let cancel = match &config.cancel {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        config.cancel = Some(cancel.clone());
        config.listeners.push(Arc::new(ChannelListener {
            tx,
            mode: stream.mode,
            cancel: cancel.clone(),
        }));

        let graph = self.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = graph.invoke_with_config(input, config).await {
                tracing::debug!(error = %e, "streamed run ended with error");
            }
        });

        Ok(Box::pin(async_stream::stream! {
            let _cancel_on_drop = cancel.drop_guard();
            while let Some(event) = rx.recv().await {
                let done = event.kind == EventKind::ChainEnd;
                yield event;
                if done {
                    break;
                }
            }
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "streamed run task failed");
            }
        }))
    }
}
