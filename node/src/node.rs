//! The node struct: wires queues, metrics and the pipeline worker together.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use quorum_consensus::ProcessState;
use quorum_messages::Message;
use quorum_network::{bounded, QueueReceiver, QueueSender};
use quorum_types::Hash;

use crate::config::NodeConfig;
use crate::metrics::NodeMetrics;
use crate::pipeline::{Inbound, Pipeline};
use crate::shutdown::ShutdownController;
use crate::NodeError;

/// Time the pipeline worker gets to finish after the shutdown signal.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// A running consensus node over chain state `S`.
///
/// Peers' frames go in through [`QuorumNode::inbound`]; everything the node
/// sends comes out of the outbound queue taken with
/// [`QuorumNode::take_outbound`]. Transport is the host's concern.
pub struct QuorumNode<S> {
    config: NodeConfig,
    metrics: Arc<NodeMetrics>,
    shutdown: ShutdownController,
    inbound: QueueSender<Inbound>,
    outbound_rx: Option<QueueReceiver<Message>>,
    worker: Option<JoinHandle<Pipeline<S>>>,
}

impl<S: ProcessState + Send + 'static> QuorumNode<S> {
    /// Build the queues and start the pipeline worker on the current tokio
    /// runtime.
    ///
    /// Configured checkpoints are loaded into `state`. Fails on an unusable
    /// signing key or checkpoint table, or when the configured identity
    /// disagrees with the chain state's.
    pub fn start(config: NodeConfig, mut state: S) -> Result<Self, NodeError> {
        let keypair = config.keypair()?;
        let checkpoints = config.checkpoint_table()?;
        let checkpoint_count = checkpoints.len();
        // An empty table leaves the state's own checkpoints in place.
        if !checkpoints.is_empty() {
            state.load_checkpoints(checkpoints);
        }
        let identity = state.identity_chain_id();
        if config.identity_chain_id != Hash::ZERO && config.identity_chain_id != identity {
            return Err(NodeError::Config(format!(
                "identity_chain_id {} does not match chain state identity {identity}",
                config.identity_chain_id
            )));
        }

        let (inbound, inbound_rx) = bounded("inbound", config.inbound_queue_capacity);
        let (outbound, outbound_rx) = bounded("outbound", config.outbound_queue_capacity);
        let metrics = Arc::new(NodeMetrics::new());
        let shutdown = ShutdownController::new();

        let pipeline = Pipeline::new(
            &config,
            state,
            keypair,
            inbound.clone(),
            outbound,
            Arc::clone(&metrics),
        );
        let worker = pipeline.spawn(inbound_rx, shutdown.subscribe());
        info!(
            network = ?config.network,
            identity = %identity,
            checkpoints = checkpoint_count,
            "consensus node started"
        );

        Ok(Self {
            config,
            metrics,
            shutdown,
            inbound,
            outbound_rx: Some(outbound_rx),
            worker: Some(worker),
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<NodeMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Sender for frames received from peers.
    pub fn inbound(&self) -> QueueSender<Inbound> {
        self.inbound.clone()
    }

    /// The outbound queue. Only the first call returns it.
    pub fn take_outbound(&mut self) -> Option<QueueReceiver<Message>> {
        self.outbound_rx.take()
    }

    pub fn shutdown_controller(&self) -> &ShutdownController {
        &self.shutdown
    }

    /// Signal shutdown and wait for the pipeline worker, handing back the
    /// pipeline with its final chain state.
    pub async fn stop(&mut self) -> Result<Pipeline<S>, NodeError> {
        info!("consensus node stopping");
        self.shutdown.shutdown();
        let Some(worker) = self.worker.take() else {
            return Err(NodeError::NotRunning);
        };
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, worker).await {
            Ok(Ok(pipeline)) => {
                info!("consensus node stopped");
                Ok(pipeline)
            }
            Ok(Err(e)) => Err(NodeError::Worker(e.to_string())),
            Err(_) => {
                warn!(timeout = ?SHUTDOWN_TIMEOUT, "pipeline worker did not stop in time");
                Err(NodeError::ShutdownTimeout)
            }
        }
    }
}
