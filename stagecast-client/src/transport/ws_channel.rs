use crate::error::{ConnectError, SignalingError, TransportError};
use crate::transport::{Connection, Connector, MessageChannel, TransportEvent};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use stagecast_core::SignalMessage;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Opens WebSocket signaling connections.
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, endpoint: &str) -> Result<Connection, SignalingError> {
        info!("Opening signaling channel to {}", endpoint);

        let (ws_stream, _) = connect_async(endpoint).await.map_err(connect_error)?;
        let (mut sender, mut receiver) = ws_stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));

        let send_task = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if let Err(e) = sender.send(msg).await {
                    warn!("Failed to write to signaling socket: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
            let _ = sender.close().await;
        });

        let recv_task = tokio::spawn({
            let open = open.clone();

            async move {
                let terminal = loop {
                    match receiver.next().await {
                        Some(Ok(Message::Text(text))) => {
                            if event_tx
                                .send(TransportEvent::Text(text.as_str().to_owned()))
                                .is_err()
                            {
                                debug!("Signaling events receiver dropped, stopping reader");
                                break None;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            debug!("Relay closed the signaling socket: {:?}", frame);
                            break Some(TransportEvent::Closed);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => break Some(TransportEvent::Failed(e.to_string())),
                        None => break Some(TransportEvent::Closed),
                    }
                };

                open.store(false, Ordering::SeqCst);
                if let Some(terminal) = terminal {
                    let _ = event_tx.send(terminal);
                }
            }
        });

        let channel = WsChannel {
            endpoint: endpoint.to_owned(),
            outbound: outbound_tx,
            open,
            tasks: Mutex::new(Some((send_task, recv_task))),
        };

        Ok(Connection {
            channel: Arc::new(channel),
            events: event_rx,
        })
    }
}

pub struct WsChannel {
    endpoint: String,
    outbound: mpsc::UnboundedSender<Message>,
    open: Arc<AtomicBool>,
    tasks: Mutex<Option<(JoinHandle<()>, JoinHandle<()>)>>,
}

#[async_trait]
impl MessageChannel for WsChannel {
    async fn send(&self, message: &SignalMessage) -> Result<(), SignalingError> {
        if !self.is_open() {
            return Err(TransportError::NotOpen.into());
        }

        let json = message
            .encode()
            .map_err(|e| TransportError::Encode(e.to_string()))?;

        self.outbound
            .send(Message::Text(json.into()))
            .map_err(|_| TransportError::NotOpen)?;
        Ok(())
    }

    async fn close(&self) {
        let Some((mut send_task, recv_task)) = self.tasks.lock().await.take() else {
            return;
        };

        self.open.store(false, Ordering::SeqCst);
        recv_task.abort();

        // The writer flushes anything already queued, then the close frame.
        let _ = self.outbound.send(Message::Close(None));
        if timeout(CLOSE_FLUSH_TIMEOUT, &mut send_task).await.is_err() {
            warn!("Signaling writer for {} did not flush in time", self.endpoint);
            send_task.abort();
        }

        info!("Signaling channel to {} closed", self.endpoint);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

fn connect_error(e: WsError) -> SignalingError {
    let err = match e {
        WsError::Url(e) => ConnectError::InvalidEndpoint(e.to_string()),
        WsError::Io(e) => ConnectError::Unreachable(e.to_string()),
        WsError::Http(response) => ConnectError::Rejected(format!("HTTP {}", response.status())),
        other => ConnectError::Rejected(other.to_string()),
    };
    err.into()
}
