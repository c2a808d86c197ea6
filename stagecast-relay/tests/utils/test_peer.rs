use anyhow::{Context, Result, bail};
use futures::{SinkExt, StreamExt};
use stagecast_core::{IceCandidate, SignalMessage};
use stagecast_relay::{RelayConfig, RelayState, bind};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// Timeout for a message to cross the relay (ms).
pub const SIGNAL_TIMEOUT_MS: u64 = 5000;

/// How long to wait before concluding nothing was routed (ms).
pub const SILENCE_MS: u64 = 200;

/// Starts a relay on an ephemeral port, returning its signaling URL.
pub async fn start_relay() -> Result<(String, RelayState)> {
    let server = bind(&RelayConfig::new("127.0.0.1:0")).await?;
    let addr = server.local_addr()?;
    let state = server.state().clone();

    tokio::spawn(async move {
        if let Err(e) = server.run().await {
            tracing::error!("[TestRelay] {:#}", e);
        }
    });

    Ok((format!("ws://{}/signal", addr), state))
}

/// A raw WebSocket participant speaking the wire protocol by hand.
pub struct TestPeer {
    pub name: String,
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestPeer {
    pub async fn connect(url: &str, name: &str) -> Result<Self> {
        let (ws, _) = connect_async(url)
            .await
            .with_context(|| format!("Failed to connect {} to {}", name, url))?;
        Ok(Self {
            name: name.to_owned(),
            ws,
        })
    }

    /// Connects and sends `join` for `room` using the peer name as id.
    pub async fn joined(url: &str, room: &str, name: &str) -> Result<Self> {
        let mut peer = Self::connect(url, name).await?;
        peer.send(&SignalMessage::Join {
            room: room.into(),
            id: name.into(),
        })
        .await?;
        Ok(peer)
    }

    pub async fn send(&mut self, message: &SignalMessage) -> Result<()> {
        self.send_raw(&message.encode()?).await
    }

    pub async fn send_raw(&mut self, text: &str) -> Result<()> {
        tracing::debug!("[TestPeer {}] -> {}", self.name, text);
        self.ws
            .send(Message::Text(text.into()))
            .await
            .context("Failed to send frame")
    }

    pub async fn offer(&mut self, sdp: &str) -> Result<()> {
        self.send(&SignalMessage::Offer { sdp: sdp.into() }).await
    }

    pub async fn answer(&mut self, sdp: &str) -> Result<()> {
        self.send(&SignalMessage::Answer { sdp: sdp.into() }).await
    }

    pub async fn candidate(&mut self, candidate: &str) -> Result<()> {
        self.send(&SignalMessage::Candidate {
            candidate: IceCandidate::new(candidate),
        })
        .await
    }

    pub async fn leave(&mut self) -> Result<()> {
        self.send(&SignalMessage::Leave).await
    }

    /// Next signaling message routed to this peer.
    pub async fn recv(&mut self) -> Result<SignalMessage> {
        let deadline = Duration::from_millis(SIGNAL_TIMEOUT_MS);
        loop {
            let frame = tokio::time::timeout(deadline, self.ws.next())
                .await
                .with_context(|| format!("{} timed out waiting for a message", self.name))?;

            match frame {
                Some(Ok(Message::Text(text))) => {
                    let text = text.as_str();
                    tracing::debug!("[TestPeer {}] <- {}", self.name, text);
                    return SignalMessage::decode(text)
                        .with_context(|| format!("Relay sent an invalid frame: {}", text));
                }
                Some(Ok(Message::Close(_))) | None => bail!("{} was disconnected", self.name),
                Some(Ok(_)) => continue,
                Some(Err(e)) => bail!("{} socket error: {}", self.name, e),
            }
        }
    }

    /// Fails if anything is routed to this peer within [`SILENCE_MS`].
    pub async fn expect_silence(&mut self) -> Result<()> {
        match tokio::time::timeout(Duration::from_millis(SILENCE_MS), self.ws.next()).await {
            Err(_) => Ok(()),
            Ok(frame) => bail!("{} unexpectedly received {:?}", self.name, frame),
        }
    }

    pub async fn close(mut self) -> Result<()> {
        self.ws.close(None).await.context("Failed to close socket")
    }
}
