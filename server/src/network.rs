//! Server runner: drives the session at a fixed tick rate over a transport

use crate::session::ServerSession;
use log::info;
use shared::pacing::FramePacer;
use shared::transport::udp::UdpTransport;
use shared::transport::Transport;
use shared::ProtocolConfig;
use std::future::Future;

/// Fixed-rate server loop around a [`ServerSession`]
pub struct Server<T: Transport> {
    transport: T,
    session: ServerSession,
    pacer: FramePacer,
}

impl Server<UdpTransport> {
    /// Binds a UDP listener and creates a fresh session
    pub async fn bind(
        addr: &str,
        config: ProtocolConfig,
        max_clients: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let transport = UdpTransport::bind(addr, max_clients).await?;
        Ok(Self::new(transport, ServerSession::new(config, max_clients)))
    }
}

impl<T: Transport> Server<T> {
    pub fn new(transport: T, session: ServerSession) -> Self {
        let pacer = FramePacer::new(session.config().frame_duration());
        Self {
            transport,
            session,
            pacer,
        }
    }

    pub fn session(&self) -> &ServerSession {
        &self.session
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Runs until Ctrl+C
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.run_until(tokio::signal::ctrl_c()).await;
        Ok(())
    }

    /// Runs frames until `shutdown` resolves, then disconnects every client
    ///
    /// The server tick advances once per frame whether or not any client
    /// sent anything. Shutdown is only observed while sleeping out a frame.
    pub async fn run_until<F: Future>(&mut self, shutdown: F) {
        tokio::pin!(shutdown);
        info!(
            "Server running at {} Hz",
            self.session.config().tick_rate
        );

        loop {
            self.pacer.begin_frame();
            self.session.frame(&mut self.transport);

            if !self.pacer.wait(&mut shutdown).await {
                break;
            }
        }

        info!("Server shutting down at tick {}", self.session.tick());
        self.session.shutdown(&mut self.transport);
    }
}
