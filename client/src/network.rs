//! Client runner: paces frames, feeds input into the session, and tears the
//! connection down on shutdown

use crate::input::InputSource;
use crate::session::{ClientError, ClientSession, SessionState};
use log::{debug, error, info};
use shared::pacing::FramePacer;
use shared::transport::udp::{UdpTransport, CONNECT_TIMEOUT};
use shared::transport::{Transport, TransportEvent};
use shared::ProtocolConfig;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// How long to keep the transport serviced after sending the disconnect
pub const SHUTDOWN_DRAIN: Duration = Duration::from_millis(100);

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct Client<T: Transport, I: InputSource> {
    transport: T,
    session: ClientSession,
    input: I,
    pacer: FramePacer,
    hello_timeout: Duration,
    frames: u64,
}

impl<I: InputSource> Client<UdpTransport, I> {
    /// Performs the UDP handshake with the server at `addr`
    pub async fn connect(
        addr: &str,
        config: ProtocolConfig,
        input: I,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Connecting to server at {}...", addr);
        let transport = UdpTransport::connect(addr, CONNECT_TIMEOUT).await?;
        info!("Connected to {}", addr);
        Ok(Self::new(transport, config, input))
    }
}

impl<T: Transport, I: InputSource> Client<T, I> {
    pub fn new(transport: T, config: ProtocolConfig, input: I) -> Self {
        Self {
            transport,
            session: ClientSession::new(config),
            input,
            pacer: FramePacer::new(config.frame_duration()),
            hello_timeout: CONNECT_TIMEOUT,
            frames: 0,
        }
    }

    /// Limits how long the runner waits for the server's hello
    pub fn with_hello_timeout(mut self, hello_timeout: Duration) -> Self {
        self.hello_timeout = hello_timeout;
        self
    }

    pub fn session(&self) -> &ClientSession {
        &self.session
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Runs until Ctrl+C or until the connection is lost
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.run_until(tokio::signal::ctrl_c()).await?;
        Ok(())
    }

    /// Runs frames until `shutdown` resolves, then disconnects gracefully
    ///
    /// Frames with a pending catch-up skip their sleep so the client tick
    /// runs faster than real time. Losing the server, or not receiving its
    /// hello within the hello timeout, ends the run with an error.
    pub async fn run_until<F: Future>(&mut self, shutdown: F) -> Result<(), ClientError> {
        tokio::pin!(shutdown);
        let started = Instant::now();

        loop {
            self.pacer.begin_frame();
            let input = self.input.capture();

            let report = match self.session.frame(&mut self.transport, &input) {
                Ok(report) => report,
                Err(e) => {
                    error!("Session ended: {}", e);
                    return Err(e);
                }
            };
            self.frames += 1;
            self.observe();

            if self.session.state() != SessionState::Synchronized
                && started.elapsed() > self.hello_timeout
            {
                error!("No hello from server within {:?}", self.hello_timeout);
                self.session.disconnect(&mut self.transport);
                return Err(ClientError::Timeout);
            }

            let keep_running = if report.skip_sleep {
                self.pacer.skip(&mut shutdown).await
            } else {
                self.pacer.wait(&mut shutdown).await
            };

            if !keep_running {
                break;
            }
        }

        info!("Shutting down at tick {}", self.session.tick());
        self.shutdown().await;
        Ok(())
    }

    fn observe(&self) {
        let status_interval = u64::from(self.session.config().tick_rate.max(1)) * 5;
        if self.frames % status_interval == 0 {
            let position = self.session.position();
            info!(
                "Tick {} | position ({:.2}, {:.2}) | iteration {} | {:?}",
                self.session.tick(),
                position.x,
                position.y,
                self.session.adjuster().iteration(),
                self.session.state()
            );
        }
    }

    /// Sends the disconnect, then drains the transport until `SHUTDOWN_DRAIN`
    /// has passed
    ///
    /// Everything drained is discarded. Returns how many events were dropped.
    async fn shutdown(&mut self) -> usize {
        self.session.disconnect(&mut self.transport);
        debug!("Disconnect sent, draining for {:?}", SHUTDOWN_DRAIN);

        let deadline = Instant::now() + SHUTDOWN_DRAIN;
        let mut drained = 0;
        while Instant::now() < deadline {
            while let Some(event) = self.transport.poll() {
                if !matches!(event, TransportEvent::Receive(..)) {
                    debug!("Discarding {:?} during shutdown", event);
                }
                drained += 1;
            }
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
        debug!("Drained {} events after disconnect", drained);
        drained
    }
}
