//! Integration tests for client and server sessions talking to each other
//!
//! Most tests run both sessions in one process over the loopback transport and
//! step them frame by frame, so packet clustering is fully deterministic. A
//! skipped frame sleep on the client is modelled as an extra client frame
//! inside the same server frame.

use client::session::{ClientSession, FrameReport, SessionState};
use server::session::{FrameReport as ServerReport, ServerSession};
use shared::transport::loopback::{LoopbackClient, LoopbackServer};
use shared::transport::{PeerId, Transport};
use shared::{EntityState, InputActivationSet, InputKind, ProtocolConfig, SPAWN_POSITION};

/// One server and one client wired together over loopback
struct Simulation {
    server: ServerSession,
    server_transport: LoopbackServer,
    client: ClientSession,
    client_transport: LoopbackClient,
    peer: PeerId,
}

impl Simulation {
    fn new() -> Self {
        let config = ProtocolConfig::default();
        let mut server_transport = LoopbackServer::new();
        let client_transport = server_transport.connect();
        let peer = client_transport.id();

        Self {
            server: ServerSession::new(config, 4),
            server_transport,
            client: ClientSession::new(config),
            client_transport,
            peer,
        }
    }

    fn server_frame(&mut self) -> ServerReport {
        self.server.frame(&mut self.server_transport)
    }

    fn client_frame(&mut self, input: &InputActivationSet) -> FrameReport {
        self.client
            .frame(&mut self.client_transport, input)
            .expect("client frame failed")
    }

    /// One server frame followed by as many client frames as fit in it
    ///
    /// Returns the client reports; more than one means catch-up frames ran.
    fn paced_round(&mut self, input: &InputActivationSet) -> Vec<FrameReport> {
        self.server_frame();

        let mut reports = Vec::new();
        loop {
            let report = self.client_frame(input);
            reports.push(report);
            if !report.skip_sleep || reports.len() > 128 {
                break;
            }
        }
        reports
    }

    fn stale_count(&self) -> u64 {
        self.server.connections().get(&self.peer).unwrap().stale
    }

    fn accepted_count(&self) -> u64 {
        self.server.connections().get(&self.peer).unwrap().accepted
    }
}

fn idle() -> InputActivationSet {
    InputActivationSet::new()
}

/// HANDSHAKE TESTS
mod handshake_tests {
    use super::*;

    /// The hello carries the server tick and authoritative position
    #[test]
    fn hello_synchronizes_client() {
        let mut sim = Simulation::new();
        let hello_tick = sim.server.tick();

        let server_report = sim.server_frame();
        assert_eq!(server_report.hellos, 1);
        assert_eq!(server_report.responses, 0);

        let report = sim.client_frame(&idle());
        assert!(!report.sent_input);
        assert_eq!(report.responses, 1);
        assert_eq!(sim.client.state(), SessionState::Synchronized);
        assert_eq!(sim.client.tick(), hello_tick + 1);
        assert_eq!(sim.client.position(), SPAWN_POSITION);
    }

    /// Nothing is sent while the hello is outstanding
    #[test]
    fn no_input_before_hello() {
        let mut sim = Simulation::new();

        let report = sim.client_frame(&InputActivationSet::with(&[InputKind::MoveUp]));
        assert!(!report.sent_input);
        assert_eq!(sim.client.state(), SessionState::AwaitingHello);

        let server_report = sim.server_frame();
        assert_eq!(server_report.inputs, 0);
    }

    /// Each client gets its own hello and its own bookkeeping
    #[test]
    fn several_clients_connect() {
        let config = ProtocolConfig::default();
        let mut hub = LoopbackServer::new();
        let mut server = ServerSession::new(config, 4);
        let mut endpoints: Vec<(ClientSession, LoopbackClient)> = (0..3)
            .map(|_| (ClientSession::new(config), hub.connect()))
            .collect();

        server.frame(&mut hub);
        for (session, transport) in endpoints.iter_mut() {
            session.frame(transport, &idle()).unwrap();
            assert_eq!(session.state(), SessionState::Synchronized);
        }
        assert_eq!(server.connections().len(), 3);
    }
}

/// TICK SYNCHRONIZATION TESTS
mod synchronization_tests {
    use super::*;

    /// An idle client settles inside the window and stops being corrected
    #[test]
    fn idle_client_settles() {
        let mut sim = Simulation::new();
        for _ in 0..30 {
            sim.paced_round(&idle());
        }

        let stale = sim.stale_count();
        let accepted = sim.accepted_count();
        let iteration = sim.client.adjuster().iteration();

        for _ in 0..15 {
            let reports = sim.paced_round(&idle());
            assert_eq!(reports.len(), 1);
            assert!(!reports[0].paused);
            assert_eq!(reports[0].corrections, 0);
        }

        assert_eq!(sim.stale_count(), stale);
        assert_eq!(sim.accepted_count(), accepted + 15);
        assert_eq!(sim.client.adjuster().iteration(), iteration);
    }

    /// A client that runs far ahead is paused back into the window
    #[test]
    fn runaway_client_is_paused() {
        let mut sim = Simulation::new();
        sim.paced_round(&idle());

        for _ in 0..10 {
            sim.client_frame(&idle());
        }

        let mut paused = 0;
        for _ in 0..60 {
            paused += sim
                .paced_round(&idle())
                .iter()
                .filter(|report| report.paused)
                .count();
        }
        assert!(paused > 0);

        let stale = sim.stale_count();
        let accepted = sim.accepted_count();
        for _ in 0..15 {
            let reports = sim.paced_round(&idle());
            assert_eq!(reports.len(), 1);
            assert_eq!(reports[0].corrections, 0);
        }
        assert_eq!(sim.stale_count(), stale);
        assert_eq!(sim.accepted_count(), accepted + 15);
    }

    /// Server tick advances once per frame whatever arrives
    #[test]
    fn server_tick_is_monotonic() {
        let mut sim = Simulation::new();
        sim.paced_round(&idle());

        let mut expected = sim.server.tick();
        for burst in [0usize, 1, 5, 0, 3] {
            for _ in 0..burst {
                sim.client_frame(&idle());
            }
            let report = sim.server_frame();
            assert_eq!(report.tick, expected);
            assert_eq!(report.inputs, burst);
            expected += 1;
            assert_eq!(sim.server.tick(), expected);
        }
    }
}

/// PREDICTION AND RECONCILIATION TESTS
mod reconciliation_tests {
    use super::*;

    /// A stale sample leaves the authority alone but still gets an answer
    #[test]
    fn stale_input_is_answered_without_applying() {
        let mut sim = Simulation::new();
        sim.paced_round(&idle());

        for _ in 0..10 {
            sim.server_frame();
        }

        let report = sim.client_frame(&InputActivationSet::with(&[InputKind::MoveRight]));
        assert!(report.sent_input);
        let predicted = sim.client.position();
        assert_ne!(predicted, SPAWN_POSITION);

        let server_report = sim.server_frame();
        assert_eq!(server_report.inputs, 1);
        assert_eq!(server_report.responses, 1);
        assert_eq!(sim.server.authority(), SPAWN_POSITION);
        assert_eq!(sim.stale_count(), 1);

        // Null response: catch up, but keep the prediction
        let report = sim.client_frame(&idle());
        assert_eq!(report.responses, 1);
        assert_eq!(report.corrections, 1);
        assert!(report.skip_sleep);
        assert!(!report.snapped);
        assert_eq!(sim.client.position(), predicted);
    }

    /// Mispredictions snap to the server, and the two agree once input stops
    #[test]
    fn client_converges_on_authority() {
        let mut sim = Simulation::new();
        sim.paced_round(&idle());

        let moving = InputActivationSet::with(&[InputKind::MoveRight, InputKind::MoveDown]);
        let mut snapped = false;
        for _ in 0..20 {
            snapped |= sim.paced_round(&moving).iter().any(|r| r.snapped);
        }
        assert!(snapped);

        for _ in 0..10 {
            sim.paced_round(&idle());
        }

        let epsilon = sim.client.config().epsilon;
        assert!(!sim.client.position().diverges_from(&sim.server.authority(), epsilon));
        assert_ne!(sim.server.authority(), SPAWN_POSITION);
    }

    /// Everything sent during one server frame is answered in one cluster
    #[test]
    fn clustered_responses_are_all_consumed() {
        let mut sim = Simulation::new();
        sim.paced_round(&idle());

        for _ in 0..5 {
            sim.client_frame(&InputActivationSet::with(&[InputKind::MoveLeft]));
        }
        let server_report = sim.server_frame();
        assert_eq!(server_report.inputs, 5);
        assert_eq!(server_report.responses, 5);

        let report = sim.client_frame(&idle());
        assert_eq!(report.responses, 5);
        assert!(report.corrections <= 1);
    }
}

/// ERROR HANDLING TESTS
mod error_tests {
    use super::*;
    use shared::codec::ClientHeader;
    use shared::transport::{Delivery, SERVER_PEER};

    /// A truncated client buffer is discarded without touching the session
    #[test]
    fn malformed_client_buffer_is_dropped() {
        let mut sim = Simulation::new();
        sim.paced_round(&idle());

        let header = ClientHeader {
            kind: 1,
            tick: sim.client.tick(),
            adjustment_iteration: 0,
        };
        let bytes = bincode::serialize(&header).unwrap();
        sim.client_transport
            .send(SERVER_PEER, &bytes, Delivery::Reliable)
            .unwrap();

        let report = sim.server_frame();
        assert_eq!(report.malformed, 1);
        assert_eq!(report.responses, 0);
        assert_eq!(sim.server.authority(), SPAWN_POSITION);
        assert!(sim.server.connections().contains(&sim.peer));
    }

    /// A client too far from the server gets no answer at all
    #[test]
    fn unresolvable_drift_is_dropped() {
        let config = ProtocolConfig::default();
        let mut hub = LoopbackServer::new();
        let mut transport = hub.connect();
        let mut server = ServerSession::with_state(config, 1_000, EntityState::new(0.0, 0.0), 4);
        let mut client = ClientSession::new(config);

        server.frame(&mut hub);
        client.frame(&mut transport, &idle()).unwrap();
        assert_eq!(client.tick(), 1_001);

        // Let the server run away from the client
        for _ in 0..200 {
            server.frame(&mut hub);
        }

        client.frame(&mut transport, &idle()).unwrap();
        let report = server.frame(&mut hub);
        assert_eq!(report.inputs, 1);
        assert_eq!(report.dropped, 1);
        assert_eq!(report.responses, 0);
    }

    /// Disconnecting the client removes it from the server
    #[test]
    fn client_disconnect_reaches_server() {
        let mut sim = Simulation::new();
        sim.paced_round(&idle());
        assert_eq!(sim.server.connections().len(), 1);

        sim.client.disconnect(&mut sim.client_transport);
        sim.server_frame();
        assert!(sim.server.connections().is_empty());
    }
}

/// REAL NETWORK TESTS
mod udp_tests {
    use client::input::IdleInput;
    use client::network::Client;
    use server::network::Server;
    use shared::transport::udp::UdpTransport;
    use shared::transport::{Delivery, Transport, TransportEvent};
    use shared::{
        encode_server, ByteBuffer, ProtocolConfig, ServerBody, ServerPacket, MAX_PACKET_SIZE,
        SPAWN_POSITION,
    };
    use std::time::Duration;
    use tokio::time::{sleep, Instant};

    /// Full client and server over a localhost UDP socket
    #[tokio::test]
    async fn udp_session_end_to_end() {
        let config = ProtocolConfig {
            tick_rate: 100,
            ..ProtocolConfig::default()
        };

        let mut server = Server::bind("127.0.0.1:0", config, 4).await.unwrap();
        let addr = server.transport_mut().local_addr().unwrap().to_string();

        let client_run = async {
            let mut client = Client::connect(&addr, config, IdleInput)
                .await
                .map_err(|e| e.to_string())?;
            client
                .run_until(sleep(Duration::from_millis(300)))
                .await
                .map_err(|e| e.to_string())?;
            Ok::<u64, String>(client.session().tick())
        };

        let (_, client_result) = tokio::join!(
            server.run_until(sleep(Duration::from_millis(500))),
            client_run
        );

        let client_tick = tokio_test::assert_ok!(client_result);
        assert!(client_tick > 0);
        assert!(server.session().connections().is_empty());
        assert!(server.session().tick() > 10);
    }

    /// A pause longer than the peer timeout does not cost the connection
    #[tokio::test]
    async fn long_pause_outlives_peer_timeout() {
        let peer_timeout = Duration::from_millis(300);
        let config = ProtocolConfig {
            tick_rate: 100,
            ..ProtocolConfig::default()
        };

        let mut server = tokio_test::assert_ok!(UdpTransport::bind("127.0.0.1:0", 4).await);
        server.set_peer_timeout(peer_timeout);
        let addr = server.local_addr().unwrap().to_string();

        // Answers the connect with a hello and a 60 frame pause, then stays quiet
        let server_run = async {
            let mut events = Vec::new();
            let mut output = ByteBuffer::new(2 * MAX_PACKET_SIZE);
            let deadline = Instant::now() + Duration::from_millis(1500);
            while Instant::now() < deadline {
                while let Some(event) = server.poll() {
                    if let TransportEvent::Connect(peer) = &event {
                        let pause = ServerPacket {
                            tick: 0,
                            adjustment: -60,
                            adjustment_iteration: 0,
                            body: ServerBody::Null,
                        };
                        output.clear();
                        encode_server(&mut output, &ServerPacket::hello(0, SPAWN_POSITION)).unwrap();
                        encode_server(&mut output, &pause).unwrap();
                        server
                            .send(*peer, output.as_slice(), Delivery::Reliable)
                            .unwrap();
                    }
                    if !matches!(event, TransportEvent::Receive(..)) {
                        events.push(event);
                    }
                }
                sleep(Duration::from_millis(10)).await;
            }
            events
        };

        let client_run = async {
            let mut transport = UdpTransport::connect(&addr, Duration::from_secs(2))
                .await
                .map_err(|e| e.to_string())?;
            transport.set_peer_timeout(peer_timeout);

            let mut client = Client::new(transport, config, IdleInput);
            client
                .run_until(sleep(Duration::from_millis(1000)))
                .await
                .map_err(|e| e.to_string())?;
            Ok::<u32, String>(client.session().adjuster().pause_frames())
        };

        let (server_events, client_result) = tokio::join!(server_run, client_run);

        let pause_left = tokio_test::assert_ok!(client_result);
        assert_eq!(pause_left, 0);
        assert!(matches!(server_events.first(), Some(TransportEvent::Connect(_))));
        assert!(!server_events
            .iter()
            .any(|event| matches!(event, TransportEvent::Timeout(_))));
    }
}
