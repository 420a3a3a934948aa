use std::collections::VecDeque;
use std::io::{self, Cursor};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use mavlink::common::{
    MavMessage, MavMissionResult, MISSION_ACK_DATA, MISSION_REQUEST_INT_DATA,
    MISSION_REQUEST_LIST_DATA,
};
use mavlink::peek_reader::PeekReader;
use mavlink::MavHeader;
use tracing::{debug, info};

use crate::config::LinkConfig;
use crate::error::LinkError;

/// MAVLink v2 max frame size.
const MAX_FRAME: usize = 280;

/// How long each liveness poll waits before re-checking the deadline.
const LIVENESS_POLL: Duration = Duration::from_millis(250);

/// Parse a `udp:HOST:PORT` (or pymavlink-style `udpin:HOST:PORT`)
/// connection string into the local bind address.
pub fn parse_endpoint(endpoint: &str) -> Result<SocketAddr, LinkError> {
    let rest = endpoint
        .strip_prefix("udp:")
        .or_else(|| endpoint.strip_prefix("udpin:"))
        .ok_or_else(|| LinkError::Endpoint(endpoint.to_string()))?;

    rest.to_socket_addrs()
        .map_err(|_| LinkError::Endpoint(endpoint.to_string()))?
        .next()
        .ok_or_else(|| LinkError::Endpoint(endpoint.to_string()))
}

/// UDP-framed MAVLink link to the flight controller.
///
/// Listen semantics: the socket is bound locally and the vehicle's address
/// is learned from the first inbound datagram, then refreshed on every
/// receive. Outbound frames go to the last-seen peer.
pub struct UdpLink {
    socket: UdpSocket,
    peer: Option<SocketAddr>,
    sys_id: u8,
    comp_id: u8,
    target_sys: u8,
    target_comp: u8,
    sequence: u8,
    /// Frames decoded from a datagram but not yet handed out. A single
    /// datagram may carry several MAVLink frames.
    pending: VecDeque<MavMessage>,
    recv_buf: Vec<u8>,
}

impl UdpLink {
    pub fn open(cfg: &LinkConfig) -> Result<Self, LinkError> {
        let bind_addr = parse_endpoint(&cfg.endpoint)?;
        let socket = UdpSocket::bind(bind_addr)?;
        info!("listening for vehicle datagrams on {}", socket.local_addr()?);

        Ok(Self {
            socket,
            peer: None,
            sys_id: cfg.sys_id,
            comp_id: cfg.comp_id,
            target_sys: cfg.target_sys,
            target_comp: cfg.target_comp,
            sequence: 0,
            pending: VecDeque::new(),
            recv_buf: vec![0u8; MAX_FRAME],
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, LinkError> {
        Ok(self.socket.local_addr()?)
    }

    /// Block until a HEARTBEAT arrives or `timeout` elapses. Other traffic
    /// received while waiting is discarded.
    pub fn await_liveness(&mut self, timeout: Duration) -> Result<bool, LinkError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            match self.receive(remaining.min(LIVENESS_POLL))? {
                Some(MavMessage::HEARTBEAT(_)) => return Ok(true),
                Some(_) | None => continue,
            }
        }
    }

    /// Blocking receive with timeout. `Ok(None)` means the timeout elapsed,
    /// which is not an error. Undecodable bytes are dropped.
    pub fn receive(&mut self, timeout: Duration) -> Result<Option<MavMessage>, LinkError> {
        if let Some(msg) = self.pending.pop_front() {
            return Ok(Some(msg));
        }

        // set_read_timeout rejects a zero duration
        self.socket
            .set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;

        match self.socket.recv_from(&mut self.recv_buf) {
            Ok((len, addr)) => {
                self.peer = Some(addr);
                self.parse_datagram(len);
                Ok(self.pending.pop_front())
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn parse_datagram(&mut self, len: usize) {
        let mut reader = PeekReader::new(Cursor::new(&self.recv_buf[..len]));
        loop {
            match mavlink::read_v2_msg::<MavMessage, _>(&mut reader) {
                Ok((_header, msg)) => self.pending.push_back(msg),
                // Exhausted the datagram, or trailing garbage: either way
                // everything decodable has been queued.
                Err(e) => {
                    if self.pending.is_empty() {
                        debug!("dropping undecodable datagram: {e}");
                    }
                    break;
                }
            }
        }
    }

    pub fn send(&mut self, msg: &MavMessage) -> Result<(), LinkError> {
        let peer = self.peer.ok_or(LinkError::NoPeer)?;
        let header = MavHeader {
            system_id: self.sys_id,
            component_id: self.comp_id,
            sequence: self.sequence,
        };
        self.sequence = self.sequence.wrapping_add(1);

        let mut buf = Vec::with_capacity(MAX_FRAME);
        mavlink::write_v2_msg(&mut buf, header, msg)?;
        self.socket.send_to(&buf, peer)?;
        Ok(())
    }

    /// Ask the vehicle for its mission list length (MISSION_REQUEST_LIST).
    pub fn request_mission_list(&mut self) -> Result<(), LinkError> {
        self.send(&MavMessage::MISSION_REQUEST_LIST(MISSION_REQUEST_LIST_DATA {
            target_system: self.target_sys,
            target_component: self.target_comp,
            ..Default::default()
        }))
    }

    /// Ask the vehicle for mission item `seq` (MISSION_REQUEST_INT).
    pub fn request_mission_item(&mut self, seq: u16) -> Result<(), LinkError> {
        self.send(&MavMessage::MISSION_REQUEST_INT(MISSION_REQUEST_INT_DATA {
            target_system: self.target_sys,
            target_component: self.target_comp,
            seq,
            ..Default::default()
        }))
    }

    /// Acknowledge a completed mission download (MISSION_ACK accepted).
    pub fn ack_mission(&mut self) -> Result<(), LinkError> {
        self.send(&MavMessage::MISSION_ACK(MISSION_ACK_DATA {
            target_system: self.target_sys,
            target_component: self.target_comp,
            mavtype: MavMissionResult::MAV_MISSION_ACCEPTED,
            ..Default::default()
        }))
    }

    pub fn close(self) {
        debug!("vehicle link closed");
    }
}
