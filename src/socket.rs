//! UDP transport: one socket bound for receiving (`Direction::In`) or connected for sending
//! (`Direction::Out`), matching the two roles a VBAN peer ever plays.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use log::{debug, error, info};

use crate::{VbanError, VBAN_PROTOCOL_MAX_SIZE};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    In,
    Out,
}

#[derive(Clone, Debug)]
pub struct SocketConfig {
    pub direction: Direction,
    pub ip_address: Ipv4Addr,
    pub port: u16,
}

/// Returns true for dotted-quad addresses whose last octet is `255` (a subnet broadcast
/// address), in which case an outbound socket needs `SO_BROADCAST` to be allowed to send to it.
fn is_broadcast_address(ip: &Ipv4Addr) -> bool {
    ip.octets()[3] == 255
}

pub struct Socket {
    config: SocketConfig,
    inner: UdpSocket,
}

impl Socket {
    /// Opens the underlying UDP socket per `config.direction`: binds `0.0.0.0:port` for `In`,
    /// or leaves an unbound/unconnected datagram socket (with `SO_BROADCAST` set when the peer
    /// address is a broadcast address) ready to `send_to` for `Out`.
    pub fn open(config: SocketConfig) -> Result<Self, VbanError> {
        info!("socket: opening with port {}", config.port);

        let inner = match config.direction {
            Direction::In => {
                let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.port);
                UdpSocket::bind(bind_addr).map_err(|e| {
                    error!("socket: unable to bind socket: {e}");
                    VbanError::Io(e)
                })?
            }
            Direction::Out => {
                let sock = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(VbanError::Io)?;
                if is_broadcast_address(&config.ip_address) {
                    debug!("socket: broadcast address detected");
                    sock.set_broadcast(true).map_err(|e| {
                        error!("socket: unable to set broadcast option: {e}");
                        VbanError::Io(e)
                    })?;
                }
                sock
            }
        };

        info!("socket: opened with port {}", config.port);
        Ok(Socket { config, inner })
    }

    /// Receives one datagram into `buffer`, discarding (and re-receiving) datagrams whose source
    /// address does not match `config.ip_address`. Only valid for `Direction::In` sockets.
    ///
    /// A `std::io::ErrorKind::Interrupted` from the underlying syscall (a caught signal) is
    /// propagated as `VbanError::Io` rather than silently retried, so the pipeline loop can treat
    /// it as a shutdown request.
    pub fn read(&self, buffer: &mut [u8]) -> Result<usize, VbanError> {
        debug_assert_eq!(self.config.direction, Direction::In);

        loop {
            let (n, from) = self.inner.recv_from(buffer).map_err(VbanError::Io)?;

            let from_ip = match from.ip() {
                IpAddr::V4(v4) => v4,
                IpAddr::V6(_) => {
                    debug!("socket: packet received from ipv6 peer, discarding");
                    continue;
                }
            };

            if from_ip != self.config.ip_address {
                debug!("socket: packet received from wrong ip {from_ip}");
                continue;
            }

            return Ok(n);
        }
    }

    /// Sends `buffer` to `config.ip_address:config.port`. Only valid for `Direction::Out`
    /// sockets.
    pub fn write(&self, buffer: &[u8]) -> Result<usize, VbanError> {
        debug_assert_eq!(self.config.direction, Direction::Out);
        debug_assert!(buffer.len() <= VBAN_PROTOCOL_MAX_SIZE);

        let dest = SocketAddr::new(IpAddr::V4(self.config.ip_address), self.config.port);
        self.inner.send_to(buffer, dest).map_err(|e| {
            error!("socket: sendto error: {e}");
            VbanError::Io(e)
        })
    }
}
