// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Socket front of the mirror node and the matching client.
//!
//! The node listens on one TCP port for framed service requests (calibrate,
//! enable/disable) and on one UDP port for the fire-and-forget hand pose stream.
//! Pose samples that arrive while the relay is busy queue up in the kernel socket
//! buffer or get dropped there; this module never buffers them itself.
extern crate nix;

use std::collections::HashMap;
use std::error::Error;
use std::fmt::Debug;
use std::io::{ErrorKind, Read, Write};
use std::mem::size_of;
use std::net::TcpStream as StdTcpStream;
use std::net::UdpSocket as StdUdpSocket;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::os::unix::io::AsRawFd;
use std::str::FromStr;
use std::time::Duration;

use mio::net::{TcpListener, TcpStream, UdpSocket};
use mio::{Events, Interest, Poll, Token};

use nix::sys::socket::setsockopt;
use nix::sys::socket::sockopt::{KeepAlive, TcpKeepCount, TcpKeepIdle, TcpKeepInterval};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::exception::{create_network_exception, GbiResult};
use crate::mirror::service_types::{
    CalibrateRequest, CalibrateRequestWithHeader, EnableMirroringRequest,
    EnableMirroringRequestWithHeader, MirrorCommandEnum, MirrorCommandHeader,
    MirrorCommandResponse, PoseSample, ServiceStatus, MAX_MESSAGE_SIZE,
};
use crate::robot::Pose;

const LISTENER: Token = Token(0);
const POSE: Token = Token(1);
const FIRST_CONNECTION: usize = 2;

pub trait MessageCommand {
    fn get_command_message_id(&self) -> u32;
}

/// One message received by the endpoint.
#[derive(Debug)]
pub enum Inbound {
    /// A framed service request on a TCP connection.
    Request {
        client: Token,
        header: MirrorCommandHeader,
        body: Vec<u8>,
    },
    /// A hand pose sample from the UDP stream.
    Pose(PoseSample),
}

struct ClientConnection {
    stream: TcpStream,
    pending_request: Vec<u8>,
}

/// Server side of the wire: TCP service listener plus UDP pose socket behind one poll.
pub struct ServiceEndpoint {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    pose_socket: UdpSocket,
    connections: HashMap<Token, ClientConnection>,
    next_token: usize,
    command_port: u16,
    pose_port: u16,
}

impl ServiceEndpoint {
    /// Binds the service listener and the pose socket. Port 0 picks a free port; the
    /// actual ports are available through [`command_port`](`Self::command_port`) and
    /// [`pose_port`](`Self::pose_port`).
    pub fn bind(command_port: u16, pose_port: u16) -> Result<ServiceEndpoint, Box<dyn Error>> {
        let ip_addr = IpAddr::from_str("0.0.0.0")?;
        let mut listener = TcpListener::bind(SocketAddr::new(ip_addr, command_port))?;
        let mut pose_socket = UdpSocket::bind(SocketAddr::new(ip_addr, pose_port))?;
        let command_port = listener.local_addr()?.port();
        let pose_port = pose_socket.local_addr()?.port();
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;
        poll.registry()
            .register(&mut pose_socket, POSE, Interest::READABLE)?;
        let events = Events::with_capacity(128);
        Ok(ServiceEndpoint {
            poll,
            events,
            listener,
            pose_socket,
            connections: HashMap::new(),
            next_token: FIRST_CONNECTION,
            command_port,
            pose_port,
        })
    }

    pub fn command_port(&self) -> u16 {
        self.command_port
    }

    pub fn pose_port(&self) -> u16 {
        self.pose_port
    }

    /// Waits up to `timeout` for socket activity and returns all messages that became
    /// complete, in arrival order.
    pub fn poll_inbound(&mut self, timeout: Duration) -> GbiResult<Vec<Inbound>> {
        self.poll
            .poll(&mut self.events, Some(timeout))
            .map_err(|e| create_network_exception(format!("poll failed: {}", e)))?;
        let mut ready: Vec<Token> = Vec::new();
        for event in self.events.iter() {
            if event.is_readable() {
                ready.push(event.token());
            }
        }
        let mut inbound: Vec<Inbound> = Vec::new();
        for token in ready {
            match token {
                LISTENER => self.accept_pending_connections()?,
                POSE => self.drain_pose_samples(&mut inbound),
                token => self.drain_connection(token, &mut inbound),
            }
        }
        Ok(inbound)
    }

    /// Answers a service request with a status code. The response echoes the command and
    /// command ID of the request header.
    pub fn send_response(
        &mut self,
        client: Token,
        request_header: &MirrorCommandHeader,
        status: ServiceStatus,
    ) -> GbiResult<()> {
        let command = request_header.command;
        let command_id = request_header.command_id;
        let mut response = MirrorCommandResponse {
            header: MirrorCommandHeader::new(command, command_id, 0),
            status,
        };
        let response_size = bincode::serialized_size(&response)
            .map_err(|e| create_network_exception(format!("cannot encode response: {}", e)))?;
        response.header.size = response_size as u32;
        let encoded_response = serialize(&response);
        let connection = match self.connections.get_mut(&client) {
            Some(connection) => connection,
            None => {
                return Err(create_network_exception(format!(
                    "connection {} is gone, response dropped",
                    client.0
                )))
            }
        };
        write_all_blocking(&mut connection.stream, &encoded_response)
            .map_err(|e| create_network_exception(format!("cannot send response: {}", e)))
    }

    fn accept_pending_connections(&mut self) -> GbiResult<()> {
        loop {
            match self.listener.accept() {
                Ok((mut stream, peer_address)) => {
                    if let Err(e) = set_keepalive_options(&stream) {
                        warn!("could not set keepalive options: {}", e);
                    }
                    let token = Token(self.next_token);
                    self.next_token += 1;
                    self.poll
                        .registry()
                        .register(&mut stream, token, Interest::READABLE)
                        .map_err(|e| {
                            create_network_exception(format!("cannot register connection: {}", e))
                        })?;
                    info!("service connection from {}", peer_address);
                    self.connections.insert(
                        token,
                        ClientConnection {
                            stream,
                            pending_request: Vec::new(),
                        },
                    );
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) => {
                    return Err(create_network_exception(format!("accept failed: {}", e)));
                }
            }
        }
    }

    fn drain_pose_samples(&mut self, inbound: &mut Vec<Inbound>) {
        let mut buffer = [0_u8; 128];
        loop {
            match self.pose_socket.recv_from(&mut buffer) {
                Ok((read_bytes, _)) => {
                    if read_bytes != size_of::<PoseSample>() {
                        warn!(
                            "pose datagram has {} bytes but it should have {} bytes",
                            read_bytes,
                            size_of::<PoseSample>()
                        );
                        continue;
                    }
                    inbound.push(Inbound::Pose(deserialize(&buffer[..read_bytes])));
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(e) => {
                    error!("pose socket receive failed: {}", e);
                    return;
                }
            }
        }
    }

    fn drain_connection(&mut self, token: Token, inbound: &mut Vec<Inbound>) {
        let mut drop_connection = false;
        if let Some(connection) = self.connections.get_mut(&token) {
            let mut chunk = [0_u8; 4096];
            loop {
                match connection.stream.read(&mut chunk) {
                    Ok(0) => {
                        drop_connection = true;
                        break;
                    }
                    Ok(read_bytes) => connection
                        .pending_request
                        .extend_from_slice(&chunk[..read_bytes]),
                    Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        error!("service connection read failed: {}", e);
                        drop_connection = true;
                        break;
                    }
                }
            }
            loop {
                match extract_frame(&mut connection.pending_request) {
                    Ok(Some((header, body))) => inbound.push(Inbound::Request {
                        client: token,
                        header,
                        body,
                    }),
                    Ok(None) => break,
                    Err(e) => {
                        error!("closing service connection {}: {}", token.0, e);
                        drop_connection = true;
                        break;
                    }
                }
            }
        }
        if drop_connection {
            self.close_connection(token);
        }
    }

    fn close_connection(&mut self, token: Token) {
        if let Some(mut connection) = self.connections.remove(&token) {
            if let Err(e) = self.poll.registry().deregister(&mut connection.stream) {
                warn!("cannot deregister connection {}: {}", token.0, e);
            }
            info!("service connection {} closed", token.0);
        }
    }
}

/// Splits one complete framed message off the front of `pending`, if there is one.
fn extract_frame(
    pending: &mut Vec<u8>,
) -> GbiResult<Option<(MirrorCommandHeader, Vec<u8>)>> {
    let header_size = size_of::<MirrorCommandHeader>();
    if pending.len() < header_size {
        return Ok(None);
    }
    let header: MirrorCommandHeader = try_deserialize(&pending[..header_size])?;
    let message_size = header.size as usize;
    if message_size < header_size || message_size > MAX_MESSAGE_SIZE {
        return Err(create_network_exception(format!(
            "frame announces invalid size {}",
            message_size
        )));
    }
    if pending.len() < message_size {
        return Ok(None);
    }
    let mut frame: Vec<u8> = pending.drain(..message_size).collect();
    let body = frame.split_off(header_size);
    Ok(Some((header, body)))
}

fn set_keepalive_options(stream: &TcpStream) -> nix::Result<()> {
    let fd = stream.as_raw_fd();
    setsockopt(fd, KeepAlive, &true)?;
    setsockopt(fd, TcpKeepIdle, &1)?;
    setsockopt(fd, TcpKeepCount, &3)?;
    setsockopt(fd, TcpKeepInterval, &1)?;
    Ok(())
}

fn write_all_blocking(stream: &mut TcpStream, bytes: &[u8]) -> std::io::Result<()> {
    let mut written = 0;
    while written < bytes.len() {
        match stream.write(&bytes[written..]) {
            Ok(0) => {
                return Err(std::io::Error::new(
                    ErrorKind::WriteZero,
                    "connection closed while writing",
                ))
            }
            Ok(n) => written += n,
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => std::thread::yield_now(),
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Client side of the wire: blocking service requests plus the pose publisher.
///
/// This is what the hand tracking process links against; the demos and the endpoint
/// tests use it as well.
pub struct MirrorClient {
    tcp_socket: StdTcpStream,
    udp_socket: StdUdpSocket,
    pub command_id: u32,
}

impl MirrorClient {
    /// Connects to a mirror node.
    pub fn connect(
        address: &str,
        command_port: u16,
        pose_port: u16,
    ) -> Result<MirrorClient, Box<dyn Error>> {
        let sock_address = format!("{}:{}", address, command_port)
            .to_socket_addrs()?
            .next()
            .ok_or("cannot resolve address")?;
        let tcp_socket = StdTcpStream::connect(sock_address)?;
        tcp_socket.set_nodelay(true)?;
        let fd = tcp_socket.as_raw_fd();
        setsockopt(fd, KeepAlive, &true)?;
        setsockopt(fd, TcpKeepIdle, &1)?;
        setsockopt(fd, TcpKeepCount, &3)?;
        setsockopt(fd, TcpKeepInterval, &1)?;
        let udp_socket = StdUdpSocket::bind("0.0.0.0:0")?;
        udp_socket.connect(format!("{}:{}", address, pose_port))?;
        Ok(MirrorClient {
            tcp_socket,
            udp_socket,
            command_id: 0,
        })
    }

    /// Requests a calibration of `limb` against the given hand pose and blocks for the
    /// status answer.
    pub fn calibrate(&mut self, limb: &str, hand_pose: &Pose) -> GbiResult<ServiceStatus> {
        let request = CalibrateRequest::new(limb, hand_pose);
        let body_size = bincode::serialized_size(&request)
            .map_err(|e| create_network_exception(format!("cannot encode request: {}", e)))?;
        let header = self.create_header(
            MirrorCommandEnum::Calibrate,
            size_of::<MirrorCommandHeader>() + body_size as usize,
        );
        let command_id = self.tcp_send_request(&CalibrateRequestWithHeader { header, request })?;
        self.tcp_blocking_receive_status(command_id)
    }

    /// Requests a mirroring state change (1 starts, 0 stops) and blocks for the status
    /// answer.
    pub fn set_mirroring(&mut self, mode: u8) -> GbiResult<ServiceStatus> {
        let request = EnableMirroringRequest { mode };
        let header = self.create_header(
            MirrorCommandEnum::EnableMirroring,
            size_of::<EnableMirroringRequestWithHeader>(),
        );
        let command_id =
            self.tcp_send_request(&EnableMirroringRequestWithHeader { header, request })?;
        self.tcp_blocking_receive_status(command_id)
    }

    /// Publishes one hand pose sample. Fire and forget: the node never answers these.
    pub fn publish_pose(&mut self, sample: &PoseSample) -> GbiResult<()> {
        let bytes_send = self
            .udp_socket
            .send(&serialize(sample))
            .map_err(|e| create_network_exception(e.to_string()))?;
        if bytes_send != size_of::<PoseSample>() {
            return Err(create_network_exception(
                "pose sample could not be sent".to_string(),
            ));
        }
        Ok(())
    }

    fn create_header(&mut self, command: MirrorCommandEnum, size: usize) -> MirrorCommandHeader {
        let header = MirrorCommandHeader::new(command, self.command_id, size as u32);
        self.command_id += 1;
        header
    }

    fn tcp_send_request<T: Serialize + MessageCommand>(&mut self, request: &T) -> GbiResult<u32> {
        let encoded_request = serialize(request);
        self.tcp_socket
            .write_all(&encoded_request)
            .map_err(|e| create_network_exception(format!("cannot send request: {}", e)))?;
        Ok(request.get_command_message_id())
    }

    fn tcp_blocking_receive_status(&mut self, command_id: u32) -> GbiResult<ServiceStatus> {
        let mut header_bytes = vec![0_u8; size_of::<MirrorCommandHeader>()];
        self.tcp_socket
            .read_exact(&mut header_bytes)
            .map_err(|e| create_network_exception(format!("cannot receive response: {}", e)))?;
        let response_header: MirrorCommandHeader = try_deserialize(&header_bytes)?;
        let response_id = response_header.command_id;
        let response_size = response_header.size as usize;
        if response_id != command_id {
            return Err(create_network_exception(format!(
                "got response for command ID {} while waiting for {}",
                response_id, command_id
            )));
        }
        if response_size < size_of::<MirrorCommandHeader>() {
            return Err(create_network_exception(format!(
                "response announces invalid size {}",
                response_size
            )));
        }
        let mut body = vec![0_u8; response_size - size_of::<MirrorCommandHeader>()];
        self.tcp_socket
            .read_exact(&mut body)
            .map_err(|e| create_network_exception(format!("cannot receive response: {}", e)))?;
        try_deserialize(&body)
    }
}

fn serialize<T: Serialize>(s: &T) -> Vec<u8> {
    bincode::serialize(s).unwrap()
}

fn deserialize<T: Debug + DeserializeOwned + 'static>(encoded: &[u8]) -> T {
    bincode::deserialize(encoded).unwrap()
}

pub(crate) fn try_deserialize<T: DeserializeOwned>(encoded: &[u8]) -> GbiResult<T> {
    bincode::deserialize(encoded)
        .map_err(|e| create_network_exception(format!("cannot decode message: {}", e)))
}
