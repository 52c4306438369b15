//! Shared helpers for socksd integration tests

use socksd::config::{Account, Config};
use socksd::error::ProxyError;
use socksd::socks::Server;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::task::JoinHandle;

/// A server under test with no authentication required
pub fn no_auth_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..Default::default()
    }
}

/// A server under test requiring the si.li/1234 account
pub fn userpass_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        auth_methods: vec!["username_password".to_string()],
        credentials: vec![Account {
            username: "si.li".to_string(),
            password: "1234".to_string(),
        }],
        ..Default::default()
    }
}

/// Bind and serve a test server, returning its address and the serve task
pub async fn start_server(
    config: Config,
) -> (Arc<Server>, SocketAddr, JoinHandle<Result<(), ProxyError>>) {
    let server = Arc::new(Server::new(&config));
    server.bind().await.expect("bind test server");
    let addr = server.local_addr().expect("bound address");
    let handle = tokio::spawn(Arc::clone(&server).serve());
    (server, addr, handle)
}

/// Start a TCP echo server on an ephemeral loopback port
pub async fn start_tcp_echo() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut conn, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    match conn.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if conn.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });

    addr
}

/// Start a UDP server that answers one "ping" with "pong"
pub async fn start_udp_ponger() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = [0u8; 1024];
        let (n, from) = socket.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");
        socket.send_to(b"pong", from).await.unwrap();
    });

    addr
}

/// Connect and complete the no-auth handshake
pub async fn connect_no_auth(proxy: SocketAddr) -> TcpStream {
    let mut conn = TcpStream::connect(proxy).await.unwrap();
    conn.write_all(&[5, 1, 0]).await.unwrap();
    let mut reply = [0u8; 2];
    conn.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [5, 0]);
    conn
}

/// Build a request frame targeting an IPv4 address
pub fn request_frame(cmd: u8, target: SocketAddr) -> Vec<u8> {
    let SocketAddr::V4(v4) = target else {
        panic!("IPv4 target expected");
    };
    let mut frame = vec![5, cmd, 0, 1];
    frame.extend_from_slice(&v4.ip().octets());
    frame.extend_from_slice(&v4.port().to_be_bytes());
    frame
}

/// Build an RFC 1929 sub-negotiation frame
pub fn userpass_frame(username: &str, password: &str) -> Vec<u8> {
    let mut frame = vec![1, username.len() as u8];
    frame.extend_from_slice(username.as_bytes());
    frame.push(password.len() as u8);
    frame.extend_from_slice(password.as_bytes());
    frame
}

/// Read a fixed-size IPv4 reply frame
pub async fn read_reply(conn: &mut TcpStream) -> [u8; 10] {
    let mut reply = [0u8; 10];
    conn.read_exact(&mut reply).await.unwrap();
    reply
}
