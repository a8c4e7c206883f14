use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;

// Binds the server socket. A host of "*" listens on all interfaces,
// preferring an IPv6 dual-stack socket and falling back to IPv4.
pub async fn create_listener(
    host: &str,
    port: u16,
) -> std::io::Result<(String, tokio::net::TcpListener)> {
    if host == "*" {
        return create_wildcard_listener(port);
    }

    let addr = format!("{}:{}", host, port);
    tracing::info!("Attempting to bind server to {}...", addr);

    let tokio_listener = tokio::net::TcpListener::bind(&addr).await?;

    Ok((addr, tokio_listener))
}

fn create_wildcard_listener(port: u16) -> std::io::Result<(String, tokio::net::TcpListener)> {
    match create_dual_stack_listener(port) {
        Ok(listener) => Ok(listener),
        Err(_) => {
            tracing::warn!("Warning: Failed to bind IPv6 listener. Attempting IPv4 only.");

            let str_addr = format!("0.0.0.0:{}", port);
            let addr: SocketAddr = str_addr.parse().unwrap();

            tracing::info!("Attempting to bind server to {}... (IPv4)", str_addr);

            let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
            let listener = into_tokio_listener(socket, addr)?;

            Ok((str_addr, listener))
        }
    }
}

fn create_dual_stack_listener(port: u16) -> std::io::Result<(String, tokio::net::TcpListener)> {
    let str_addr = format!("[::]:{}", port);
    let addr: SocketAddr = str_addr.parse().unwrap();

    tracing::info!(
        "Attempting to bind server to {}... (IPv6 + IPv4 dual-stack)",
        str_addr
    );

    let socket = Socket::new(Domain::IPV6, Type::STREAM, Some(Protocol::TCP))?;

    // Some systems refuse dual-stack mode but still accept IPv6 connections
    if let Err(e) = socket.set_only_v6(false) {
        tracing::warn!(
            "Warning: Failed to set dual-stack mode for IPv6 socket: {}. Continuing anyway.",
            e
        );
    }

    let listener = into_tokio_listener(socket, addr)?;

    Ok((str_addr, listener))
}

fn into_tokio_listener(
    socket: Socket,
    addr: SocketAddr,
) -> std::io::Result<tokio::net::TcpListener> {
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    // Make it non-blocking for tokio
    socket.set_nonblocking(true)?;

    let std_listener: std::net::TcpListener = socket.into();
    tokio::net::TcpListener::from_std(std_listener)
}
