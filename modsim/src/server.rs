//! The Modbus/TCP slave endpoint (spec.md §4.6, §4.7).
//!
//! One `tokio-modbus` `Service` per simulation, backed directly by its
//! `RegisterBank`. Only function codes 3 (read holding registers), 6
//! (write single register) and 16 (write multiple registers) are
//! supported; everything else is `ExceptionCode::IllegalFunction`.

use std::future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_modbus::server::tcp::{accept_tcp_connection, Server};
use tokio_modbus::{ExceptionCode, Request, Response};
use tracing::{error, info, warn};

use crate::bank::RegisterBank;
use crate::error::{BindError, ProtocolError};

/// Grace window existing connections are given before a cancelled
/// listener is dropped out from under them (spec.md §5).
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Adapts a `RegisterBank` to `tokio_modbus::server::Service`.
///
/// The bank's `RwLock` critical sections never `.await`, so `call`
/// answers synchronously; `tokio_modbus` only requires the `Future`
/// associated type, which `future::Ready` satisfies without spawning.
pub struct BankService {
    bank: Arc<RegisterBank>,
}

impl BankService {
    pub fn new(bank: Arc<RegisterBank>) -> Self {
        Self { bank }
    }
}

impl tokio_modbus::server::Service for BankService {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        let result = match req {
            Request::ReadHoldingRegisters(addr, count) => self
                .bank
                .read_words(addr, count)
                .map(Response::ReadHoldingRegisters),
            Request::WriteSingleRegister(addr, value) => self
                .bank
                .write_words(addr, &[value])
                .map(|()| Response::WriteSingleRegister(addr, value)),
            Request::WriteMultipleRegisters(addr, values) => {
                let count = values.len() as u16;
                self.bank
                    .write_words(addr, &values)
                    .map(|()| Response::WriteMultipleRegisters(addr, count))
            }
            other => {
                warn!(?other, "unsupported Modbus function code");
                Err(ProtocolError::IllegalFunction)
            }
        };
        future::ready(result.map_err(to_exception))
    }
}

fn to_exception(err: ProtocolError) -> ExceptionCode {
    match err {
        ProtocolError::IllegalFunction => ExceptionCode::IllegalFunction,
        ProtocolError::IllegalDataAddress => ExceptionCode::IllegalDataAddress,
        ProtocolError::IllegalDataValue => ExceptionCode::IllegalDataValue,
    }
}

/// Bind `(ip, port)`, reporting `AlreadyBoundLocally`/`Io` synchronously
/// so `Supervisor::add` can fail before any task is spawned (spec.md
/// §4.7, "Fails if the (ip, port) is already bound").
pub async fn bind(ip: Ipv4Addr, port: u16) -> Result<TcpListener, BindError> {
    let addr = SocketAddr::from((ip, port));
    TcpListener::bind(addr).await.map_err(|source| {
        if source.kind() == std::io::ErrorKind::AddrInUse {
            BindError::AlreadyBoundLocally {
                ip: ip.to_string(),
                port,
            }
        } else {
            BindError::Io {
                ip: ip.to_string(),
                port,
                source,
            }
        }
    })
}

/// Serve `bank` on an already-bound `listener` until `cancel` signals
/// true. Cancellation stops accepting new connections immediately and
/// gives in-flight ones `SHUTDOWN_GRACE` before the listener is torn
/// down (spec.md §5).
pub async fn run(listener: TcpListener, bank: Arc<RegisterBank>, mut cancel: watch::Receiver<bool>) {
    let local_addr = listener.local_addr().ok();
    info!(?local_addr, "Modbus/TCP endpoint listening");

    let server = Server::new(listener);
    let on_connected = move |stream, socket_addr| {
        let bank = bank.clone();
        future::ready(accept_tcp_connection(stream, socket_addr, move |_slave| {
            Ok(Some(BankService::new(bank.clone())))
        }))
    };
    let on_process_error = |err: std::io::Error| {
        error!(%err, "Modbus/TCP connection error");
    };

    tokio::select! {
        result = server.serve(&on_connected, on_process_error) => {
            if let Err(err) = result {
                error!(%err, ?local_addr, "Modbus/TCP listener exited unexpectedly");
            }
        }
        _ = wait_for_shutdown(&mut cancel) => {
            info!(?local_addr, grace_ms = SHUTDOWN_GRACE.as_millis(), "Modbus/TCP endpoint shutting down");
            tokio::time::sleep(SHUTDOWN_GRACE).await;
        }
    }
}

async fn wait_for_shutdown(cancel: &mut watch::Receiver<bool>) {
    while !*cancel.borrow() {
        if cancel.changed().await.is_err() {
            return;
        }
    }
}
