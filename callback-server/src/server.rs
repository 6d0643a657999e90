//! HTTP server for receiving GENA event notifications.

use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use warp::http::{HeaderMap, Method, StatusCode};
use warp::Filter;

use crate::error::CallbackError;
use crate::router::{CallbackEvent, EventRouter, NotificationPayload};

/// HTTP callback server for receiving GENA event notifications.
///
/// The server accepts any method on any path. Every request is acknowledged
/// with `200 OK` and an empty body whatever its content; usable notifications
/// are routed through an [`EventRouter`] and unusable ones are reported as
/// [`CallbackEvent::Rejected`].
///
/// # Example
///
/// ```no_run
/// use tokio::sync::mpsc;
/// use callback_server::{CallbackEvent, CallbackServer};
///
/// #[tokio::main]
/// async fn main() -> Result<(), callback_server::CallbackError> {
///     let (tx, mut rx) = mpsc::unbounded_channel::<CallbackEvent>();
///
///     let server = CallbackServer::start(([0, 0, 0, 0], 0).into(), None, tx).await?;
///     println!("Server listening at: {}", server.base_url());
///
///     server.router().register("uuid:subscription-123".to_string()).await;
///
///     while let Some(event) = rx.recv().await {
///         println!("{event:?}");
///     }
///     Ok(())
/// }
/// ```
pub struct CallbackServer {
    /// Address the socket is actually bound to
    local_addr: SocketAddr,
    /// URL handed to devices in the CALLBACK header
    base_url: String,
    event_router: Arc<EventRouter>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server_handle: Option<JoinHandle<()>>,
}

impl CallbackServer {
    /// Bind the server and start serving in a background task.
    ///
    /// A port of `0` in `bind_addr` picks an ephemeral port. The host part of
    /// the callback URL is `advertise_ip` when given, the bound address when
    /// it is not a wildcard, and otherwise the detected routable address.
    pub async fn start(
        bind_addr: SocketAddr,
        advertise_ip: Option<IpAddr>,
        event_sender: mpsc::UnboundedSender<CallbackEvent>,
    ) -> Result<Self, CallbackError> {
        let host_ip = advertised_ip(bind_addr.ip(), advertise_ip)
            .ok_or(CallbackError::NoRoutableAddress)?;

        let event_router = Arc::new(EventRouter::new(event_sender));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let (local_addr, server) = warp::serve(notify_route(event_router.clone()))
            .try_bind_with_graceful_shutdown(bind_addr, async move {
                let _ = shutdown_rx.await;
            })
            .map_err(|e| CallbackError::Bind {
                addr: bind_addr,
                message: e.to_string(),
            })?;

        let base_url = format!("http://{}/", SocketAddr::new(host_ip, local_addr.port()));
        info!(%local_addr, %base_url, "Callback server listening");

        let server_handle = tokio::spawn(server);

        Ok(Self {
            local_addr,
            base_url,
            event_router,
            shutdown_tx: Some(shutdown_tx),
            server_handle: Some(server_handle),
        })
    }

    /// Callback URL of the form `http://<host-ip>:<port>/`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.event_router
    }

    /// Stop accepting connections and wait for the server task to finish.
    pub async fn shutdown(mut self) -> Result<(), CallbackError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(handle) = self.server_handle.take() {
            handle
                .await
                .map_err(|e| CallbackError::Shutdown(e.to_string()))?;
        }

        info!(local_addr = %self.local_addr, "Callback server stopped");
        Ok(())
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Detect the local address used to reach other hosts.
///
/// Connecting a UDP socket sends nothing; it only asks the OS which
/// interface would route the traffic.
pub fn detect_local_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then_some(ip)
}

fn advertised_ip(bind_ip: IpAddr, advertise_ip: Option<IpAddr>) -> Option<IpAddr> {
    match advertise_ip {
        Some(ip) => Some(ip),
        None if !bind_ip.is_unspecified() => Some(bind_ip),
        None => detect_local_ip(),
    }
}

fn notify_route(
    router: Arc<EventRouter>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = std::convert::Infallible> + Clone {
    let with_router = warp::any().map(move || router.clone());

    warp::any()
        .and(with_router)
        .and(warp::method())
        .and(warp::path::full())
        .and(warp::header::headers_cloned())
        .and(warp::body::bytes())
        .and_then(handle_notification)
        .recover(acknowledge_rejection)
}

async fn handle_notification(
    router: Arc<EventRouter>,
    method: Method,
    path: warp::path::FullPath,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl warp::Reply, warp::Rejection> {
    let sid = header_text(&headers, "sid");
    let seq = header_text(&headers, "seq");

    debug!(
        %method,
        path = path.as_str(),
        sid = ?sid,
        seq = ?seq,
        body_len = body.len(),
        "Incoming notification"
    );

    match check_gena_headers(sid, seq) {
        Ok((subscription_id, seq)) => {
            let payload = NotificationPayload {
                subscription_id,
                seq,
                event_xml: String::from_utf8_lossy(&body).into_owned(),
            };
            router.route_event(payload).await;
        }
        Err((subscription_id, reason)) => {
            warn!(sid = ?subscription_id, %reason, "Malformed notification");
            router.reject(subscription_id, reason);
        }
    }

    Ok(acknowledge())
}

/// Anything warp itself refuses (an unreadable body, say) is still acknowledged.
async fn acknowledge_rejection(
    err: warp::Rejection,
) -> Result<impl warp::Reply, std::convert::Infallible> {
    warn!(?err, "Request rejected before routing");
    Ok(acknowledge())
}

fn acknowledge() -> impl warp::Reply {
    warp::reply::with_status(warp::reply(), StatusCode::OK)
}

fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Validate the `SID` and `SEQ` headers of a notification.
///
/// On failure returns the SID (if any) and a reason.
fn check_gena_headers(
    sid: Option<String>,
    seq: Option<String>,
) -> Result<(String, u32), (Option<String>, String)> {
    let Some(sid) = sid else {
        return Err((None, "missing SID header".to_string()));
    };
    let Some(seq) = seq else {
        return Err((Some(sid), "missing SEQ header".to_string()));
    };
    match seq.parse::<u32>() {
        Ok(seq) => Ok((sid, seq)),
        Err(_) => Err((Some(sid), format!("invalid SEQ header: {seq}"))),
    }
}
