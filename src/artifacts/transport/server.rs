//! TCP server exposing one repository
//!
//! Each connection starts with `Hello`. When the server holds a token the
//! client must present the same `Credential::Token`, otherwise it receives a
//! 401 error frame and the connection is closed. Requests from all
//! connections are served against one `RemoteRepository` behind a mutex, so
//! pushes are applied one at a time. Requests run on tokio's blocking pool.

use crate::artifacts::transport::Credential;
use crate::artifacts::transport::codec::{read_message, write_message};
use crate::artifacts::transport::message::{Message, PROTOCOL_VERSION, codes};
use crate::artifacts::transport::parts::LargeObjects;
use crate::artifacts::transport::remote_repository::RemoteRepository;
use crate::artifacts::transport::url::DEFAULT_PORT;
use crate::errors::{Result, VcsError};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufStream;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Required from every client when set
    pub token: Option<String>,
    /// Repository to serve, bare or not
    pub path: PathBuf,
}

impl ServerConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ServerConfig {
            bind: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            token: None,
            path: path.into(),
        }
    }
}

pub struct Server {
    listener: TcpListener,
    repository: Arc<Mutex<RemoteRepository>>,
    token: Option<Arc<str>>,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let repository = RemoteRepository::open(&config.path)?;
        let listener = TcpListener::bind(config.bind)
            .await
            .map_err(|e| VcsError::Network(format!("cannot bind {}: {e}", config.bind)))?;

        Ok(Server {
            listener,
            repository: Arc::new(Mutex::new(repository)),
            token: config.token.map(Arc::from),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| VcsError::Network(format!("listener has no address: {e}")))
    }

    /// Accept connections until the future is dropped.
    pub async fn serve(self) -> Result<()> {
        tracing::info!(address = %self.local_addr()?, "serving repository");

        loop {
            let (stream, peer) = self
                .listener
                .accept()
                .await
                .map_err(|e| VcsError::Network(format!("accept failed: {e}")))?;
            tracing::info!(peer = %peer, "accepted connection");

            let connection = Connection {
                stream: BufStream::new(stream),
                peer,
                repository: Arc::clone(&self.repository),
                token: self.token.clone(),
                large_objects: LargeObjects::default(),
            };
            tokio::spawn(async move {
                if let Err(e) = connection.run().await {
                    tracing::warn!(peer = %peer, error = %e, "connection ended with an error");
                } else {
                    tracing::debug!(peer = %peer, "connection closed");
                }
            });
        }
    }
}

struct Connection {
    stream: BufStream<TcpStream>,
    peer: SocketAddr,
    repository: Arc<Mutex<RemoteRepository>>,
    token: Option<Arc<str>>,
    large_objects: LargeObjects,
}

impl Connection {
    async fn run(mut self) -> Result<()> {
        if !self.handshake().await? {
            return Ok(());
        }

        while let Some(request) = read_message(&mut self.stream).await? {
            let response = match self.handle(request).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::debug!(peer = %self.peer, error = %e, "request failed");
                    Message::from_error(&e)
                }
            };
            write_message(&mut self.stream, &response).await?;
        }

        Ok(())
    }

    /// Whether the client may go on sending requests.
    async fn handshake(&mut self) -> Result<bool> {
        let (version, credential) = match read_message(&mut self.stream).await? {
            Some(Message::Hello { version, credential }) => (version, credential),
            Some(other) => {
                let error = Message::Error {
                    code: codes::INVALID_ARGUMENT,
                    message: format!("expected Hello, got {}", other.type_name()),
                };
                write_message(&mut self.stream, &error).await?;
                return Ok(false);
            }
            None => return Ok(false),
        };

        if version != PROTOCOL_VERSION {
            let error = Message::Error {
                code: codes::INVALID_ARGUMENT,
                message: format!("protocol version mismatch: server {PROTOCOL_VERSION}, client {version}"),
            };
            write_message(&mut self.stream, &error).await?;
            return Ok(false);
        }

        if !self.is_authorized(credential.as_ref()) {
            tracing::warn!(peer = %self.peer, "rejected client with invalid credentials");
            let error = Message::from_error(&VcsError::AuthenticationFailed("invalid or missing token".into()));
            write_message(&mut self.stream, &error).await?;
            return Ok(false);
        }

        write_message(
            &mut self.stream,
            &Message::HelloAck {
                version: PROTOCOL_VERSION,
            },
        )
        .await?;

        Ok(true)
    }

    fn is_authorized(&self, credential: Option<&Credential>) -> bool {
        match (&self.token, credential) {
            (None, _) => true,
            (Some(expected), Some(Credential::Token(token))) => expected.as_ref() == token,
            (Some(_), _) => false,
        }
    }

    /// Requests run on the blocking pool: repository work is synchronous
    /// file I/O.
    async fn handle(&mut self, request: Message) -> Result<Message> {
        let repository = Arc::clone(&self.repository);
        let mut large_objects = std::mem::take(&mut self.large_objects);
        let peer = self.peer;

        let (large_objects, response) = tokio::task::spawn_blocking(move || {
            let repository = repository.blocking_lock();
            let response = dispatch(&repository, &mut large_objects, peer, request);
            (large_objects, response)
        })
        .await
        .map_err(|e| VcsError::Network(format!("request handler failed: {e}")))?;

        self.large_objects = large_objects;
        response
    }
}

fn dispatch(
    repository: &RemoteRepository,
    large_objects: &mut LargeObjects,
    peer: SocketAddr,
    request: Message,
) -> Result<Message> {
    match request {
        Message::ListRefs => Ok(Message::Refs(repository.advertise()?)),
        Message::Negotiate { wants, haves } => Ok(Message::ObjectList {
            ids: repository.negotiate(&wants, &haves)?,
        }),
        Message::GetObjects { ids } => Ok(Message::Objects {
            objects: repository.get_objects(&ids)?,
        }),
        Message::GetObjectPart { id, offset } => Ok(Message::Part(large_objects.read_part(
            repository.database(),
            &id,
            offset,
        )?)),
        Message::SendObjects { objects } => Ok(Message::Stored {
            count: repository.store_objects(&objects)?,
        }),
        Message::SendObjectPart(part) => {
            let stored = large_objects.write_part(repository.database(), part)?;
            Ok(Message::Stored {
                count: usize::from(stored),
            })
        }
        Message::UpdateRef { name, old, new } => {
            repository.update_ref(&name, old.as_ref(), &new)?;
            tracing::info!(peer = %peer, reference = %name, oid = %new, "accepted push");
            Ok(Message::RefUpdated)
        }
        other => Err(VcsError::InvalidArgument(format!(
            "unexpected {} request",
            other.type_name()
        ))),
    }
}
