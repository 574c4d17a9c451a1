//! Client side of the framed protocol
//!
//! One request frame, one response frame. Any `Error` frame is turned back
//! into the matching `VcsError`; an unexpected frame is a protocol violation
//! and surfaces as `Network`.

use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::transport::codec::{read_message, write_message};
use crate::artifacts::transport::message::{Message, PROTOCOL_VERSION};
use crate::artifacts::transport::{Advertisement, Credential, ObjectPart, Transport, WireObject};
use crate::errors::{Result, VcsError};
use async_trait::async_trait;
use tokio::io::BufStream;
use tokio::net::TcpStream;

#[derive(Debug)]
pub struct TcpTransport {
    stream: BufStream<TcpStream>,
    address: String,
}

impl TcpTransport {
    /// Connect and complete the handshake.
    pub async fn connect(host: &str, port: u16, credential: Option<Credential>) -> Result<Self> {
        let address = format!("{host}:{port}");
        let stream = TcpStream::connect(&address)
            .await
            .map_err(|e| VcsError::Network(format!("cannot connect to {address}: {e}")))?;
        // the protocol is strictly request/response
        let _ = stream.set_nodelay(true);

        let mut transport = TcpTransport {
            stream: BufStream::new(stream),
            address,
        };

        let hello = Message::Hello {
            version: PROTOCOL_VERSION,
            credential,
        };
        match transport.call(hello).await? {
            Message::HelloAck { version } if version == PROTOCOL_VERSION => {}
            Message::HelloAck { version } => {
                return Err(VcsError::Network(format!(
                    "protocol version mismatch: local {PROTOCOL_VERSION}, remote {version}"
                )));
            }
            other => return Err(Self::unexpected("HelloAck", &other)),
        }
        tracing::debug!(address = %transport.address, "connected");

        Ok(transport)
    }

    async fn call(&mut self, request: Message) -> Result<Message> {
        write_message(&mut self.stream, &request).await?;

        match read_message(&mut self.stream).await? {
            Some(Message::Error { code, message }) => Err(Message::into_error(code, message)),
            Some(response) => Ok(response),
            None => Err(VcsError::Network(format!(
                "{} closed the connection during {}",
                self.address,
                request.type_name()
            ))),
        }
    }

    fn unexpected(expected: &str, actual: &Message) -> VcsError {
        VcsError::Network(format!("expected {expected}, got {}", actual.type_name()))
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn advertise(&mut self) -> Result<Advertisement> {
        match self.call(Message::ListRefs).await? {
            Message::Refs(advertisement) => Ok(advertisement),
            other => Err(Self::unexpected("Refs", &other)),
        }
    }

    async fn negotiate(&mut self, wants: Vec<ObjectId>, haves: Vec<ObjectId>) -> Result<Vec<ObjectId>> {
        match self.call(Message::Negotiate { wants, haves }).await? {
            Message::ObjectList { ids } => Ok(ids),
            other => Err(Self::unexpected("ObjectList", &other)),
        }
    }

    async fn fetch_objects(&mut self, ids: Vec<ObjectId>) -> Result<Vec<WireObject>> {
        match self.call(Message::GetObjects { ids }).await? {
            Message::Objects { objects } => Ok(objects),
            other => Err(Self::unexpected("Objects", &other)),
        }
    }

    async fn fetch_object_part(&mut self, id: ObjectId, offset: u64) -> Result<ObjectPart> {
        match self.call(Message::GetObjectPart { id, offset }).await? {
            Message::Part(part) => Ok(part),
            other => Err(Self::unexpected("Part", &other)),
        }
    }

    async fn send_objects(&mut self, objects: Vec<WireObject>) -> Result<usize> {
        match self.call(Message::SendObjects { objects }).await? {
            Message::Stored { count } => Ok(count),
            other => Err(Self::unexpected("Stored", &other)),
        }
    }

    async fn send_object_part(&mut self, part: ObjectPart) -> Result<()> {
        match self.call(Message::SendObjectPart(part)).await? {
            Message::Stored { .. } => Ok(()),
            other => Err(Self::unexpected("Stored", &other)),
        }
    }

    async fn update_ref(&mut self, name: String, old: Option<ObjectId>, new: ObjectId) -> Result<()> {
        match self.call(Message::UpdateRef { name, old, new }).await? {
            Message::RefUpdated => Ok(()),
            other => Err(Self::unexpected("RefUpdated", &other)),
        }
    }
}
