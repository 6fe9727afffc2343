use std::sync::Arc;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use crate::document::ensure_id;
use crate::server::router::UpdateRequest;
use crate::{
    DeleteResult, Document, DocumentCollection, DocumentDatabase, DocumentStore, Error, Filter,
    InsertManyResult, InsertOneResult, Result, Update, UpdateResult,
};

/// Remote client for a `flatdoc-stored` daemon.
///
/// Cloning is cheap; clones share one connection. The client implements [`DocumentStore`],
/// so callers use it exactly like the embedded [`Registry`](crate::engine::Registry).
#[derive(Clone)]
pub struct Client {
    addr: Arc<str>,
    inner: Arc<Mutex<Option<ClientInner>>>,
}

struct ClientInner {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

impl Client {
    pub async fn connect(addr: &str) -> Result<Self> {
        let inner = Client::connect_inner(addr).await?;
        Ok(Self {
            addr: Arc::from(addr),
            inner: Arc::new(Mutex::new(Some(inner))),
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Sends one command line and returns the payload of the `OK` response.
    async fn send_and_receive(&self, cmd: String) -> Result<String> {
        let mut inner_guard = self.inner.lock().await;

        // Retry logic
        for i in 0..3u64 {
            if inner_guard.is_none() {
                match Client::connect_inner(&self.addr).await {
                    Ok(inner) => *inner_guard = Some(inner),
                    Err(e) => {
                        if i == 2 {
                            return Err(e);
                        }
                        tokio::time::sleep(std::time::Duration::from_millis((i + 1) * 200)).await;
                        continue;
                    }
                }
            }

            let Some(inner) = inner_guard.as_mut() else {
                continue;
            };

            if inner.writer.write_all(format!("{}\n", cmd).as_bytes()).await.is_err() {
                *inner_guard = None;
                continue;
            }

            let mut resp = String::new();
            match inner.reader.read_line(&mut resp).await {
                Ok(0) | Err(_) => {
                    *inner_guard = None;
                    continue;
                }
                Ok(_) => return parse_response(resp.trim()),
            }
        }

        Err(Error::Internal("failed after 3 attempts".to_string()))
    }

    async fn connect_inner(addr: &str) -> Result<ClientInner> {
        let stream = TcpStream::connect(addr).await?;
        let (reader, writer) = stream.into_split();
        Ok(ClientInner {
            reader: BufReader::new(reader),
            writer,
        })
    }

    async fn request<T: DeserializeOwned>(
        &self,
        command: &str,
        db: &str,
        collection: &str,
        payload: Option<String>,
    ) -> Result<T> {
        for name in [db, collection] {
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(Error::Validation(format!("invalid name {:?} for remote mode", name)));
            }
        }
        let mut cmd = format!("{} {} {}", command, db, collection);
        if let Some(payload) = payload {
            cmd.push(' ');
            cmd.push_str(&payload);
        }
        let resp = self.send_and_receive(cmd).await?;
        Ok(serde_json::from_str(&resp)?)
    }

    pub async fn ping(&self) -> Result<()> {
        match self.send_and_receive("PING".to_string()).await?.as_str() {
            "PONG" => Ok(()),
            other => Err(Error::Internal(format!("unexpected ping response {:?}", other))),
        }
    }
}

/// Maps a response line to its payload or to the error the daemon reported.
fn parse_response(resp: &str) -> Result<String> {
    if let Some(msg) = resp.strip_prefix("ERR ") {
        return Err(match msg.strip_prefix("validation error: ") {
            Some(reason) => Error::Validation(reason.to_string()),
            None => Error::Remote(msg.to_string()),
        });
    }
    match resp {
        "OK" => Ok("null".to_string()),
        "PONG" => Ok(resp.to_string()),
        _ => resp
            .strip_prefix("OK ")
            .map(str::to_string)
            .ok_or_else(|| Error::Internal(format!("Invalid response: {}", resp))),
    }
}

impl DocumentStore for Client {
    fn database(&self, name: &str) -> Arc<dyn DocumentDatabase> {
        Arc::new(RemoteDatabase {
            client: self.clone(),
            name: name.to_string(),
        })
    }
}

pub struct RemoteDatabase {
    client: Client,
    name: String,
}

impl DocumentDatabase for RemoteDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn collection(&self, name: &str) -> Arc<dyn DocumentCollection> {
        Arc::new(RemoteCollection {
            client: self.client.clone(),
            db: self.name.clone(),
            name: name.to_string(),
        })
    }
}

pub struct RemoteCollection {
    client: Client,
    db: String,
    name: String,
}

impl RemoteCollection {
    async fn request<T: DeserializeOwned>(
        &self,
        command: &str,
        payload: &(impl Serialize + ?Sized + Sync),
    ) -> Result<T> {
        let payload = serde_json::to_string(payload)?;
        self.client.request(command, &self.db, &self.name, Some(payload)).await
    }
}

#[async_trait]
impl DocumentCollection for RemoteCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(&self, filter: &Filter) -> Result<Vec<Document>> {
        self.request("FIND", filter).await
    }

    /// Identities are assigned here rather than by the daemon, so a command resent after a
    /// lost reply hits the duplicate-identity check instead of storing a second copy.
    async fn insert_one(&self, mut document: Document) -> Result<InsertOneResult> {
        ensure_id(&mut document)?;
        self.request("INSERT_ONE", &document).await
    }

    async fn insert_many(&self, mut documents: Vec<Document>) -> Result<InsertManyResult> {
        for doc in documents.iter_mut() {
            ensure_id(doc)?;
        }
        self.request("INSERT_MANY", &documents).await
    }

    async fn update_one(&self, filter: &Filter, update: Update) -> Result<UpdateResult> {
        let req = UpdateRequest { filter: filter.clone(), update };
        self.request("UPDATE_ONE", &req).await
    }

    async fn delete_one(&self, filter: &Filter) -> Result<DeleteResult> {
        self.request("DELETE_ONE", filter).await
    }

    async fn delete_many(&self, filter: &Filter) -> Result<DeleteResult> {
        self.request("DELETE_MANY", filter).await
    }

    async fn drop_collection(&self) -> Result<()> {
        let _: Value = self.client.request("DROP", &self.db, &self.name, None).await?;
        Ok(())
    }

    async fn distinct(&self, field: &str) -> Result<Vec<Value>> {
        if field.is_empty() || field.contains(['\n', '\r']) {
            return Err(Error::Validation(format!("invalid field name {:?}", field)));
        }
        self.client
            .request("DISTINCT", &self.db, &self.name, Some(field.to_string()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response() {
        assert_eq!(parse_response("OK [1]").unwrap(), "[1]");
        assert_eq!(parse_response("OK").unwrap(), "null");
        assert!(matches!(parse_response("ERR validation error: bad"), Err(Error::Validation(m)) if m == "bad"));
        assert!(matches!(parse_response("ERR IO error: denied"), Err(Error::Remote(_))));
        assert!(matches!(parse_response("garbage"), Err(Error::Internal(_))));
    }
}
