use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use crate::{Document, DocumentStore, Error, Filter, Result, Update};
use log::{info, error};
use tokio::sync::Semaphore;

/// Payload of an `UPDATE_ONE` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub filter: Filter,
    pub update: Update,
}

pub struct Router {
    store: Arc<dyn DocumentStore>,
    semaphore: Arc<Semaphore>,
}

impl Router {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            semaphore: Arc::new(Semaphore::new(100)),
        }
    }

    pub async fn listen(&self, port: &str) -> Result<()> {
        let listener = TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
        info!("Flatdoc listening on port {}", port);
        self.serve(listener).await
    }

    /// Accepts connections on an already bound listener until it fails.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            let (socket, peer) = listener.accept().await?;
            let store = self.store.clone();
            let sem = self.semaphore.clone();

            tokio::spawn(async move {
                let _permit = match sem.try_acquire() {
                    Ok(p) => p,
                    Err(_) => {
                        error!("Server busy: too many concurrent connections. Rejecting {}", peer);
                        let mut socket = socket;
                        let _ = socket.shutdown().await;
                        return;
                    }
                };

                if let Err(e) = handle_connection(socket, store).await {
                    error!("Connection error from {}: {}", peer, e);
                }
            });
        }
    }
}

pub async fn handle_connection(mut socket: TcpStream, store: Arc<dyn DocumentStore>) -> Result<()> {
    let (reader, mut writer) = socket.split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break;
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut parts = line.splitn(4, ' ');
        let command = parts.next().unwrap_or_default().to_uppercase();
        let response = match command.as_str() {
            "PING" => "PONG".to_string(),
            "QUIT" => break,
            _ => {
                let (db, collection, payload) = (parts.next(), parts.next(), parts.next());
                match (db, collection) {
                    (Some(db), Some(collection)) => {
                        match dispatch(store.as_ref(), &command, db, collection, payload).await {
                            Ok(Value::Null) => "OK".to_string(),
                            Ok(out) => format!("OK {}", serde_json::to_string(&out)?),
                            Err(e) => format!("ERR {}", e),
                        }
                    }
                    _ => "ERR missing arguments".to_string(),
                }
            }
        };

        writer.write_all(format!("{}\n", response).as_bytes()).await?;
    }
    Ok(())
}

fn payload<T: serde::de::DeserializeOwned>(payload: Option<&str>) -> Result<T> {
    let raw = payload.ok_or_else(|| Error::Validation("missing arguments".to_string()))?;
    serde_json::from_str(raw).map_err(|e| Error::Validation(format!("invalid json payload: {}", e)))
}

async fn dispatch(
    store: &dyn DocumentStore,
    command: &str,
    db: &str,
    collection: &str,
    raw: Option<&str>,
) -> Result<Value> {
    let coll = store.collection(db, collection);
    let out = match command {
        "FIND" => {
            let filter = match raw {
                Some(_) => payload(raw)?,
                None => Filter::all(),
            };
            serde_json::to_value(coll.find(&filter).await?)?
        }
        "INSERT_ONE" => {
            let doc: Document = payload(raw)?;
            serde_json::to_value(coll.insert_one(doc).await?)?
        }
        "INSERT_MANY" => {
            let docs: Vec<Document> = payload(raw)?;
            serde_json::to_value(coll.insert_many(docs).await?)?
        }
        "UPDATE_ONE" => {
            let req: UpdateRequest = payload(raw)?;
            serde_json::to_value(coll.update_one(&req.filter, req.update).await?)?
        }
        "DELETE_ONE" => {
            let filter: Filter = payload(raw)?;
            serde_json::to_value(coll.delete_one(&filter).await?)?
        }
        "DELETE_MANY" => {
            let filter: Filter = payload(raw)?;
            serde_json::to_value(coll.delete_many(&filter).await?)?
        }
        "DROP" => {
            coll.drop_collection().await?;
            Value::Null
        }
        "DISTINCT" => {
            let field = raw
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .ok_or_else(|| Error::Validation("missing arguments".to_string()))?;
            Value::Array(coll.distinct(field).await?)
        }
        _ => return Err(Error::Validation("unknown command".to_string())),
    };
    Ok(out)
}
