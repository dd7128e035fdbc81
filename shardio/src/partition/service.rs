use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::buffer::FlushReport;
use super::local::{LocalFile, WriteAck};
use crate::config::{OpenMode, PartitionOptions, Whence};
use crate::directory::Location;
use crate::error::{Result, ShardError};

/// Remote-callable interface of a partition unit.
///
/// Every method may be invoked from another task; implementations must apply
/// calls against one unit in the order they arrive.
#[async_trait]
pub trait PartitionService: Send + Sync {
    async fn open(&self, path: &str, mode: OpenMode) -> Result<()>;

    async fn is_open(&self) -> Result<bool>;

    async fn close(&self) -> Result<()>;

    async fn remove_file(&self, path: &str) -> Result<()>;

    async fn read(&self, count: usize) -> Result<Vec<u8>>;

    async fn pread(&self, count: usize, offset: u64) -> Result<Vec<u8>>;

    async fn write(&self, data: Bytes) -> Result<usize>;

    async fn pwrite(&self, data: Bytes, offset: u64) -> Result<WriteAck>;

    async fn flush(&self) -> Result<FlushReport>;

    async fn seek(&self, offset: i64, whence: Whence) -> Result<u64>;

    async fn tell(&self) -> Result<u64>;

    async fn size(&self) -> Result<u64>;

    /// Locality the unit lives on.
    fn location(&self) -> Location {
        Location::local()
    }
}

pub type PartitionRef = Arc<dyn PartitionService>;

type Reply<T> = oneshot::Sender<Result<T>>;

enum Request {
    Open {
        path: String,
        mode: OpenMode,
        reply: Reply<()>,
    },
    IsOpen {
        reply: Reply<bool>,
    },
    Close {
        reply: Reply<()>,
    },
    RemoveFile {
        path: String,
        reply: Reply<()>,
    },
    Read {
        count: usize,
        reply: Reply<Vec<u8>>,
    },
    Pread {
        count: usize,
        offset: u64,
        reply: Reply<Vec<u8>>,
    },
    Write {
        data: Bytes,
        reply: Reply<usize>,
    },
    Pwrite {
        data: Bytes,
        offset: u64,
        reply: Reply<WriteAck>,
    },
    Flush {
        reply: Reply<FlushReport>,
    },
    Seek {
        offset: i64,
        whence: Whence,
        reply: Reply<u64>,
    },
    Tell {
        reply: Reply<u64>,
    },
    Size {
        reply: Reply<u64>,
    },
}

/// Handle on a `LocalFile` served by its own task.
///
/// Clones share the unit. The task closes the file once the last handle is
/// gone.
#[derive(Clone)]
pub struct LocalPartition {
    tx: UnboundedSender<Request>,
    location: Location,
}

impl LocalPartition {
    /// Spawns the unit's task on the current tokio runtime.
    pub fn spawn(options: PartitionOptions, location: Location) -> Self {
        let (tx, rx) = unbounded_channel();
        tokio::spawn(serve(LocalFile::new(options), rx));
        Self { tx, location }
    }

    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Request) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .map_err(|_| ShardError::remote(format!("unit on {} has stopped", self.location)))?;
        rx.await.map_err(|_| {
            ShardError::remote(format!("unit on {} dropped the reply", self.location))
        })?
    }
}

async fn serve(mut unit: LocalFile, mut rx: UnboundedReceiver<Request>) {
    while let Some(req) = rx.recv().await {
        match req {
            Request::Open { path, mode, reply } => {
                let _ = reply.send(unit.open(&path, mode).await);
            }
            Request::IsOpen { reply } => {
                let _ = reply.send(Ok(unit.is_open()));
            }
            Request::Close { reply } => {
                let _ = reply.send(unit.close().await);
            }
            Request::RemoveFile { path, reply } => {
                let _ = reply.send(unit.remove_file(&path).await);
            }
            Request::Read { count, reply } => {
                let _ = reply.send(unit.read(count).await);
            }
            Request::Pread {
                count,
                offset,
                reply,
            } => {
                let _ = reply.send(unit.pread(count, offset).await);
            }
            Request::Write { data, reply } => {
                let _ = reply.send(unit.write(data).await);
            }
            Request::Pwrite {
                data,
                offset,
                reply,
            } => {
                let _ = reply.send(unit.pwrite(data, offset).await);
            }
            Request::Flush { reply } => {
                let _ = reply.send(unit.flush().await);
            }
            Request::Seek {
                offset,
                whence,
                reply,
            } => {
                let _ = reply.send(unit.seek(offset, whence).await);
            }
            Request::Tell { reply } => {
                let _ = reply.send(unit.tell());
            }
            Request::Size { reply } => {
                let _ = reply.send(unit.size().await);
            }
        }
    }
    if let Err(err) = unit.close().await {
        warn!("closing released partition unit failed: {err}");
    }
    debug!("partition unit task finished");
}

#[async_trait]
impl PartitionService for LocalPartition {
    async fn open(&self, path: &str, mode: OpenMode) -> Result<()> {
        let path = path.to_string();
        self.call(|reply| Request::Open { path, mode, reply }).await
    }

    async fn is_open(&self) -> Result<bool> {
        self.call(|reply| Request::IsOpen { reply }).await
    }

    async fn close(&self) -> Result<()> {
        self.call(|reply| Request::Close { reply }).await
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        let path = path.to_string();
        self.call(|reply| Request::RemoveFile { path, reply }).await
    }

    async fn read(&self, count: usize) -> Result<Vec<u8>> {
        self.call(|reply| Request::Read { count, reply }).await
    }

    async fn pread(&self, count: usize, offset: u64) -> Result<Vec<u8>> {
        self.call(|reply| Request::Pread {
            count,
            offset,
            reply,
        })
        .await
    }

    async fn write(&self, data: Bytes) -> Result<usize> {
        self.call(|reply| Request::Write { data, reply }).await
    }

    async fn pwrite(&self, data: Bytes, offset: u64) -> Result<WriteAck> {
        self.call(|reply| Request::Pwrite {
            data,
            offset,
            reply,
        })
        .await
    }

    async fn flush(&self) -> Result<FlushReport> {
        self.call(|reply| Request::Flush { reply }).await
    }

    async fn seek(&self, offset: i64, whence: Whence) -> Result<u64> {
        self.call(|reply| Request::Seek {
            offset,
            whence,
            reply,
        })
        .await
    }

    async fn tell(&self) -> Result<u64> {
        self.call(|reply| Request::Tell { reply }).await
    }

    async fn size(&self) -> Result<u64> {
        self.call(|reply| Request::Size { reply }).await
    }

    fn location(&self) -> Location {
        self.location.clone()
    }
}
