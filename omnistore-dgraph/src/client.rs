//! Thin gRPC client over the Dgraph service.

use std::time::Duration;

use http::uri::PathAndQuery;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::transport::{Channel, Endpoint};
use tonic::Status;

use crate::proto;
use omnistore_core::{StorageError, StorageResult};

/// Unary client for `api.Dgraph`. Cheap to clone; clones share the channel.
#[derive(Clone)]
pub struct DgraphClient {
    inner: Grpc<Channel>,
}

impl DgraphClient {
    /// Connect to `host:port`.
    pub async fn connect(target: &str, timeout: Option<Duration>) -> StorageResult<Self> {
        let mut endpoint = Endpoint::try_from(format!("http://{target}"))
            .map_err(|e| StorageError::Connection(format!("invalid graph target {target}: {e}")))?;
        if let Some(timeout) = timeout {
            endpoint = endpoint.connect_timeout(timeout);
        }
        let channel = endpoint
            .connect()
            .await
            .map_err(|e| StorageError::Connection(format!("graph store unreachable at {target}: {e}")))?;
        Ok(Self {
            inner: Grpc::new(channel),
        })
    }

    async fn ready(&mut self) -> Result<(), Status> {
        self.inner
            .ready()
            .await
            .map_err(|e| Status::unknown(format!("Service was not ready: {e}")))
    }

    pub async fn query(&mut self, request: proto::Request) -> Result<proto::Response, Status> {
        self.ready().await?;
        let codec: ProstCodec<proto::Request, proto::Response> = ProstCodec::default();
        let path = PathAndQuery::from_static("/api.Dgraph/Query");
        self.inner
            .unary(tonic::Request::new(request), path, codec)
            .await
            .map(|response| response.into_inner())
    }

    pub async fn alter(&mut self, operation: proto::Operation) -> Result<proto::Payload, Status> {
        self.ready().await?;
        let codec: ProstCodec<proto::Operation, proto::Payload> = ProstCodec::default();
        let path = PathAndQuery::from_static("/api.Dgraph/Alter");
        self.inner
            .unary(tonic::Request::new(operation), path, codec)
            .await
            .map(|response| response.into_inner())
    }

    pub async fn commit_or_abort(
        &mut self,
        txn: proto::TxnContext,
    ) -> Result<proto::TxnContext, Status> {
        self.ready().await?;
        let codec: ProstCodec<proto::TxnContext, proto::TxnContext> = ProstCodec::default();
        let path = PathAndQuery::from_static("/api.Dgraph/CommitOrAbort");
        self.inner
            .unary(tonic::Request::new(txn), path, codec)
            .await
            .map(|response| response.into_inner())
    }

    pub async fn check_version(&mut self) -> Result<proto::Version, Status> {
        self.ready().await?;
        let codec: ProstCodec<proto::Check, proto::Version> = ProstCodec::default();
        let path = PathAndQuery::from_static("/api.Dgraph/CheckVersion");
        self.inner
            .unary(tonic::Request::new(proto::Check {}), path, codec)
            .await
            .map(|response| response.into_inner())
    }
}
