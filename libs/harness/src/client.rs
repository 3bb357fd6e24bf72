//! Control-plane client seam.
//!
//! The harness never reconciles anything itself. It submits objects and reads
//! them back through this trait, so the same scenario code runs against a real
//! cluster ([`KubeControlPlane`](crate::cluster::KubeControlPlane)) or an
//! in-memory double.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;
use jobprobe_names::{NamespaceName, ObjectName};
use thiserror::Error;

use crate::objects::{ClusterObject, ObjectRef};
use crate::status::ObservedObject;

/// Byte stream of a unit of work's execution log.
pub type LogStream = Pin<Box<dyn Stream<Item = Result<Bytes, ControlPlaneError>> + Send>>;

/// Errors reported by the control plane.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ControlPlaneError {
    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The caller lacks permission for the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The request was rejected by validation, e.g. an immutable field.
    #[error("invalid: {0}")]
    Invalid(String),

    /// The control plane could not be reached or asked us to back off.
    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Other(String),
}

impl ControlPlaneError {
    /// Returns true if retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ControlPlaneError::Unavailable(_))
    }
}

/// Object submission and status read API of the orchestration system.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Creates an object. Fails with `AlreadyExists` on a name collision.
    async fn create(&self, object: &ClusterObject) -> Result<ObjectRef, ControlPlaneError>;

    /// Replaces an existing object.
    async fn update(&self, object: &ClusterObject) -> Result<ObjectRef, ControlPlaneError>;

    /// Reads the current state of an object.
    async fn get(&self, object: &ObjectRef) -> Result<ObservedObject, ControlPlaneError>;

    /// Opens the execution log of a unit of work.
    async fn stream_logs(
        &self,
        namespace: &NamespaceName,
        unit_of_work: &ObjectName,
    ) -> Result<LogStream, ControlPlaneError>;

    /// Deletes a namespace and everything in it. Deleting a missing
    /// namespace succeeds.
    async fn delete_namespace(&self, namespace: &NamespaceName) -> Result<(), ControlPlaneError>;

    /// Returns true if the control plane serves the given API group.
    async fn serves_api_group(&self, group: &str) -> Result<bool, ControlPlaneError>;
}
