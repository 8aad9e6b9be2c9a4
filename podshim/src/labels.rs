//! Metadata codec.
//!
//! The engine has no notion of a pod sandbox, so orchestrator identity is
//! carried in reserved keys on the engine record's label map, next to the
//! caller's own labels. Annotations ride along under [`keys::ANNOTATION_PREFIX`].
//!
//! ```text
//! io.kubernetes.docker.type        = container | podsandbox
//! io.kubernetes.sandbox.id         = <sandbox id>        (containers)
//! io.kubernetes.container.name     = <name>              (containers)
//! io.kubernetes.container.attempt  = <u32>               (containers)
//! io.kubernetes.pod.{name,namespace,uid,attempt}         (sandboxes)
//! annotation.<key>                 = <annotation value>
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Flat string map stored on engine records.
pub type Labels = HashMap<String, String>;

/// Reserved label keys and discriminator values.
pub mod keys {
    pub const TYPE: &str = "io.kubernetes.docker.type";
    pub const TYPE_CONTAINER: &str = "container";
    pub const TYPE_SANDBOX: &str = "podsandbox";

    pub const SANDBOX_ID: &str = "io.kubernetes.sandbox.id";
    pub const CONTAINER_NAME: &str = "io.kubernetes.container.name";
    pub const CONTAINER_ATTEMPT: &str = "io.kubernetes.container.attempt";

    pub const POD_NAME: &str = "io.kubernetes.pod.name";
    pub const POD_NAMESPACE: &str = "io.kubernetes.pod.namespace";
    pub const POD_UID: &str = "io.kubernetes.pod.uid";
    pub const POD_ATTEMPT: &str = "io.kubernetes.pod.attempt";

    pub const ANNOTATION_PREFIX: &str = "annotation.";

    /// Every exact key the codec may write.
    pub const RESERVED: &[&str] = &[
        TYPE,
        SANDBOX_ID,
        CONTAINER_NAME,
        CONTAINER_ATTEMPT,
        POD_NAME,
        POD_NAMESPACE,
        POD_UID,
        POD_ATTEMPT,
    ];
}

/// Record kind, taken from the discriminator label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Container,
    Sandbox,
}

impl RecordKind {
    pub fn as_label(&self) -> &'static str {
        match self {
            RecordKind::Container => keys::TYPE_CONTAINER,
            RecordKind::Sandbox => keys::TYPE_SANDBOX,
        }
    }
}

/// Container identity echoed back in status.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ContainerMetadata {
    pub name: String,
    pub attempt: u32,
}

/// Sandbox (pod) identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SandboxMetadata {
    pub name: String,
    pub namespace: String,
    pub uid: String,
    pub attempt: u32,
}

/// Identity decoded from a record's labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordIdentity {
    Container {
        metadata: ContainerMetadata,
        sandbox_id: String,
    },
    Sandbox {
        metadata: SandboxMetadata,
    },
}

impl RecordIdentity {
    pub fn kind(&self) -> RecordKind {
        match self {
            RecordIdentity::Container { .. } => RecordKind::Container,
            RecordIdentity::Sandbox { .. } => RecordKind::Sandbox,
        }
    }
}

/// Why a label map could not be decoded or built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LabelError {
    #[error("missing reserved label '{0}'")]
    Missing(&'static str),

    #[error("label '{key}' has unparsable value '{value}'")]
    Unparsable { key: &'static str, value: String },

    #[error("unknown record type '{0}'")]
    UnknownKind(String),

    #[error("label key '{0}' is reserved")]
    Reserved(String),
}

/// Whether `key` belongs to the codec's namespace.
pub fn is_reserved(key: &str) -> bool {
    keys::RESERVED.contains(&key) || key.starts_with(keys::ANNOTATION_PREFIX)
}

/// Encode identity into reserved labels only.
pub fn encode(identity: &RecordIdentity) -> Labels {
    let mut labels = Labels::new();
    labels.insert(keys::TYPE.to_string(), identity.kind().as_label().to_string());

    match identity {
        RecordIdentity::Container {
            metadata,
            sandbox_id,
        } => {
            labels.insert(keys::SANDBOX_ID.to_string(), sandbox_id.clone());
            labels.insert(keys::CONTAINER_NAME.to_string(), metadata.name.clone());
            labels.insert(
                keys::CONTAINER_ATTEMPT.to_string(),
                metadata.attempt.to_string(),
            );
        }
        RecordIdentity::Sandbox { metadata } => {
            labels.insert(keys::POD_NAME.to_string(), metadata.name.clone());
            labels.insert(keys::POD_NAMESPACE.to_string(), metadata.namespace.clone());
            labels.insert(keys::POD_UID.to_string(), metadata.uid.clone());
            labels.insert(keys::POD_ATTEMPT.to_string(), metadata.attempt.to_string());
        }
    }

    labels
}

/// Build the full engine label map: reserved identity keys, caller labels,
/// and prefixed annotations.
///
/// Caller labels may not use reserved keys; annotation keys are namespaced
/// by the prefix and cannot collide.
pub fn merge(
    identity: &RecordIdentity,
    labels: &Labels,
    annotations: &Labels,
) -> Result<Labels, LabelError> {
    if let Some(key) = labels.keys().find(|k| is_reserved(k)) {
        return Err(LabelError::Reserved(key.clone()));
    }

    let mut merged = encode(identity);
    merged.extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged.extend(
        annotations
            .iter()
            .map(|(k, v)| (format!("{}{}", keys::ANNOTATION_PREFIX, k), v.clone())),
    );
    Ok(merged)
}

/// Decode identity from a label map.
pub fn decode(labels: &Labels) -> Result<RecordIdentity, LabelError> {
    let kind = required(labels, keys::TYPE)?;

    match kind {
        keys::TYPE_CONTAINER => {
            let sandbox_id = required(labels, keys::SANDBOX_ID)?;
            if sandbox_id.is_empty() {
                return Err(LabelError::Unparsable {
                    key: keys::SANDBOX_ID,
                    value: String::new(),
                });
            }
            Ok(RecordIdentity::Container {
                metadata: ContainerMetadata {
                    name: required(labels, keys::CONTAINER_NAME)?.to_string(),
                    attempt: attempt(labels, keys::CONTAINER_ATTEMPT)?,
                },
                sandbox_id: sandbox_id.to_string(),
            })
        }
        keys::TYPE_SANDBOX => Ok(RecordIdentity::Sandbox {
            metadata: SandboxMetadata {
                name: required(labels, keys::POD_NAME)?.to_string(),
                namespace: required(labels, keys::POD_NAMESPACE)?.to_string(),
                uid: required(labels, keys::POD_UID)?.to_string(),
                attempt: attempt(labels, keys::POD_ATTEMPT)?,
            },
        }),
        other => Err(LabelError::UnknownKind(other.to_string())),
    }
}

/// Split a record's labels back into caller labels and annotations,
/// dropping every reserved key.
pub fn strip(labels: &Labels) -> (Labels, Labels) {
    let mut user = Labels::new();
    let mut annotations = Labels::new();

    for (key, value) in labels {
        if let Some(annotation) = key.strip_prefix(keys::ANNOTATION_PREFIX) {
            annotations.insert(annotation.to_string(), value.clone());
        } else if !keys::RESERVED.contains(&key.as_str()) {
            user.insert(key.clone(), value.clone());
        }
    }

    (user, annotations)
}

fn required<'a>(labels: &'a Labels, key: &'static str) -> Result<&'a str, LabelError> {
    labels
        .get(key)
        .map(String::as_str)
        .ok_or(LabelError::Missing(key))
}

fn attempt(labels: &Labels, key: &'static str) -> Result<u32, LabelError> {
    let raw = required(labels, key)?;
    raw.parse().map_err(|_| LabelError::Unparsable {
        key,
        value: raw.to_string(),
    })
}
