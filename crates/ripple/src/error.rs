//! # Error Types
//!
//! Registration and lookup errors are programmer errors surfaced at startup;
//! dispatch errors are returned to the publisher. Nothing is retried.

use std::path::PathBuf;

use ripple_shared::KindId;
use thiserror::Error;

/// Errors raised while building or querying the payload registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The kind id is already bound to a different payload type.
    #[error("kind {id} already bound to {existing}, cannot bind {incoming}")]
    IdConflict {
        /// The contested id.
        id: KindId,
        /// Type currently holding the id.
        existing: &'static str,
        /// Type that tried to claim it.
        incoming: &'static str,
    },

    /// The payload type is already bound to a different kind id.
    #[error("{type_name} already registered as kind {existing}, cannot re-register as {requested}")]
    TypeConflict {
        /// The payload type.
        type_name: &'static str,
        /// Id it is bound to.
        existing: KindId,
        /// Id that was requested.
        requested: KindId,
    },

    /// Two payload types share one `Payload::NAME`.
    #[error("payload name '{name}' used by both {existing} and {incoming}")]
    DuplicateName {
        /// The shared name.
        name: &'static str,
        /// Type registered first.
        existing: &'static str,
        /// Type that tried to reuse the name.
        incoming: &'static str,
    },

    /// Lookup for a payload type that was never registered.
    #[error("payload type not registered: {0}")]
    UnregisteredType(&'static str),

    /// Lookup for a kind id no payload type is bound to.
    #[error("no payload type registered for kind {0}")]
    UnregisteredKind(KindId),

    /// The id allocator could not produce an id for this payload.
    #[error("no kind id available for payload '{0}'")]
    AllocatorExhausted(&'static str),

    /// Registered id disagrees with the wire schema's discriminant.
    #[error("wire variant '{variant}' uses discriminant {schema} but registry binds kind {registered}")]
    SchemaMismatch {
        /// Payload name of the variant.
        variant: &'static str,
        /// Discriminant in the wire schema.
        schema: KindId,
        /// Id in the registry.
        registered: KindId,
    },

    /// Wire schema names a payload the registry does not know.
    #[error("wire variant '{variant}' (discriminant {discriminant}) has no registered payload")]
    MissingSchemaPayload {
        /// Payload name of the variant.
        variant: &'static str,
        /// Discriminant in the wire schema.
        discriminant: KindId,
    },
}

/// Errors raised by the event bus.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Registry lookup failed (unregistered type or kind).
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Payload type does not match the type registered for the kind.
    #[error("kind {kind} carries {expected}, got {actual}")]
    KindTypeMismatch {
        /// The kind id used.
        kind: KindId,
        /// Type registered for the kind.
        expected: &'static str,
        /// Type that was supplied.
        actual: &'static str,
    },

    /// The deferred queue is full.
    #[error("event queue full (capacity {capacity}), kind {kind} rejected")]
    QueueFull {
        /// Kind of the rejected event.
        kind: KindId,
        /// Queue capacity.
        capacity: usize,
    },

    /// Handlers re-published recursively past the configured limit.
    #[error("dispatch depth limit {limit} exceeded")]
    DepthExceeded {
        /// Configured limit.
        limit: u32,
    },
}

/// Errors loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The config is not valid TOML for this schema.
    #[error("invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values parsed but are out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;
