//! # Payload Registry
//!
//! Binds each payload type to one small integer kind id, and each id to at
//! most one payload type.
//!
//! ## Lifecycle
//!
//! ```text
//! startup:   RegistryBuilder ── register / register_with ──> build()
//!                                                              │
//! runtime:   Arc<PayloadRegistry>  (immutable, lock-free reads)  <┘
//! ```
//!
//! Registration is an explicit, ordered call made by the application's
//! startup code. There is no static registration; the event bus only accepts
//! a frozen registry, so nothing can be published before registration ends.
//!
//! ## Id assignment
//!
//! Ids are either given explicitly ([`RegistryBuilder::register`]) or produced
//! by a [`KindAllocator`]:
//!
//! - [`SequentialKinds`]: lowest free id
//! - [`HashedKinds`]: FNV-1a of the payload name, linear probing
//! - [`ConfiguredKinds`]: the `[kinds]` table of the config file

use std::any::{type_name, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use ripple_shared::{KindId, Payload, SchemaVariant};

use crate::config::KindTable;
use crate::error::{RegistryError, RegistryResult};

/// Runtime identity of a registered payload type.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PayloadType {
    type_id: TypeId,
    type_name: &'static str,
    name: &'static str,
}

impl PayloadType {
    /// Identity of `T`.
    #[must_use]
    pub fn of<T: Payload>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            name: T::NAME,
        }
    }

    /// The Rust `TypeId`.
    #[must_use]
    pub const fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// The Rust type name, for diagnostics.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The payload's `Payload::NAME`.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Whether this is the identity of `T`.
    #[must_use]
    pub fn is<T: Payload>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl fmt::Debug for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PayloadType({} '{}')", self.type_name, self.name)
    }
}

/// Strategy producing kind ids for payloads registered without one.
pub trait KindAllocator {
    /// Proposes an id for the payload named `name`.
    ///
    /// `is_claimed` reports ids already bound in the registry being built.
    /// Returns `None` when no id can be produced.
    fn allocate(
        &mut self,
        name: &'static str,
        is_claimed: &dyn Fn(KindId) -> bool,
    ) -> Option<KindId>;
}

/// Hands out the lowest unclaimed id at or above a starting point.
#[derive(Clone, Debug)]
pub struct SequentialKinds {
    next: u32,
}

impl SequentialKinds {
    /// Allocator starting at `first`.
    #[must_use]
    pub const fn starting_at(first: u16) -> Self {
        Self { next: first as u32 }
    }
}

impl Default for SequentialKinds {
    fn default() -> Self {
        Self::starting_at(0)
    }
}

impl KindAllocator for SequentialKinds {
    fn allocate(
        &mut self,
        _name: &'static str,
        is_claimed: &dyn Fn(KindId) -> bool,
    ) -> Option<KindId> {
        while let Ok(raw) = u16::try_from(self.next) {
            self.next += 1;
            let id = KindId::new(raw);
            if !is_claimed(id) {
                return Some(id);
            }
        }
        None
    }
}

/// Derives ids from the FNV-1a hash of the payload name.
///
/// Ids fall in `base .. base + span`. On collision the next id in the range
/// is tried, wrapping, so the result depends on registration order only when
/// two names hash to the same slot.
#[derive(Clone, Debug)]
pub struct HashedKinds {
    base: u16,
    span: u16,
}

impl HashedKinds {
    /// Allocator over `base .. base + span`, clipped to `u16::MAX`.
    #[must_use]
    pub fn new(base: u16, span: u16) -> Self {
        let span = span.min(u16::MAX - base).max(1);
        Self { base, span }
    }
}

impl Default for HashedKinds {
    fn default() -> Self {
        Self::new(0, 1024)
    }
}

impl KindAllocator for HashedKinds {
    fn allocate(
        &mut self,
        name: &'static str,
        is_claimed: &dyn Fn(KindId) -> bool,
    ) -> Option<KindId> {
        let span = u32::from(self.span);
        let start = fnv1a(name.as_bytes()) % span;

        (0..span)
            .filter_map(|probe| u16::try_from((start + probe) % span).ok())
            .map(|offset| KindId::new(self.base + offset))
            .find(|&id| !is_claimed(id))
    }
}

/// Looks ids up by payload name in a config table.
///
/// A name missing from the table yields no id. A configured id that is
/// already claimed is still returned so the builder reports the clash as
/// [`RegistryError::IdConflict`].
#[derive(Clone, Debug, Default)]
pub struct ConfiguredKinds {
    table: KindTable,
}

impl ConfiguredKinds {
    /// Allocator over a `[kinds]` table.
    #[must_use]
    pub fn new(table: KindTable) -> Self {
        Self { table }
    }
}

impl KindAllocator for ConfiguredKinds {
    fn allocate(
        &mut self,
        name: &'static str,
        _is_claimed: &dyn Fn(KindId) -> bool,
    ) -> Option<KindId> {
        self.table.get(name).copied().map(KindId::new)
    }
}

/// FNV-1a, 32-bit.
fn fnv1a(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0x811c_9dc5, |hash: u32, &b| {
        (hash ^ u32::from(b)).wrapping_mul(0x0100_0193)
    })
}

/// Collects registrations during startup.
#[derive(Default)]
pub struct RegistryBuilder {
    by_type: HashMap<TypeId, KindId>,
    by_kind: BTreeMap<KindId, PayloadType>,
}

impl RegistryBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `T` to `id`.
    ///
    /// Registering the same `(T, id)` pair again is a no-op.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::IdConflict`] if `id` is bound to another type
    /// - [`RegistryError::TypeConflict`] if `T` is bound to another id
    /// - [`RegistryError::DuplicateName`] if another type already uses `T::NAME`
    pub fn register<T: Payload>(&mut self, id: KindId) -> RegistryResult<()> {
        let incoming = PayloadType::of::<T>();

        if let Some(&existing) = self.by_type.get(&incoming.type_id) {
            if existing == id {
                return Ok(());
            }
            return Err(RegistryError::TypeConflict {
                type_name: incoming.type_name,
                existing,
                requested: id,
            });
        }

        if let Some(holder) = self.by_kind.get(&id) {
            return Err(RegistryError::IdConflict {
                id,
                existing: holder.type_name,
                incoming: incoming.type_name,
            });
        }

        if let Some(homonym) = self.by_kind.values().find(|t| t.name == incoming.name) {
            return Err(RegistryError::DuplicateName {
                name: incoming.name,
                existing: homonym.type_name,
                incoming: incoming.type_name,
            });
        }

        tracing::debug!(kind = id.get(), payload = incoming.name, "payload registered");
        self.by_type.insert(incoming.type_id, id);
        self.by_kind.insert(id, incoming);
        Ok(())
    }

    /// Binds `T` to an id chosen by `allocator`, returning it.
    ///
    /// If `T` is already registered its existing id is returned and the
    /// allocator is not consulted.
    ///
    /// # Errors
    ///
    /// [`RegistryError::AllocatorExhausted`] if the allocator has no id,
    /// otherwise as [`register`](Self::register).
    pub fn register_with<T: Payload>(
        &mut self,
        allocator: &mut dyn KindAllocator,
    ) -> RegistryResult<KindId> {
        if let Some(&existing) = self.by_type.get(&TypeId::of::<T>()) {
            return Ok(existing);
        }

        let by_kind = &self.by_kind;
        let id = allocator
            .allocate(T::NAME, &|id| by_kind.contains_key(&id))
            .ok_or(RegistryError::AllocatorExhausted(T::NAME))?;

        self.register::<T>(id)?;
        Ok(id)
    }

    /// Number of registrations so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_kind.len()
    }

    /// Whether nothing is registered yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }

    /// Freezes the registry.
    #[must_use]
    pub fn build(self) -> PayloadRegistry {
        tracing::info!(kinds = self.by_kind.len(), "payload registry frozen");
        PayloadRegistry {
            by_type: self.by_type,
            by_kind: self.by_kind,
        }
    }
}

/// Immutable payload type ↔ kind id mapping.
///
/// Shared behind an `Arc`; all methods take `&self` and never lock.
pub struct PayloadRegistry {
    by_type: HashMap<TypeId, KindId>,
    by_kind: BTreeMap<KindId, PayloadType>,
}

impl PayloadRegistry {
    /// Starts a new registration phase.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Kind id bound to `T`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnregisteredType`] if `T` was never registered.
    pub fn id_for<T: Payload>(&self) -> RegistryResult<KindId> {
        self.by_type
            .get(&TypeId::of::<T>())
            .copied()
            .ok_or(RegistryError::UnregisteredType(type_name::<T>()))
    }

    /// Payload type bound to `id`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnregisteredKind`] if nothing is bound to `id`.
    pub fn type_for(&self, id: KindId) -> RegistryResult<&PayloadType> {
        self.by_kind
            .get(&id)
            .ok_or(RegistryError::UnregisteredKind(id))
    }

    /// Whether `T` is registered.
    #[must_use]
    pub fn contains<T: Payload>(&self) -> bool {
        self.by_type.contains_key(&TypeId::of::<T>())
    }

    /// Startup assertion that `T` is registered.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnregisteredType`], logged at `error`.
    pub fn require<T: Payload>(&self) -> RegistryResult<KindId> {
        self.id_for::<T>().map_err(|err| {
            tracing::error!(payload = T::NAME, "required payload type missing from registry");
            err
        })
    }

    /// Kind id of the payload whose `Payload::NAME` is `name`.
    #[must_use]
    pub fn kind_named(&self, name: &str) -> Option<KindId> {
        self.by_kind
            .iter()
            .find(|(_, t)| t.name == name)
            .map(|(&id, _)| id)
    }

    /// Checks every wire variant against the registry.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::MissingSchemaPayload`] if a variant's payload is
    ///   not registered
    /// - [`RegistryError::SchemaMismatch`] if it is registered under a
    ///   different id than the variant's discriminant
    pub fn verify_schema(&self, schema: &[SchemaVariant]) -> RegistryResult<()> {
        for variant in schema {
            let expected = KindId::new(variant.discriminant);
            let Some(registered) = self.kind_named(variant.name) else {
                return Err(RegistryError::MissingSchemaPayload {
                    variant: variant.name,
                    discriminant: expected,
                });
            };
            if registered != expected {
                tracing::error!(
                    variant = variant.name,
                    schema = expected.get(),
                    registered = registered.get(),
                    "wire schema disagrees with payload registry"
                );
                return Err(RegistryError::SchemaMismatch {
                    variant: variant.name,
                    schema: expected,
                    registered,
                });
            }
        }
        Ok(())
    }

    /// Number of registered kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_kind.len()
    }

    /// Whether no kinds are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }

    /// Registered kinds in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (KindId, &PayloadType)> + '_ {
        self.by_kind.iter().map(|(&id, t)| (id, t))
    }
}

impl fmt::Debug for PayloadRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.by_kind.iter()).finish()
    }
}
