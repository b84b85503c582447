//! Local mirrors of VM-side values and the per-mapping cache that owns them.
//!
//! A [`MirrorCache`] is one cache scope. It hands out mirrors that are
//! current, coalesces concurrent fetches for the same handle into a single
//! in-flight request, and bumps its generation on [`MirrorCache::clear`] so
//! results of fetches started before the clear are discarded.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::dialect::RemoteHandle;
use crate::error::SdkError;
use crate::reply::{deliver, ReplySender};

/// Coarse classification of a remote value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Undefined,
    Null,
    Boolean,
    Number,
    String,
    Symbol,
    BigInt,
    Object,
    Array,
    Function,
    RegExp,
    Date,
    Error,
    /// Anything else the VM reports (maps, promises, nodes).
    Other,
}

impl ValueKind {
    /// Whether the value is carried inline rather than by reference.
    pub fn is_primitive(self) -> bool {
        matches!(
            self,
            ValueKind::Undefined
                | ValueKind::Null
                | ValueKind::Boolean
                | ValueKind::Number
                | ValueKind::String
                | ValueKind::Symbol
                | ValueKind::BigInt
        )
    }
}

/// Sizes of a string the VM returned only partly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Truncation {
    /// Characters actually returned.
    pub loaded: u64,
    /// Full length on the VM side.
    pub full: u64,
}

/// How much of a value is known locally.
#[derive(Debug, Clone, PartialEq)]
pub enum MirrorData<H> {
    /// A primitive with its value, possibly truncated.
    Primitive {
        value: Value,
        truncation: Option<Truncation>,
    },
    /// Only the type and handle are known.
    ReferenceOnly,
    /// The property list has been fetched.
    Loaded { properties: Vec<PropertyMirror<H>> },
}

/// One property of a loaded object.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyMirror<H> {
    pub name: String,
    pub value: PropertyValue<H>,
}

/// A property's value: either inline or a handle to load later.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue<H> {
    Remote {
        handle: H,
        kind: Option<ValueKind>,
        description: Option<String>,
    },
    Inline {
        kind: ValueKind,
        value: Value,
        description: Option<String>,
    },
}

impl<H> PropertyValue<H> {
    /// Handle to resolve, when the value is not inline.
    pub fn handle(&self) -> Option<&H> {
        match self {
            PropertyValue::Remote { handle, .. } => Some(handle),
            PropertyValue::Inline { .. } => None,
        }
    }
}

/// Local representation of one remote value.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueMirror<H> {
    pub handle: H,
    pub kind: ValueKind,
    pub class_name: Option<String>,
    pub description: Option<String>,
    pub data: MirrorData<H>,
    /// Cache generation the mirror was stored under. Zero until cached.
    pub generation: u64,
}

impl<H> ValueMirror<H> {
    /// A mirror that knows only the value's type.
    pub fn reference(handle: H, kind: ValueKind) -> Self {
        Self {
            handle,
            kind,
            class_name: None,
            description: None,
            data: MirrorData::ReferenceOnly,
            generation: 0,
        }
    }

    /// Whether the mirror carries more than a bare reference.
    pub fn is_complete(&self) -> bool {
        !matches!(self.data, MirrorData::ReferenceOnly)
    }

    /// Property list, when loaded.
    pub fn properties(&self) -> Option<&[PropertyMirror<H>]> {
        match &self.data {
            MirrorData::Loaded { properties } => Some(properties),
            _ => None,
        }
    }

    /// The primitive value, when known.
    pub fn primitive(&self) -> Option<&Value> {
        match &self.data {
            MirrorData::Primitive { value, .. } => Some(value),
            _ => None,
        }
    }

    /// The string value, when this is a string primitive.
    pub fn as_str(&self) -> Option<&str> {
        self.primitive().and_then(Value::as_str)
    }

    pub fn truncation(&self) -> Option<Truncation> {
        match &self.data {
            MirrorData::Primitive { truncation, .. } => *truncation,
            _ => None,
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.truncation().is_some()
    }

    /// Whether `self` carries strictly more information than `other`.
    ///
    /// A reference is the least informative. Among primitives the longer
    /// string wins; among loaded objects the longer property list wins.
    pub fn is_fuller_than(&self, other: &ValueMirror<H>) -> bool {
        match (&self.data, &other.data) {
            (MirrorData::ReferenceOnly, _) => false,
            (_, MirrorData::ReferenceOnly) => true,
            (
                MirrorData::Primitive { value: mine, .. },
                MirrorData::Primitive { value: theirs, .. },
            ) => string_len(mine) > string_len(theirs),
            (
                MirrorData::Loaded { properties: mine },
                MirrorData::Loaded { properties: theirs },
            ) => mine.len() > theirs.len(),
            // Kind changed under the same handle; trust the newer data.
            _ => true,
        }
    }
}

fn string_len(value: &Value) -> usize {
    value.as_str().map(|s| s.chars().count()).unwrap_or(0)
}

impl<H: fmt::Display> fmt::Display for ValueMirror<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(description) = &self.description {
            return f.write_str(description);
        }
        match &self.data {
            MirrorData::Primitive { value, .. } => match value {
                Value::String(s) => f.write_str(s),
                other => write!(f, "{other}"),
            },
            _ => match &self.class_name {
                Some(class) => write!(f, "#<{class}>"),
                None => write!(f, "#<ref {}>", self.handle),
            },
        }
    }
}

/// Identifies a cache scope within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MappingId(pub(crate) u64);

impl MappingId {
    /// The mapping bound to the current suspend.
    pub const SUSPEND: MappingId = MappingId(0);

    pub fn is_suspend(self) -> bool {
        self == Self::SUSPEND
    }
}

impl fmt::Display for MappingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_suspend() {
            f.write_str("suspend")
        } else {
            write!(f, "permanent-{}", self.0)
        }
    }
}

pub(crate) type Waiter<H> = ReplySender<ValueMirror<H>>;

/// What the caller of [`MirrorCache::request`] has to do next.
#[derive(Debug)]
pub(crate) enum FetchPlan<H> {
    /// The cached mirror was delivered to the waiter.
    Served,
    /// A fetch is already in flight; the waiter was queued on it.
    Joined,
    /// The caller must issue a fetch for this handle.
    Fetch,
    /// The handle cannot be cached; fetch for this waiter alone.
    Uncacheable(Waiter<H>),
}

struct Slot<H> {
    mirror: Option<ValueMirror<H>>,
    /// `Some` while a fetch is in flight.
    waiters: Option<Vec<Waiter<H>>>,
}

impl<H> Default for Slot<H> {
    fn default() -> Self {
        Self {
            mirror: None,
            waiters: None,
        }
    }
}

/// Mirrors of one cache scope.
pub struct MirrorCache<H> {
    generation: u64,
    slots: HashMap<H, Slot<H>>,
}

impl<H: RemoteHandle> MirrorCache<H> {
    pub fn new() -> Self {
        Self {
            generation: 1,
            slots: HashMap::new(),
        }
    }

    /// Current generation stamp.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Cached mirror, complete or not.
    pub fn get(&self, handle: &H) -> Option<&ValueMirror<H>> {
        self.slots.get(handle).and_then(|slot| slot.mirror.as_ref())
    }

    /// Number of cached mirrors.
    pub fn len(&self) -> usize {
        self.slots.values().filter(|s| s.mirror.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a fetch for `handle` is in flight.
    pub fn is_fetching(&self, handle: &H) -> bool {
        self.slots
            .get(handle)
            .is_some_and(|slot| slot.waiters.is_some())
    }

    /// Ask for a complete mirror of `handle`.
    pub(crate) fn request(&mut self, handle: &H, waiter: Waiter<H>) -> FetchPlan<H> {
        if !handle.is_cacheable() {
            return FetchPlan::Uncacheable(waiter);
        }
        let slot = self.slots.entry(handle.clone()).or_default();
        if let Some(mirror) = slot.mirror.as_ref().filter(|m| m.is_complete()) {
            deliver(waiter, Ok(mirror.clone()));
            return FetchPlan::Served;
        }
        match &mut slot.waiters {
            Some(waiters) => {
                waiters.push(waiter);
                FetchPlan::Joined
            }
            None => {
                slot.waiters = Some(vec![waiter]);
                FetchPlan::Fetch
            }
        }
    }

    /// Store `mirror`, merging with what is already cached.
    ///
    /// Returns the mirror now held for the handle. Uncacheable handles are
    /// returned unchanged and not stored.
    pub fn insert(&mut self, mut mirror: ValueMirror<H>) -> ValueMirror<H> {
        if !mirror.handle.is_cacheable() {
            return mirror;
        }
        mirror.generation = self.generation;
        let slot = self.slots.entry(mirror.handle.clone()).or_default();
        match &slot.mirror {
            Some(existing) if !mirror.is_fuller_than(existing) => existing.clone(),
            _ => {
                slot.mirror = Some(mirror.clone());
                mirror
            }
        }
    }

    /// Finish a fetch started under `generation`.
    ///
    /// Results from an older generation are discarded; their waiters were
    /// already failed by [`clear`](Self::clear). A failure leaves any cached
    /// mirror untouched and is reported to every waiter of this fetch.
    pub(crate) fn complete(
        &mut self,
        generation: u64,
        handle: &H,
        result: Result<ValueMirror<H>, SdkError>,
    ) {
        if generation != self.generation {
            tracing::debug!(
                %handle,
                generation,
                current = self.generation,
                "discarding stale mirror fetch"
            );
            return;
        }
        let waiters = match self.slots.get_mut(handle).and_then(|slot| slot.waiters.take()) {
            Some(waiters) => waiters,
            None => {
                let err = SdkError::CacheConsistency(format!(
                    "completion for {handle} without a fetch in flight"
                ));
                debug_assert!(false, "{err}");
                tracing::error!("{}", err);
                Vec::new()
            }
        };
        match result {
            Ok(mirror) => {
                let stored = self.insert(mirror);
                for waiter in waiters {
                    deliver(waiter, Ok(stored.clone()));
                }
            }
            Err(err) => {
                if self.slots.get(handle).is_some_and(|s| s.mirror.is_none()) {
                    self.slots.remove(handle);
                }
                for waiter in waiters {
                    deliver(waiter, Err(err.clone()));
                }
            }
        }
    }

    /// Drop every mirror and bump the generation.
    ///
    /// Callers waiting on in-flight fetches get
    /// [`SdkError::ContextDismissed`].
    pub fn clear(&mut self) {
        self.generation += 1;
        for (_, slot) in self.slots.drain() {
            for waiter in slot.waiters.unwrap_or_default() {
                deliver(waiter, Err(SdkError::ContextDismissed));
            }
        }
    }
}

impl<H: RemoteHandle> Default for MirrorCache<H> {
    fn default() -> Self {
        Self::new()
    }
}
