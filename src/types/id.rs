//! Identifier types and the code-location registry.
//!
//! Code locations are stable integers minted at instrumentation time. The
//! least significant bit encodes the kind: even identifiers are potential
//! switch points (shared reads, writes, atomic calls, lock operations,
//! parks, waits), odd identifiers are helper events (method enter/exit,
//! receiver and parameter views). Negative identifiers are value views:
//! low-bit-cleared hashes of a method receiver or parameter, used as
//! pseudo-events when identifying spin cycles.

use crate::util::det_hash::det_hash;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identity of a worker: one column of the scenario, `0 .. width`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct WorkerId(pub usize);

impl WorkerId {
    /// Returns the raw index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "W{}", self.0)
    }
}

/// Identity of a method call, stable across suspension and resumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodId(pub u64);

/// Opaque reference identity for monitors and tracked objects.
///
/// The engine never inspects the referent; only pointer identity matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectRef(usize);

impl ObjectRef {
    /// Builds a reference identity from the address of `value`.
    ///
    /// The identity is stable for as long as `value` is not moved; callers
    /// keep monitored objects alive (and pinned behind an `Arc` or similar)
    /// for the duration of the scenario.
    #[must_use]
    pub fn of<T: ?Sized>(value: &T) -> Self {
        Self(std::ptr::from_ref(value).cast::<()>() as usize)
    }

    /// Builds a reference identity from a raw token.
    ///
    /// Useful for tests and for instrumentation layers that already assign
    /// stable object tokens.
    #[must_use]
    pub const fn from_token(token: usize) -> Self {
        Self(token)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj@{:x}", self.0)
    }
}

/// First identifier handed out by the registry.
///
/// Identifiers below this value are reserved sentinels.
pub const LEAST_CODE_LOCATION_ID: i32 = 6;

/// A stable code-location identifier assigned at instrumentation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CodeLocation(pub i32);

impl CodeLocation {
    /// Reserved sentinel recorded when a coroutine suspension is re-entered.
    ///
    /// Never contributes to loop-detector visit counts.
    pub const SUSPENSION: Self = Self(4);

    /// True for identifiers at which the scheduler may switch workers.
    #[must_use]
    pub const fn is_switch_point(self) -> bool {
        self.0 >= 0 && self.0 & 1 == 0
    }

    /// True for helper events (method enter/exit, receiver/parameter views).
    #[must_use]
    pub const fn is_helper(self) -> bool {
        self.0 >= 0 && self.0 & 1 == 1
    }

    /// True for value views (hash-normalized receiver/parameter encodings).
    #[must_use]
    pub const fn is_value_view(self) -> bool {
        self.0 < 0
    }

    /// Builds the value view for a receiver or parameter.
    ///
    /// The hash is normalized to a negative 32-bit integer with the low bit
    /// cleared, so a value view can never collide with a switch-point or
    /// helper identifier.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn value_view<T: std::hash::Hash>(value: &T) -> Self {
        let h = det_hash(value) as i32;
        Self((h | i32::MIN) & !1)
    }
}

impl fmt::Display for CodeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cl:{}", self.0)
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    next_switch: i32,
    next_helper: i32,
    labels: HashMap<i32, String>,
}

/// Allocator of code-location identifiers, shared between instrumentation
/// and the engine.
///
/// Identifiers are allocated from a monotone counter starting at
/// [`LEAST_CODE_LOCATION_ID`]; the low bit encodes the kind. Labels are kept
/// for trace rendering.
#[derive(Debug)]
pub struct CodeLocationRegistry {
    inner: Mutex<RegistryInner>,
}

impl CodeLocationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                next_switch: LEAST_CODE_LOCATION_ID,
                next_helper: LEAST_CODE_LOCATION_ID + 1,
                labels: HashMap::new(),
            }),
        }
    }

    /// Mints a switch-point identifier (even) with a display label.
    pub fn switch_point(&self, label: impl Into<String>) -> CodeLocation {
        let mut inner = self.inner.lock();
        let id = inner.next_switch;
        inner.next_switch += 2;
        inner.labels.insert(id, label.into());
        CodeLocation(id)
    }

    /// Mints a helper identifier (odd) with a display label.
    pub fn helper(&self, label: impl Into<String>) -> CodeLocation {
        let mut inner = self.inner.lock();
        let id = inner.next_helper;
        inner.next_helper += 2;
        inner.labels.insert(id, label.into());
        CodeLocation(id)
    }

    /// Returns the label for an identifier, if registered.
    #[must_use]
    pub fn label(&self, cl: CodeLocation) -> Option<String> {
        self.inner.lock().labels.get(&cl.0).cloned()
    }

    /// Returns the label for an identifier, falling back to the raw id.
    #[must_use]
    pub fn label_or_id(&self, cl: CodeLocation) -> String {
        self.label(cl).unwrap_or_else(|| cl.to_string())
    }
}

impl Default for CodeLocationRegistry {
    fn default() -> Self {
        Self::new()
    }
}
