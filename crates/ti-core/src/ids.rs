use core::fmt;
use core::num::NonZeroU32;

use crate::error::{CoreError, CoreResult};

/// Compact, stable identifier shared by every handle type.
///
/// - `u32` keeps memory small
/// - `NonZero` enables `Option<Id>` to be pointer-optimized
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Id(NonZeroU32);

impl Id {
    /// Create an Id from a 0-based index by storing index+1.
    ///
    /// `u32::MAX` saturates onto the last representable id; use
    /// [`HandleAllocator`] when uniqueness matters.
    pub fn from_index(index: u32) -> Self {
        Self(NonZeroU32::MIN.saturating_add(index))
    }

    /// Recover the 0-based index.
    pub fn index(self) -> u32 {
        self.0.get() - 1
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.index())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

macro_rules! handle_type {
    ($(#[$meta:meta])* $name:ident, $tag:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub struct $name(Id);

        impl $name {
            /// Handle for the 0-based slot `index` of the owning model.
            pub fn from_index(index: u32) -> Self {
                Self(Id::from_index(index))
            }

            /// 0-based slot index, suitable for indexing caller storage.
            pub fn index(self) -> usize {
                self.0.index() as usize
            }

            pub fn id(self) -> Id {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($tag, "({})"), self.0.index())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($tag, "#{}"), self.0.index())
            }
        }
    };
}

handle_type!(
    /// Identifies one integrated scalar state of a model.
    StateHandle,
    "State"
);
handle_type!(
    /// Identifies one numerically differentiated output of a model.
    DerivedHandle,
    "Derived"
);
handle_type!(
    /// Identifies a caller-held slot receiving a state's local error estimate.
    ErrorHandle,
    "Error"
);

/// Hands out handles once, at model-setup time.
///
/// Each handle kind has its own index space starting at zero, so a model
/// with a contiguous state buffer can index it directly with
/// [`StateHandle::index`].
#[derive(Debug, Default, Clone)]
pub struct HandleAllocator {
    next_state: u32,
    next_derived: u32,
    next_error: u32,
}

fn bump(counter: &mut u32, what: &'static str) -> CoreResult<u32> {
    let index = *counter;
    if index == u32::MAX - 1 {
        return Err(CoreError::HandleOverflow { what });
    }
    *counter += 1;
    Ok(index)
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&mut self) -> CoreResult<StateHandle> {
        bump(&mut self.next_state, "state handles").map(StateHandle::from_index)
    }

    /// Allocate `n` consecutive state handles (vector/matrix quantities).
    pub fn states(&mut self, n: usize) -> CoreResult<Vec<StateHandle>> {
        (0..n).map(|_| self.state()).collect()
    }

    pub fn derived(&mut self) -> CoreResult<DerivedHandle> {
        bump(&mut self.next_derived, "derived handles").map(DerivedHandle::from_index)
    }

    pub fn derived_many(&mut self, n: usize) -> CoreResult<Vec<DerivedHandle>> {
        (0..n).map(|_| self.derived()).collect()
    }

    pub fn error(&mut self) -> CoreResult<ErrorHandle> {
        bump(&mut self.next_error, "error handles").map(ErrorHandle::from_index)
    }

    pub fn errors(&mut self, n: usize) -> CoreResult<Vec<ErrorHandle>> {
        (0..n).map(|_| self.error()).collect()
    }

    /// Number of state handles handed out so far.
    pub fn state_count(&self) -> usize {
        self.next_state as usize
    }

    pub fn derived_count(&self) -> usize {
        self.next_derived as usize
    }
}
