use core::{fmt, num::NonZero, str::FromStr};

/// A process identifier.
///
/// PID 0 is reserved as the "no parent" sentinel and is therefore
/// unrepresentable; parent links use `Option<ProcId>` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ProcId(NonZero<i32>);

impl fmt::Display for ProcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<ProcId> for i32 {
    fn from(value: ProcId) -> Self {
        value.0.get()
    }
}

impl From<ProcId> for NonZero<i32> {
    fn from(value: ProcId) -> Self {
        value.0
    }
}

impl From<NonZero<i32>> for ProcId {
    fn from(value: NonZero<i32>) -> Self {
        Self(value)
    }
}

impl ProcId {
    #[must_use]
    pub const fn new(value: NonZero<i32>) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn get(self) -> NonZero<i32> {
        self.0
    }

    /// Raw PID value, always positive.
    #[must_use]
    pub const fn value(self) -> i32 {
        self.0.get()
    }

    /// Constructs a `ProcId` from a raw value, `None` for 0.
    #[must_use]
    pub const fn from_raw(value: i32) -> Option<Self> {
        match NonZero::new(value) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl FromStr for ProcId {
    type Err = <NonZero<i32> as FromStr>::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self::new)
    }
}
