//! Three-component numeric versions (`2.17`, `1.2.4`)

use std::fmt;
use std::str::FromStr;

use crate::domain::AbiError;

/// `major.minor.patch`; missing components are zero
///
/// Ordering is component-wise, so `2.9 < 2.17`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(pub [u32; 3]);

impl FromStr for Version {
    type Err = AbiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() > 3 {
            return Err(AbiError::InvalidVersion(s.to_string()));
        }

        let mut version = [0u32; 3];
        for (slot, part) in version.iter_mut().zip(&parts) {
            *slot = part.parse().map_err(|_| AbiError::InvalidVersion(s.to_string()))?;
        }
        Ok(Self(version))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.0[0], self.0[1], self.0[2])
    }
}
