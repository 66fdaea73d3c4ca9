//! LSN (Log Sequence Number) utilities for PostgreSQL replication.

use std::fmt;
use std::str::FromStr;

use crate::error::{PgError, PgResult};

/// A WAL position, displayed in Postgres' `X/Y` form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lsn(pub u64);

impl Lsn {
    pub const ZERO: Lsn = Lsn(0);

    /// Parse LSN from "X/Y" format.
    pub fn parse(lsn: &str) -> PgResult<Lsn> {
        let (high, low) = lsn
            .split_once('/')
            .ok_or_else(|| PgError::InvalidLsn(lsn.to_string()))?;

        let high = u64::from_str_radix(high, 16).map_err(|_| PgError::InvalidLsn(lsn.to_string()))?;
        let low = u64::from_str_radix(low, 16).map_err(|_| PgError::InvalidLsn(lsn.to_string()))?;
        if high > u32::MAX as u64 || low > u32::MAX as u64 {
            return Err(PgError::InvalidLsn(lsn.to_string()));
        }

        Ok(Lsn((high << 32) | low))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}/{:X}", self.0 >> 32, self.0 & 0xFFFF_FFFF)
    }
}

impl FromStr for Lsn {
    type Err = PgError;

    fn from_str(s: &str) -> PgResult<Self> {
        Lsn::parse(s)
    }
}

impl From<u64> for Lsn {
    fn from(v: u64) -> Self {
        Lsn(v)
    }
}

impl From<Lsn> for u64 {
    fn from(lsn: Lsn) -> Self {
        lsn.0
    }
}
