// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Inclusive IPv4 address ranges.

use crate::errors::AllocatorError;
use std::fmt;
use std::net::Ipv4Addr;

/// An inclusive range of IPv4 addresses, `start == end` being a single address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRange {
    start: Ipv4Addr,
    end: Ipv4Addr,
}

impl IpRange {
    /// Create a range from its first and last address.
    ///
    /// # Errors
    ///
    /// Returns [`AllocatorError::InvalidRange`] when `start` is after `end`.
    pub fn new(start: Ipv4Addr, end: Ipv4Addr) -> Result<Self, AllocatorError> {
        if start > end {
            return Err(AllocatorError::InvalidRange {
                start: start.to_string(),
                end: end.to_string(),
                reason: "start address is after end address".to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Parse a range from dotted address strings.
    ///
    /// # Errors
    ///
    /// Returns [`AllocatorError::InvalidRange`] when either address does not
    /// parse or the range is inverted.
    pub fn parse(start: &str, end: &str) -> Result<Self, AllocatorError> {
        let invalid = |what: &str, value: &str| AllocatorError::InvalidRange {
            start: start.to_string(),
            end: end.to_string(),
            reason: format!("{what} address '{value}' is not an IPv4 address"),
        };
        let first = start.trim().parse().map_err(|_| invalid("start", start))?;
        let last = end.trim().parse().map_err(|_| invalid("end", end))?;
        Self::new(first, last)
    }

    /// First address of the range.
    #[must_use]
    pub fn start(&self) -> Ipv4Addr {
        self.start
    }

    /// Last address of the range.
    #[must_use]
    pub fn end(&self) -> Ipv4Addr {
        self.end
    }

    /// Returns true if `ip` lies within the range.
    #[must_use]
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.start <= ip && ip <= self.end
    }

    /// Number of addresses in the range.
    #[must_use]
    pub fn len(&self) -> u64 {
        u64::from(u32::from(self.end)) - u64::from(u32::from(self.start)) + 1
    }

    /// Always false; a valid range holds at least one address.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Iterate the range in scan order, from `start` to `end`.
    #[must_use]
    pub fn iter(&self) -> IpRangeIter {
        IpRangeIter {
            next: Some(self.start),
            end: self.end,
        }
    }

    /// The `RangeExhausted` error for this range.
    #[must_use]
    pub fn exhausted(&self) -> AllocatorError {
        AllocatorError::RangeExhausted {
            start: self.start.to_string(),
            end: self.end.to_string(),
        }
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl IntoIterator for &IpRange {
    type Item = Ipv4Addr;
    type IntoIter = IpRangeIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the addresses of an [`IpRange`].
#[derive(Debug, Clone)]
pub struct IpRangeIter {
    next: Option<Ipv4Addr>,
    end: Ipv4Addr,
}

impl Iterator for IpRangeIter {
    type Item = Ipv4Addr;

    fn next(&mut self) -> Option<Ipv4Addr> {
        let current = self.next?;
        self.next = if current >= self.end {
            None
        } else {
            next_ip(current)
        };
        Some(current)
    }
}

/// Increment an address by one, carrying from the low octet into the higher ones.
///
/// Returns `None` past `255.255.255.255`.
#[must_use]
pub fn next_ip(ip: Ipv4Addr) -> Option<Ipv4Addr> {
    let mut octets = ip.octets();
    for octet in octets.iter_mut().rev() {
        if *octet == u8::MAX {
            *octet = 0;
        } else {
            *octet += 1;
            return Some(Ipv4Addr::from(octets));
        }
    }
    None
}

#[cfg(test)]
#[path = "range_tests.rs"]
mod range_tests;
