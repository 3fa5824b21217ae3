//! Stable per-node addresses using dynamic level numbering.
//!
//! An address is a sequence of positive ordinals, one per tree level. The
//! document node is `1`, its children `1.1`, `1.2`, and so on. Attributes take
//! the first ordinals below their element, followed by the element's children.
//! Comparing the level sequences lexicographically (a prefix sorts first) gives
//! document order.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Ordered, string-round-trippable identifier of one node in a revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeAddress {
    levels: Vec<u32>,
}

impl NodeAddress {
    /// Address of the document node.
    pub fn document() -> Self {
        NodeAddress { levels: vec![1] }
    }

    /// Returns the address of the `ordinal`-th child (1-based).
    pub fn child(&self, ordinal: u32) -> Self {
        debug_assert!(ordinal > 0);
        let mut levels = Vec::with_capacity(self.levels.len() + 1);
        levels.extend_from_slice(&self.levels);
        levels.push(ordinal);
        NodeAddress { levels }
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, level) in self.levels.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", level)?;
        }
        Ok(())
    }
}

impl FromStr for NodeAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidAddress(s.to_string()));
        }
        let levels = s
            .split('.')
            .map(|part| match part.parse::<u32>() {
                Ok(n) if n > 0 => Ok(n),
                _ => Err(Error::InvalidAddress(s.to_string())),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(NodeAddress { levels })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> NodeAddress {
        s.parse().unwrap()
    }

    #[test]
    fn test_round_trip_string() {
        let a = NodeAddress::document().child(2).child(13);
        assert_eq!(a.to_string(), "1.2.13");
        assert_eq!(addr("1.2.13"), a);
    }

    #[test]
    fn test_document_order() {
        let mut addrs = vec![addr("1.2"), addr("1.1.3"), addr("1"), addr("1.10"), addr("1.1")];
        addrs.sort();
        let rendered: Vec<String> = addrs.iter().map(|a| a.to_string()).collect();
        assert_eq!(rendered, vec!["1", "1.1", "1.1.3", "1.2", "1.10"]);
    }

    #[test]
    fn test_child_addresses() {
        let a = addr("1.4").child(2);
        assert_eq!(a, addr("1.4.2"));
        assert_eq!(NodeAddress::document().child(1), addr("1.1"));
    }

    #[test]
    fn test_invalid_addresses() {
        for bad in ["", "1..2", "1.0", "a.b", "1.-2"] {
            assert!(bad.parse::<NodeAddress>().is_err(), "accepted {:?}", bad);
        }
    }
}
