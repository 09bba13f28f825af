//! # Operation Identifiers
//!
//! Operations are identified by an explicit table built at registration time:
//! each provider interns the names of the operations it services when it is
//! constructed, and each mock double interns its entity's operation names when
//! it is registered. Call recording and readiness tickets then work with the
//! dense [`OpId`]s instead of re-deriving identifiers from signatures.

use std::sync::RwLock;

/// Dense identifier for an interned operation name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OpId(u16);

/// Interning table from operation names to [`OpId`]s.
///
/// Shared between the mock registry, the call tracker, and the storage and
/// stream doubles so that the same name always resolves to the same id.
#[derive(Debug, Default)]
pub struct OperationTable {
    names: RwLock<Vec<&'static str>>,
}

impl OperationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id for `name`, adding it to the table on first sight.
    pub fn intern(&self, name: &'static str) -> OpId {
        {
            let names = self.names.read().unwrap();
            if let Some(idx) = names.iter().position(|n| *n == name) {
                return OpId(idx as u16);
            }
        }
        let mut names = self.names.write().unwrap();
        // Racing interns of the same name must agree on the id.
        if let Some(idx) = names.iter().position(|n| *n == name) {
            return OpId(idx as u16);
        }
        names.push(name);
        OpId((names.len() - 1) as u16)
    }

    /// Looks up an already-interned name.
    pub fn get(&self, name: &str) -> Option<OpId> {
        let names = self.names.read().unwrap();
        names.iter().position(|n| *n == name).map(|i| OpId(i as u16))
    }

    pub fn name(&self, id: OpId) -> &'static str {
        let names = self.names.read().unwrap();
        names.get(id.0 as usize).copied().unwrap_or("<unknown>")
    }

    pub fn len(&self) -> usize {
        self.names.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable() {
        let table = OperationTable::new();
        let write = table.intern("write");
        let read = table.intern("read");
        assert_ne!(write, read);
        assert_eq!(table.intern("write"), write);
        assert_eq!(table.get("read"), Some(read));
        assert_eq!(table.name(write), "write");
        assert_eq!(table.len(), 2);
    }
}
