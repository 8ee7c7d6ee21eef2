//! Storage locations and the per-procedure arena that owns them
//!
//! Environments only store [`StorageLocation`] indices. The arena records
//! each location's type and, for records, its field children, so location
//! identity survives every fork, join and snapshot of one analysis run.

use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;

use crate::ast::{DeclId, StmtId, Type};

/// Index of a place a value can live
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorageLocation(pub u32);

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loc{}", self.0)
    }
}

/// What a top-level location stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Decl(DeclId),
    Expr(StmtId),
    /// Holds the value returned by the frame at the location's depth
    ReturnSlot,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum LocationKey {
    Entity { entity: Entity, depth: usize },
    Field { parent: StorageLocation, field: String },
}

#[derive(Debug, Clone)]
pub struct LocationInfo {
    pub ty: Type,
    /// Call depth the location was allocated at; 0 is the analysed function
    pub depth: usize,
    pub global: bool,
    pub fields: IndexMap<String, StorageLocation>,
}

#[derive(Debug, Default)]
pub struct LocationArena {
    infos: Vec<LocationInfo>,
    index: HashMap<LocationKey, StorageLocation>,
}

impl LocationArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Location for `entity` at call depth `depth`, allocated on first use.
    ///
    /// Globals ignore the depth: every frame sees the same location.
    pub fn get_or_create(&mut self, entity: Entity, depth: usize, ty: &Type, global: bool) -> StorageLocation {
        let depth = if global { 0 } else { depth };
        let key = LocationKey::Entity { entity, depth };
        if let Some(&loc) = self.index.get(&key) {
            return loc;
        }
        self.allocate(key, ty, depth, global)
    }

    /// Location already allocated for `entity` at `depth`, if any
    pub fn lookup(&self, entity: Entity, depth: usize, global: bool) -> Option<StorageLocation> {
        let depth = if global { 0 } else { depth };
        self.index.get(&LocationKey::Entity { entity, depth }).copied()
    }

    fn allocate(&mut self, key: LocationKey, ty: &Type, depth: usize, global: bool) -> StorageLocation {
        let loc = StorageLocation(self.infos.len() as u32);
        self.infos.push(LocationInfo {
            ty: ty.clone(),
            depth,
            global,
            fields: IndexMap::new(),
        });
        self.index.insert(key, loc);

        if let Type::Record(record) = ty {
            for field in &record.fields {
                let child = self.allocate(
                    LocationKey::Field {
                        parent: loc,
                        field: field.name.clone(),
                    },
                    &field.ty,
                    depth,
                    global,
                );
                self.infos[loc.0 as usize].fields.insert(field.name.clone(), child);
            }
        }
        loc
    }

    pub fn info(&self, loc: StorageLocation) -> Option<&LocationInfo> {
        self.infos.get(loc.0 as usize)
    }

    pub fn ty(&self, loc: StorageLocation) -> Type {
        self.info(loc).map_or(Type::Unknown, |info| info.ty.clone())
    }

    pub fn is_global(&self, loc: StorageLocation) -> bool {
        self.info(loc).is_some_and(|info| info.global)
    }

    pub fn field(&self, loc: StorageLocation, name: &str) -> Option<StorageLocation> {
        self.info(loc).and_then(|info| info.fields.get(name).copied())
    }

    pub fn fields(&self, loc: StorageLocation) -> Vec<(String, StorageLocation)> {
        self.info(loc)
            .map(|info| info.fields.iter().map(|(n, l)| (n.clone(), *l)).collect())
            .unwrap_or_default()
    }

    /// `loc` followed by all of its nested field locations
    pub fn with_descendants(&self, loc: StorageLocation) -> Vec<StorageLocation> {
        let mut out = vec![loc];
        let mut i = 0;
        while i < out.len() {
            if let Some(info) = self.info(out[i]) {
                out.extend(info.fields.values().copied());
            }
            i += 1;
        }
        out
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}
