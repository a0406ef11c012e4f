//! Connection registry and URI router.
//!
//! URIs have the shape `umbra:<kind>://<name>` with
//! `kind ∈ {mem, multi, durable}`. The process-wide registry maps
//! names to live connections; `shutdown` releases everything.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use tracing::{debug, info};
use umbra_index::GraphFlavor;
use umbra_types::{Result, UmbraError};

use crate::connection::{Connection, ConnectionOptions};
use crate::transact::Journal;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GraphKind {
    /// In-memory simple graph.
    Mem,
    /// In-memory multi graph.
    Multi,
    /// Simple graph journaled through the durable stores.
    Durable,
}

impl GraphKind {
    fn flavor(self) -> GraphFlavor {
        match self {
            GraphKind::Multi => GraphFlavor::Multi,
            GraphKind::Mem | GraphKind::Durable => GraphFlavor::Simple,
        }
    }
}

/// Splits `umbra:<kind>://<name>`.
pub fn parse_uri(uri: &str) -> Result<(GraphKind, &str)> {
    let unknown = || UmbraError::UnknownUriScheme(uri.to_owned());
    let rest = uri.strip_prefix("umbra:").ok_or_else(unknown)?;
    let (kind, name) = rest.split_once("://").ok_or_else(unknown)?;
    let kind = match kind {
        "mem" => GraphKind::Mem,
        "multi" => GraphKind::Multi,
        "durable" => GraphKind::Durable,
        _ => return Err(unknown()),
    };
    if name.is_empty() {
        return Err(UmbraError::Invalid("database uri has an empty name"));
    }
    Ok((kind, name))
}

pub struct Registry {
    connections: DashMap<String, Arc<Connection>>,
    options: ConnectionOptions,
    base_dir: PathBuf,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(ConnectionOptions::default(), PathBuf::from("umbra-data"))
    }
}

impl Registry {
    pub fn new(options: ConnectionOptions, base_dir: PathBuf) -> Self {
        Self {
            connections: DashMap::new(),
            options,
            base_dir,
        }
    }

    fn open_connection(&self, kind: GraphKind, name: &str) -> Result<Arc<Connection>> {
        let journal = match kind {
            GraphKind::Durable => Some(Journal::open(
                &self.base_dir.join(name),
                name,
                self.options.region_size,
            )?),
            _ => None,
        };
        Ok(Connection::new(name, kind.flavor(), journal, &self.options))
    }

    /// Creates an empty database of the requested kind. Returns false
    /// if the name is already registered.
    pub fn create(&self, uri: &str) -> Result<bool> {
        let (kind, name) = parse_uri(uri)?;
        if self.connections.contains_key(name) {
            return Ok(false);
        }
        let conn = self.open_connection(kind, name)?;
        let fresh = self.connections.insert(name.to_owned(), conn).is_none();
        if fresh {
            info!(name, kind = ?kind, "registry.create");
        }
        Ok(fresh)
    }

    /// The registered connection, creating one of the URI's kind on
    /// first use.
    pub fn connect(&self, uri: &str) -> Result<Arc<Connection>> {
        let (kind, name) = parse_uri(uri)?;
        if let Some(conn) = self.connections.get(name) {
            return Ok(Arc::clone(&conn));
        }
        let conn = self.open_connection(kind, name)?;
        let entry = self
            .connections
            .entry(name.to_owned())
            .or_insert_with(|| conn);
        Ok(Arc::clone(&entry))
    }

    /// Removes the connection and runs its cleanup hook. Returns false
    /// for unknown names.
    pub fn release(&self, uri: &str) -> Result<bool> {
        let (_, name) = parse_uri(uri)?;
        match self.connections.remove(name) {
            Some((_, conn)) => {
                conn.close()?;
                debug!(name, "registry.release");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Empties the database's history and resets its timestamp; the
    /// connection stays registered.
    pub fn delete(&self, uri: &str) -> Result<bool> {
        let (_, name) = parse_uri(uri)?;
        match self.connections.get(name) {
            Some(conn) => {
                conn.reset()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Releases every registered connection.
    pub fn shutdown(&self) {
        let names: Vec<String> = self
            .connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for name in names {
            if let Some((_, conn)) = self.connections.remove(&name) {
                if let Err(err) = conn.close() {
                    debug!(name = %name, %err, "registry.shutdown.close-failed");
                }
            }
        }
        info!("registry.shutdown");
    }
}

/// The process-wide registry used by the free functions below.
pub fn registry() -> &'static Registry {
    static GLOBAL: OnceLock<Registry> = OnceLock::new();
    GLOBAL.get_or_init(Registry::default)
}

pub fn create_database(uri: &str) -> Result<bool> {
    registry().create(uri)
}

pub fn connect(uri: &str) -> Result<Arc<Connection>> {
    registry().connect(uri)
}

pub fn release(uri: &str) -> Result<bool> {
    registry().release(uri)
}

pub fn delete_database(uri: &str) -> Result<bool> {
    registry().delete(uri)
}

/// Process-wide shutdown hook: releases every registered connection.
pub fn shutdown() {
    registry().shutdown()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_registry() -> (tempfile::TempDir, Registry) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::new(ConnectionOptions::default(), dir.path().to_path_buf());
        (dir, registry)
    }

    #[test]
    fn uri_parsing() {
        assert_eq!(
            parse_uri("umbra:mem://alpha").unwrap(),
            (GraphKind::Mem, "alpha")
        );
        assert_eq!(
            parse_uri("umbra:multi://beta").unwrap(),
            (GraphKind::Multi, "beta")
        );
        assert_eq!(
            parse_uri("umbra:durable://gamma").unwrap(),
            (GraphKind::Durable, "gamma")
        );
        for bad in ["mem://alpha", "umbra:disk://x", "umbra:mem:x"] {
            assert!(matches!(
                parse_uri(bad),
                Err(UmbraError::UnknownUriScheme(_))
            ));
        }
        assert!(matches!(
            parse_uri("umbra:mem://"),
            Err(UmbraError::Invalid(_))
        ));
    }

    #[test]
    fn create_then_connect_shares_the_connection() {
        let (_dir, registry) = scratch_registry();
        assert!(registry.create("umbra:mem://shared").unwrap());
        assert!(!registry.create("umbra:mem://shared").unwrap());
        let a = registry.connect("umbra:mem://shared").unwrap();
        let b = registry.connect("umbra:mem://shared").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn connect_creates_on_first_use() {
        let (_dir, registry) = scratch_registry();
        let conn = registry.connect("umbra:multi://fresh").unwrap();
        assert_eq!(conn.flavor(), umbra_index::GraphFlavor::Multi);
    }

    #[test]
    fn release_closes_the_connection() {
        let (_dir, registry) = scratch_registry();
        let conn = registry.connect("umbra:mem://gone").unwrap();
        assert!(registry.release("umbra:mem://gone").unwrap());
        assert!(!conn.is_open());
        assert!(!registry.release("umbra:mem://gone").unwrap());
    }

    #[test]
    fn delete_resets_history() {
        let (_dir, registry) = scratch_registry();
        let conn = registry.connect("umbra:mem://reset").unwrap();
        conn.transact(vec![crate::TxOp::add(
            umbra_types::Value::Int(1),
            umbra_types::Value::kw("n", "v"),
            umbra_types::Value::Int(2),
        )])
        .unwrap();
        assert_eq!(conn.db().unwrap().t, 1);
        assert!(registry.delete("umbra:mem://reset").unwrap());
        let db = conn.db().unwrap();
        assert_eq!(db.t, 0);
        assert_eq!(db.graph.triple_count(), 0);
        assert!(conn.is_open());
    }

    #[test]
    fn shutdown_releases_everything() {
        let (_dir, registry) = scratch_registry();
        let a = registry.connect("umbra:mem://one").unwrap();
        let b = registry.connect("umbra:multi://two").unwrap();
        registry.shutdown();
        assert!(!a.is_open());
        assert!(!b.is_open());
        // Shut-down registries can be repopulated.
        assert!(registry.create("umbra:mem://one").unwrap());
    }
}
