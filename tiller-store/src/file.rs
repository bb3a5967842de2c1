//! Flat-file backend: one JSON record per service.
//!
//! Layout:
//! ```text
//! {root}/services/{service_id}.json
//! ```
//!
//! Servers are embedded in their service record. Every record is written
//! atomically: first to a `.tmp` sibling, then renamed over the final path,
//! so a reader never observes a half-written service.
//!
//! A bulk replace stages every record before touching the collection, then
//! moves replaced and stale records aside to `.bak` siblings while the staged
//! ones are renamed in. Any failure undoes the moves in reverse, so the
//! collection ends up either fully replaced or as it was.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tiller_core::{Backender, Result, Server, Service, TillerError};
use tracing::{debug, warn};

const COLLECTION: &str = "services";
const RECORD_EXT: &str = "json";
const STAGED_EXT: &str = "json.tmp";
const BACKUP_EXT: &str = "json.bak";

/// A bulk-replace step that already reached the collection.
enum Undo {
    Installed(PathBuf),
    MovedAside { path: PathBuf, backup: PathBuf },
}

pub struct FileStore {
    collection: PathBuf,
}

impl FileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            collection: root.as_ref().join(COLLECTION),
        }
    }

    pub fn collection_dir(&self) -> &Path {
        &self.collection
    }

    fn record_path(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || id.starts_with('.') || id.contains(['/', '\\']) {
            return Err(TillerError::validation(format!("invalid record id '{id}'")));
        }
        Ok(self.collection.join(format!("{id}.{RECORD_EXT}")))
    }

    fn read_record(&self, id: &str) -> Result<Service> {
        let path = self.record_path(id)?;
        let data = match fs::read_to_string(&path) {
            Ok(d) => d,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(TillerError::NoService),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&data)
            .map_err(|e| TillerError::Store(format!("corrupt record {}: {e}", path.display())))
    }

    /// Write `service` next to its record path. Returns `(staged, final)`.
    fn stage_record(&self, service: &Service) -> Result<(PathBuf, PathBuf)> {
        let path = self.record_path(&service.id)?;
        let json = serde_json::to_string_pretty(service)?;
        let tmp = path.with_extension(STAGED_EXT);
        if let Err(e) = fs::write(&tmp, json) {
            discard(&tmp);
            return Err(e.into());
        }
        Ok((tmp, path))
    }

    fn write_record(&self, service: &Service) -> Result<()> {
        fs::create_dir_all(&self.collection)?;

        // Atomic write: tmp file → rename
        let (tmp, path) = self.stage_record(service)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            discard(&tmp);
            return Err(e.into());
        }

        debug!(id = %service.id, path = %path.display(), "store: record written");
        Ok(())
    }

    /// Stage one record per distinct id, the last occurrence winning.
    /// Nothing is left behind on failure.
    fn stage_all(&self, services: &[Service]) -> Result<Vec<(PathBuf, PathBuf)>> {
        let mut unique: Vec<&Service> = Vec::with_capacity(services.len());
        for service in services {
            match unique.iter_mut().find(|u| u.id == service.id) {
                Some(existing) => *existing = service,
                None => unique.push(service),
            }
        }

        let mut staged = Vec::with_capacity(unique.len());
        for service in unique {
            match self.stage_record(service) {
                Ok(pair) => staged.push(pair),
                Err(e) => {
                    for (tmp, _) in &staged {
                        discard(tmp);
                    }
                    return Err(e);
                }
            }
        }
        Ok(staged)
    }

    fn remove_record(&self, id: &str) -> Result<()> {
        let path = self.record_path(id)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(id, "store: record removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(TillerError::NoService),
            Err(e) => Err(e.into()),
        }
    }

    /// Ids of all records, sorted. A missing collection is empty.
    fn record_ids(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.collection) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let path = entry?.path();
            // Skips `.json.tmp` and `.json.bak` siblings as well.
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

impl Backender for FileStore {
    fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.collection)?;
        Ok(())
    }

    fn get_services(&self) -> Result<Vec<Service>> {
        let mut services = Vec::new();
        for id in self.record_ids()? {
            match self.read_record(&id) {
                Ok(svc) => services.push(svc),
                // Deleted between listing and reading.
                Err(TillerError::NoService) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(services)
    }

    fn get_service(&self, id: &str) -> Result<Service> {
        self.read_record(id)
    }

    fn set_services(&self, services: &[Service]) -> Result<()> {
        fs::create_dir_all(&self.collection)?;
        let mut stale = Vec::new();
        for id in self.record_ids()? {
            if !services.iter().any(|s| s.id == id) {
                stale.push(self.record_path(&id)?);
            }
        }

        let staged = self.stage_all(services)?;
        let mut journal = Vec::new();
        if let Err(e) = commit(&staged, &stale, &mut journal) {
            rollback(journal);
            for (tmp, _) in &staged {
                discard(tmp);
            }
            return Err(e);
        }

        for step in journal {
            if let Undo::MovedAside { backup, .. } = step {
                discard(&backup);
            }
        }
        debug!(
            written = staged.len(),
            removed = stale.len(),
            "store: collection replaced"
        );
        Ok(())
    }

    fn set_service(&self, service: &Service) -> Result<()> {
        self.write_record(service)
    }

    fn delete_service(&self, id: &str) -> Result<()> {
        self.remove_record(id)
    }

    fn set_servers(&self, svc_id: &str, servers: &[Server]) -> Result<()> {
        let mut service = self.read_record(svc_id)?;
        service.servers = servers.to_vec();
        self.write_record(&service)
    }

    fn set_server(&self, svc_id: &str, server: &Server) -> Result<()> {
        let mut service = self.read_record(svc_id)?;
        service.upsert_server(server.clone());
        self.write_record(&service)
    }

    fn delete_server(&self, svc_id: &str, srv_id: &str) -> Result<()> {
        let mut service = self.read_record(svc_id)?;
        if !service.remove_server(srv_id) {
            return Err(TillerError::NoServer);
        }
        self.write_record(&service)
    }

    fn get_server(&self, svc_id: &str, srv_id: &str) -> Result<Server> {
        let service = self.read_record(svc_id)?;
        service.server(srv_id).cloned().ok_or(TillerError::NoServer)
    }

    fn kind(&self) -> &'static str {
        "file"
    }
}

fn commit(staged: &[(PathBuf, PathBuf)], stale: &[PathBuf], journal: &mut Vec<Undo>) -> Result<()> {
    for (tmp, path) in staged {
        move_aside(path, journal)?;
        fs::rename(tmp, path)?;
        journal.push(Undo::Installed(path.clone()));
    }
    for path in stale {
        move_aside(path, journal)?;
    }
    Ok(())
}

fn move_aside(path: &Path, journal: &mut Vec<Undo>) -> Result<()> {
    let backup = path.with_extension(BACKUP_EXT);
    match fs::rename(path, &backup) {
        Ok(()) => {
            journal.push(Undo::MovedAside {
                path: path.to_path_buf(),
                backup,
            });
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn rollback(journal: Vec<Undo>) {
    for step in journal.into_iter().rev() {
        match step {
            Undo::Installed(path) => discard(&path),
            Undo::MovedAside { path, backup } => {
                if let Err(e) = fs::rename(&backup, &path) {
                    warn!(path = %path.display(), error = %e, "store: could not restore record");
                }
            }
        }
    }
}

/// Remove a file the store created, if it is still there.
fn discard(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "store: could not remove leftover file"),
    }
}
