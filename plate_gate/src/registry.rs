use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, NaiveDateTime, Timelike};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::RegistryError;
use crate::plate::{normalize, NormalizedPlate};

pub const MIN_PLATE_LEN: usize = 4;
const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq)]
pub struct VehicleRecord {
    pub plate: NormalizedPlate,
    pub origin: String,
    pub destination: String,
    pub registered_at: NaiveDateTime,
}

impl fmt::Display for VehicleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:15} | From: {:20} | To: {:20}",
            self.plate.as_str(),
            self.origin,
            self.destination
        )
    }
}

/// One value of the persisted document, keyed by plate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredVehicle {
    pub from: String,
    pub to: String,
    pub added_date: String,
}

pub type RegistryDocument = BTreeMap<String, StoredVehicle>;

/// Full-document storage behind the registry.
pub trait RegistryStore: Send + Sync {
    fn load(&self) -> io::Result<RegistryDocument>;
    fn save(&self, document: &RegistryDocument) -> io::Result<()>;
    fn location(&self) -> PathBuf;
}

/// Pretty-printed JSON file.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RegistryStore for JsonFileStore {
    fn load(&self) -> io::Result<RegistryDocument> {
        let contents = fs::read_to_string(&self.path)?;
        serde_json::from_str(&contents).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn save(&self, document: &RegistryDocument) -> io::Result<()> {
        let contents = serde_json::to_string_pretty(document)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(&self.path, contents)
    }

    fn location(&self) -> PathBuf {
        self.path.clone()
    }
}

type Records = HashMap<NormalizedPlate, VehicleRecord>;

/// Plate to vehicle mapping backed by a [`RegistryStore`].
///
/// Readers always see a complete snapshot. A mutation builds the next snapshot,
/// persists it and only then swaps it in, so a failed write leaves both the store
/// and memory untouched.
pub struct VehicleRegistry {
    store: Box<dyn RegistryStore>,
    snapshot: RwLock<Arc<Records>>,
    write_lock: Mutex<()>,
}

impl VehicleRegistry {
    /// Reads the store. A missing or unreadable store yields an empty registry.
    pub fn load(store: Box<dyn RegistryStore>) -> Self {
        let records = match store.load() {
            Ok(document) => from_document(document),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Records::new(),
            Err(e) => {
                warn!(
                    "Error loading vehicle registry {}: {}",
                    store.location().display(),
                    e
                );
                Records::new()
            }
        };
        info!("Loaded {} registered vehicles", records.len());
        Self {
            store,
            snapshot: RwLock::new(Arc::new(records)),
            write_lock: Mutex::new(()),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Self {
        Self::load(Box::new(JsonFileStore::new(path.as_ref())))
    }

    pub fn lookup(&self, plate: &NormalizedPlate) -> Option<VehicleRecord> {
        self.snapshot.read().get(plate).cloned()
    }

    pub fn contains(&self, plate: &NormalizedPlate) -> bool {
        self.snapshot.read().contains_key(plate)
    }

    pub fn len(&self) -> usize {
        self.snapshot.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.read().is_empty()
    }

    /// Records ordered by plate, for listings.
    pub fn list(&self) -> Vec<VehicleRecord> {
        let snapshot = self.snapshot.read().clone();
        let mut records: Vec<VehicleRecord> = snapshot.values().cloned().collect();
        records.sort_by(|a, b| a.plate.cmp(&b.plate));
        records
    }

    /// Inserts or replaces a record stamped with the current local time.
    pub fn add(
        &self,
        plate: NormalizedPlate,
        origin: &str,
        destination: &str,
    ) -> Result<(), RegistryError> {
        if plate.len() < MIN_PLATE_LEN {
            return Err(RegistryError::InvalidPlate(plate.to_string()));
        }
        if origin.trim().is_empty() || destination.trim().is_empty() {
            return Err(RegistryError::MissingRoute);
        }

        let record = VehicleRecord {
            plate: plate.clone(),
            origin: origin.to_string(),
            destination: destination.to_string(),
            registered_at: now(),
        };
        self.commit(|records| {
            records.insert(plate, record);
        })?;
        Ok(())
    }

    /// Normalizes a typed plate and trims the route before [`Self::add`].
    pub fn register(
        &self,
        raw_plate: &str,
        origin: &str,
        destination: &str,
    ) -> Result<NormalizedPlate, RegistryError> {
        let plate = normalize(raw_plate);
        self.add(plate.clone(), origin.trim(), destination.trim())?;
        Ok(plate)
    }

    /// `Ok(false)` when the plate was not registered.
    pub fn remove(&self, plate: &NormalizedPlate) -> Result<bool, RegistryError> {
        if !self.contains(plate) {
            return Ok(false);
        }
        self.commit(|records| {
            records.remove(plate);
        })?;
        Ok(true)
    }

    fn commit(&self, mutate: impl FnOnce(&mut Records)) -> Result<(), RegistryError> {
        let _guard = self.write_lock.lock();
        let mut next: Records = self.snapshot.read().as_ref().clone();
        mutate(&mut next);

        if let Err(e) = self.store.save(&to_document(&next)) {
            let path = self.store.location();
            warn!("Error saving vehicle registry {}: {}", path.display(), e);
            return Err(RegistryError::Persist {
                path,
                reason: e.to_string(),
            });
        }

        *self.snapshot.write() = Arc::new(next);
        Ok(())
    }
}

fn now() -> NaiveDateTime {
    // Whole seconds, as stored.
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

fn from_document(document: RegistryDocument) -> Records {
    let mut records = Records::new();
    for (key, stored) in document {
        let plate = normalize(&key);
        if plate.is_empty() {
            warn!("Ignoring registry entry with empty plate '{}'", key);
            continue;
        }
        let registered_at = match NaiveDateTime::parse_from_str(&stored.added_date, DATE_FORMAT) {
            Ok(date) => date,
            Err(e) => {
                warn!(
                    "Registry entry {} has unreadable date '{}': {}",
                    plate, stored.added_date, e
                );
                NaiveDateTime::default()
            }
        };
        records.insert(
            plate.clone(),
            VehicleRecord {
                plate,
                origin: stored.from,
                destination: stored.to,
                registered_at,
            },
        );
    }
    records
}

fn to_document(records: &Records) -> RegistryDocument {
    records
        .values()
        .map(|record| {
            (
                record.plate.to_string(),
                StoredVehicle {
                    from: record.origin.clone(),
                    to: record.destination.clone(),
                    added_date: record.registered_at.format(DATE_FORMAT).to_string(),
                },
            )
        })
        .collect()
}
