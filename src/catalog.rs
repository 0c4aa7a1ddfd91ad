use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveTime;
use dashmap::DashMap;
use serde::Deserialize;

use crate::model::{SalonId, ServiceId, UserId, WorkingHours};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SalonInfo {
    pub id: SalonId,
    pub owner_id: UserId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub open_time: Option<NaiveTime>,
    #[serde(default)]
    pub close_time: Option<NaiveTime>,
}

impl SalonInfo {
    pub fn working_hours(&self) -> WorkingHours {
        WorkingHours::from_options(self.open_time, self.close_time)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceInfo {
    pub id: ServiceId,
    pub salon_id: SalonId,
    #[serde(default)]
    pub name: String,
    pub duration_minutes: i64,
    pub price_cents: i64,
}

#[derive(Debug)]
pub enum CatalogError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Unavailable(String),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::Io(e) => write!(f, "catalog read failed: {e}"),
            CatalogError::Parse(e) => write!(f, "catalog parse failed: {e}"),
            CatalogError::Unavailable(e) => write!(f, "catalog unavailable: {e}"),
        }
    }
}

impl std::error::Error for CatalogError {}

/// Read side of the salon/service catalog. The engine never writes to it.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn salon(&self, id: SalonId) -> Result<Option<SalonInfo>, CatalogError>;

    /// A service only resolves under the salon it belongs to.
    async fn service(
        &self,
        salon_id: SalonId,
        service_id: ServiceId,
    ) -> Result<Option<ServiceInfo>, CatalogError>;

    async fn salons_owned_by(&self, owner_id: UserId) -> Result<Vec<SalonId>, CatalogError>;
}

/// On-disk catalog format: `{"salons": [...], "services": [...]}`.
#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    salons: Vec<SalonInfo>,
    #[serde(default)]
    services: Vec<ServiceInfo>,
}

#[derive(Default)]
pub struct InMemoryCatalog {
    salons: DashMap<SalonId, SalonInfo>,
    services: DashMap<ServiceId, ServiceInfo>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(json).map_err(CatalogError::Parse)?;
        let catalog = Self::new();
        for salon in file.salons {
            catalog.insert_salon(salon);
        }
        for service in file.services {
            catalog.insert_service(service);
        }
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path).map_err(CatalogError::Io)?;
        Self::from_json(&json)
    }

    pub fn insert_salon(&self, salon: SalonInfo) {
        self.salons.insert(salon.id, salon);
    }

    pub fn insert_service(&self, service: ServiceInfo) {
        self.services.insert(service.id, service);
    }

    pub fn salon_count(&self) -> usize {
        self.salons.len()
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn salon(&self, id: SalonId) -> Result<Option<SalonInfo>, CatalogError> {
        Ok(self.salons.get(&id).map(|e| e.value().clone()))
    }

    async fn service(
        &self,
        salon_id: SalonId,
        service_id: ServiceId,
    ) -> Result<Option<ServiceInfo>, CatalogError> {
        Ok(self
            .services
            .get(&service_id)
            .filter(|s| s.salon_id == salon_id)
            .map(|e| e.value().clone()))
    }

    async fn salons_owned_by(&self, owner_id: UserId) -> Result<Vec<SalonId>, CatalogError> {
        Ok(self
            .salons
            .iter()
            .filter(|e| e.owner_id == owner_id)
            .map(|e| *e.key())
            .collect())
    }
}
