//! Searchable entities and their attributes.
//!
//! Each entity kind declares its attributes once, with a clause-name stem and
//! a value type. The compiler derives its clause vocabulary from these lists.

use std::collections::{BTreeMap, HashMap};

use librarian_state::{FileInstance, FileRecord, ObsId, Observation, StateStore, StoreId, StoreRecord};

use crate::error::SearchResult;

/// Declared value type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrType {
    Text,
    Int,
    Float,
}

/// An attribute value read off a record. `Null` compares as unknown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttrValue<'a> {
    Text(&'a str),
    Int(i64),
    Float(f64),
    Null,
}

/// An attribute enum usable in predicates.
pub trait Attribute: Copy + std::fmt::Debug + Send + Sync + 'static {
    /// Every attribute with its clause-name stem and type.
    const ALL: &'static [(Self, &'static str, AttrType)];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileAttr {
    Name,
    Type,
    Source,
    Size,
    Obsid,
    NumInstances,
}

impl Attribute for FileAttr {
    const ALL: &'static [(Self, &'static str, AttrType)] = &[
        (FileAttr::Name, "name", AttrType::Text),
        (FileAttr::Type, "type", AttrType::Text),
        (FileAttr::Source, "source", AttrType::Text),
        (FileAttr::Size, "size", AttrType::Int),
        (FileAttr::Obsid, "obsid", AttrType::Int),
        (FileAttr::NumInstances, "num-instances", AttrType::Int),
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObsAttr {
    Obsid,
    StartTimeJd,
    StopTimeJd,
    StartLstHr,
    SessionId,
    Duration,
    NumFiles,
}

impl Attribute for ObsAttr {
    const ALL: &'static [(Self, &'static str, AttrType)] = &[
        (ObsAttr::Obsid, "obsid", AttrType::Int),
        (ObsAttr::StartTimeJd, "start-time-jd", AttrType::Float),
        (ObsAttr::StopTimeJd, "stop-time-jd", AttrType::Float),
        (ObsAttr::StartLstHr, "start-lst-hr", AttrType::Float),
        (ObsAttr::SessionId, "session-id", AttrType::Int),
        (ObsAttr::Duration, "duration", AttrType::Float),
        (ObsAttr::NumFiles, "num-files", AttrType::Int),
    ];
}

/// A record a predicate over `Self::Attr` can be evaluated against.
pub trait Record {
    type Attr: Attribute;

    fn value(&self, attr: Self::Attr) -> AttrValue<'_>;

    /// Creation time for the time-window clauses.
    fn created_at(&self) -> Option<u64> {
        None
    }

    /// The observation this record belongs to, for cross-entity clauses.
    fn observation(&self) -> Option<ObsView<'_>> {
        None
    }
}

fn opt_int(value: Option<i64>) -> AttrValue<'static> {
    value.map_or(AttrValue::Null, AttrValue::Int)
}

fn opt_float(value: Option<f64>) -> AttrValue<'static> {
    value.map_or(AttrValue::Null, AttrValue::Float)
}

/// An observation together with its computed attributes.
#[derive(Debug, Clone, Copy)]
pub struct ObsView<'a> {
    pub obs: &'a Observation,
    pub num_files: i64,
}

impl Record for ObsView<'_> {
    type Attr = ObsAttr;

    fn value(&self, attr: ObsAttr) -> AttrValue<'_> {
        match attr {
            ObsAttr::Obsid => AttrValue::Int(self.obs.obsid),
            ObsAttr::StartTimeJd => AttrValue::Float(self.obs.start_time_jd),
            ObsAttr::StopTimeJd => opt_float(self.obs.stop_time_jd),
            ObsAttr::StartLstHr => opt_float(self.obs.start_lst_hr),
            ObsAttr::SessionId => opt_int(self.obs.session_id),
            ObsAttr::Duration => opt_float(self.obs.duration()),
            ObsAttr::NumFiles => AttrValue::Int(self.num_files),
        }
    }
}

/// A file seen through the catalog, which supplies its computed attributes.
#[derive(Debug, Clone, Copy)]
pub struct FileView<'a> {
    pub file: &'a FileRecord,
    catalog: &'a SearchCatalog,
}

impl Record for FileView<'_> {
    type Attr = FileAttr;

    fn value(&self, attr: FileAttr) -> AttrValue<'_> {
        match attr {
            FileAttr::Name => AttrValue::Text(&self.file.name),
            FileAttr::Type => AttrValue::Text(&self.file.file_type),
            FileAttr::Source => AttrValue::Text(&self.file.source),
            FileAttr::Size => i64::try_from(self.file.size).map_or(AttrValue::Null, AttrValue::Int),
            FileAttr::Obsid => opt_int(self.file.obsid),
            FileAttr::NumInstances => AttrValue::Int(self.catalog.instance_count(&self.file.name)),
        }
    }

    fn created_at(&self) -> Option<u64> {
        Some(self.file.created_at)
    }

    fn observation(&self) -> Option<ObsView<'_>> {
        self.file.obsid.and_then(|obsid| self.catalog.observation(obsid))
    }
}

/// Point-in-time snapshot of the searchable metadata.
#[derive(Debug, Default)]
pub struct SearchCatalog {
    files: Vec<FileRecord>,
    observations: BTreeMap<ObsId, Observation>,
    instances: Vec<FileInstance>,
    stores: HashMap<StoreId, StoreRecord>,
    instance_counts: HashMap<String, i64>,
    file_counts: HashMap<ObsId, i64>,
}

impl SearchCatalog {
    pub fn new(
        files: Vec<FileRecord>,
        observations: Vec<Observation>,
        instances: Vec<FileInstance>,
        stores: Vec<StoreRecord>,
    ) -> Self {
        let mut instance_counts: HashMap<String, i64> = HashMap::new();
        for instance in &instances {
            *instance_counts.entry(instance.file_name.clone()).or_default() += 1;
        }
        let mut file_counts: HashMap<ObsId, i64> = HashMap::new();
        for obsid in files.iter().filter_map(|f| f.obsid) {
            *file_counts.entry(obsid).or_default() += 1;
        }
        Self {
            files,
            observations: observations.into_iter().map(|o| (o.obsid, o)).collect(),
            instances,
            stores: stores.into_iter().map(|s| (s.id, s)).collect(),
            instance_counts,
            file_counts,
        }
    }

    /// Snapshot the current contents of the state store.
    pub fn load(state: &StateStore) -> SearchResult<Self> {
        Ok(Self::new(
            state.list_files()?,
            state.list_observations()?,
            state.list_instances()?,
            state.list_stores()?,
        ))
    }

    pub fn files(&self) -> impl Iterator<Item = FileView<'_>> {
        self.files.iter().map(|file| FileView { file, catalog: self })
    }

    pub fn observations(&self) -> impl Iterator<Item = ObsView<'_>> {
        self.observations.values().map(|obs| self.obs_view(obs))
    }

    pub fn observation(&self, obsid: ObsId) -> Option<ObsView<'_>> {
        self.observations.get(&obsid).map(|obs| self.obs_view(obs))
    }

    fn obs_view<'a>(&'a self, obs: &'a Observation) -> ObsView<'a> {
        ObsView {
            obs,
            num_files: self.file_counts.get(&obs.obsid).copied().unwrap_or(0),
        }
    }

    pub fn instance_count(&self, file_name: &str) -> i64 {
        self.instance_counts.get(file_name).copied().unwrap_or(0)
    }

    /// Full paths of every instance of the named file, in instance-id order.
    pub fn instance_paths(&self, file_name: &str) -> Vec<String> {
        let mut instances: Vec<&FileInstance> = self
            .instances
            .iter()
            .filter(|i| i.file_name == file_name)
            .collect();
        instances.sort_by_key(|i| i.id);
        instances
            .into_iter()
            .filter_map(|i| self.stores.get(&i.store_id).map(|s| i.full_path_on_store(s)))
            .collect()
    }
}
