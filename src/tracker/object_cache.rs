//! Store of recently seen objects and the instance id allocator.

use std::collections::{BTreeMap, VecDeque};

use nalgebra::{Point3, Vector3};
use ndarray::Array1;

use crate::tracker::cluster::{Cluster, InstanceId};
use crate::tracker::config::IdScope;

/// Last known state of an object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRecord {
    pub id: InstanceId,
    pub class: u32,
    pub centroid: Point3<f32>,
    pub feature: Array1<f32>,
    /// Frame index of the last observation.
    pub last_seen: u64,
    pub first_seen: u64,
    /// Number of frames the object was observed in.
    pub hits: u32,
    /// Most recent `(frame, centroid)` observations, oldest first.
    pub history: VecDeque<(u64, Point3<f32>)>,
}

impl ObjectRecord {
    pub fn new(id: InstanceId, cluster: &Cluster, frame: u64) -> Self {
        Self {
            id,
            class: cluster.class,
            centroid: cluster.centroid,
            feature: cluster.feature.clone(),
            last_seen: frame,
            first_seen: frame,
            hits: 1,
            history: VecDeque::from([(frame, cluster.centroid)]),
        }
    }

    /// Fold a new observation into the record.
    pub fn observe(&mut self, cluster: &Cluster, frame: u64, history_len: usize) {
        self.class = cluster.class;
        self.centroid = cluster.centroid;
        self.feature = cluster.feature.clone();
        self.last_seen = frame;
        self.hits += 1;
        self.history.push_back((frame, cluster.centroid));
        while self.history.len() > history_len {
            self.history.pop_front();
        }
    }

    /// Frames elapsed since the last observation.
    #[inline]
    pub fn age(&self, frame: u64) -> u64 {
        frame.saturating_sub(self.last_seen)
    }

    /// Per-frame displacement between the two most recent observations.
    pub fn velocity(&self) -> Option<Vector3<f32>> {
        let mut recent = self.history.iter().rev();
        let (t1, p1) = recent.next()?;
        let (t0, p0) = recent.next()?;
        let dt = t1.checked_sub(*t0).filter(|&dt| dt > 0)?;
        Some((p1 - p0) / dt as f32)
    }

    /// Centroid extrapolated to `frame` at constant velocity.
    pub fn predicted_centroid(&self, frame: u64) -> Point3<f32> {
        match self.velocity() {
            Some(velocity) => self.centroid + velocity * self.age(frame) as f32,
            None => self.centroid,
        }
    }
}

/// Object records keyed by id, plus the id counter.
///
/// Iteration is in ascending id order.
#[derive(Debug, Clone)]
pub struct ObjectCache {
    records: BTreeMap<InstanceId, ObjectRecord>,
    max_id: InstanceId,
    id_scope: IdScope,
    history_len: usize,
}

impl Default for ObjectCache {
    fn default() -> Self {
        Self::new(IdScope::Scene, 4)
    }
}

impl ObjectCache {
    pub fn new(id_scope: IdScope, history_len: usize) -> Self {
        Self {
            records: BTreeMap::new(),
            max_id: 0,
            id_scope,
            history_len,
        }
    }

    /// Largest id issued so far.
    #[inline]
    pub fn max_id(&self) -> InstanceId {
        self.max_id
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &ObjectRecord> {
        self.records.values()
    }

    /// Issue a fresh id, never handed out before in the current id scope.
    pub fn allocate_id(&mut self) -> InstanceId {
        self.max_id += 1;
        self.max_id
    }

    /// Insert or overwrite the record for `id`, marking it seen at `frame`.
    pub fn upsert(&mut self, id: InstanceId, mut record: ObjectRecord, frame: u64) {
        record.id = id;
        record.last_seen = frame;
        self.max_id = self.max_id.max(id);
        self.records.insert(id, record);
    }

    /// Record an observation of `id`, creating the record on first sight.
    pub fn observe(&mut self, id: InstanceId, cluster: &Cluster, frame: u64) {
        let record = match self.records.remove(&id) {
            Some(mut record) => {
                record.observe(cluster, frame, self.history_len);
                record
            }
            None => ObjectRecord::new(id, cluster, frame),
        };
        self.upsert(id, record, frame);
    }

    pub fn lookup(&self, id: InstanceId) -> Option<&ObjectRecord> {
        self.records.get(&id)
    }

    /// Drop records unseen for more than `max_age` frames. Returns how many were removed.
    pub fn evict_stale(&mut self, frame: u64, max_age: u64) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| record.age(frame) <= max_age);
        before - self.records.len()
    }

    /// Drop the least recently seen records until at most `max_records` remain.
    pub fn enforce_capacity(&mut self, max_records: usize) -> usize {
        let excess = self.records.len().saturating_sub(max_records);
        if excess == 0 {
            return 0;
        }
        let mut by_age: Vec<(u64, InstanceId)> = self
            .records
            .values()
            .map(|record| (record.last_seen, record.id))
            .collect();
        by_age.sort_unstable();
        for (_, id) in by_age.into_iter().take(excess) {
            self.records.remove(&id);
        }
        excess
    }

    /// Clear all records for a new scene. The id counter restarts at 0 under
    /// [`IdScope::Scene`] and is kept under [`IdScope::Run`].
    pub fn reset(&mut self) {
        self.records.clear();
        if self.id_scope == IdScope::Scene {
            self.max_id = 0;
        }
    }
}
