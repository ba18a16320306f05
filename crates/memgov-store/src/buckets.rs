use chrono::NaiveDate;
use serde_yaml::Value;

use memgov_types::{MemoryItem, Status, StatusCounts};

/// A stored record that failed validation, kept verbatim so that rewriting
/// its bucket never drops it.
#[derive(Clone, Debug, PartialEq)]
pub struct InvalidRecord {
    pub bucket: Status,
    pub record: Value,
    pub errors: Vec<String>,
}

/// In-memory view of the three status buckets.
///
/// Every item sits in the bucket matching its `status`; the mutators below
/// keep that true. Invalid records ride along untouched and are never
/// counted, listed, or rendered.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatusBuckets {
    active: Vec<MemoryItem>,
    pending: Vec<MemoryItem>,
    deprecated: Vec<MemoryItem>,
    invalid: Vec<InvalidRecord>,
}

impl StatusBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Partition items by their `status` field.
    pub fn from_items(items: impl IntoIterator<Item = MemoryItem>) -> Self {
        let mut buckets = Self::new();
        for item in items {
            buckets.insert(item);
        }
        buckets
    }

    pub fn bucket(&self, status: Status) -> &[MemoryItem] {
        match status {
            Status::Active => &self.active,
            Status::Pending => &self.pending,
            Status::Deprecated => &self.deprecated,
        }
    }

    fn bucket_mut(&mut self, status: Status) -> &mut Vec<MemoryItem> {
        match status {
            Status::Active => &mut self.active,
            Status::Pending => &mut self.pending,
            Status::Deprecated => &mut self.deprecated,
        }
    }

    pub fn counts(&self) -> StatusCounts {
        StatusCounts {
            active: self.active.len(),
            pending: self.pending.len(),
            deprecated: self.deprecated.len(),
        }
    }

    /// All items, bucket by bucket.
    pub fn iter(&self) -> impl Iterator<Item = &MemoryItem> {
        self.active
            .iter()
            .chain(self.pending.iter())
            .chain(self.deprecated.iter())
    }

    /// Bucket and position of the first item with `id`.
    pub fn locate(&self, id: &str) -> Option<(Status, usize)> {
        Status::ALL.iter().find_map(|status| {
            self.bucket(*status)
                .iter()
                .position(|item| item.id == id)
                .map(|pos| (*status, pos))
        })
    }

    pub fn get(&self, id: &str) -> Option<&MemoryItem> {
        self.locate(id).map(|(status, pos)| &self.bucket(status)[pos])
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut MemoryItem> {
        let (status, pos) = self.locate(id)?;
        self.bucket_mut(status).get_mut(pos)
    }

    /// Add an item to the bucket named by its status.
    pub fn insert(&mut self, item: MemoryItem) {
        self.bucket_mut(item.status).push(item);
    }

    pub fn insert_invalid(&mut self, record: InvalidRecord) {
        self.invalid.push(record);
    }

    /// Invalid records, in the order they were read.
    pub fn invalid(&self) -> &[InvalidRecord] {
        &self.invalid
    }

    /// Raw invalid records stored in one bucket.
    pub fn invalid_in(&self, status: Status) -> impl Iterator<Item = &Value> {
        self.invalid
            .iter()
            .filter(move |r| r.bucket == status)
            .map(|r| &r.record)
    }

    /// Move an item to the `to` bucket and stamp `updated`.
    ///
    /// Returns the previous status, or `None` if no item has `id`. Moving
    /// an item to the status it already has changes nothing.
    pub fn relabel(&mut self, id: &str, to: Status, today: NaiveDate) -> Option<Status> {
        let (from, pos) = self.locate(id)?;
        if from == to {
            return Some(from);
        }
        let mut item = self.bucket_mut(from).remove(pos);
        item.status = to;
        item.updated = Some(today);
        self.insert(item);
        Some(from)
    }

    /// Sort every bucket into persistence order.
    pub fn sort(&mut self) {
        for status in Status::ALL {
            self.bucket_mut(status).sort_by(|a, b| a.storage_order(b));
        }
    }

    /// Every item in persistence order, as written to the canonical file.
    pub fn flatten(&self) -> Vec<MemoryItem> {
        let mut items: Vec<MemoryItem> = self.iter().cloned().collect();
        items.sort_by(|a, b| a.storage_order(b));
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn item(id: &str, topic: &str, status: Status) -> MemoryItem {
        MemoryItem::new(
            id,
            topic,
            "mode",
            "canary",
            "session:1",
            date("2024-01-01"),
            date("2024-06-01"),
        )
        .with_status(status)
    }

    #[test]
    fn from_items_partitions_by_status() {
        let buckets = StatusBuckets::from_items(vec![
            item("MEM-2024-01-001", "deploy", Status::Active),
            item("MEM-2024-01-002", "deploy", Status::Pending),
            item("MEM-2024-01-003", "deploy", Status::Pending),
        ]);
        let counts = buckets.counts();
        assert_eq!((counts.active, counts.pending, counts.deprecated), (1, 2, 0));
        assert_eq!(buckets.locate("MEM-2024-01-003"), Some((Status::Pending, 1)));
        assert!(buckets.get("MEM-2024-01-009").is_none());
    }

    #[test]
    fn relabel_moves_and_stamps() {
        let mut buckets =
            StatusBuckets::from_items(vec![item("MEM-2024-01-001", "deploy", Status::Pending)]);
        let today = date("2024-03-01");

        assert_eq!(
            buckets.relabel("MEM-2024-01-001", Status::Active, today),
            Some(Status::Pending)
        );
        let moved = buckets.get("MEM-2024-01-001").unwrap();
        assert_eq!(moved.status, Status::Active);
        assert_eq!(moved.updated, Some(today));
        assert!(buckets.bucket(Status::Pending).is_empty());

        assert_eq!(buckets.relabel("MEM-2024-01-404", Status::Active, today), None);
    }

    #[test]
    fn relabel_to_same_status_is_untouched() {
        let mut buckets =
            StatusBuckets::from_items(vec![item("MEM-2024-01-001", "deploy", Status::Active)]);
        let before = buckets.clone();
        buckets.relabel("MEM-2024-01-001", Status::Active, date("2024-03-01"));
        assert_eq!(buckets, before);
    }

    #[test]
    fn flatten_is_storage_ordered() {
        let buckets = StatusBuckets::from_items(vec![
            item("MEM-2024-01-003", "runtime", Status::Active),
            item("MEM-2024-01-002", "deploy", Status::Deprecated),
            item("MEM-2024-01-001", "deploy", Status::Pending),
        ]);
        let ids: Vec<String> = buckets.flatten().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, ["MEM-2024-01-001", "MEM-2024-01-002", "MEM-2024-01-003"]);
    }

    #[test]
    fn invalid_records_are_kept_apart() {
        let mut buckets =
            StatusBuckets::from_items(vec![item("MEM-2024-01-001", "deploy", Status::Active)]);
        buckets.insert_invalid(InvalidRecord {
            bucket: Status::Deprecated,
            record: Value::String("garbage".into()),
            errors: vec!["record is not a mapping".into()],
        });

        assert_eq!(buckets.counts().total(), 1);
        assert_eq!(buckets.flatten().len(), 1);
        assert_eq!(buckets.invalid_in(Status::Deprecated).count(), 1);
        assert_eq!(buckets.invalid_in(Status::Active).count(), 0);
        assert_eq!(buckets.invalid().len(), 1);
    }
}
