use hookwire_proto::CaptureRecord;
use std::collections::VecDeque;
use tracing::{debug, trace};

use crate::action::{Action, Applied, StreamTag};
use crate::filter::Filter;

pub const DEFAULT_CAPACITY: usize = 500;

/// Client-side view of one endpoint's requests
#[derive(Debug, Clone)]
pub struct LiveList {
    slug: Option<String>,
    generation: u64,
    /// Newest first, in arrival order
    records: VecDeque<CaptureRecord>,
    capacity: usize,
    live_mode: bool,
    sort_newest: bool,
    filter: Filter,
    selected: Option<String>,
    new_count: usize,
    stale_dropped: u64,
}

impl Default for LiveList {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl LiveList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slug: None,
            generation: 0,
            records: VecDeque::new(),
            capacity: capacity.max(1),
            live_mode: true,
            sort_newest: true,
            filter: Filter::default(),
            selected: None,
            new_count: 0,
            stale_dropped: 0,
        }
    }

    /// Tag to attach to snapshot and stream actions for the current endpoint
    pub fn tag(&self) -> Option<StreamTag> {
        self.slug.as_ref().map(|slug| StreamTag {
            slug: slug.clone(),
            generation: self.generation,
        })
    }

    pub fn apply(&mut self, action: Action) -> Applied {
        if let Some(tag) = action.tag() {
            if !self.is_current(tag) {
                self.stale_dropped += 1;
                trace!(slug = %tag.slug, generation = tag.generation, "Dropping stale action");
                return Applied::Stale;
            }
        }

        match action {
            Action::EndpointSwitched(slug) => {
                self.switch_to(slug);
                Applied::Applied
            }
            Action::Snapshot { records, .. } => {
                self.merge_snapshot(records);
                Applied::Applied
            }
            Action::NewRecord { record, .. } => self.push_new(record),
            Action::Refetched { records, .. } => {
                self.replace(records);
                Applied::Applied
            }
            Action::FilterChanged { method, text } => {
                self.filter = Filter::new(method, text);
                Applied::Applied
            }
            Action::LiveModeChanged(live) => {
                self.live_mode = live;
                if live {
                    self.jump_to_newest();
                }
                Applied::Applied
            }
            Action::SortChanged { newest_first } => {
                self.sort_newest = newest_first;
                Applied::Applied
            }
            Action::Select(id) => {
                if self.position(&id).is_some() {
                    self.selected = Some(id);
                    Applied::Applied
                } else {
                    Applied::Ignored
                }
            }
            Action::JumpToNew => {
                self.jump_to_newest();
                Applied::Applied
            }
        }
    }

    fn is_current(&self, tag: &StreamTag) -> bool {
        self.slug.as_deref() == Some(tag.slug.as_str()) && self.generation == tag.generation
    }

    fn switch_to(&mut self, slug: String) {
        debug!(slug = %slug, "Switching live list endpoint");
        let capacity = self.capacity;
        let generation = self.generation + 1;
        let stale_dropped = self.stale_dropped;
        *self = Self::with_capacity(capacity);
        self.slug = Some(slug);
        self.generation = generation;
        self.stale_dropped = stale_dropped;
    }

    fn merge_snapshot(&mut self, records: Vec<CaptureRecord>) {
        for record in records {
            if self.position(&record.id).is_none() {
                self.records.push_back(record);
            }
        }
        // Stable, so records sharing a timestamp keep arrival order
        self.records
            .make_contiguous()
            .sort_by(|a, b| b.received_at.cmp(&a.received_at));
        self.evict_overflow();

        if self.selected.is_none() {
            self.selected = self.newest_matching();
        }
    }

    fn push_new(&mut self, record: CaptureRecord) -> Applied {
        if self.position(&record.id).is_some() {
            return Applied::Ignored;
        }

        let id = record.id.clone();
        let matches = self.filter.matches(&record);
        self.records.push_front(record);
        self.evict_overflow();

        if self.live_mode {
            if matches {
                self.selected = Some(id);
            }
        } else {
            self.new_count += 1;
        }
        Applied::Applied
    }

    fn replace(&mut self, records: Vec<CaptureRecord>) {
        self.records.clear();
        for record in records {
            if self.position(&record.id).is_none() {
                self.records.push_back(record);
            }
        }
        self.evict_overflow();

        if let Some(selected) = &self.selected {
            if self.position(selected).is_none() {
                debug!(id = %selected, "Selected record gone after refetch");
                self.selected = None;
            }
        }
        self.new_count = self.new_count.min(self.records.len());
    }

    fn jump_to_newest(&mut self) {
        self.new_count = 0;
        if let Some(newest) = self.newest_matching() {
            self.selected = Some(newest);
        }
    }

    fn evict_overflow(&mut self) {
        while self.records.len() > self.capacity {
            if let Some(evicted) = self.records.pop_back() {
                if self.selected.as_deref() == Some(evicted.id.as_str()) {
                    self.selected = None;
                }
            }
        }
    }

    fn newest_matching(&self) -> Option<String> {
        self.records
            .iter()
            .find(|record| self.filter.matches(record))
            .map(|record| record.id.clone())
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.records.iter().position(|record| record.id == id)
    }

    /// Records passing the active filters, in display order, paginated
    pub fn visible(&self, offset: usize, limit: usize) -> Vec<&CaptureRecord> {
        let matching = self.records.iter().filter(|record| self.filter.matches(record));
        if self.sort_newest {
            matching.skip(offset).take(limit).collect()
        } else {
            let mut all: Vec<&CaptureRecord> = matching.collect();
            all.reverse();
            all.into_iter().skip(offset).take(limit).collect()
        }
    }

    pub fn visible_count(&self) -> usize {
        self.records
            .iter()
            .filter(|record| self.filter.matches(record))
            .count()
    }

    pub fn selected(&self) -> Option<&CaptureRecord> {
        let id = self.selected.as_deref()?;
        self.records.iter().find(|record| record.id == id)
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn slug(&self) -> Option<&str> {
        self.slug.as_deref()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn new_count(&self) -> usize {
        self.new_count
    }

    pub fn stale_dropped(&self) -> u64 {
        self.stale_dropped
    }

    pub fn is_live(&self) -> bool {
        self.live_mode
    }

    pub fn sort_newest(&self) -> bool {
        self.sort_newest
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }
}
