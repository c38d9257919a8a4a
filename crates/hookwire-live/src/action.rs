use hookwire_proto::CaptureRecord;

/// Identifies the endpoint session an action was produced for.
///
/// The generation changes on every endpoint switch, so records still in
/// flight for a previous session never match, even when the user switches
/// back to the same slug.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamTag {
    pub slug: String,
    pub generation: u64,
}

/// Input to [`crate::LiveList::apply`]
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Initial fetch, newest first
    Snapshot {
        tag: StreamTag,
        records: Vec<CaptureRecord>,
    },
    /// One record from the live stream
    NewRecord {
        tag: StreamTag,
        record: CaptureRecord,
    },
    /// Authoritative replacement of the window, newest first
    Refetched {
        tag: StreamTag,
        records: Vec<CaptureRecord>,
    },
    FilterChanged {
        method: Option<String>,
        text: Option<String>,
    },
    LiveModeChanged(bool),
    SortChanged {
        newest_first: bool,
    },
    Select(String),
    JumpToNew,
    EndpointSwitched(String),
}

impl Action {
    pub fn tag(&self) -> Option<&StreamTag> {
        match self {
            Action::Snapshot { tag, .. }
            | Action::NewRecord { tag, .. }
            | Action::Refetched { tag, .. } => Some(tag),
            _ => None,
        }
    }
}

/// What [`crate::LiveList::apply`] did with an action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Applied,
    /// Tagged for another endpoint or an older session; dropped
    Stale,
    /// Valid but had no effect (duplicate record, unknown selection)
    Ignored,
}
