use dashmap::mapref::entry::Entry;
use model::domain::assignment::RemoteAssignment;
use model::view::auction::JobStatus;

/// Jobs this node won on other auction houses, keyed by the remote auction.
#[derive(Debug, Default)]
pub struct AssignmentStore {
    database: dashmap::DashMap<(String, String), RemoteAssignment>,
}

fn key(assignment: &RemoteAssignment) -> (String, String) {
    (
        assignment.auction_house_uri.to_string(),
        assignment.auction_id.clone(),
    )
}

impl AssignmentStore {
    pub fn new() -> Self { Self::default() }

    /// Returns whether the assignment is new. A repeated assignment does not
    /// overwrite the recorded one.
    pub fn insert(&self, assignment: RemoteAssignment) -> bool {
        match self.database.entry(key(&assignment)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(assignment);
                true
            }
        }
    }

    pub fn finish(
        &self,
        assignment: &RemoteAssignment,
        status: JobStatus,
        output: Option<serde_json::Value>,
    ) {
        if let Some(mut record) = self.database.get_mut(&key(assignment)) {
            record.status = status;
            record.output_data = output;
        }
    }

    /// Oldest first.
    pub fn list(&self) -> Vec<RemoteAssignment> {
        let mut list: Vec<_> =
            self.database.iter().map(|entry| entry.value().clone()).collect();
        list.sort_by(|a, b| a.received_at.cmp(&b.received_at));
        list
    }
}
