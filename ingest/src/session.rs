use crate::file_analyzer::{DataItem, DataKind, ExtractedData};
use crate::burp::BurpParseResult;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use pentest_common::scope::ScopePolicy;
use regex::Regex;

/// `spec.md` §4.8: `CREATED → ACTIVE → CLOSED`, operations valid only
/// in `ACTIVE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Active,
    Closed,
}

/// A single filter dimension for `InformationGatherer::query`
/// (`spec.md` §4.8: "by kind, by target, by regex").
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub kind: Option<DataKind>,
    pub target: Option<String>,
    pub pattern: Option<Regex>,
}

impl QueryFilter {
    fn matches(&self, item: &DataItem, source_path: &str) -> bool {
        if let Some(kind) = self.kind {
            if item.kind != kind {
                return false;
            }
        }
        if let Some(target) = &self.target {
            if !source_path.contains(target.as_str()) {
                return false;
            }
        }
        if let Some(pattern) = &self.pattern {
            if !pattern.is_match(&item.raw) {
                return false;
            }
        }
        true
    }
}

/// `spec.md` §3 `GatherSession`. Accumulators are single-writer guarded
/// by a `Mutex` — workers from the bounded pool push results as they
/// finish rather than racing to build one `Vec` directly.
pub struct GatherSession {
    id: String,
    project_name: Option<String>,
    scope: ScopePolicy,
    created_at: DateTime<Utc>,
    state: Mutex<SessionState>,
    files_analyzed: Mutex<usize>,
    findings: Mutex<Vec<ExtractedData>>,
    burp_imports: Mutex<Vec<BurpParseResult>>,
}

impl GatherSession {
    pub(crate) fn new(id: String, project_name: Option<String>, scope: ScopePolicy) -> Self {
        GatherSession {
            id,
            project_name,
            scope,
            created_at: pentest_common::time::now(),
            state: Mutex::new(SessionState::Created),
            files_analyzed: Mutex::new(0),
            findings: Mutex::new(Vec::new()),
            burp_imports: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn project_name(&self) -> Option<&str> {
        self.project_name.as_deref()
    }

    pub fn scope(&self) -> &ScopePolicy {
        &self.scope
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        *self.state.lock() = state;
    }

    pub fn files_analyzed(&self) -> usize {
        *self.files_analyzed.lock()
    }

    pub(crate) fn record(&self, data: ExtractedData) {
        *self.files_analyzed.lock() += 1;
        self.findings.lock().push(data);
    }

    pub(crate) fn record_burp_import(&self, result: BurpParseResult) {
        self.burp_imports.lock().push(result);
    }

    pub fn findings(&self) -> Vec<ExtractedData> {
        self.findings.lock().clone()
    }

    pub fn burp_imports(&self) -> Vec<BurpParseResult> {
        self.burp_imports.lock().clone()
    }

    /// `spec.md` §4.8 `query`: flattens every `DataItem` across all
    /// accumulated `ExtractedData`, paired with its source file, and
    /// filters by the requested dimensions.
    pub fn query(&self, filter: &QueryFilter) -> Vec<DataItem> {
        self.findings
            .lock()
            .iter()
            .flat_map(|data| {
                let source = data.source_path.to_string_lossy().to_string();
                data.items
                    .iter()
                    .filter(move |item| filter.matches(item, &source))
                    .cloned()
            })
            .collect()
    }
}
