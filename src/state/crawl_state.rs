/// Crawl lifecycle and progress tracking
///
/// `CrawlState` is the crawl driver's state machine; `CrawlStatus` is the
/// observable snapshot the control surface hands to callers.
use serde::Serialize;
use std::fmt;

/// Lifecycle of a single crawl: `Idle -> Running -> {Completed, Stopped, Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlState {
    /// No crawl has been started yet
    Idle,

    /// A crawl task is walking pages
    Running,

    /// The page cap or the end-of-data heuristic ended the crawl
    Completed,

    /// An external stop request ended the crawl
    Stopped,

    /// A page failed fatally or exhausted its retries
    Failed,
}

impl CrawlState {
    /// Returns true once the crawl can make no further progress
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Stopped | Self::Failed)
    }

    /// Returns true if the state machine permits moving to `next`
    pub fn can_transition_to(&self, next: CrawlState) -> bool {
        match (self, next) {
            (Self::Idle, Self::Running) => true,
            (Self::Running, s) => s.is_terminal(),
            // A finished crawl may be followed by a new one
            (s, Self::Running) => s.is_terminal(),
            _ => false,
        }
    }

    /// Converts the state to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }

    /// Parses a state from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "stopped" => Some(Self::Stopped),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Process-lifetime progress of the current (or last) crawl
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrawlStatus {
    pub state: CrawlState,

    /// True while the crawl task is alive
    pub is_running: bool,

    /// Page index currently being processed
    pub current_page: u64,

    /// Page budget of the crawl, `None` when unbounded
    pub total_pages: Option<u64>,

    /// Pages finished so far (empty pages included)
    pub pages_processed: u64,

    /// Percent complete, `None` when the page budget is unbounded
    pub progress: Option<f64>,

    /// Human-readable description of the most recent condition
    pub message: String,

    /// Records written to the store so far
    pub records_saved: u64,
}

impl Default for CrawlStatus {
    fn default() -> Self {
        Self {
            state: CrawlState::Idle,
            is_running: false,
            current_page: 0,
            total_pages: None,
            pages_processed: 0,
            progress: None,
            message: "Ready to start crawling".to_string(),
            records_saved: 0,
        }
    }
}

impl CrawlStatus {
    /// Fresh status for a crawl that is about to walk pages
    pub fn starting(start_page: u64, max_pages: Option<u64>) -> Self {
        let message = match max_pages {
            Some(n) => format!(
                "Starting crawl from page {} for {} pages",
                start_page, n
            ),
            None => format!("Starting crawl from page {} until exhausted", start_page),
        };

        Self {
            state: CrawlState::Running,
            is_running: true,
            current_page: start_page,
            total_pages: max_pages,
            pages_processed: 0,
            progress: max_pages.map(|_| 0.0),
            message,
            records_saved: 0,
        }
    }

    /// Records one finished page and recomputes the percentage
    pub fn page_finished(&mut self, records: usize) {
        self.pages_processed += 1;
        self.records_saved += records as u64;
        self.progress = self
            .total_pages
            .filter(|total| *total > 0)
            .map(|total| (self.pages_processed as f64 / total as f64 * 100.0).min(100.0));
    }

    /// Moves into a terminal state with a final message
    pub fn finish(&mut self, state: CrawlState, message: impl Into<String>) {
        self.state = state;
        self.is_running = false;
        self.message = message.into();
        if state == CrawlState::Completed && self.total_pages.is_some() {
            self.progress = Some(100.0);
        }
    }
}
