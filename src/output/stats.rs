//! Plain-text reports for the command line

use crate::output::HarvestSummary;
use crate::state::RateLimitStatus;
use crate::storage::ArtistRecord;
use std::fmt::Write;

/// Longest alias list shown per artist before it is abbreviated
const MAX_ALIASES_SHOWN: usize = 3;

/// Renders aggregate statistics and the latest run
pub fn format_statistics(summary: &HarvestSummary) -> String {
    let stats = &summary.stats;
    let mut out = String::new();

    let _ = writeln!(out, "=== Harvest Statistics ===\n");
    let _ = writeln!(out, "Overview:");
    let _ = writeln!(out, "  Total artists: {}", stats.total_artists);
    if let Some(avg) = stats.avg_posts {
        let _ = writeln!(out, "  Average posts: {:.1}", avg);
    }
    if let (Some(min), Some(max)) = (stats.min_posts, stats.max_posts) {
        let _ = writeln!(out, "  Post count range: {} - {}", min, max);
    }
    let _ = writeln!(out);

    if !stats.top_artists.is_empty() {
        let _ = writeln!(out, "Top Artists by Posts:");
        for (rank, (name, posts)) in stats.top_artists.iter().enumerate() {
            let _ = writeln!(out, "  {:>2}. {} ({} posts)", rank + 1, name, posts);
        }
        let _ = writeln!(out);
    }

    match &summary.latest_run {
        Some(run) => {
            let _ = writeln!(out, "Latest Run (#{}):", run.id);
            let _ = writeln!(out, "  Status: {}", run.status);
            let _ = writeln!(out, "  Started: {}", run.started_at);
            if let Some(finished) = &run.finished_at {
                let _ = writeln!(out, "  Finished: {}", finished);
            }
            if let Some(secs) = summary.duration_seconds {
                let _ = writeln!(out, "  Duration: {}s", secs);
            }
            let _ = writeln!(
                out,
                "  Pages: {} processed from page {}{}",
                run.pages_processed,
                run.start_page,
                run.max_pages
                    .map(|max| format!(" (budget {})", max))
                    .unwrap_or_default()
            );
            let _ = writeln!(out, "  Records saved: {}", run.records_saved);
            if let Some(message) = &run.message {
                let _ = writeln!(out, "  Message: {}", message);
            }
            if run.is_resumable() {
                let _ = writeln!(out, "  Resumable from page {}", run.resume_page());
            }
        }
        None => {
            let _ = writeln!(out, "No crawl runs recorded yet.");
        }
    }

    out
}

pub fn print_statistics(summary: &HarvestSummary) {
    print!("{}", format_statistics(summary));
}

/// Renders search results, one artist per line
pub fn format_artists(artists: &[ArtistRecord]) -> String {
    if artists.is_empty() {
        return "No matching artists.\n".to_string();
    }

    let mut out = String::new();
    for artist in artists {
        let mut flags = Vec::new();
        if !artist.is_active {
            flags.push("inactive");
        }
        if artist.is_banned {
            flags.push("banned");
        }
        if artist.is_deleted {
            flags.push("deleted");
        }

        let _ = write!(
            out,
            "{:>9}  {:<32} {:>7} posts",
            artist.id, artist.name, artist.post_count
        );
        if !artist.group_name.is_empty() {
            let _ = write!(out, "  [{}]", artist.group_name);
        }
        if !artist.other_names.is_empty() {
            let shown: Vec<&str> = artist
                .other_names
                .iter()
                .take(MAX_ALIASES_SHOWN)
                .map(String::as_str)
                .collect();
            let more = artist.other_names.len().saturating_sub(MAX_ALIASES_SHOWN);
            let _ = write!(out, "  aka {}", shown.join(", "));
            if more > 0 {
                let _ = write!(out, " (+{})", more);
            }
        }
        if !flags.is_empty() {
            let _ = write!(out, "  ({})", flags.join(", "));
        }
        let _ = writeln!(out);
    }
    let _ = writeln!(out, "\n{} artists", artists.len());
    out
}

pub fn print_artists(artists: &[ArtistRecord]) {
    print!("{}", format_artists(artists));
}

/// Renders the rate-limit snapshot
pub fn format_rate_limit_status(status: &RateLimitStatus) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Rate Limit Status ===");
    let _ = writeln!(out, "  Health: {}", status.health);
    let _ = writeln!(
        out,
        "  Rate: {:.2} req/sec (base {:.2})",
        status.current_rate, status.base_rate
    );
    let _ = writeln!(
        out,
        "  Requests: {} | Throttles: {} total, {} consecutive",
        status.total_requests, status.total_throttles, status.consecutive_throttles
    );
    if status.cooldown_active {
        let _ = writeln!(
            out,
            "  Cooldown: {:.0}s remaining",
            status.cooldown_remaining_seconds
        );
    }
    if let Some(avg) = status.avg_response_ms {
        let _ = writeln!(out, "  Avg response: {:.0}ms", avg);
    }
    if let Some(at) = &status.last_throttle_at {
        let _ = writeln!(out, "  Last throttled: {}", at);
    }
    out
}

pub fn print_rate_limit_status(status: &RateLimitStatus) {
    print!("{}", format_rate_limit_status(status));
}
