//! Markdown summary generation
//!
//! Renders a [`CrawlSummary`] as a human-readable report: run information,
//! page outcomes, and what was harvested.

use crate::output::traits::{CrawlSummary, OutputResult};
use crate::state::PageState;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Generates a markdown summary from crawl statistics
///
/// # Arguments
///
/// * `summary` - The crawl summary data
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote markdown summary
/// * `Err(OutputError)` - Failed to write summary
pub fn generate_markdown_summary(summary: &CrawlSummary, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_summary(summary);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

fn state_label(state: PageState) -> &'static str {
    match state {
        PageState::Discovered => "Discovered",
        PageState::Queued => "Queued",
        PageState::Fetching => "Fetching",
        PageState::Processed => "Processed",
        PageState::DeadLink => "Dead Link (404/410)",
        PageState::Unreachable => "Unreachable",
        PageState::RateLimited => "Rate Limited",
        PageState::Failed => "Failed",
        PageState::RequestLimitHit => "Request Limit Hit",
        PageState::ContentMismatch => "Content Mismatch",
        PageState::RobotsDenied => "Denied by robots.txt",
    }
}

/// Formats a crawl summary as markdown
pub fn format_markdown_summary(summary: &CrawlSummary) -> String {
    let mut md = String::new();

    md.push_str("# Catalog-Harvest Crawl Summary\n\n");

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Run ID**: {}\n", summary.run_id));
    md.push_str(&format!("- **Started**: {}\n", summary.started_at));
    if let Some(finished) = &summary.finished_at {
        md.push_str(&format!("- **Finished**: {}\n", finished));
    }
    if let Some(duration) = summary.duration_seconds {
        md.push_str(&format!(
            "- **Duration**: {} seconds ({:.2} minutes)\n",
            duration,
            duration as f64 / 60.0
        ));
    }
    md.push_str(&format!("- **Status**: {}\n", summary.status));
    md.push_str(&format!("- **Config Hash**: {}\n\n", summary.config_hash));

    // Pages
    md.push_str("## Pages\n\n");
    md.push_str(&format!("- **Total Pages**: {}\n", summary.total_pages));
    md.push_str(&format!("- **Listing Pages**: {}\n", summary.listing_pages));
    md.push_str(&format!("- **Product Pages**: {}\n", summary.product_pages));
    md.push_str(&format!(
        "- **Success Rate**: {:.2}%\n\n",
        summary.success_rate()
    ));

    md.push_str("| State | Count |\n");
    md.push_str("|-------|-------|\n");
    for state in PageState::all_states() {
        let count = summary.pages_in(state);
        if count > 0 {
            md.push_str(&format!("| {} | {} |\n", state_label(state), count));
        }
    }
    md.push('\n');

    // Products
    md.push_str("## Products\n\n");
    md.push_str(&format!("- **Products Stored**: {}\n", summary.total_products));
    md.push_str(&format!(
        "- **In Stock**: {} ({:.1}%)\n",
        summary.products_in_stock,
        summary.in_stock_rate()
    ));
    md.push_str(&format!(
        "- **Discounted**: {}\n\n",
        summary.discounted_products
    ));

    if !summary.top_sections.is_empty() {
        md.push_str("## Top Sections\n\n");
        md.push_str("| Section | Products |\n");
        md.push_str("|---------|----------|\n");

        for (section, count) in &summary.top_sections {
            let section = if section.is_empty() {
                "(none)"
            } else {
                section.as_str()
            };
            md.push_str(&format!("| {} | {} |\n", section, count));
        }
        md.push('\n');
    }

    // Error summary, largest first
    if !summary.error_summary.is_empty() {
        md.push_str("## Error Summary\n\n");
        md.push_str("| Error Type | Count |\n");
        md.push_str("|------------|-------|\n");

        let mut errors: Vec<_> = summary.error_summary.iter().collect();
        errors.sort_by(|a, b| b.1.cmp(a.1));
        for (state, count) in errors {
            md.push_str(&format!("| {} | {} |\n", state_label(*state), count));
        }
        md.push('\n');
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_summary() -> CrawlSummary {
        let mut summary = CrawlSummary::new();
        summary.run_id = 1;
        summary.started_at = "2024-01-01T00:00:00Z".to_string();
        summary.finished_at = Some("2024-01-01T01:00:00Z".to_string());
        summary.duration_seconds = Some(3600);
        summary.status = "completed".to_string();
        summary.config_hash = "abc123".to_string();
        summary.total_pages = 1000;
        summary.listing_pages = 40;
        summary.product_pages = 960;
        summary.pages_by_state.insert(PageState::Processed, 990);
        summary.pages_by_state.insert(PageState::DeadLink, 10);
        summary.error_summary.insert(PageState::DeadLink, 10);
        summary.total_products = 950;
        summary.products_in_stock = 760;
        summary.discounted_products = 120;
        summary
    }

    #[test]
    fn test_format_markdown_summary() {
        let markdown = format_markdown_summary(&create_test_summary());

        assert!(markdown.contains("# Catalog-Harvest Crawl Summary"));
        assert!(markdown.contains("- **Run ID**: 1"));
        assert!(markdown.contains("- **Total Pages**: 1000"));
        assert!(markdown.contains("| Processed | 990 |"));
        assert!(markdown.contains("| Dead Link (404/410) | 10 |"));
    }

    #[test]
    fn test_markdown_products() {
        let markdown = format_markdown_summary(&create_test_summary());

        assert!(markdown.contains("- **Products Stored**: 950"));
        assert!(markdown.contains("- **In Stock**: 760 (80.0%)"));
        assert!(markdown.contains("- **Discounted**: 120"));
    }

    #[test]
    fn test_markdown_with_sections() {
        let mut summary = create_test_summary();
        summary.top_sections = vec![
            ("Catalog / Cosmetics / Soap".to_string(), 700),
            (String::new(), 5),
        ];

        let markdown = format_markdown_summary(&summary);

        assert!(markdown.contains("## Top Sections"));
        assert!(markdown.contains("| Catalog / Cosmetics / Soap | 700 |"));
        assert!(markdown.contains("| (none) | 5 |"));
    }

    #[test]
    fn test_empty_states_are_omitted() {
        let markdown = format_markdown_summary(&create_test_summary());
        assert!(!markdown.contains("| Unreachable |"));
        assert!(!markdown.contains("## Top Sections"));
    }

    #[test]
    fn test_generate_markdown_summary_writes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("summary.md");

        generate_markdown_summary(&create_test_summary(), &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# Catalog-Harvest Crawl Summary"));
    }
}
