//! Terminal rendering for reconciled updates and publication plans.

use std::cmp::Ordering;

use tramita_core::{PostDraft, Update};

const DATE_FORMAT: &str = "%d/%m/%Y %H:%M";
const FLAG: &str = "!";

// ── Public API ──

/// Print updates as a table ordered by occurrence, undated ones last,
/// followed by totals.
pub fn print_updates(updates: &[Update]) {
    if updates.is_empty() {
        println!("No updates in this window.");
        return;
    }

    println!("{}", header_row());
    for update in by_occurrence(updates) {
        println!("{}", update_row(update));
        for related in &update.related {
            println!("    related: {}", related_summary(related));
        }
    }
    println!();

    let posted = updates.iter().filter(|u| u.is_posted()).count();
    let flagged = updates.iter().filter(|u| u.flagged).count();
    println!("  {:<26} {}", "updates", updates.len());
    println!("  {:<26} {}", "posted", posted);
    println!("  {:<26} {}", "flagged", flagged);
}

/// Print the post that would be submitted for an update.
pub fn print_draft(update: &Update, draft: &PostDraft) {
    println!("=== {} ===", update.key);
    println!("  {:<26} {}", "title", draft.title);
    if let Some(flair) = &draft.flair {
        println!("  {:<26} {}", "flair", flair);
    }
    if let Some(link) = &draft.link {
        println!("  {:<26} {}", "link", link);
    }
    println!("  comment");
    for line in draft.comment.lines() {
        println!("    {line}");
    }
    println!();
}

/// Print the posts selected for removal.
pub fn print_removals(updates: &[&Update]) {
    if updates.is_empty() {
        println!("Nothing to remove.");
        return;
    }
    for update in updates {
        println!(
            "  {:<26} {}",
            update.key.to_string(),
            update.post_url.as_deref().unwrap_or("-")
        );
    }
    println!();
    println!("  {:<26} {}", "to remove", updates.len());
}

// ── Row formatting ──

fn by_occurrence(updates: &[Update]) -> Vec<&Update> {
    let mut sorted: Vec<&Update> = updates.iter().collect();
    sorted.sort_by(|a, b| match (a.occurred_at, b.occurred_at) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    sorted
}

fn header_row() -> String {
    format!(
        "{:<1} {:<22} {:<26} {:<26} {:<16} {:<16} {:>3} {:>5}",
        "", "id", "author", "post", "occurred", "posted", "rel", "ups"
    )
}

fn update_row(update: &Update) -> String {
    format!(
        "{:<1} {:<22} {:<26} {:<26} {:<16} {:<16} {:>3} {:>5}",
        if update.flagged { FLAG } else { "" },
        update.key.to_string(),
        clip(update.author.as_deref().unwrap_or("-"), 26),
        update.post_url.as_deref().unwrap_or("-"),
        update
            .occurred_at
            .map(|at| at.format(DATE_FORMAT).to_string())
            .unwrap_or_else(|| "-".into()),
        update
            .posted_at
            .map(|at| at.format(DATE_FORMAT).to_string())
            .unwrap_or_else(|| "-".into()),
        update.related.len(),
        update
            .ups
            .map(|ups| ups.to_string())
            .unwrap_or_else(|| "-".into()),
    )
}

fn related_summary(update: &Update) -> String {
    match (&update.post_url, update.occurred_at) {
        (Some(url), _) => format!("{} posted at {url}", update.key),
        (None, Some(at)) => format!("{} occurred {}", update.key, at.format(DATE_FORMAT)),
        (None, None) => update.key.to_string(),
    }
}

fn clip(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut clipped: String = text.chars().take(width - 1).collect();
        clipped.push('~');
        clipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tramita_core::UpdateKey;

    fn update(number: u32, day: Option<u32>) -> Update {
        let mut u = Update::new(UpdateKey::new("PL", number, 2024, Some(1)));
        u.occurred_at = day.map(|d| {
            NaiveDate::from_ymd_opt(2024, 3, d)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap()
        });
        u
    }

    #[test]
    fn undated_updates_sort_last() {
        let updates = vec![update(1, None), update(2, Some(20)), update(3, Some(5))];
        let numbers: Vec<u32> = by_occurrence(&updates)
            .iter()
            .map(|u| u.key.number)
            .collect();
        assert_eq!(numbers, vec![3, 2, 1]);
    }

    #[test]
    fn row_marks_flagged_and_missing_fields() {
        let mut u = update(2655, Some(15));
        u.flagged = true;
        u.author = Some("Dr. Leonardo".into());
        let row = update_row(&u);
        assert!(row.starts_with(FLAG));
        assert!(row.contains("PL 2655/2024 (1)"));
        assert!(row.contains("Dr. Leonardo"));
        assert!(row.contains("15/03/2024 10:00"));
        assert!(row.trim_end().ends_with('-'));
    }

    #[test]
    fn long_names_are_clipped() {
        assert_eq!(clip("short", 26), "short");
        let clipped = clip("Comissão de Constituição e Justiça e de Cidadania", 26);
        assert_eq!(clipped.chars().count(), 26);
        assert!(clipped.ends_with('~'));
    }

    #[test]
    fn related_summary_prefers_post_url() {
        let mut u = update(7, Some(1));
        assert_eq!(related_summary(&u), "PL 7/2024 (1) occurred 01/03/2024 10:00");
        u.post_url = Some("https://redd.it/abc".into());
        assert_eq!(related_summary(&u), "PL 7/2024 (1) posted at https://redd.it/abc");
    }
}
