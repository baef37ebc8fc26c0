use regex::Regex;
use std::sync::LazyLock;

use crate::domain::order::{OrderFilter, ReceiverContact};
use crate::store::{OrderRepository, StoreResult};

// ============================================================================
// Receiver Backfill - legacy free-text notes to receiver columns
// ============================================================================
//
// Orders created before receiver columns existed carried the receiver in the
// notes field. This migration parses the known note shapes once and writes
// the receiver columns; nothing at runtime reads receivers from notes.
//
// Patterns are tried in order, first match wins:
//   Receiver: Jane Doe (jane@x.com, +254700000000)
//   receiver: | to: | recipient: | for: | deliver to:  name, email, phone
//   any bare email, with a capitalised name directly in front if present
//
// ============================================================================

static CONTACT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)receiver:\s*([^()]+?)\s*\(([^,]+),\s*([^)]+)\)",
        r"(?i)receiver:\s*([^,]+),\s*([^,]+),\s*([^,\n]+)",
        r"(?i)deliver to:\s*([^,]+),\s*([^,]+),\s*([^,\n]+)",
        r"(?i)to:\s*([^,]+),\s*([^,]+),\s*([^,\n]+)",
        r"(?i)recipient:\s*([^,]+),\s*([^,]+),\s*([^,\n]+)",
        r"(?i)for:\s*([^,]+),\s*([^,]+),\s*([^,\n]+)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("receiver pattern is valid"))
    .collect()
});

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("email pattern is valid")
});

static NAME_BEFORE_EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Z][a-z]+(?:\s+[A-Z][a-z]+)*)\s*[a-zA-Z0-9._%+-]+@").expect("name pattern is valid")
});

fn field(raw: &str) -> Option<String> {
    let value = raw.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Extract a receiver from legacy notes. `None` when nothing recognisable is
/// present.
pub fn parse_receiver_notes(notes: &str) -> Option<ReceiverContact> {
    for pattern in CONTACT_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(notes) {
            return Some(ReceiverContact {
                name: field(&caps[1]),
                email: field(&caps[2]),
                phone: field(&caps[3]),
            });
        }
    }

    let email = EMAIL.find(notes)?;
    let name = NAME_BEFORE_EMAIL
        .captures(notes)
        .and_then(|caps| field(&caps[1]));
    Some(ReceiverContact {
        name,
        email: Some(email.as_str().to_string()),
        phone: None,
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub scanned: usize,
    pub updated: usize,
    pub unmatched: usize,
}

/// Fill receiver columns for every order that has none but carries notes.
/// Orders that already have a receiver are left alone, so reruns are no-ops.
pub async fn backfill_receivers(orders: &dyn OrderRepository) -> StoreResult<BackfillReport> {
    let mut report = BackfillReport::default();

    for mut order in orders.filter_orders(&OrderFilter::default()).await? {
        report.scanned += 1;
        if !order.receiver.is_empty() {
            continue;
        }
        let Some(receiver) = order.notes.as_deref().and_then(parse_receiver_notes) else {
            report.unmatched += 1;
            continue;
        };

        order.receiver = receiver;
        if orders.save_order(&order, None).await? {
            tracing::debug!(
                order_id = %order.id,
                tracking_code = %order.tracking_code,
                "Receiver backfilled from notes"
            );
            report.updated += 1;
        }
    }

    tracing::info!(
        scanned = report.scanned,
        updated = report.updated,
        unmatched = report.unmatched,
        "Receiver backfill finished"
    );
    Ok(report)
}
